//! Konghou keyboard layout.
//!
//! The in-game konghou has three registers of seven letter keys each. Sharps
//! are played with Shift and the flat third and seventh with Ctrl, which
//! gives 36 chromatic notes from C3 (48) to B5 (83). Notes outside that
//! range are folded in by octaves.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::midi::{ChannelMessage, MidiSequence};

pub const MIN_NOTE: u8 = 48;
pub const MAX_NOTE: u8 = 83;
const OCTAVE: u8 = 12;

/// Scale degree and its semitone offset from the register's tonic.
const DEGREES: [(&str, u8); 12] = [
    ("1", 0), ("#1", 1),
    ("2", 2),
    ("b3", 3), ("3", 4),
    ("4", 5), ("#4", 6),
    ("5", 7), ("#5", 8),
    ("6", 9),
    ("b7", 10), ("7", 11),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Low,
    Med,
    High,
}

impl Register {
    pub const ALL: [Register; 3] = [Register::Low, Register::Med, Register::High];

    pub fn base_note(&self) -> u8 {
        match self {
            Register::Low => 48,  // C3
            Register::Med => 60,  // C4
            Register::High => 72, // C5
        }
    }

    /// Key for each entry of `DEGREES`, in the same order.
    fn keys(&self) -> [&'static str; 12] {
        match self {
            Register::Low => ["Z", "Shift+Z", "X", "Ctrl+C", "C", "V", "Shift+V", "B", "Shift+B", "N", "Ctrl+M", "M"],
            Register::Med => ["A", "Shift+A", "S", "Ctrl+D", "D", "F", "Shift+F", "G", "Shift+G", "H", "Ctrl+J", "J"],
            Register::High => ["Q", "Shift+Q", "W", "Ctrl+E", "E", "R", "Shift+R", "T", "Shift+T", "Y", "Ctrl+U", "U"],
        }
    }
}

/// Fold a note into the playable range by whole octaves.
pub fn transpose_into_range(note: u8) -> u8 {
    let mut note = note;
    while note < MIN_NOTE {
        note += OCTAVE;
    }
    while note > MAX_NOTE {
        note -= OCTAVE;
    }
    note
}

/// Gap between the notes of a rolled chord. Louder chords roll faster.
pub fn roll_delay(velocity: u8) -> Duration {
    let seconds = (0.1 - (velocity.min(127) as f64 / 127.0) * 0.08).max(0.01);
    Duration::from_secs_f64(seconds)
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyStroke {
    /// Seconds from the start of the track
    pub time: f64,
    pub keys: &'static str,
    pub note: u8,
}

#[derive(Debug, Clone)]
pub struct KonghouLayout {
    keys: BTreeMap<u8, &'static str>,
}

impl Default for KonghouLayout {
    fn default() -> Self {
        KonghouLayout::new(0)
    }
}

impl KonghouLayout {
    /// `semitone_offset` shifts the whole instrument, for songs in other keys.
    /// Entries pushed outside the playable range are dropped.
    pub fn new(semitone_offset: i8) -> Self {
        let mut keys = BTreeMap::new();
        for register in Register::ALL {
            let base = register.base_note() as i16 + semitone_offset as i16;
            for ((_, offset), key) in DEGREES.iter().zip(register.keys()) {
                let note = base + *offset as i16;
                if (MIN_NOTE as i16..=MAX_NOTE as i16).contains(&note) {
                    keys.insert(note as u8, key);
                }
            }
        }
        KonghouLayout { keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key_for(&self, note: u8) -> Option<&'static str> {
        self.keys.get(&transpose_into_range(note)).copied()
    }

    /// Key strokes for every note-on of a sequence.
    ///
    /// Note-ons that share a timestamp form a chord. The chord is rolled
    /// upwards, spacing its notes by [`roll_delay`] of the loudest note.
    pub fn timeline(&self, sequence: &MidiSequence) -> Vec<KeyStroke> {
        let mut strokes = Vec::new();
        let mut notes = sequence.events.iter().filter_map(|e| match e.message {
            ChannelMessage::NoteOn { key, velocity } => Some((e.time, key, velocity)),
            _ => None,
        }).peekable();

        while let Some((time, key, velocity)) = notes.next() {
            let mut chord = vec![key];
            let mut loudest = velocity;
            while let Some((_, next_key, next_velocity)) = notes.next_if(|(t, _, _)| (*t - time).abs() < 1e-6) {
                chord.push(next_key);
                loudest = loudest.max(next_velocity);
            }
            chord.sort_unstable();

            let gap = roll_delay(loudest).as_secs_f64();
            let mut offset = 0.0;
            for note in chord {
                if let Some(keys) = self.key_for(note) {
                    strokes.push(KeyStroke { time: time + offset, keys, note });
                    offset += gap;
                }
            }
        }

        strokes
    }
}

/// Receiver for key strokes, e.g. a printer or an input injector.
pub trait KeySink {
    fn send(&mut self, stroke: &KeyStroke);
}

/// Feed a whole timeline to a sink.
pub fn perform<S: KeySink + ?Sized>(strokes: &[KeyStroke], sink: &mut S) {
    for stroke in strokes {
        sink.send(stroke);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiEvent;

    fn on(time: f64, key: u8, velocity: u8) -> MidiEvent {
        MidiEvent { time, channel: 0, message: ChannelMessage::NoteOn { key, velocity } }
    }

    #[test]
    fn default_layout_covers_the_whole_range() {
        let layout = KonghouLayout::default();
        assert_eq!(layout.len(), 36);
        assert_eq!(layout.key_for(48), Some("Z"));
        assert_eq!(layout.key_for(49), Some("Shift+Z"));
        assert_eq!(layout.key_for(63), Some("Ctrl+D"));
        assert_eq!(layout.key_for(72), Some("Q"));
        assert_eq!(layout.key_for(83), Some("U"));
    }

    #[test]
    fn out_of_range_notes_fold_by_octaves() {
        assert_eq!(transpose_into_range(0), 48);
        assert_eq!(transpose_into_range(47), 59);
        assert_eq!(transpose_into_range(84), 72);
        assert_eq!(transpose_into_range(127), 79);
        assert_eq!(transpose_into_range(60), 60);

        let layout = KonghouLayout::default();
        assert_eq!(layout.key_for(36), Some("Z"));
        assert_eq!(layout.key_for(96), Some("Q"));
    }

    #[test]
    fn offset_drops_keys_leaving_the_range() {
        let layout = KonghouLayout::new(2);
        assert_eq!(layout.len(), 34);
        assert_eq!(layout.key_for(50), Some("Z"));
        assert_eq!(layout.key_for(48), None);

        let down = KonghouLayout::new(-1);
        assert_eq!(down.len(), 35);
        assert_eq!(down.key_for(48), Some("Shift+Z"));
        assert_eq!(down.key_for(59), Some("A"));
    }

    #[test]
    fn roll_delay_is_bounded() {
        assert!((roll_delay(0).as_secs_f64() - 0.1).abs() < 1e-9);
        assert!((roll_delay(127).as_secs_f64() - 0.02).abs() < 1e-9);
        assert!(roll_delay(64) < roll_delay(10));
        assert!(roll_delay(255) >= Duration::from_millis(10));
    }

    #[test]
    fn chords_are_rolled_upwards() {
        let seq = MidiSequence::from_events(vec![on(1.0, 64, 127), on(1.0, 60, 50), on(2.0, 67, 80)], 3.0);
        let strokes = KonghouLayout::default().timeline(&seq);
        let keys: Vec<&str> = strokes.iter().map(|s| s.keys).collect();
        assert_eq!(keys, vec!["A", "D", "G"]);
        assert!((strokes[0].time - 1.0).abs() < 1e-9);
        assert!((strokes[1].time - 1.02).abs() < 1e-9);
        assert!((strokes[2].time - 2.0).abs() < 1e-9);
    }

    #[test]
    fn perform_sends_everything_in_order() {
        struct Collect(Vec<u8>);
        impl KeySink for Collect {
            fn send(&mut self, stroke: &KeyStroke) {
                self.0.push(stroke.note);
            }
        }

        let seq = MidiSequence::from_events(vec![on(0.0, 72, 100), on(0.5, 48, 100)], 1.0);
        let strokes = KonghouLayout::default().timeline(&seq);
        let mut sink = Collect(Vec::new());
        perform(&strokes, &mut sink);
        assert_eq!(sink.0, vec![72, 48]);
    }
}
