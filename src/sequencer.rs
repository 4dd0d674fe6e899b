use std::sync::Arc;

use crate::midi::MidiSequence;
use crate::synth::Synthesizer;

/// Walks a [`MidiSequence`] in step with rendered audio.
///
/// Events are dispatched on the frame they fall on, blocks are split at
/// event boundaries so timing does not depend on the callback size.
pub struct Sequencer {
    sequence: Arc<MidiSequence>,
    sample_rate: u32,
    next_event: usize,
    position: u64, // frames rendered so far
}

impl Sequencer {
    pub fn new(sequence: Arc<MidiSequence>, sample_rate: u32) -> Self {
        Sequencer {
            sequence,
            sample_rate,
            next_event: 0,
            position: 0,
        }
    }

    pub fn sequence(&self) -> &MidiSequence {
        &self.sequence
    }

    fn frame_of(&self, time: f64) -> u64 {
        (time * self.sample_rate as f64).round() as u64
    }

    pub fn duration_frames(&self) -> u64 {
        self.frame_of(self.sequence.duration)
    }

    fn dispatch_due<S: Synthesizer + ?Sized>(&mut self, synth: &mut S) {
        while let Some(event) = self.sequence.events.get(self.next_event) {
            if self.frame_of(event.time) > self.position {
                break;
            }
            synth.process(event.channel, event.message);
            self.next_event += 1;
        }
    }

    fn frames_until_next_event(&self) -> Option<u64> {
        self.sequence
            .events
            .get(self.next_event)
            .map(|e| self.frame_of(e.time).saturating_sub(self.position))
    }

    pub fn render<S: Synthesizer + ?Sized>(&mut self, synth: &mut S, left: &mut [f32], right: &mut [f32]) {
        let len = left.len().min(right.len());
        let mut written = 0;

        while written < len {
            self.dispatch_due(synth);

            let remaining = len - written;
            let chunk = match self.frames_until_next_event() {
                Some(frames) if frames > 0 => remaining.min(frames as usize),
                _ => remaining,
            };

            synth.render(&mut left[written..written + chunk], &mut right[written..written + chunk]);
            written += chunk;
            self.position += chunk as u64;
        }

        // Events on the block boundary belong to this block
        self.dispatch_due(synth);
    }

    /// Seconds played so far.
    pub fn position(&self) -> f64 {
        self.position as f64 / self.sample_rate as f64
    }

    /// Percent of the track played, 0..=100.
    pub fn progress(&self) -> u8 {
        let total = self.duration_frames();
        if total == 0 {
            return if self.is_finished() { 100 } else { 0 };
        }
        (self.position.min(total) * 100 / total) as u8
    }

    pub fn frames_remaining(&self) -> u64 {
        self.duration_frames().saturating_sub(self.position)
    }

    pub fn is_finished(&self) -> bool {
        self.next_event >= self.sequence.events.len() && self.position >= self.duration_frames()
    }

    pub fn dispatched(&self) -> usize {
        self.next_event
    }

    pub fn rewind(&mut self) {
        self.next_event = 0;
        self.position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{ChannelMessage, MidiEvent};

    // Records every dispatched event with the frame it landed on
    #[derive(Default)]
    struct Recorder {
        frame: u64,
        seen: Vec<(u64, u8, ChannelMessage)>,
    }

    impl Synthesizer for Recorder {
        fn sample_rate(&self) -> u32 {
            1000
        }

        fn process(&mut self, channel: u8, message: ChannelMessage) {
            self.seen.push((self.frame, channel, message));
        }

        fn note_off_all(&mut self) {}

        fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
            left.fill(0.0);
            right.fill(0.0);
            self.frame += left.len() as u64;
        }
    }

    fn on(time: f64, key: u8) -> MidiEvent {
        MidiEvent { time, channel: 0, message: ChannelMessage::NoteOn { key, velocity: 100 } }
    }

    fn sequence() -> Arc<MidiSequence> {
        Arc::new(MidiSequence::from_events(vec![on(0.0, 60), on(0.011, 61), on(0.25, 62), on(0.25, 63)], 0.5))
    }

    #[test]
    fn events_land_on_their_frames_regardless_of_block_size() {
        for block in [1usize, 7, 64, 1000] {
            let mut seq = Sequencer::new(sequence(), 1000);
            let mut synth = Recorder::default();
            let mut l = vec![0.0; block];
            let mut r = vec![0.0; block];
            while !seq.is_finished() {
                seq.render(&mut synth, &mut l, &mut r);
            }
            let frames: Vec<u64> = synth.seen.iter().map(|(f, _, _)| *f).collect();
            assert_eq!(frames, vec![0, 11, 250, 250], "block size {}", block);
        }
    }

    #[test]
    fn every_event_dispatched_once_in_order() {
        let mut seq = Sequencer::new(sequence(), 1000);
        let mut synth = Recorder::default();
        let mut l = vec![0.0; 600];
        let mut r = vec![0.0; 600];
        seq.render(&mut synth, &mut l, &mut r);
        let keys: Vec<u8> = synth.seen.iter().map(|(_, _, m)| match m {
            ChannelMessage::NoteOn { key, .. } => *key,
            _ => 0,
        }).collect();
        assert_eq!(keys, vec![60, 61, 62, 63]);
        assert_eq!(seq.dispatched(), 4);
        assert!(seq.is_finished());
    }

    #[test]
    fn progress_tracks_position() {
        let mut seq = Sequencer::new(sequence(), 1000);
        let mut synth = Recorder::default();
        assert_eq!(seq.progress(), 0);
        let mut l = vec![0.0; 125];
        let mut r = vec![0.0; 125];
        seq.render(&mut synth, &mut l, &mut r);
        assert_eq!(seq.progress(), 25);
        assert!((seq.position() - 0.125).abs() < 1e-9);
        seq.render(&mut synth, &mut l, &mut r);
        seq.render(&mut synth, &mut l, &mut r);
        seq.render(&mut synth, &mut l, &mut r);
        assert_eq!(seq.progress(), 100);
        assert!(seq.is_finished());
    }

    #[test]
    fn rewind_replays_from_start() {
        let mut seq = Sequencer::new(sequence(), 1000);
        let mut synth = Recorder::default();
        let mut l = vec![0.0; 500];
        let mut r = vec![0.0; 500];
        seq.render(&mut synth, &mut l, &mut r);
        seq.rewind();
        assert_eq!(seq.progress(), 0);
        assert!(!seq.is_finished());
        seq.render(&mut synth, &mut l, &mut r);
        assert_eq!(synth.seen.len(), 8);
    }

    #[test]
    fn empty_sequence_finishes_immediately() {
        let seq = Sequencer::new(Arc::new(MidiSequence::default()), 1000);
        assert!(seq.is_finished());
        assert_eq!(seq.progress(), 100);
    }
}
