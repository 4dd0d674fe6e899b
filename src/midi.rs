//! Standard MIDI file loading.
//!
//! Every track of the file is flattened into one time-ordered list of channel
//! events with absolute times in seconds, so playback only has to walk a cursor.

use std::path::Path;
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

use crate::error::PlayerError;

/// Microseconds per quarter note when a file sets no tempo (120 BPM).
pub const DEFAULT_TEMPO: u32 = 500_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMessage {
    NoteOn { key: u8, velocity: u8 },
    NoteOff { key: u8 },
    PolyPressure { key: u8, pressure: u8 },
    ControlChange { controller: u8, value: u8 },
    ProgramChange { program: u8 },
    ChannelPressure { pressure: u8 },
    /// 14-bit value, 8192 is centre.
    PitchBend { value: u16 },
}

impl From<MidiMessage> for ChannelMessage {
    fn from(message: MidiMessage) -> Self {
        match message {
            // Running-status files end notes with a zero-velocity note-on
            MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => ChannelMessage::NoteOff { key: key.as_int() },
            MidiMessage::NoteOn { key, vel } => ChannelMessage::NoteOn { key: key.as_int(), velocity: vel.as_int() },
            MidiMessage::NoteOff { key, .. } => ChannelMessage::NoteOff { key: key.as_int() },
            MidiMessage::Aftertouch { key, vel } => ChannelMessage::PolyPressure { key: key.as_int(), pressure: vel.as_int() },
            MidiMessage::Controller { controller, value } => ChannelMessage::ControlChange {
                controller: controller.as_int(),
                value: value.as_int(),
            },
            MidiMessage::ProgramChange { program } => ChannelMessage::ProgramChange { program: program.as_int() },
            MidiMessage::ChannelAftertouch { vel } => ChannelMessage::ChannelPressure { pressure: vel.as_int() },
            MidiMessage::PitchBend { bend } => ChannelMessage::PitchBend { value: bend.0.as_int() },
        }
    }
}

impl ChannelMessage {
    /// Command nibble and the two data bytes, as sent over the wire.
    pub fn to_bytes(&self) -> (u8, u8, u8) {
        match *self {
            ChannelMessage::NoteOff { key } => (0x80, key, 0),
            ChannelMessage::NoteOn { key, velocity } => (0x90, key, velocity),
            ChannelMessage::PolyPressure { key, pressure } => (0xA0, key, pressure),
            ChannelMessage::ControlChange { controller, value } => (0xB0, controller, value),
            ChannelMessage::ProgramChange { program } => (0xC0, program, 0),
            ChannelMessage::ChannelPressure { pressure } => (0xD0, pressure, 0),
            ChannelMessage::PitchBend { value } => (0xE0, (value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidiEvent {
    /// Seconds from the start of the file
    pub time: f64,
    pub channel: u8,
    pub message: ChannelMessage,
}

#[derive(Debug, Clone, Default)]
pub struct MidiSequence {
    pub events: Vec<MidiEvent>,
    pub duration: f64,
    pub track_names: Vec<String>,
    pub initial_bpm: f64,
}

enum Pending {
    Tempo(u32),
    Channel(u8, ChannelMessage),
}

// Converts absolute ticks to seconds while tempo changes arrive in tick order
struct TickClock {
    tick: u64,
    seconds: f64,
    seconds_per_tick: f64,
    ticks_per_beat: Option<f64>, // None for SMPTE timing, where tempo is ignored
}

impl TickClock {
    fn new(timing: Timing) -> Self {
        match timing {
            Timing::Metrical(tpb) => {
                let tpb = tpb.as_int().max(1) as f64;
                TickClock {
                    tick: 0,
                    seconds: 0.0,
                    seconds_per_tick: DEFAULT_TEMPO as f64 / 1_000_000.0 / tpb,
                    ticks_per_beat: Some(tpb),
                }
            }
            Timing::Timecode(fps, ticks_per_frame) => TickClock {
                tick: 0,
                seconds: 0.0,
                seconds_per_tick: 1.0 / (fps.as_f32() as f64 * ticks_per_frame.max(1) as f64),
                ticks_per_beat: None,
            },
        }
    }

    fn seconds_at(&mut self, tick: u64) -> f64 {
        self.seconds += (tick - self.tick) as f64 * self.seconds_per_tick;
        self.tick = tick;
        self.seconds
    }

    fn set_tempo(&mut self, micros_per_beat: u32) {
        if let Some(tpb) = self.ticks_per_beat {
            self.seconds_per_tick = micros_per_beat.max(1) as f64 / 1_000_000.0 / tpb;
        }
    }
}

impl MidiSequence {
    pub fn from_file(path: &Path) -> Result<Self, PlayerError> {
        let data = std::fs::read(path)
            .map_err(|e| PlayerError::FileError(format!("{}: {}", path.display(), e)))?;
        MidiSequence::parse(&data)
            .map_err(|e| match e {
                PlayerError::ParseError(msg) => PlayerError::ParseError(format!("{}: {}", path.display(), msg)),
                other => other,
            })
    }

    pub fn parse(data: &[u8]) -> Result<Self, PlayerError> {
        let smf = Smf::parse(data).map_err(|e| PlayerError::ParseError(e.to_string()))?;

        let mut pending: Vec<(u64, Pending)> = Vec::new();
        let mut track_names = Vec::new();
        let mut end_tick = 0u64;

        for track in &smf.tracks {
            let mut tick = 0u64;
            for event in track {
                tick += event.delta.as_int() as u64;
                match event.kind {
                    TrackEventKind::Midi { channel, message } => {
                        pending.push((tick, Pending::Channel(channel.as_int(), message.into())));
                    }
                    TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                        pending.push((tick, Pending::Tempo(tempo.as_int())));
                    }
                    TrackEventKind::Meta(MetaMessage::TrackName(name)) => {
                        track_names.push(String::from_utf8_lossy(name).trim().to_string());
                    }
                    _ => {}
                }
            }
            end_tick = end_tick.max(tick);
        }

        // Stable, so simultaneous events keep track order and then file order
        pending.sort_by_key(|(tick, _)| *tick);

        let initial_tempo = pending
            .iter()
            .take_while(|(tick, _)| *tick == 0)
            .filter_map(|(_, p)| match p {
                Pending::Tempo(t) => Some(*t),
                _ => None,
            })
            .last()
            .unwrap_or(DEFAULT_TEMPO);

        let mut clock = TickClock::new(smf.header.timing);
        let mut events = Vec::with_capacity(pending.len());
        for (tick, p) in pending {
            let time = clock.seconds_at(tick);
            match p {
                Pending::Tempo(t) => clock.set_tempo(t),
                Pending::Channel(channel, message) => events.push(MidiEvent { time, channel, message }),
            }
        }
        let duration = clock.seconds_at(end_tick);

        Ok(MidiSequence {
            events,
            duration,
            track_names,
            initial_bpm: 60_000_000.0 / initial_tempo.max(1) as f64,
        })
    }

    /// Build a sequence from already-timed events. Events are put in time order.
    pub fn from_events(mut events: Vec<MidiEvent>, duration: f64) -> Self {
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        let last = events.last().map(|e| e.time).unwrap_or(0.0);
        MidiSequence {
            events,
            duration: duration.max(last),
            track_names: Vec::new(),
            initial_bpm: 120.0,
        }
    }

    pub fn note_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.message, ChannelMessage::NoteOn { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
