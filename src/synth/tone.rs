use std::str::FromStr;

use crate::error::PlayerError;
use crate::midi::ChannelMessage;
use crate::synth::Synthesizer;

const MAX_VOICES: usize = 64;
const PERCUSSION_CHANNEL: u8 = 9;
const BEND_RANGE_SEMITONES: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaveformType {
    Sine,
    Square,
    Triangle,
    Sawtooth,
    Noise,
}

impl WaveformType {
    pub fn generate_sample(&self, phase: f32) -> f32 { // Phase should be in the range [0.0, 1.0)
        match self {
            WaveformType::Sine => (phase * std::f32::consts::TAU).sin(),
            WaveformType::Square => if phase < 0.5 { 1.0 } else { -1.0 },
            WaveformType::Sawtooth => phase * 2.0 - 1.0,
            WaveformType::Noise => fastrand::f32() * 2.0 - 1.0,
            WaveformType::Triangle => {
                if phase < 0.5 { phase * 4.0 - 1.0 } else { 3.0 - phase * 4.0 }
            }
        }
    }
}

impl FromStr for WaveformType {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sine" => Ok(WaveformType::Sine),
            "square" => Ok(WaveformType::Square),
            "triangle" => Ok(WaveformType::Triangle),
            "sawtooth" | "saw" => Ok(WaveformType::Sawtooth),
            "noise" => Ok(WaveformType::Noise),
            other => Err(PlayerError::ParseError(format!("Unknown waveform: {}", other))),
        }
    }
}

/// ADSR envelope, times in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Default for Envelope {
    fn default() -> Self {
        Envelope {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.8,
            release: 0.2,
        }
    }
}

impl Envelope {
    fn percussive() -> Self {
        Envelope {
            attack: 0.001,
            decay: 0.12,
            sustain: 0.0,
            release: 0.05,
        }
    }

    // Level while the key is held
    fn held_level(&self, time: f32) -> f32 {
        let decay_end = self.attack + self.decay;
        if time < self.attack {
            time / self.attack
        } else if time < decay_end {
            let decay_progress = (time - self.attack) / self.decay;
            1.0 - decay_progress * (1.0 - self.sustain)
        } else {
            self.sustain
        }
    }

    fn level(&self, time: f32, release: Option<(f32, f32)>) -> f32 {
        match release {
            None => self.held_level(time),
            Some((released_at, from_level)) => {
                let progress = (time - released_at) / self.release;
                (from_level * (1.0 - progress)).max(0.0)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Voice {
    channel: u8,
    key: u8,
    frequency: f32,
    velocity: f32,
    phase: f32,
    time: f32,
    waveform: WaveformType,
    envelope: Envelope,
    release: Option<(f32, f32)>, // (time of release, level at release)
}

impl Voice {
    fn release(&mut self) {
        if self.release.is_none() {
            let level = self.envelope.level(self.time, None);
            self.release = Some((self.time, level));
        }
    }

    fn is_finished(&self) -> bool {
        match self.release {
            Some((released_at, _)) => self.time >= released_at + self.envelope.release,
            None => self.envelope.sustain <= 0.0 && self.time >= self.envelope.attack + self.envelope.decay,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ChannelState {
    volume: u8,
    expression: u8,
    bend: f32, // semitones
}

impl Default for ChannelState {
    fn default() -> Self {
        ChannelState { volume: 100, expression: 127, bend: 0.0 }
    }
}

impl ChannelState {
    fn gain(&self) -> f32 {
        (self.volume as f32 / 127.0) * (self.expression as f32 / 127.0)
    }
}

/// Oscillator synth for playing without a SoundFont.
pub struct ToneSynth {
    sample_rate: u32,
    waveform: WaveformType,
    envelope: Envelope,
    voices: Vec<Voice>,
    channels: [ChannelState; 16],
    gain: f32,
}

pub fn key_frequency(key: u8) -> f32 {
    440.0 * 2.0_f32.powf((key as f32 - 69.0) / 12.0)
}

impl ToneSynth {
    pub fn new(sample_rate: u32, waveform: WaveformType) -> Self {
        ToneSynth {
            sample_rate,
            waveform,
            envelope: Envelope::default(),
            voices: Vec::with_capacity(MAX_VOICES),
            channels: [ChannelState::default(); 16],
            gain: 0.2,
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    fn note_on(&mut self, channel: u8, key: u8, velocity: u8) {
        self.note_off(channel, key);
        if self.voices.len() >= MAX_VOICES {
            self.voices.remove(0); // steal the oldest
        }
        let (waveform, envelope) = if channel == PERCUSSION_CHANNEL {
            (WaveformType::Noise, Envelope::percussive())
        } else {
            (self.waveform, self.envelope)
        };
        self.voices.push(Voice {
            channel,
            key,
            frequency: key_frequency(key),
            velocity: velocity as f32 / 127.0,
            phase: 0.0,
            time: 0.0,
            waveform,
            envelope,
            release: None,
        });
    }

    fn note_off(&mut self, channel: u8, key: u8) {
        self.voices
            .iter_mut()
            .filter(|v| v.channel == channel && v.key == key)
            .for_each(Voice::release);
    }

    fn control_change(&mut self, channel: u8, controller: u8, value: u8) {
        let state = &mut self.channels[channel as usize & 0x0F];
        match controller {
            7 => state.volume = value,
            11 => state.expression = value,
            120 => self.voices.retain(|v| v.channel != channel),
            121 => *state = ChannelState::default(),
            123 => self.voices
                .iter_mut()
                .filter(|v| v.channel == channel)
                .for_each(Voice::release),
            _ => {}
        }
    }
}

impl Synthesizer for ToneSynth {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn process(&mut self, channel: u8, message: ChannelMessage) {
        match message {
            ChannelMessage::NoteOn { key, velocity } => self.note_on(channel, key, velocity),
            ChannelMessage::NoteOff { key } => self.note_off(channel, key),
            ChannelMessage::ControlChange { controller, value } => self.control_change(channel, controller, value),
            ChannelMessage::PitchBend { value } => {
                let amount = (value as f32 - 8192.0) / 8192.0;
                self.channels[channel as usize & 0x0F].bend = amount * BEND_RANGE_SEMITONES;
            }
            _ => {}
        }
    }

    fn note_off_all(&mut self) {
        self.voices.iter_mut().for_each(Voice::release);
    }

    fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        left.fill(0.0);
        right.fill(0.0);
        let dt = 1.0 / self.sample_rate as f32;

        for voice in self.voices.iter_mut() {
            let channel = self.channels[voice.channel as usize & 0x0F];
            let increment = voice.frequency * 2.0_f32.powf(channel.bend / 12.0) * dt;
            let amplitude = voice.velocity * channel.gain() * self.gain;

            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                let envelope = voice.envelope.level(voice.time, voice.release);
                let sample = voice.waveform.generate_sample(voice.phase) * envelope * amplitude;
                *l += sample;
                *r += sample;

                voice.phase += increment;
                if voice.phase >= 1.0 {
                    voice.phase -= 1.0;
                }
                voice.time += dt;
            }
        }

        self.voices.retain(|v| !v.is_finished());
    }
}
