use std::path::{Path, PathBuf};
use std::sync::Arc;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use parking_lot::Mutex;
use rustysynth::SoundFont;

use crate::error::PlayerError;
use crate::midi::MidiSequence;
use crate::player::Backend;
use crate::render::RELEASE_TAIL_SECONDS;
use crate::sequencer::Sequencer;
use crate::synth::soundfont::load_soundfont;
use crate::synth::{InstrumentSource, SoundFontSynth, Synthesizer, ToneSynth};

pub const DEFAULT_VOLUME: u8 = 100;
pub const MAX_VOLUME: u8 = 127;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Everything the audio callback needs for one track.
pub struct PlaybackContext {
    sequencer: Sequencer,
    synth: Box<dyn Synthesizer>,
    state: PlaybackState,
    volume: u8,
    // Frames left to ring out after the last event
    release: Option<u64>,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl PlaybackContext {
    pub fn new(sequence: Arc<MidiSequence>, synth: Box<dyn Synthesizer>, volume: u8) -> Self {
        let sample_rate = synth.sample_rate();
        PlaybackContext {
            sequencer: Sequencer::new(sequence, sample_rate),
            synth,
            state: PlaybackState::Playing,
            volume: volume.min(MAX_VOLUME),
            release: None,
            left: Vec::new(),
            right: Vec::new(),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.state = PlaybackState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == PlaybackState::Paused {
            self.state = PlaybackState::Playing;
        }
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(MAX_VOLUME);
    }

    pub fn progress(&self) -> u8 {
        self.sequencer.progress()
    }

    pub fn position(&self) -> f64 {
        self.sequencer.position()
    }

    /// Fill an interleaved buffer of `channels` channels.
    ///
    /// Mono output gets the average of both sides. Wider layouts carry left and
    /// right on the first two channels and silence on the rest. Once the last
    /// event has played the synth keeps rendering for [`RELEASE_TAIL_SECONDS`]
    /// before the context reports `Stopped`.
    pub fn render_interleaved(&mut self, data: &mut [f32], channels: usize) {
        if self.state != PlaybackState::Playing || channels == 0 {
            data.fill(0.0);
            return;
        }

        let frames = data.len() / channels;
        self.left.resize(frames, 0.0);
        self.right.resize(frames, 0.0);
        match self.release {
            None => self.sequencer.render(self.synth.as_mut(), &mut self.left, &mut self.right),
            Some(_) => self.synth.render(&mut self.left, &mut self.right),
        }

        let gain = self.volume as f32 / MAX_VOLUME as f32;
        for (i, frame) in data.chunks_mut(channels).enumerate() {
            let (l, r) = match (self.left.get(i), self.right.get(i)) {
                (Some(l), Some(r)) => (*l * gain, *r * gain),
                _ => (0.0, 0.0),
            };
            match frame {
                [mono] => *mono = (l + r) * 0.5,
                [first, second, rest @ ..] => {
                    *first = l;
                    *second = r;
                    rest.fill(0.0);
                }
                [] => {}
            }
        }

        self.release = match self.release {
            None if self.sequencer.is_finished() => {
                self.synth.note_off_all();
                Some((RELEASE_TAIL_SECONDS * self.synth.sample_rate() as f64) as u64)
            }
            Some(remaining) => Some(remaining.saturating_sub(frames as u64)),
            None => None,
        };
        if self.release == Some(0) {
            self.state = PlaybackState::Stopped;
        }
    }
}

pub struct AudioEngine {
    stream_config: StreamConfig,
    sample_format: SampleFormat,
    sample_rate: u32,
    instruments: InstrumentSource,
    soundfont_cache: Option<(PathBuf, Arc<SoundFont>)>,
    playback_context: Arc<Mutex<Option<PlaybackContext>>>,
    stream: Option<Stream>,
    volume: u8,
}

impl AudioEngine {
    pub fn new(instruments: InstrumentSource) -> Result<Self, PlayerError> {
        let host = cpal::default_host();
        let device = host.default_output_device()
            .ok_or_else(|| PlayerError::AudioError("No output device found".to_string()))?;
        let config = device.default_output_config()
            .map_err(|e| PlayerError::AudioError(e.to_string()))?;
        let stream_config = config.config();
        log::debug!(
            "output device {:?}: {} Hz, {} channels, {:?}",
            device.name().unwrap_or_default(),
            stream_config.sample_rate.0,
            stream_config.channels,
            config.sample_format()
        );

        Ok(AudioEngine {
            sample_rate: stream_config.sample_rate.0,
            sample_format: config.sample_format(),
            stream_config,
            instruments,
            soundfont_cache: None,
            playback_context: Arc::new(Mutex::new(None)),
            stream: None,
            volume: DEFAULT_VOLUME,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn soundfont(&mut self, path: &Path) -> Result<Arc<SoundFont>, PlayerError> {
        if let Some((cached_path, soundfont)) = &self.soundfont_cache {
            if cached_path == path {
                return Ok(Arc::clone(soundfont));
            }
        }
        let soundfont = load_soundfont(path)?;
        self.soundfont_cache = Some((path.to_path_buf(), Arc::clone(&soundfont)));
        Ok(soundfont)
    }

    fn build_synth(&mut self) -> Result<Box<dyn Synthesizer>, PlayerError> {
        match self.instruments.clone() {
            InstrumentSource::SoundFont(path) => {
                let soundfont = self.soundfont(&path)?;
                Ok(Box::new(SoundFontSynth::new(&soundfont, self.sample_rate)?))
            }
            InstrumentSource::Tone(waveform) => Ok(Box::new(ToneSynth::new(self.sample_rate, waveform))),
        }
    }

    pub fn play_sequence(&mut self, sequence: MidiSequence) -> Result<(), PlayerError> {
        self.stop();

        let synth = self.build_synth()?;
        let context = PlaybackContext::new(Arc::new(sequence), synth, self.volume);
        *self.playback_context.lock() = Some(context);
        self.start_stream()
    }

    pub fn play_file(&mut self, path: &Path) -> Result<(), PlayerError> {
        let sequence = MidiSequence::from_file(path)?;
        log::info!(
            "playing {} ({} notes, {:.1}s)",
            path.display(),
            sequence.note_count(),
            sequence.duration
        );
        self.play_sequence(sequence)
    }

    pub fn pause(&self) {
        if let Some(ctx) = self.playback_context.lock().as_mut() {
            ctx.pause();
        }
    }

    pub fn resume(&self) {
        if let Some(ctx) = self.playback_context.lock().as_mut() {
            ctx.resume();
        }
    }

    /// Returns true when playback ended up paused.
    pub fn toggle_pause(&self) -> bool {
        let mut guard = self.playback_context.lock();
        match guard.as_mut() {
            Some(ctx) => {
                match ctx.state() {
                    PlaybackState::Playing => ctx.pause(),
                    PlaybackState::Paused => ctx.resume(),
                    PlaybackState::Stopped => {}
                }
                ctx.state() == PlaybackState::Paused
            }
            None => false,
        }
    }

    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        *self.playback_context.lock() = None;
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(MAX_VOLUME);
        if let Some(ctx) = self.playback_context.lock().as_mut() {
            ctx.set_volume(self.volume);
        }
    }

    pub fn get_playback_state(&self) -> PlaybackState {
        match self.playback_context.lock().as_ref() {
            Some(ctx) => ctx.state(),
            None => PlaybackState::Stopped,
        }
    }

    pub fn get_progress(&self) -> u8 {
        self.playback_context.lock().as_ref().map(|ctx| ctx.progress()).unwrap_or(0)
    }

    pub fn get_playback_position(&self) -> f64 {
        self.playback_context.lock().as_ref().map(|ctx| ctx.position()).unwrap_or(0.0)
    }

    fn start_stream(&mut self) -> Result<(), PlayerError> {
        let host = cpal::default_host();
        let device = host.default_output_device()
            .ok_or_else(|| PlayerError::AudioError("No output device".to_string()))?;

        let ctx = Arc::clone(&self.playback_context);
        let stream = match self.sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &self.stream_config, ctx)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &self.stream_config, ctx)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &self.stream_config, ctx)?,
            other => return Err(PlayerError::AudioError(format!("Unsupported sample format {:?}", other))),
        };

        stream.play().map_err(|e| PlayerError::AudioError(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    ctx: Arc<Mutex<Option<PlaybackContext>>>,
) -> Result<Stream, PlayerError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            {
                let mut context_lock = ctx.lock();
                match context_lock.as_mut() {
                    Some(context) => context.render_interleaved(&mut scratch, channels),
                    None => scratch.fill(0.0),
                }
            }
            for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(*src);
            }
        },
        |err| log::error!("stream error: {}", err),
        None,
    ).map_err(|e| PlayerError::AudioError(e.to_string()))
}

impl Backend for AudioEngine {
    fn start(&mut self, path: &Path) -> Result<(), PlayerError> {
        self.play_file(path)
    }

    fn stop(&mut self) {
        AudioEngine::stop(self);
    }

    fn toggle_pause(&mut self) -> bool {
        AudioEngine::toggle_pause(self)
    }

    fn set_volume(&mut self, volume: u8) {
        AudioEngine::set_volume(self, volume);
    }

    fn state(&self) -> PlaybackState {
        self.get_playback_state()
    }

    fn progress(&self) -> u8 {
        self.get_progress()
    }

    fn position(&self) -> f64 {
        self.get_playback_position()
    }
}
