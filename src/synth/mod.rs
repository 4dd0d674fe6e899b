pub mod soundfont;
pub mod tone;

use std::path::PathBuf;

use crate::midi::ChannelMessage;

pub use soundfont::SoundFontSynth;
pub use tone::{ToneSynth, WaveformType};

/// Anything that turns channel messages into stereo audio.
///
/// Runs on the audio thread, so implementations must not block.
pub trait Synthesizer: Send {
    fn sample_rate(&self) -> u32;

    fn process(&mut self, channel: u8, message: ChannelMessage);

    /// Release every sounding note on every channel.
    fn note_off_all(&mut self);

    /// Fill both buffers (same length) with the next block of audio.
    fn render(&mut self, left: &mut [f32], right: &mut [f32]);
}

/// Where instrument sounds come from.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentSource {
    SoundFont(PathBuf),
    Tone(WaveformType),
}

impl Default for InstrumentSource {
    fn default() -> Self {
        InstrumentSource::SoundFont(PathBuf::from("GeneralUser.sf2"))
    }
}
