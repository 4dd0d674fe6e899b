use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustysynth::{SoundFont, SynthesizerSettings};

use crate::error::PlayerError;
use crate::midi::ChannelMessage;
use crate::synth::Synthesizer;

/// Parse an `.sf2` file. The result is shared between tracks, loading is the slow part.
pub fn load_soundfont(path: &Path) -> Result<Arc<SoundFont>, PlayerError> {
    let file = File::open(path)
        .map_err(|e| PlayerError::SoundFontError(format!("{}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);
    let soundfont = SoundFont::new(&mut reader)
        .map_err(|e| PlayerError::SoundFontError(format!("{}: {}", path.display(), e)))?;
    log::info!("loaded SoundFont {}", path.display());
    Ok(Arc::new(soundfont))
}

pub struct SoundFontSynth {
    inner: rustysynth::Synthesizer,
    sample_rate: u32,
}

impl SoundFontSynth {
    pub fn new(soundfont: &Arc<SoundFont>, sample_rate: u32) -> Result<Self, PlayerError> {
        let settings = SynthesizerSettings::new(sample_rate as i32);
        let inner = rustysynth::Synthesizer::new(soundfont, &settings)
            .map_err(|e| PlayerError::SoundFontError(e.to_string()))?;
        Ok(SoundFontSynth { inner, sample_rate })
    }
}

impl Synthesizer for SoundFontSynth {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn process(&mut self, channel: u8, message: ChannelMessage) {
        let (command, data1, data2) = message.to_bytes();
        self.inner.process_midi_message(channel as i32, command as i32, data1 as i32, data2 as i32);
    }

    fn note_off_all(&mut self) {
        self.inner.note_off_all(false);
    }

    fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.inner.render(left, right);
    }
}
