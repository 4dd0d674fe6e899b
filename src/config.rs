use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::engine::{DEFAULT_VOLUME, MAX_VOLUME};
use crate::error::PlayerError;
use crate::synth::{InstrumentSource, WaveformType};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 192_000;

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    player: PlayerSection,
    #[serde(default)]
    synth: SynthSection,
    #[serde(default)]
    keys: KeysSection,
}

#[derive(Deserialize, Default)]
struct PlayerSection {
    soundfont: Option<PathBuf>,
    volume: Option<u8>,
    auto_advance: Option<bool>,
}

#[derive(Deserialize, Default)]
struct SynthSection {
    tone: Option<bool>,
    waveform: Option<String>,
    sample_rate: Option<u32>,
}

#[derive(Deserialize, Default)]
struct KeysSection {
    previous: Option<String>,
    play_pause: Option<String>,
    next: Option<String>,
}

/// Console words bound to the three transport shortcuts.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyBindings {
    pub previous: String,
    pub play_pause: String,
    pub next: String,
}

impl Default for KeyBindings {
    fn default() -> Self {
        KeyBindings {
            previous: "b".to_string(),
            play_pause: "p".to_string(),
            next: "n".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub soundfont: PathBuf,
    pub volume: u8,
    pub auto_advance: bool,
    pub tone: bool,
    pub waveform: WaveformType,
    pub sample_rate: u32,
    pub keys: KeyBindings,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            soundfont: PathBuf::from("GeneralUser.sf2"),
            volume: DEFAULT_VOLUME,
            auto_advance: false,
            tone: false,
            waveform: WaveformType::Sine,
            sample_rate: 44_100,
            keys: KeyBindings::default(),
        }
    }
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("midiplay").join("config.toml"))
}

impl Config {
    /// Built-in defaults overlaid with the user's config file, if there is one.
    /// A broken user file is logged and skipped.
    pub fn load() -> Self {
        let mut config = match Config::from_toml_str(DEFAULT_CONFIG) {
            Ok(config) => config,
            Err(e) => {
                log::error!(target: "config", "embedded config.toml is invalid: {}", e);
                Config::default()
            }
        };

        if let Some(path) = user_config_path() {
            if path.exists() {
                if let Err(e) = config.merge_file(&path) {
                    log::warn!(target: "config", "ignoring config {}: {}", path.display(), e);
                }
            }
        }

        config
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, PlayerError> {
        let mut config = Config::default();
        config.merge_str(contents)?;
        Ok(config)
    }

    pub fn merge_file(&mut self, path: &Path) -> Result<(), PlayerError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PlayerError::FileError(format!("{}: {}", path.display(), e)))?;
        self.merge_str(&contents)?;
        log::debug!(target: "config", "loaded {}", path.display());
        Ok(())
    }

    /// Apply every key present in `contents`. Nothing changes if parsing fails.
    pub fn merge_str(&mut self, contents: &str) -> Result<(), PlayerError> {
        let file: ConfigFile = toml::from_str(contents)
            .map_err(|e| PlayerError::ParseError(e.to_string()))?;
        let waveform = file.synth.waveform.as_deref().map(str::parse::<WaveformType>).transpose()?;
        if let Some(rate) = file.synth.sample_rate {
            if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&rate) {
                return Err(PlayerError::ParseError(format!(
                    "sample_rate {} is outside {}..={}",
                    rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
                )));
            }
        }

        if let Some(soundfont) = file.player.soundfont {
            self.soundfont = soundfont;
        }
        if let Some(volume) = file.player.volume {
            self.volume = volume.min(MAX_VOLUME);
        }
        if let Some(auto_advance) = file.player.auto_advance {
            self.auto_advance = auto_advance;
        }
        if let Some(tone) = file.synth.tone {
            self.tone = tone;
        }
        if let Some(waveform) = waveform {
            self.waveform = waveform;
        }
        if let Some(sample_rate) = file.synth.sample_rate {
            self.sample_rate = sample_rate;
        }
        if let Some(previous) = file.keys.previous {
            self.keys.previous = previous;
        }
        if let Some(play_pause) = file.keys.play_pause {
            self.keys.play_pause = play_pause;
        }
        if let Some(next) = file.keys.next {
            self.keys.next = next;
        }
        Ok(())
    }

    pub fn instrument_source(&self) -> InstrumentSource {
        if self.tone {
            InstrumentSource::Tone(self.waveform)
        } else {
            InstrumentSource::SoundFont(self.soundfont.clone())
        }
    }
}
