pub mod error;
pub mod midi;
pub mod synth;
pub mod sequencer;
pub mod engine;
pub mod playlist;
pub mod player;
pub mod keymap;
pub mod render;
pub mod config;
pub mod console;

pub use error::PlayerError;
pub use midi::{ChannelMessage, MidiEvent, MidiSequence};
pub use synth::{InstrumentSource, SoundFontSynth, Synthesizer, ToneSynth, WaveformType};
pub use sequencer::Sequencer;
pub use engine::{AudioEngine, PlaybackContext, PlaybackState, DEFAULT_VOLUME, MAX_VOLUME};
pub use playlist::Playlist;
pub use player::{Backend, Player, TransportLabel};
pub use keymap::{KeySink, KeyStroke, KonghouLayout};
pub use render::{render_to_buffer, render_to_wav};
pub use config::{Config, KeyBindings};
pub use console::Command;
