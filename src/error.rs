use std::fmt;

impl std::error::Error for PlayerError {}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerError {
    ParseError(String),
    FileError(String),
    AudioError(String),
    SoundFontError(String),
    PlaylistError(String),
    RenderError(String),
    InvalidIndex(usize),
}

impl fmt::Display for PlayerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PlayerError::ParseError(msg) => write!(f, "Parsing Error: {}", msg),
            PlayerError::FileError(msg) => write!(f, "File Error: {}", msg),
            PlayerError::AudioError(msg) => write!(f, "Audio Error: {}", msg),
            PlayerError::SoundFontError(msg) => write!(f, "SoundFont Error: {}", msg),
            PlayerError::PlaylistError(msg) => write!(f, "Playlist Error: {}", msg),
            PlayerError::RenderError(msg) => write!(f, "Render Error: {}", msg),
            PlayerError::InvalidIndex(index) => write!(f, "No playlist entry at position {}", index + 1),
        }
    }
}
