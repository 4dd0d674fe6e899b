//! Transport control over a playlist.
//!
//! [`Player`] holds the user-facing state (cursor, play button label, status
//! line) and drives any [`Backend`]. Failures end up in the status line
//! instead of aborting, so a bad file never takes the player down.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::engine::{PlaybackState, DEFAULT_VOLUME, MAX_VOLUME};
use crate::error::PlayerError;
use crate::playlist::Playlist;

/// Something that can play one MIDI file at a time.
pub trait Backend {
    fn start(&mut self, path: &Path) -> Result<(), PlayerError>;
    fn stop(&mut self);
    /// Returns true when playback ended up paused.
    fn toggle_pause(&mut self) -> bool;
    fn set_volume(&mut self, volume: u8);
    fn state(&self) -> PlaybackState;
    fn progress(&self) -> u8;
    /// Seconds into the current track.
    fn position(&self) -> f64;
}

/// Caption of the play/pause button.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportLabel {
    Play,
    Pause,
    Resume,
}

impl fmt::Display for TransportLabel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportLabel::Play => write!(f, "Play"),
            TransportLabel::Pause => write!(f, "Pause"),
            TransportLabel::Resume => write!(f, "Resume"),
        }
    }
}

pub struct Player<B: Backend> {
    backend: B,
    playlist: Playlist,
    status: String,
    label: TransportLabel,
    volume: u8,
    progress: u8,
    auto_advance: bool,
}

impl<B: Backend> Player<B> {
    pub fn new(backend: B) -> Self {
        Player {
            backend,
            playlist: Playlist::new(),
            status: "No files loaded".to_string(),
            label: TransportLabel::Play,
            volume: DEFAULT_VOLUME,
            progress: 0,
            auto_advance: false,
        }
    }

    pub fn with_auto_advance(mut self, auto_advance: bool) -> Self {
        self.auto_advance = auto_advance;
        self
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn label(&self) -> TransportLabel {
        self.label
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn position(&self) -> f64 {
        self.backend.position()
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn load_files(&mut self, paths: Vec<PathBuf>) {
        if paths.is_empty() {
            return;
        }
        self.playlist = Playlist::from_paths(paths);
        self.status = format!("Loaded {} files. Ready to play.", self.playlist.len());
    }

    pub fn add_files(&mut self, paths: Vec<PathBuf>) {
        let count = paths.len();
        for path in paths {
            self.playlist.push(path);
        }
        self.status = format!("Added {} files ({} in playlist).", count, self.playlist.len());
    }

    pub fn load_playlist(&mut self, path: &Path) -> Result<(), PlayerError> {
        match Playlist::load_m3u(path) {
            Ok(playlist) => {
                self.playlist = playlist;
                self.status = format!("Loaded playlist with {} files.", self.playlist.len());
                Ok(())
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                Err(e)
            }
        }
    }

    pub fn save_playlist(&mut self, path: &Path) -> Result<(), PlayerError> {
        match self.playlist.save_m3u(path) {
            Ok(()) => {
                self.status = format!("Saved playlist with {} files to {}.", self.playlist.len(), path.display());
                Ok(())
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                Err(e)
            }
        }
    }

    pub fn play_pause(&mut self) {
        if self.playlist.is_empty() {
            self.status = "Please load MIDI files first!".to_string();
            return;
        }
        if self.backend.state() != PlaybackState::Stopped {
            let paused = self.backend.toggle_pause();
            self.label = if paused { TransportLabel::Resume } else { TransportLabel::Pause };
        } else {
            self.start_playback();
        }
    }

    pub fn previous(&mut self) {
        if self.playlist.retreat() {
            self.start_playback();
        }
    }

    pub fn next(&mut self) {
        if self.playlist.advance() {
            self.start_playback();
        }
    }

    /// Jump to an entry and play it.
    pub fn select(&mut self, index: usize) -> Result<(), PlayerError> {
        if let Err(e) = self.playlist.select(index) {
            self.status = format!("Error: {}", e);
            return Err(e);
        }
        self.start_playback();
        Ok(())
    }

    pub fn stop(&mut self) {
        self.backend.stop();
        self.label = TransportLabel::Play;
        self.progress = 0;
        self.status = "Stopped".to_string();
    }

    /// Stop a paused track. Used once no command can resume it.
    pub fn stop_if_paused(&mut self) {
        if self.label == TransportLabel::Resume {
            self.stop();
        }
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(MAX_VOLUME);
        self.backend.set_volume(self.volume);
    }

    /// Refresh progress and notice the end of a track.
    pub fn poll(&mut self) {
        self.progress = self.backend.progress();
        if self.label == TransportLabel::Play || self.backend.state() != PlaybackState::Stopped {
            return;
        }

        self.label = TransportLabel::Play;
        self.progress = 100;
        if let Some(current) = self.playlist.current() {
            self.status = format!("Finished: {}", current.display());
        }
        if self.auto_advance && self.playlist.advance() {
            self.start_playback();
        }
    }

    fn start_playback(&mut self) {
        self.backend.stop();
        let Some(path) = self.playlist.current().map(Path::to_path_buf) else {
            return;
        };

        self.backend.set_volume(self.volume);
        match self.backend.start(&path) {
            Ok(()) => {
                self.label = TransportLabel::Pause;
                self.progress = 0;
                self.status = format!("Playing: {}", path.display());
            }
            Err(e) => {
                log::warn!("could not play {}: {}", path.display(), e);
                self.label = TransportLabel::Play;
                self.status = format!("Error: {}", e);
            }
        }
    }
}
