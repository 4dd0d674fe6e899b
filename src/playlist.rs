use std::path::{Path, PathBuf};
use crate::error::PlayerError;

/// Ordered list of tracks with a play cursor.
///
/// The cursor is `None` exactly when the list is empty, otherwise it always
/// points at an existing entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Playlist {
    entries: Vec<PathBuf>,
    cursor: Option<usize>,
}

impl Playlist {
    pub fn new() -> Self {
        Playlist::default()
    }

    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let entries: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        let cursor = if entries.is_empty() { None } else { Some(0) };
        Playlist { entries, cursor }
    }

    /// Parse `.m3u` text. Blank lines and `#` lines (comments, `#EXTINF`) are skipped.
    pub fn parse_m3u(content: &str) -> Self {
        Playlist::from_paths(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(PathBuf::from),
        )
    }

    /// Load an `.m3u` file. Relative entries resolve against the playlist's own directory.
    pub fn load_m3u(path: &Path) -> Result<Self, PlayerError> {
        let bytes = std::fs::read(path)
            .map_err(|e| PlayerError::FileError(format!("{}: {}", path.display(), e)))?;
        let content = String::from_utf8(bytes)
            .map_err(|_| PlayerError::PlaylistError(format!("{} is not valid UTF-8", path.display())))?;

        let mut playlist = Playlist::parse_m3u(&content);
        if let Some(base) = path.parent() {
            for entry in playlist.entries.iter_mut() {
                if entry.is_relative() {
                    *entry = base.join(&*entry);
                }
            }
        }

        log::info!("loaded playlist {} ({} entries)", path.display(), playlist.len());
        Ok(playlist)
    }

    pub fn to_m3u(&self) -> Result<String, PlayerError> {
        let mut out = String::new();
        for entry in &self.entries {
            let line = entry.to_str()
                .ok_or_else(|| PlayerError::PlaylistError(format!("path is not valid UTF-8: {}", entry.display())))?;
            out.push_str(line);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn save_m3u(&self, path: &Path) -> Result<(), PlayerError> {
        let content = self.to_m3u()?;
        std::fs::write(path, content)
            .map_err(|e| PlayerError::FileError(format!("{}: {}", path.display(), e)))?;
        log::info!("saved playlist {} ({} entries)", path.display(), self.len());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn current(&self) -> Option<&Path> {
        self.cursor.map(|i| self.entries[i].as_path())
    }

    pub fn select(&mut self, index: usize) -> Result<&Path, PlayerError> {
        if index >= self.entries.len() {
            return Err(PlayerError::InvalidIndex(index));
        }
        self.cursor = Some(index);
        Ok(self.entries[index].as_path())
    }

    /// Step forward. Stays put on the last entry.
    pub fn advance(&mut self) -> bool {
        match self.cursor {
            Some(i) if i + 1 < self.entries.len() => {
                self.cursor = Some(i + 1);
                true
            }
            _ => false,
        }
    }

    /// Step back. Stays put on the first entry.
    pub fn retreat(&mut self) -> bool {
        match self.cursor {
            Some(i) if i > 0 => {
                self.cursor = Some(i - 1);
                true
            }
            _ => false,
        }
    }

    pub fn push(&mut self, path: impl Into<PathBuf>) {
        self.entries.push(path.into());
        if self.cursor.is_none() {
            self.cursor = Some(0);
        }
    }

    /// File name of each entry, as a list view shows it.
    pub fn display_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| p.display().to_string())
            })
            .collect()
    }
}
