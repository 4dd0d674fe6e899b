//! Line commands for the interactive terminal front end.

use std::path::PathBuf;

use crate::config::KeyBindings;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    PlayPause,
    Next,
    Previous,
    Stop,
    Volume(u8),
    /// Zero-based playlist index
    Select(usize),
    List,
    Load(PathBuf),
    Save(PathBuf),
    Add(Vec<PathBuf>),
    Status,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines give `Ok(None)`.
    pub fn parse(line: &str, keys: &KeyBindings) -> Result<Option<Command>, String> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();
        let word = word.to_lowercase();

        if word == keys.play_pause.to_lowercase() {
            return Ok(Some(Command::PlayPause));
        }
        if word == keys.next.to_lowercase() {
            return Ok(Some(Command::Next));
        }
        if word == keys.previous.to_lowercase() {
            return Ok(Some(Command::Previous));
        }

        let command = match word.as_str() {
            "play" | "pause" | "resume" => Command::PlayPause,
            "next" => Command::Next,
            "prev" | "previous" => Command::Previous,
            "stop" => Command::Stop,
            "vol" | "volume" => {
                let value = single_arg(&rest, "volume")?;
                let volume: u8 = value.parse()
                    .map_err(|_| format!("volume must be a number from 0 to 127, got {}", value))?;
                Command::Volume(volume.min(127))
            }
            "sel" | "select" => {
                let value = single_arg(&rest, "select")?;
                let position: usize = value.parse()
                    .map_err(|_| format!("select needs a playlist position, got {}", value))?;
                if position == 0 {
                    return Err("playlist positions start at 1".to_string());
                }
                Command::Select(position - 1)
            }
            "list" | "ls" => Command::List,
            "load" => Command::Load(PathBuf::from(path_arg(&rest, "load")?)),
            "save" => Command::Save(PathBuf::from(path_arg(&rest, "save")?)),
            "add" => {
                if rest.is_empty() {
                    return Err("add needs at least one file".to_string());
                }
                Command::Add(rest.iter().map(PathBuf::from).collect())
            }
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "q" | "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command: {} (try help)", other)),
        };
        Ok(Some(command))
    }
}

fn single_arg<'a>(rest: &[&'a str], command: &str) -> Result<&'a str, String> {
    match rest {
        [value] => Ok(*value),
        _ => Err(format!("{} takes exactly one argument", command)),
    }
}

// Paths may contain spaces
fn path_arg(rest: &[&str], command: &str) -> Result<String, String> {
    if rest.is_empty() {
        return Err(format!("{} needs a playlist path", command));
    }
    Ok(rest.join(" "))
}

pub fn help_text(keys: &KeyBindings) -> String {
    format!(
        "commands:\n  \
         {} | play        play / pause / resume\n  \
         {} | next        next track\n  \
         {} | prev        previous track\n  \
         stop             stop playback\n  \
         vol N            volume 0..127\n  \
         sel N            play playlist entry N\n  \
         list             show the playlist\n  \
         add FILE..       append MIDI files\n  \
         load FILE.m3u    load a playlist\n  \
         save FILE.m3u    save the playlist\n  \
         status           show the status line\n  \
         quit",
        keys.play_pause, keys.next, keys.previous
    )
}

/// `[#####-----]  50%`
pub fn progress_bar(percent: u8, width: usize) -> String {
    let percent = percent.min(100) as usize;
    let filled = percent * width / 100;
    format!("[{}{}] {:>3}%", "#".repeat(filled), "-".repeat(width - filled), percent)
}
