mod common;

use std::path::Path;
use std::sync::Arc;

use midiplay::render::RELEASE_TAIL_SECONDS;
use midiplay::{
    render_to_buffer, Backend, ChannelMessage, MidiSequence, PlaybackContext, PlaybackState, Player, PlayerError,
    Playlist, ToneSynth, TransportLabel, WaveformType,
};

const SAMPLE_RATE: u32 = 8000;

/// Plays through a `PlaybackContext` like the audio callback would, minus the device.
#[derive(Default)]
struct OfflineBackend {
    context: Option<PlaybackContext>,
    volume: u8,
}

impl OfflineBackend {
    fn run(&mut self, seconds: f64) {
        let frames = (seconds * SAMPLE_RATE as f64) as usize;
        let mut buffer = vec![0.0f32; frames * 2];
        if let Some(ctx) = self.context.as_mut() {
            ctx.render_interleaved(&mut buffer, 2);
        }
    }
}

impl Backend for OfflineBackend {
    fn start(&mut self, path: &Path) -> Result<(), PlayerError> {
        let sequence = MidiSequence::from_file(path)?;
        let synth = Box::new(ToneSynth::new(SAMPLE_RATE, WaveformType::Sine));
        self.context = Some(PlaybackContext::new(Arc::new(sequence), synth, self.volume));
        Ok(())
    }

    fn stop(&mut self) {
        self.context = None;
    }

    fn toggle_pause(&mut self) -> bool {
        match self.context.as_mut() {
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

    fn set_volume(&mut self, volume: u8) {
        self.volume = volume;
        if let Some(ctx) = self.context.as_mut() {
            ctx.set_volume(volume);
        }
    }

    fn state(&self) -> PlaybackState {
        self.context.as_ref().map(|ctx| ctx.state()).unwrap_or(PlaybackState::Stopped)
    }

    fn progress(&self) -> u8 {
        self.context.as_ref().map(|ctx| ctx.progress()).unwrap_or(0)
    }

    fn position(&self) -> f64 {
        self.context.as_ref().map(|ctx| ctx.position()).unwrap_or(0.0)
    }
}

#[test]
fn midi_file_loads_with_expected_timing() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_melody(dir.path(), "scale.mid", &[60, 62, 64, 65]);

    let sequence = MidiSequence::from_file(&path).unwrap();
    assert_eq!(sequence.note_count(), 4);
    assert!((sequence.duration - 2.0).abs() < 1e-9);
    assert!((sequence.initial_bpm - 120.0).abs() < 1e-9);
    let offs = sequence.events.iter().filter(|e| matches!(e.message, ChannelMessage::NoteOff { .. })).count();
    assert_eq!(offs, 4);
}

#[test]
fn offline_render_matches_file_length() {
    let dir = tempfile::tempdir().unwrap();
    let path = common::write_melody(dir.path(), "two.mid", &[69, 72]);
    let sequence = Arc::new(MidiSequence::from_file(&path).unwrap());

    let mut synth = ToneSynth::new(SAMPLE_RATE, WaveformType::Sine);
    let samples = render_to_buffer(sequence, &mut synth, 100).unwrap();
    // half a second per note plus the one second release tail
    assert_eq!(samples.len(), (SAMPLE_RATE as usize) * 2 * 2);
    assert!(samples.iter().any(|s| s.abs() > 0.01));
}

#[test]
fn playlist_drives_playback_to_the_end() {
    let dir = tempfile::tempdir().unwrap();
    let first = common::write_melody(dir.path(), "first.mid", &[60]);
    let second = common::write_melody(dir.path(), "second.mid", &[64, 67]);

    let list = dir.path().join("set.m3u");
    std::fs::write(&list, "#EXTM3U\nfirst.mid\n\nsecond.mid\n").unwrap();

    let mut player = Player::new(OfflineBackend::default()).with_auto_advance(true);
    player.load_playlist(&list).unwrap();
    assert_eq!(player.playlist().entries(), &[first.clone(), second.clone()]);

    player.play_pause();
    assert_eq!(player.label(), TransportLabel::Pause);
    player.backend_mut().run(0.25);
    player.poll();
    assert_eq!(player.progress(), 50);
    assert_eq!(player.position(), 0.25);

    player.play_pause();
    assert_eq!(player.label(), TransportLabel::Resume);
    player.backend_mut().run(5.0);
    player.poll();
    assert_eq!(player.progress(), 50, "paused playback must not move");

    player.play_pause();
    player.backend_mut().run(0.25);
    player.poll();
    // last event played, the release tail is still ringing
    assert_eq!(player.progress(), 100);
    assert_eq!(player.label(), TransportLabel::Pause);
    assert_eq!(player.playlist().cursor(), Some(0));

    player.backend_mut().run(RELEASE_TAIL_SECONDS);
    player.poll();
    // first track finished, auto advance picked up the second
    assert_eq!(player.playlist().cursor(), Some(1));
    assert_eq!(player.status(), format!("Playing: {}", second.display()));

    player.backend_mut().run(0.5);
    player.poll();
    assert_eq!(player.progress(), 50);
    player.backend_mut().run(0.5);
    player.backend_mut().run(RELEASE_TAIL_SECONDS);
    player.poll();
    assert_eq!(player.label(), TransportLabel::Play);
    assert_eq!(player.status(), format!("Finished: {}", second.display()));
}

#[test]
fn missing_file_in_playlist_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let good = common::write_melody(dir.path(), "good.mid", &[60]);
    let missing = dir.path().join("gone.mid");

    let mut player = Player::new(OfflineBackend::default());
    player.load_files(vec![missing, good.clone()]);
    player.play_pause();
    assert_eq!(player.label(), TransportLabel::Play);
    assert!(player.status().starts_with("Error: File Error"));

    player.next();
    assert_eq!(player.label(), TransportLabel::Pause);
    assert_eq!(player.status(), format!("Playing: {}", good.display()));
}

#[test]
fn saved_playlist_reloads_identically() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = (0..5).map(|i| dir.path().join(format!("track{}.mid", i))).collect();
    let playlist = Playlist::from_paths(paths.clone());

    let file = dir.path().join("five.m3u");
    playlist.save_m3u(&file).unwrap();
    let reloaded = Playlist::load_m3u(&file).unwrap();
    assert_eq!(reloaded.entries(), paths.as_slice());
    assert_eq!(reloaded.cursor(), Some(0));
}
