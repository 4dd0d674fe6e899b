use std::path::Path;
use std::sync::Arc;

use crate::engine::MAX_VOLUME;
use crate::error::PlayerError;
use crate::midi::MidiSequence;
use crate::sequencer::Sequencer;
use crate::synth::Synthesizer;

/// Silence rendered after the last event so released notes can ring out.
pub const RELEASE_TAIL_SECONDS: f64 = 1.0;
const BLOCK_SIZE: usize = 1024;
/// Most frames a 16-bit stereo WAV data chunk can hold.
pub const MAX_RENDER_FRAMES: u64 = (u32::MAX as u64 - 44) / 4;

/// Frames a render of `sequence` produces, release tail included.
fn planned_frames(sequence: &Arc<MidiSequence>, sample_rate: u32) -> Result<u64, PlayerError> {
    let tail_frames = (RELEASE_TAIL_SECONDS * sample_rate as f64) as u64;
    let frames = Sequencer::new(Arc::clone(sequence), sample_rate)
        .duration_frames()
        .saturating_add(tail_frames);
    if frames > MAX_RENDER_FRAMES {
        return Err(PlayerError::RenderError(format!(
            "{:.0}s at {} Hz is longer than a WAV file can hold",
            sequence.duration, sample_rate
        )));
    }
    Ok(frames)
}

fn interleave(left: &[f32], right: &[f32], gain: f32, block: &mut Vec<f32>) {
    block.clear();
    for (l, r) in left.iter().zip(right) {
        block.push((l * gain).clamp(-1.0, 1.0));
        block.push((r * gain).clamp(-1.0, 1.0));
    }
}

/// Run the sequencer offline and hand each block of interleaved stereo to `sink`.
/// Returns the number of frames produced.
fn render_blocks<S, F>(sequence: Arc<MidiSequence>, synth: &mut S, volume: u8, mut sink: F) -> Result<usize, PlayerError>
where
    S: Synthesizer + ?Sized,
    F: FnMut(&[f32]) -> Result<(), PlayerError>,
{
    let sample_rate = synth.sample_rate();
    planned_frames(&sequence, sample_rate)?;
    let mut sequencer = Sequencer::new(sequence, sample_rate);
    let gain = volume.min(MAX_VOLUME) as f32 / MAX_VOLUME as f32;

    let mut left = vec![0.0f32; BLOCK_SIZE];
    let mut right = vec![0.0f32; BLOCK_SIZE];
    let mut block = Vec::with_capacity(BLOCK_SIZE * 2);
    let mut written = 0;

    while !sequencer.is_finished() {
        let frames = (sequencer.frames_remaining().min(BLOCK_SIZE as u64) as usize).max(1);
        sequencer.render(synth, &mut left[..frames], &mut right[..frames]);
        interleave(&left[..frames], &right[..frames], gain, &mut block);
        sink(&block)?;
        written += frames;
    }

    synth.note_off_all();
    let mut tail = (RELEASE_TAIL_SECONDS * sample_rate as f64) as usize;
    while tail > 0 {
        let frames = tail.min(BLOCK_SIZE);
        synth.render(&mut left[..frames], &mut right[..frames]);
        interleave(&left[..frames], &right[..frames], gain, &mut block);
        sink(&block)?;
        written += frames;
        tail -= frames;
    }

    Ok(written)
}

/// Render a whole sequence into memory. Returns interleaved stereo samples.
pub fn render_to_buffer<S: Synthesizer + ?Sized>(
    sequence: Arc<MidiSequence>,
    synth: &mut S,
    volume: u8,
) -> Result<Vec<f32>, PlayerError> {
    let mut out = Vec::new();
    render_blocks(sequence, synth, volume, |block| {
        out.extend_from_slice(block);
        Ok(())
    })?;
    Ok(out)
}

/// Render a sequence to a 16-bit stereo WAV file. Returns the number of frames written.
///
/// Blocks go straight to disk, so memory use does not depend on the length of the file.
pub fn render_to_wav<S: Synthesizer + ?Sized>(
    sequence: Arc<MidiSequence>,
    synth: &mut S,
    path: &Path,
    volume: u8,
) -> Result<usize, PlayerError> {
    let sample_rate = synth.sample_rate();
    planned_frames(&sequence, sample_rate)?;

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| PlayerError::FileError(format!("{}: {}", path.display(), e)))?;
    let frames = render_blocks(sequence, synth, volume, |block| {
        for sample in block {
            writer.write_sample((sample * i16::MAX as f32) as i16)
                .map_err(|e| PlayerError::FileError(e.to_string()))?;
        }
        Ok(())
    })?;
    writer.finalize().map_err(|e| PlayerError::FileError(e.to_string()))?;

    log::info!("wrote {} ({} frames at {} Hz)", path.display(), frames, sample_rate);
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{ChannelMessage, MidiEvent};
    use crate::synth::{ToneSynth, WaveformType};

    fn melody() -> Arc<MidiSequence> {
        Arc::new(MidiSequence::from_events(
            vec![
                MidiEvent { time: 0.0, channel: 0, message: ChannelMessage::NoteOn { key: 60, velocity: 100 } },
                MidiEvent { time: 0.25, channel: 0, message: ChannelMessage::NoteOff { key: 60 } },
                MidiEvent { time: 0.25, channel: 0, message: ChannelMessage::NoteOn { key: 67, velocity: 100 } },
                MidiEvent { time: 0.5, channel: 0, message: ChannelMessage::NoteOff { key: 67 } },
            ],
            0.5,
        ))
    }

    #[test]
    fn buffer_covers_track_and_tail() {
        let mut synth = ToneSynth::new(8000, WaveformType::Sine);
        let out = render_to_buffer(melody(), &mut synth, 100).unwrap();
        assert_eq!(out.len(), (4000 + 8000) * 2);
        assert!(out.iter().any(|s| *s != 0.0));
        assert!(out.iter().all(|s| (-1.0..=1.0).contains(s)));
        // The tail ends in silence once every voice has released
        assert!(out[out.len() - 200..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn wav_file_has_expected_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let mut synth = ToneSynth::new(8000, WaveformType::Triangle);
        let frames = render_to_wav(melody(), &mut synth, &path, 100).unwrap();
        assert_eq!(frames, 12_000);

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 8000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.duration(), 12_000);
    }

    #[test]
    fn unwritable_path_is_a_file_error() {
        let mut synth = ToneSynth::new(8000, WaveformType::Sine);
        let err = render_to_wav(melody(), &mut synth, Path::new("/no/such/dir/out.wav"), 100).unwrap_err();
        assert!(matches!(err, PlayerError::FileError(_)));
    }

    #[test]
    fn long_sparse_file_streams_to_disk() {
        let sequence = Arc::new(MidiSequence::from_events(
            vec![
                MidiEvent { time: 0.0, channel: 0, message: ChannelMessage::NoteOn { key: 57, velocity: 90 } },
                MidiEvent { time: 0.1, channel: 0, message: ChannelMessage::NoteOff { key: 57 } },
            ],
            3600.0,
        ));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hour.wav");
        let mut synth = ToneSynth::new(1000, WaveformType::Sine);
        let frames = render_to_wav(sequence, &mut synth, &path, 100).unwrap();
        assert_eq!(frames, 3_601_000);
        assert_eq!(hound::WavReader::open(&path).unwrap().duration(), 3_601_000);
    }

    // Slowest tempo, one tick per beat and the longest delta midly can encode
    fn endless_smf() -> Vec<u8> {
        use midly::num::{u15, u24, u28};
        use midly::{Format, Header, MetaMessage, Smf, Timing, TrackEvent, TrackEventKind};

        let track = vec![
            TrackEvent { delta: u28::new(0), kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(0xFF_FFFF))) },
            TrackEvent { delta: u28::new(0x0FFF_FFFF), kind: TrackEventKind::Meta(MetaMessage::EndOfTrack) },
        ];
        let smf = Smf {
            header: Header::new(Format::SingleTrack, Timing::Metrical(u15::new(1))),
            tracks: vec![track],
        };
        let mut bytes = Vec::new();
        smf.write_std(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn too_long_for_wav_is_refused_up_front() {
        let sequence = Arc::new(MidiSequence::parse(&endless_smf()).unwrap());
        assert!(sequence.duration > 4.0e9);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("endless.wav");
        let mut synth = ToneSynth::new(8000, WaveformType::Sine);
        let err = render_to_wav(Arc::clone(&sequence), &mut synth, &path, 100).unwrap_err();
        assert!(matches!(err, PlayerError::RenderError(_)));
        assert!(!path.exists());

        let err = render_to_buffer(sequence, &mut synth, 100).unwrap_err();
        assert!(matches!(err, PlayerError::RenderError(_)));
    }
}
