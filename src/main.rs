use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;

use midiplay::config::{MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};
use midiplay::console::{help_text, progress_bar};
use midiplay::keymap::{perform, KeySink, KeyStroke, KonghouLayout};
use midiplay::synth::soundfont::load_soundfont;
use midiplay::{
    render_to_wav, AudioEngine, Backend, Command, Config, InstrumentSource, MidiSequence, Player, PlayerError,
    SoundFontSynth, Synthesizer, ToneSynth, TransportLabel, WaveformType,
};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const PROGRESS_WIDTH: usize = 40;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Default)]
struct SynthArgs {
    /// SoundFont (.sf2) supplying the instruments
    #[arg(short, long)]
    soundfont: Option<PathBuf>,

    /// Use the built-in oscillators (sine, square, triangle, sawtooth, noise) instead of a SoundFont
    #[arg(long, value_parser = parse_waveform, conflicts_with = "soundfont")]
    tone: Option<WaveformType>,

    /// Volume from 0 to 127
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=127))]
    volume: Option<u8>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play MIDI files with interactive transport controls
    Play {
        /// MIDI files (.mid, .midi)
        files: Vec<PathBuf>,

        /// Load an .m3u playlist
        #[arg(short, long)]
        playlist: Option<PathBuf>,

        /// Start the next entry when a track ends
        #[arg(long)]
        auto_advance: bool,

        #[command(flatten)]
        synth: SynthArgs,
    },
    /// Render a MIDI file to a WAV file
    Render {
        input: PathBuf,

        /// Output filename
        #[arg(short, long)]
        out: PathBuf,

        /// Output sample rate in Hz
        #[arg(long, value_parser = clap::value_parser!(u32).range((MIN_SAMPLE_RATE as i64)..=(MAX_SAMPLE_RATE as i64)))]
        sample_rate: Option<u32>,

        #[command(flatten)]
        synth: SynthArgs,
    },
    /// Print the konghou key timeline of a MIDI file
    Keys {
        input: PathBuf,

        /// Shift the instrument by this many semitones
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        offset: i8,
    },
}

fn parse_waveform(s: &str) -> Result<WaveformType, String> {
    s.parse().map_err(|e: PlayerError| e.to_string())
}

fn apply_synth_args(config: &mut Config, args: &SynthArgs) {
    if let Some(soundfont) = &args.soundfont {
        config.soundfont = soundfont.clone();
        config.tone = false;
    }
    if let Some(waveform) = args.tone {
        config.waveform = waveform;
        config.tone = true;
    }
    if let Some(volume) = args.volume {
        config.volume = volume;
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mut config = Config::load();

    match cli.command {
        Commands::Play { files, playlist, auto_advance, synth } => {
            apply_synth_args(&mut config, &synth);
            config.auto_advance |= auto_advance;
            run_player(&config, files, playlist)
        }
        Commands::Render { input, out, sample_rate, synth } => {
            apply_synth_args(&mut config, &synth);
            if let Some(rate) = sample_rate {
                config.sample_rate = rate;
            }
            run_render(&config, &input, &out)
        }
        Commands::Keys { input, offset } => run_keys(&input, offset),
    }
}

fn run_player(config: &Config, files: Vec<PathBuf>, playlist: Option<PathBuf>) -> anyhow::Result<()> {
    let engine = AudioEngine::new(config.instrument_source()).context("opening the audio output")?;
    let mut player = Player::new(engine).with_auto_advance(config.auto_advance);
    player.set_volume(config.volume);

    if let Some(path) = playlist {
        // A bad playlist is reported in the status line, the player still starts
        let _ = player.load_playlist(&path);
    }
    if !files.is_empty() {
        player.add_files(files);
    }

    println!("{}", help_text(&config.keys));
    println!("{}", player.status());

    let (tx, rx) = crossbeam_channel::unbounded::<String>();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("stdin closed: {}", e);
                    break;
                }
            }
        }
    });

    let mut input_open = true;
    let mut shown_progress: Option<u8> = None;
    loop {
        if input_open {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => match Command::parse(&line, &config.keys) {
                    Ok(Some(command)) => {
                        if !execute(&mut player, command, config) {
                            break;
                        }
                        shown_progress = None;
                    }
                    Ok(None) => {}
                    Err(msg) => println!("{}", msg),
                },
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    input_open = false;
                    player.stop_if_paused();
                }
            }
        } else {
            // No more commands: play out whatever is running, then leave
            std::thread::sleep(POLL_INTERVAL);
        }

        let label = player.label();
        player.poll();
        if player.label() != label {
            println!("{}", player.status());
        }
        if player.label() != TransportLabel::Play && shown_progress != Some(player.progress()) {
            shown_progress = Some(player.progress());
            println!("{}", progress_bar(player.progress(), PROGRESS_WIDTH));
        }
        if !input_open && player.label() == TransportLabel::Play {
            break;
        }
    }

    player.stop();
    Ok(())
}

/// Run one console command. Returns false when the player should quit.
fn execute<B: Backend>(player: &mut Player<B>, command: Command, config: &Config) -> bool {
    match command {
        Command::PlayPause => player.play_pause(),
        Command::Next => player.next(),
        Command::Previous => player.previous(),
        Command::Stop => player.stop(),
        Command::Volume(volume) => {
            player.set_volume(volume);
            println!("volume {}", player.volume());
            return true;
        }
        Command::Select(index) => {
            let _ = player.select(index);
        }
        Command::List => {
            let cursor = player.playlist().cursor();
            for (i, name) in player.playlist().display_names().iter().enumerate() {
                let marker = if Some(i) == cursor { '>' } else { ' ' };
                println!("{} {:>3}. {}", marker, i + 1, name);
            }
            return true;
        }
        Command::Load(path) => {
            let _ = player.load_playlist(&path);
        }
        Command::Save(path) => {
            let _ = player.save_playlist(&path);
        }
        Command::Add(paths) => player.add_files(paths),
        Command::Status => {
            println!("[{}] {} ({:.1}s)", player.label(), player.status(), player.position());
            return true;
        }
        Command::Help => {
            println!("{}", help_text(&config.keys));
            return true;
        }
        Command::Quit => return false,
    }
    println!("[{}] {}", player.label(), player.status());
    true
}

fn build_offline_synth(config: &Config) -> anyhow::Result<Box<dyn Synthesizer>> {
    match config.instrument_source() {
        InstrumentSource::SoundFont(path) => {
            let soundfont = load_soundfont(&path)?;
            Ok(Box::new(SoundFontSynth::new(&soundfont, config.sample_rate)?))
        }
        InstrumentSource::Tone(waveform) => Ok(Box::new(ToneSynth::new(config.sample_rate, waveform))),
    }
}

fn run_render(config: &Config, input: &Path, out: &Path) -> anyhow::Result<()> {
    let sequence = MidiSequence::from_file(input)?;
    let mut synth = build_offline_synth(config)?;
    let frames = render_to_wav(Arc::new(sequence), synth.as_mut(), out, config.volume)
        .with_context(|| format!("rendering {}", input.display()))?;
    println!(
        "Rendered {} to {} ({:.1}s)",
        input.display(),
        out.display(),
        frames as f64 / config.sample_rate as f64
    );
    Ok(())
}

struct PrintSink;

impl KeySink for PrintSink {
    fn send(&mut self, stroke: &KeyStroke) {
        println!("{:>9.3}s  {:<8} note {}", stroke.time, stroke.keys, stroke.note);
    }
}

fn run_keys(input: &Path, offset: i8) -> anyhow::Result<()> {
    let sequence = MidiSequence::from_file(input)?;
    let layout = KonghouLayout::new(offset);
    let strokes = layout.timeline(&sequence);
    perform(&strokes, &mut PrintSink);
    log::info!("{} strokes from {} notes", strokes.len(), sequence.note_count());
    Ok(())
}
