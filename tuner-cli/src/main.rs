//! # Tuner - Terminal Front End
//!
//! A thin consumer of `tuner-core`: it starts the engine, polls the latest
//! snapshot on a fixed tick, and prints one status line per new reading.
//!
//! ## Architecture
//! - **Main thread**: command parsing and the polling/render loop
//! - **Engine worker**: capture, framing and analysis inside `tuner-core`
//! - **Logging**: `tracing` to stderr, readings to stdout

mod ui;

use std::io::Write;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tuner_core::{
    Analyzer, EngineConfig, EngineStatus, Reading, TargetPitch, TunerEngine, Windower, tuning,
};

/// Display refresh period (~60 FPS).
const TICK: Duration = Duration::from_millis(16);

/// Chunk size used when streaming a synthetic tone.
const TONE_CHUNK: usize = 512;

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Listen {
            engine,
            target,
            seconds,
            json,
        } => run_listen(&engine, &target, seconds, json),
        Commands::Tone {
            freq,
            seconds,
            amplitude,
            engine,
            target,
            json,
        } => run_tone(freq, seconds, amplitude, &engine, &target, json),
        Commands::Note { frequency } => run_note(frequency),
        Commands::Config { engine } => {
            let config = engine.load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time instrument tuner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tune live from the default microphone.
    Listen {
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        target: TargetArgs,
        /// Stop after this many seconds instead of running until the stream ends.
        #[arg(long)]
        seconds: Option<f64>,
        /// Print one JSON snapshot per line instead of a status line.
        #[arg(long)]
        json: bool,
    },
    /// Run a synthetic sine tone through the analysis pipeline.
    Tone {
        /// Tone frequency in Hz.
        #[arg(long, default_value_t = 440.0)]
        freq: f32,
        /// Tone length in seconds.
        #[arg(long, default_value_t = 0.5)]
        seconds: f32,
        /// Peak amplitude in [0, 1].
        #[arg(long, default_value_t = 0.5)]
        amplitude: f32,
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        target: TargetArgs,
        /// Print one JSON reading per line.
        #[arg(long)]
        json: bool,
    },
    /// Print the equal-tempered note nearest to a frequency.
    Note {
        /// Frequency in Hz.
        frequency: f32,
    },
    /// Print the effective engine configuration as JSON.
    Config {
        #[command(flatten)]
        engine: EngineArgs,
    },
}

/// Engine configuration: an optional JSON file plus flag overrides.
#[derive(Args, Debug)]
struct EngineArgs {
    /// JSON configuration file; missing fields use defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Samples per analysis frame.
    #[arg(long)]
    frame_size: Option<usize>,
    /// Samples between consecutive frames.
    #[arg(long)]
    hop_size: Option<usize>,
    /// YIN threshold.
    #[arg(long)]
    threshold: Option<f32>,
}

impl EngineArgs {
    fn load(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(frame_size) = self.frame_size {
            config.frame_size = frame_size;
        }
        if let Some(hop_size) = self.hop_size {
            config.hop_size = hop_size;
        }
        if let Some(threshold) = self.threshold {
            config.yin_threshold = threshold;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Target selection: a note name, a frequency, or a guitar string.
#[derive(Args, Debug)]
struct TargetArgs {
    /// Target as a note name (`E2`, `C#3`) or a frequency in Hz.
    #[arg(short, long, conflicts_with = "string")]
    target: Option<String>,
    /// Target a guitar string in standard tuning, 1 (high E) to 6 (low E).
    #[arg(short, long)]
    string: Option<u8>,
}

impl TargetArgs {
    fn resolve(&self) -> Result<TargetPitch> {
        if let Some(number) = self.string {
            let note = tuning::guitar_string(number)
                .ok_or_else(|| anyhow!("guitar strings are numbered 1 to 6, got {number}"))?;
            return Ok(TargetPitch::note(note));
        }
        match self.target.as_deref() {
            None => Ok(TargetPitch::UNSET),
            Some(text) => match text.parse::<f32>() {
                Ok(hz) if hz > 0.0 && hz.is_finite() => Ok(TargetPitch::hz(hz)),
                Ok(hz) => bail!("target frequency must be positive, got {hz}"),
                Err(_) => Ok(TargetPitch::note(tuning::parse_note(text)?)),
            },
        }
    }
}

fn run_listen(
    engine: &EngineArgs,
    target: &TargetArgs,
    seconds: Option<f64>,
    json: bool,
) -> Result<()> {
    let config = engine.load()?;
    let target = target.resolve()?;
    tracing::info!(?target, "starting live mode");

    let handle = TunerEngine::spawn_microphone(config)?;
    handle.set_target(target);

    let started = Instant::now();
    let mut last_sequence = 0;
    loop {
        let snapshot = handle.latest();
        if snapshot.sequence != last_sequence && snapshot.frames > 0 {
            last_sequence = snapshot.sequence;
            if json {
                println!("{}", serde_json::to_string(&*snapshot)?);
            } else {
                print!("\r{}   ", ui::render_line(&snapshot.reading));
                std::io::stdout().flush()?;
            }
        }
        if snapshot.status.is_terminal() {
            break;
        }
        if seconds.is_some_and(|limit| started.elapsed().as_secs_f64() >= limit) {
            break;
        }
        thread::sleep(TICK);
    }
    if !json {
        println!();
    }

    match handle.stop() {
        EngineStatus::Failed(message) => Err(anyhow!("audio engine failed: {message}")),
        status => {
            tracing::info!(?status, "live mode finished");
            Ok(())
        }
    }
}

/// Streams a synthetic tone through the framing and analysis pipeline
/// without starting a worker, printing a reading per frame.
fn run_tone(
    freq: f32,
    seconds: f32,
    amplitude: f32,
    engine: &EngineArgs,
    target: &TargetArgs,
    json: bool,
) -> Result<()> {
    let config = engine.load()?;
    let target = target.resolve()?;
    if !(seconds.is_finite() && seconds > 0.0) {
        bail!("tone length must be positive, got {seconds}");
    }

    let len = (seconds * config.sample_rate as f32) as usize;
    let rate = config.sample_rate as f32;
    let tone: Vec<f32> = (0..len)
        .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / rate).sin())
        .collect();

    let (sender, receiver) = crossbeam_channel::unbounded();
    for chunk in tone.chunks(TONE_CHUNK) {
        sender.send(chunk.to_vec())?;
    }
    drop(sender);

    let mut windower = Windower::from_config(&config)?;
    let mut analyzer = Analyzer::new(&config)?;
    let mut frames = 0usize;
    for frame in windower.frames(&receiver) {
        let reading: Reading = analyzer.analyze(&frame, target);
        if json {
            println!("{}", serde_json::to_string(&reading)?);
        } else {
            println!("{}", ui::render_line(&reading));
        }
        frames += 1;
    }
    if frames == 0 {
        tracing::warn!(
            samples = len,
            frame_size = config.frame_size,
            "tone is shorter than one frame"
        );
    }
    Ok(())
}

fn run_note(frequency: f32) -> Result<()> {
    match tuning::note_for_frequency(frequency) {
        Some(note) => {
            let cents = tuning::cents_from_nearest(frequency).unwrap_or(0.0);
            println!("{note} ({:.2} Hz, {cents:+.1} cents)", note.frequency());
        }
        None => println!("{}", tuning::NO_NOTE),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target_args(target: Option<&str>, string: Option<u8>) -> TargetArgs {
        TargetArgs {
            target: target.map(str::to_string),
            string,
        }
    }

    #[test]
    fn resolves_targets() {
        assert_eq!(target_args(None, None).resolve().unwrap(), TargetPitch::UNSET);
        assert_eq!(
            target_args(Some("440"), None).resolve().unwrap(),
            TargetPitch::hz(440.0)
        );
        let low_e = target_args(Some("E2"), None).resolve().unwrap();
        assert!((low_e.frequency().unwrap() - 82.41).abs() < 0.01);
        assert_eq!(target_args(None, Some(6)).resolve().unwrap(), low_e);
        assert!(target_args(None, Some(9)).resolve().is_err());
        assert!(target_args(Some("-3"), None).resolve().is_err());
        assert!(target_args(Some("Q7"), None).resolve().is_err());
    }

    #[test]
    fn flags_override_defaults() {
        let args = EngineArgs {
            config: None,
            frame_size: Some(2048),
            hop_size: Some(512),
            threshold: None,
        };
        let config = args.load().unwrap();
        assert_eq!(config.frame_size, 2048);
        assert_eq!(config.hop_size, 512);
        assert_eq!(config.yin_threshold, EngineConfig::default().yin_threshold);
    }

    #[test]
    fn cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
        let cli = Cli::try_parse_from(["tuner", "tone", "--freq", "110", "--string", "5"]).unwrap();
        assert!(matches!(cli.command, Commands::Tone { freq, .. } if freq == 110.0));
    }
}
