//! sotto command-line interface.

use anyhow::Context;
use clap::{Parser, Subcommand};
use sotto::audio::capture::CpalAudioHost;
use sotto::audio::source::AudioHost;
use sotto::config::{Settings, TomlConfigStore};
use sotto::pipeline::session::Session;
use sotto::pipeline::sink::{MeterSink, NullEnergySink, StdoutSink};
use sotto::stt::command::CommandTranscriber;
use sotto::vad::calibrator::Calibrator;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sotto", version, about = "Always-listening dictation")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Listen continuously and print finalized sentences to stdout
    Run {
        /// External transcription command fed WAV on stdin, e.g.
        /// "whisper-cli -f - -l {lang}"
        #[arg(long, value_name = "CMD")]
        transcribe_with: String,

        /// Input device index from `sotto devices`; omit for the default
        #[arg(long)]
        device: Option<usize>,

        /// Language code passed to the transcriber
        #[arg(long)]
        language: Option<String>,

        /// Show a live level meter on stderr
        #[arg(long)]
        show_levels: bool,
    },

    /// List input devices with their indices
    Devices,

    /// Measure the noise baseline and print the derived speech threshold
    Calibrate {
        /// Input device index from `sotto devices`; omit for the default
        #[arg(long)]
        device: Option<usize>,
    },
}

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

fn install_sigint_handler() {
    let handler = on_sigint as extern "C" fn(libc::c_int);
    // SAFETY: installs an async-signal-safe handler that only stores a flag.
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Settings::default_path);
    let settings = Settings::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?
        .with_env_overrides();

    match cli.command {
        Command::Run {
            transcribe_with,
            device,
            language,
            show_levels,
        } => run(
            settings,
            config_path,
            &transcribe_with,
            device,
            language,
            show_levels,
        ),
        Command::Devices => list_devices(),
        Command::Calibrate { device } => calibrate(settings, config_path, device),
    }
}

fn run(
    mut settings: Settings,
    config_path: PathBuf,
    transcribe_with: &str,
    device: Option<usize>,
    language: Option<String>,
    show_levels: bool,
) -> anyhow::Result<()> {
    if let Some(index) = device {
        settings.audio.input_device_index = Some(index);
    }
    if let Some(language) = language {
        settings.stt.language = language;
    }

    let transcriber = CommandTranscriber::new(transcribe_with)?;
    let session = Session::new(
        settings.clone(),
        Arc::new(CpalAudioHost::new()),
        Arc::new(TomlConfigStore::new(config_path)),
    );

    install_sigint_handler();
    eprintln!("sotto: listening (press Ctrl-C to stop)");

    let handle = if show_levels {
        session.start(
            transcriber,
            StdoutSink,
            MeterSink::new(settings.detection.silence_threshold),
        )?
    } else {
        session.start(transcriber, StdoutSink, NullEnergySink)?
    };

    while handle.is_running() && !SHUTDOWN.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    handle.stop()?;
    eprintln!("sotto: stopped");
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    let host = CpalAudioHost::new();
    let devices = host.devices().context("enumerating input devices")?;
    if devices.is_empty() {
        println!("No input devices found.");
        return Ok(());
    }
    println!("Input devices (omit --device for the system default):");
    for (index, name) in devices.iter().enumerate() {
        println!("  {index:>3}  {name}");
    }
    Ok(())
}

fn calibrate(
    mut settings: Settings,
    config_path: PathBuf,
    device: Option<usize>,
) -> anyhow::Result<()> {
    if let Some(index) = device {
        settings.audio.input_device_index = Some(index);
    }
    // Drop the cached baseline so a fresh one is measured.
    settings.calibration.energy = None;

    let host = CpalAudioHost::new();
    let mut source = host.open(settings.audio.input_device_index)?;
    source.start()?;

    let store = TomlConfigStore::new(config_path);
    let running = AtomicBool::new(true);
    eprintln!("sotto: calibrating, keep quiet for a moment...");
    let profile = Calibrator::new().run(source.as_mut(), &mut settings, &store, &running)?;
    source.stop()?;

    let threshold = profile.adaptive_threshold(settings.detection.speech_energy_threshold);
    println!("baseline energy:    {:.1}", profile.baseline_energy);
    println!("speech threshold:   {threshold:.1}");
    println!("saved to:           {}", store.path().display());
    Ok(())
}
