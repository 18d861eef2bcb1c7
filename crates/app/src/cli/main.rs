//! Plectrum CLI: a guitar practice rig in the terminal

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use plectrum_core::domain::{
    AudioDeviceRegistry, ConfigManager, DeviceId, MetronomeScheduler, PlectrumConfig, Preset,
    PresetManager, SignalChainManager, TunerSession,
};
use plectrum_infra::{AudioEngine, CpalEnumerator, CpalInputProvider};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Tuner repaint period, roughly one display frame
const TUNER_FRAME: Duration = Duration::from_millis(16);
/// VU meter refresh period
const METER_FRAME: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "plectrum")]
#[command(about = "Guitar effects rig, tuner and metronome", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration directory
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List audio input and output devices
    Devices,

    /// Show the detected note of the input
    Tuner {
        /// Input device id (see `devices`)
        #[arg(long)]
        device: Option<String>,

        /// Stop after this many analysis frames
        #[arg(long)]
        frames: Option<u64>,
    },

    /// Play a click track
    Metronome {
        #[arg(long)]
        bpm: Option<f64>,

        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },

    /// Run the live effects chain until Ctrl-C
    Rig {
        /// Input device id (see `devices`)
        #[arg(long)]
        device: Option<String>,

        /// Effect to append, repeatable (e.g. `overdrive`, `reverb`)
        #[arg(long = "effect")]
        effects: Vec<String>,

        /// Preset to load before any `--effect`
        #[arg(long)]
        preset: Option<String>,

        /// Master volume, 0..=1
        #[arg(long)]
        volume: Option<f32>,

        /// Master pan, -1..=1
        #[arg(long)]
        pan: Option<f32>,

        /// Save the chain as a preset on exit
        #[arg(long)]
        save: Option<String>,
    },

    /// Manage stored presets
    Presets {
        #[command(subcommand)]
        action: PresetAction,
    },
}

#[derive(Subcommand)]
enum PresetAction {
    List,
    Show { name: String },
    Delete { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => ConfigManager::default_config_dir()?,
    };
    let config = ConfigManager::new(config_dir).load().await;

    match cli.command {
        Command::Devices => list_devices(),
        Command::Tuner { device, frames } => run_tuner(&config, device, frames).await,
        Command::Metronome { bpm, seconds } => run_metronome(&config, bpm, seconds).await,
        Command::Rig {
            device,
            effects,
            preset,
            volume,
            pan,
            save,
        } => {
            let options = RigOptions {
                device,
                effects,
                preset,
                volume,
                pan,
                save,
            };
            run_rig(&config, options).await
        }
        Command::Presets { action } => manage_presets(&config, action).await,
    }
}

fn list_devices() -> anyhow::Result<()> {
    let enumerator = CpalEnumerator::new();
    let registry = AudioDeviceRegistry::new();
    registry.refresh(&enumerator)?;

    println!("Inputs:");
    for device in registry.input_devices() {
        println!("  {}", device.label);
    }
    println!("Outputs:");
    for device in registry.output_devices() {
        println!("  {}", device.label);
    }
    Ok(())
}

fn start_engine(config: &PlectrumConfig) -> anyhow::Result<AudioEngine> {
    let engine = AudioEngine::start(config.audio.output()).context("opening audio output")?;
    engine.resume()?;
    Ok(engine)
}

fn input_device(arg: Option<String>, config: &PlectrumConfig) -> Option<DeviceId> {
    arg.map(DeviceId::new).or_else(|| config.audio.input())
}

async fn run_tuner(
    config: &PlectrumConfig,
    device: Option<String>,
    frames: Option<u64>,
) -> anyhow::Result<()> {
    let mut engine = start_engine(config)?;
    let provider = CpalInputProvider::new(engine.sample_rate());
    let mut session = TunerSession::open(
        engine.context().clone(),
        &provider,
        input_device(device, config),
        &config.app.tuner,
    )
    .await?;

    let mut ticker = interval(TUNER_FRAME);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut updates = session.subscribe();
    let mut count = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        session.tick();
        if updates.has_changed().unwrap_or(false) {
            if let Some(reading) = *updates.borrow_and_update() {
                println!(
                    "{:<4} {:>8.2} Hz {:>+6.1} cents",
                    reading.note_label(),
                    reading.detected_frequency_hz,
                    reading.display_offset()
                );
            }
        }

        count += 1;
        if frames.is_some_and(|limit| count >= limit) {
            break;
        }
    }

    session.stop();
    engine.dispose();
    Ok(())
}

async fn run_metronome(
    config: &PlectrumConfig,
    bpm: Option<f64>,
    seconds: Option<u64>,
) -> anyhow::Result<()> {
    let mut engine = start_engine(config)?;
    let mut scheduler = MetronomeScheduler::new(engine.context().clone(), config.app.metronome.clone());
    if let Some(bpm) = bpm {
        scheduler.set_bpm(bpm);
    }
    scheduler.start();
    info!(bpm = scheduler.bpm(), "Metronome running");

    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs(s));
    let mut ticker = interval(scheduler.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        scheduler.tick();
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
    }

    scheduler.stop();
    engine.dispose();
    Ok(())
}

struct RigOptions {
    device: Option<String>,
    effects: Vec<String>,
    preset: Option<String>,
    volume: Option<f32>,
    pan: Option<f32>,
    save: Option<String>,
}

async fn run_rig(config: &PlectrumConfig, options: RigOptions) -> anyhow::Result<()> {
    let mut engine = start_engine(config)?;
    let provider = CpalInputProvider::new(engine.sample_rate());
    let presets = PresetManager::new(config.app.preset_dir.clone());

    let mut chain = SignalChainManager::new(engine.context().clone(), config.app.analysis_size)?;
    chain
        .set_input_source(&provider, input_device(options.device, config))
        .await?;

    if let Some(name) = &options.preset {
        let preset = presets.load_preset(name).await?;
        chain.import_chain(&preset.effects)?;
        info!(preset = %preset.name, "Preset loaded");
    }
    for effect in &options.effects {
        chain.add_effect(effect, &[])?;
    }
    if let Some(volume) = options.volume {
        chain.set_master_volume(volume);
    }
    if let Some(pan) = options.pan {
        chain.set_master_pan(pan);
    }

    for stage in chain.topology() {
        println!("  {:?}", stage);
    }

    let tap = chain.analysis_tap();
    let mut ticker = interval(METER_FRAME);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let level = tap.level_percent();
                let bar = "#".repeat((level / 5.0) as usize);
                println!("{:>5.1}% {}", level, bar);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Some(name) = options.save {
        let preset = Preset::new(name, chain.export_chain());
        if let Err(e) = presets.save_preset(&preset).await {
            warn!("Could not save preset {}: {}", preset.name, e);
        }
    }

    chain.dispose();
    engine.dispose();
    Ok(())
}

async fn manage_presets(config: &PlectrumConfig, action: PresetAction) -> anyhow::Result<()> {
    let presets = PresetManager::new(config.app.preset_dir.clone());
    match action {
        PresetAction::List => {
            for id in presets.list_presets().await? {
                println!("{}", id);
            }
        }
        PresetAction::Show { name } => {
            let preset = presets.load_preset(&name).await?;
            println!("{}", serde_json::to_string_pretty(&preset)?);
        }
        PresetAction::Delete { name } => {
            presets.delete_preset(&name).await?;
            println!("Deleted {}", name);
        }
    }
    Ok(())
}
