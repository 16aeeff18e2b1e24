//! beatsync - Music synchronization demo
//!
//! Plays one or more music files through the silent null sound driver and
//! logs the song clock, switching songs on a fixed schedule to show beat
//! aligned starts.
//!
//! ```text
//! beatsync songs/a/music.wav songs/b/music.wav --switch-secs 8
//! ```

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use beatsync_common::config::TomlConfig;
use beatsync_common::events::SyncEvent;
use beatsync_common::simfile::SimfileTimingLoader;
use beatsync_music::sound::NullSoundDriver;
use beatsync_music::{MusicSync, PlayMusicOptions, SyncSettings};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for beatsync
#[derive(Parser, Debug)]
#[command(name = "beatsync")]
#[command(about = "Beat-synchronized music playback demo")]
#[command(version)]
struct Args {
    /// Music files to play, in order
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Config file (TOML)
    #[arg(short, long, env = "BEATSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Timing file used for every song instead of `<music>.sm`
    #[arg(long)]
    timing: Option<PathBuf>,

    /// Loop each song
    #[arg(long = "loop")]
    force_loop: bool,

    /// Start position within each file, in seconds
    #[arg(long, default_value_t = 0.0)]
    start_secs: f64,

    /// Length of the played region, in seconds
    #[arg(long)]
    length_secs: Option<f64>,

    /// Fade-out length, in seconds
    #[arg(long, default_value_t = 0.0)]
    fade_secs: f64,

    /// Switch to the next file after this many seconds
    #[arg(long, default_value_t = 10.0)]
    switch_secs: f64,

    /// Exit after this many seconds (runs until Ctrl+C if absent)
    #[arg(long)]
    duration_secs: Option<f64>,

    /// Frame rate of the update loop
    #[arg(long, default_value_t = 60.0)]
    fps: f64,

    /// Start latency reported by the null sound driver, in milliseconds
    #[arg(long, default_value_t = 20)]
    latency_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config, config_path) = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    init_tracing(&config).context("Failed to initialize logging")?;

    info!("Starting beatsync v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }

    if !(args.fps.is_finite() && args.fps > 0.0) {
        bail!("--fps must be positive, got {}", args.fps);
    }
    if !(args.switch_secs.is_finite() && args.switch_secs > 0.0) {
        bail!("--switch-secs must be positive, got {}", args.switch_secs);
    }

    let settings = SyncSettings::from(&config.music);
    let driver = Arc::new(NullSoundDriver::new(args.latency_ms as f64 / 1000.0));
    let sync = MusicSync::new(driver, Arc::new(SimfileTimingLoader), settings)
        .context("Failed to initialize music sync")?;
    info!("Music sync initialized (play latency {:.3}s)", sync.play_latency());

    let event_logger = tokio::spawn(log_events(sync.subscribe()));

    sync.handle_song_timer(true);

    let options = PlayMusicOptions {
        timing_file: args.timing.clone(),
        force_loop: args.force_loop,
        start_seconds: args.start_secs,
        length_seconds: args.length_secs,
        fade_seconds: args.fade_secs,
    };

    let mut next_file = 0;
    play_next(&sync, &args.files, &mut next_file, &options)?;

    let started = Instant::now();
    let switch_every = Duration::from_secs_f64(args.switch_secs);
    let deadline = args.duration_secs.map(|secs| started + Duration::from_secs_f64(secs.max(0.0)));

    let mut frames = tokio::time::interval(Duration::from_secs_f64(1.0 / args.fps));
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_frame = Instant::now();
    let mut last_switch = started;
    let mut last_report = started;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = frames.tick() => {
                let now = Instant::now();
                let delta = now.duration_since(last_frame).as_secs_f64();
                last_frame = now;

                sync.update(delta);

                if now.duration_since(last_report) >= Duration::from_secs(1) {
                    last_report = now;
                    let position = sync.clock().snapshot();
                    info!(
                        "{:>8.3}s  beat {:>8.3}  {:>6.1} BPM{}  [{}]",
                        position.music_seconds,
                        position.song_beat,
                        position.beats_per_second * 60.0,
                        if position.freeze { "  (stop)" } else { "" },
                        sync.music_path().display()
                    );
                }

                if args.files.len() > 1 && now.duration_since(last_switch) >= switch_every {
                    last_switch = now;
                    play_next(&sync, &args.files, &mut next_file, &options)?;
                }

                if deadline.is_some_and(|deadline| now >= deadline) {
                    info!("Run time elapsed");
                    break;
                }
            }
        }
    }

    sync.shutdown();
    drop(sync);
    if let Err(e) = event_logger.await {
        warn!("Event logger task failed: {}", e);
    }

    info!("beatsync stopped");
    Ok(())
}

fn play_next(
    sync: &MusicSync,
    files: &[PathBuf],
    next_file: &mut usize,
    options: &PlayMusicOptions,
) -> Result<()> {
    let file = &files[*next_file % files.len()];
    *next_file += 1;
    info!("Playing {}", file.display());
    sync.play_music(file, options.clone())
        .with_context(|| format!("Cannot play {}", file.display()))
}

/// Install the global subscriber: `RUST_LOG` wins over the configured level
fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.logging.level)
            .with_context(|| format!("Invalid log level '{}'", config.logging.level))?,
    };

    match &config.logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(Arc::new(file))
                        .with_ansi(false)
                        .with_thread_names(true),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_thread_names(true),
                )
                .init();
        }
    }

    Ok(())
}

/// Log every sync event until the bus closes
async fn log_events(mut rx: broadcast::Receiver<SyncEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => info!("Event {}: {}", event.kind(), json),
                Err(e) => warn!("Cannot serialize {} event: {}", event.kind(), e),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event logger lagged, {} events skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Event bus closed");
                break;
            }
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
