//! Music synchronization service
//!
//! [`MusicSync`] owns everything the engine shares between threads: the
//! request mailbox, the current playback slot, the song clock and the event
//! bus. It spawns the music start thread on construction and joins it on
//! shutdown (or drop).
//!
//! # Threads
//!
//! - **Caller thread**: `play_music`, `stop_music`, `handle_song_timer`,
//!   `update`. Never blocks beyond a short lock.
//! - **MusicThread**: waits for requests, loads timing and sound, publishes
//!   the new slot. Sleeps on a condition variable that `play_music`
//!   signals; the poll interval bounds the wait if a signal is missed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use beatsync_common::events::{EventBus, SyncEvent};
use beatsync_common::simfile::TimingLoader;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use super::reconciler::{ReconcileOutcome, SyncReconciler};
use super::request::{PlayMusicOptions, StartRequest};
use super::shared::SyncShared;
use super::slot::SlotPhase;
use super::starter::MusicStarter;
use crate::config::SyncSettings;
use crate::error::{Error, Result};
use crate::sound::SoundDriver;
use crate::state::SongClock;

/// Name of the music start thread
pub const MUSIC_THREAD_NAME: &str = "MusicThread";

/// Music playback synchronization service
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use beatsync_common::simfile::SimfileTimingLoader;
/// use beatsync_music::sound::NullSoundDriver;
/// use beatsync_music::{MusicSync, PlayMusicOptions, SyncSettings};
///
/// let sync = MusicSync::new(
///     Arc::new(NullSoundDriver::default()),
///     Arc::new(SimfileTimingLoader),
///     SyncSettings::default(),
/// )?;
/// sync.handle_song_timer(true);
/// sync.play_music("songs/a/music.wav", PlayMusicOptions::default())?;
///
/// // once per frame
/// sync.update(1.0 / 60.0);
/// println!("beat {:.2}", sync.clock().song_beat());
/// # Ok::<(), beatsync_music::Error>(())
/// ```
pub struct MusicSync {
    shared: Arc<SyncShared>,
    clock: SongClock,
    events: EventBus,
    driver: Arc<dyn SoundDriver>,
    starter: Arc<MusicStarter>,
    reconciler: SyncReconciler,
    settings: SyncSettings,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MusicSync {
    /// Create the service and, with threaded start, spawn the music start thread
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for invalid settings
    /// - [`Error::Internal`] if the thread cannot be spawned
    pub fn new(
        driver: Arc<dyn SoundDriver>,
        loader: Arc<dyn TimingLoader>,
        settings: SyncSettings,
    ) -> Result<Self> {
        settings.validate()?;

        let shared = Arc::new(SyncShared::new());
        let clock = SongClock::new();
        let events = EventBus::new(settings.event_capacity);

        let starter = Arc::new(MusicStarter::new(
            Arc::clone(&shared),
            clock.clone(),
            Arc::clone(&driver),
            loader,
            events.clone(),
            settings.presumed_latency_nudge,
        ));
        let reconciler = SyncReconciler::new(Arc::clone(&shared), clock.clone(), events.clone());

        let worker = if settings.threaded_start {
            let thread_shared = Arc::clone(&shared);
            let thread_starter = Arc::clone(&starter);
            let poll_interval = settings.poll_interval;

            let handle = thread::Builder::new()
                .name(MUSIC_THREAD_NAME.to_string())
                .spawn(move || run_music_thread(thread_shared, thread_starter, poll_interval))
                .map_err(|e| Error::Internal(format!("Failed to spawn {}: {}", MUSIC_THREAD_NAME, e)))?;
            debug!("Spawned {} (poll interval {:?})", MUSIC_THREAD_NAME, poll_interval);
            Some(handle)
        } else {
            debug!("Threaded music start disabled, starting music inline");
            None
        };

        Ok(Self {
            shared,
            clock,
            events,
            driver,
            starter,
            reconciler,
            settings,
            worker: Mutex::new(worker),
        })
    }

    /// Request `file` to play
    ///
    /// Does nothing if `file` (compared case-insensitively) is already
    /// playing. Otherwise the current music stops at once and the request
    /// replaces any request not yet started. An empty path only stops music.
    ///
    /// Returns as soon as the request is queued; loading happens on the
    /// music start thread. With threaded start off the music is started
    /// before returning. Load failures are logged and reported through
    /// [`SyncEvent::MusicFailed`], never returned.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] for negative or non-finite positions
    /// - [`Error::InvalidState`] after [`shutdown`](Self::shutdown)
    pub fn play_music(&self, file: impl AsRef<Path>, options: PlayMusicOptions) -> Result<()> {
        let file = file.as_ref();
        if file.as_os_str().is_empty() {
            self.stop_music();
            return Ok(());
        }

        validate_options(&options)?;
        if self.shared.is_shutting_down() {
            return Err(Error::InvalidState("music sync is shut down".to_string()));
        }

        let stopped = {
            let mut state = self.shared.lock();
            if state.playing.is_playing() && state.playing.music_path().is_some_and(|p| same_path(p, file)) {
                trace!("{} is already playing", file.display());
                return Ok(());
            }
            state.playing.unload()
        };
        if let Some(sound) = stopped {
            self.announce_stopped(sound.path());
        }

        let request = StartRequest::new(file, options);
        debug!("Music requested: {} (request {})", file.display(), request.id);
        self.events.emit_lossy(SyncEvent::MusicRequested {
            request_id: request.id,
            path: request.file.clone(),
            timestamp: chrono::Utc::now(),
        });

        if self.settings.threaded_start {
            self.shared.lock().queue.submit(request);
            self.shared.notify();
            return Ok(());
        }

        let request = {
            let mut state = self.shared.lock();
            state.queue.submit(request);
            state.queue.take_if_present()
        };
        if let Some(request) = request {
            if let Err(e) = self.starter.start_queued(request) {
                debug!("Inline music start failed: {}", e);
            }
        }

        Ok(())
    }

    /// Stop the current music and drop any request not yet started
    pub fn stop_music(&self) {
        let (stopped, dropped) = {
            let mut state = self.shared.lock();
            (state.playing.unload(), state.queue.cancel())
        };

        if let Some(request) = dropped {
            debug!("Dropped pending start of {}", request.file.display());
        }
        if let Some(sound) = stopped {
            self.announce_stopped(sound.path());
        }
    }

    /// Enable or disable per-frame song clock updates
    pub fn handle_song_timer(&self, on: bool) {
        self.shared.lock().updating_timer = on;
        debug!("Song timer {}", if on { "enabled" } else { "disabled" });
    }

    /// Advance the song clock; call once per frame
    pub fn update(&self, delta_seconds: f64) -> ReconcileOutcome {
        self.reconciler.update(delta_seconds)
    }

    /// File of the current music; empty when none is loaded
    pub fn music_path(&self) -> PathBuf {
        self.shared
            .lock()
            .playing
            .music_path()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Lifecycle phase of the current playback slot
    pub fn phase(&self) -> SlotPhase {
        self.shared.lock().playing.phase()
    }

    /// Minimum time between starting a sound and hearing it, in seconds
    pub fn play_latency(&self) -> f64 {
        self.driver.min_start_latency()
    }

    /// Published song position
    pub fn clock(&self) -> &SongClock {
        &self.clock
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Stop the music start thread and the current music
    ///
    /// Idempotent. A request still in the mailbox is never started.
    pub fn shutdown(&self) {
        self.shared.request_shutdown();

        if let Some(handle) = self.worker.lock().take() {
            trace!("Shutting down music start thread ...");
            if handle.join().is_err() {
                error!("{} panicked", MUSIC_THREAD_NAME);
            }
            trace!("Music start thread shut down.");
        }

        let stopped = self.shared.lock().playing.unload();
        if let Some(sound) = stopped {
            info!("Stopped {} on shutdown", sound.path().display());
        }
    }

    fn announce_stopped(&self, path: &Path) {
        debug!("Stopped music {}", path.display());
        self.events.emit_lossy(SyncEvent::MusicStopped {
            path: path.to_path_buf(),
            timestamp: chrono::Utc::now(),
        });
    }
}

impl Drop for MusicSync {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Music start thread body: wait for a request, start it, repeat until shutdown
fn run_music_thread(shared: Arc<SyncShared>, starter: Arc<MusicStarter>, poll_interval: Duration) {
    loop {
        let request = {
            let mut state = shared.lock();
            loop {
                if shared.is_shutting_down() {
                    return;
                }
                if let Some(request) = state.queue.take_if_present() {
                    break request;
                }
                shared.wait(&mut state, poll_interval);
            }
        };

        // Lock is released: loading may take a while
        let file = request.file.clone();
        if let Err(e) = starter.start_queued(request) {
            warn!("Music start thread skipped {}: {}", file.display(), e);
        }
    }
}

fn validate_options(options: &PlayMusicOptions) -> Result<()> {
    if !options.start_seconds.is_finite() || options.start_seconds < 0.0 {
        return Err(Error::InvalidRequest(format!(
            "start position must be a non-negative number, got {}",
            options.start_seconds
        )));
    }
    if let Some(length) = options.length_seconds {
        if !length.is_finite() || length <= 0.0 {
            return Err(Error::InvalidRequest(format!(
                "length must be a positive number, got {}",
                length
            )));
        }
    }
    if !options.fade_seconds.is_finite() || options.fade_seconds < 0.0 {
        return Err(Error::InvalidRequest(format!(
            "fade length must be a non-negative number, got {}",
            options.fade_seconds
        )));
    }
    Ok(())
}

/// Case-insensitive path comparison
fn same_path(a: &Path, b: &Path) -> bool {
    a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
}
