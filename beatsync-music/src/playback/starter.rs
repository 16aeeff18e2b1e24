//! Music starter
//!
//! Turns a [`StartRequest`] into a running [`PlaybackSlot`]. Runs on the
//! music start thread (or inline on the caller when threaded start is off).
//!
//! The shared lock is taken twice, both times briefly: once to snapshot the
//! current slot's timing and the song clock, once to publish the new slot.
//! Timing file reads and sound loading happen between the two, unlocked.
//!
//! # Beat alignment
//!
//! When a song with timing replaces a song that governs the clock, the new
//! sound is scheduled so its beat phase at `start_seconds` matches the phase
//! the current clock will have at that instant:
//!
//! ```text
//! current clock:  ...|----|----|--x-|----|...   x = now + presumed latency
//!                                  ^    ^
//!                                  |    start instant (same fraction as
//!                                  |    the new song's start beat)
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use beatsync_common::events::{EventBus, SyncEvent};
use beatsync_common::simfile::TimingLoader;
use beatsync_common::timing::{beat_fraction, TimingModel};
use tracing::{debug, info, warn};

use super::request::StartRequest;
use super::shared::SyncShared;
use super::slot::PlaybackSlot;
use crate::error::Result;
use crate::sound::{SoundDriver, SoundParams};
use crate::state::SongClock;

/// Result of starting one request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartOutcome {
    /// A new slot was published and its sound started
    Started {
        /// The song came with its own timing data
        has_timing: bool,
        /// Start was scheduled to keep beat phase
        aligned: bool,
        /// Instant the sound was asked to start (None: as soon as possible)
        start_at: Option<Instant>,
    },
    /// A newer request (or a stop) arrived before the start; the sound was
    /// never started
    Superseded,
}

/// What the starter needs from the currently published state
struct CurrentState {
    timing: Arc<TimingModel>,
    has_timing: bool,
    updating_timer: bool,
    music_seconds: f64,
    song_beat: f64,
    last_update: Instant,
}

pub struct MusicStarter {
    shared: Arc<SyncShared>,
    clock: SongClock,
    driver: Arc<dyn SoundDriver>,
    loader: Arc<dyn TimingLoader>,
    events: EventBus,
    /// Seconds added to the driver's minimum start latency
    latency_nudge: f64,
}

impl MusicStarter {
    pub fn new(
        shared: Arc<SyncShared>,
        clock: SongClock,
        driver: Arc<dyn SoundDriver>,
        loader: Arc<dyn TimingLoader>,
        events: EventBus,
        latency_nudge: f64,
    ) -> Self {
        Self {
            shared,
            clock,
            driver,
            loader,
            events,
            latency_nudge,
        }
    }

    /// Latency assumed between starting a fresh sound and hearing it
    pub fn presumed_latency(&self) -> f64 {
        self.driver.min_start_latency() + self.latency_nudge
    }

    /// Start `request`, replacing the current slot
    ///
    /// `request` must have gone through the shared
    /// [`StartRequestQueue`](super::request::StartRequestQueue)
    /// (submitted, then taken); one that is no longer the latest submission
    /// by the time its sound is loaded is abandoned without starting audio.
    ///
    /// A missing or broken timing file is not an error; the song plays
    /// untimed. A sound that cannot be loaded leaves the current slot alone
    /// and returns the error after emitting [`SyncEvent::MusicFailed`].
    pub fn start_queued(&self, request: StartRequest) -> Result<StartOutcome> {
        let current = self.current_state();

        let loaded = self.resolve_timing(&request);
        let has_timing = loaded.is_some();

        let mut length_seconds = request.length_seconds;
        let new_timing = match loaded {
            Some(timing) => {
                if request.force_loop {
                    if let Some(length) = request.length_seconds {
                        let corrected =
                            corrected_loop_length(&timing, request.start_seconds, length);
                        debug!("Loop length {:.3}s corrected to {:.3}s", length, corrected);
                        length_seconds = Some(corrected);
                    }
                }
                timing
            }
            // Untimed songs have arbitrary phase; continue from the current beat
            None => untimed_model_for_phase(current.song_beat),
        };

        let start_immediately = !has_timing || (!current.has_timing && !current.updating_timer);
        let start_at = if start_immediately {
            None
        } else {
            let presumed = self.presumed_latency();
            let distance = aligned_start_distance(
                &current.timing,
                &new_timing,
                current.music_seconds,
                request.start_seconds,
                presumed,
            );
            let delay = (presumed + distance).max(0.0);
            debug!(
                "Aligning start of {}: distance {:.3}s, presumed latency {:.3}s",
                request.file.display(),
                distance,
                presumed
            );
            Some(current.last_update + Duration::from_secs_f64(delay))
        };

        let params = SoundParams {
            looping: request.force_loop,
            start_seconds: request.start_seconds,
            length_seconds,
            fade_seconds: request.fade_seconds,
        };

        let mut sound = match self.driver.load(&request.file, &params) {
            Ok(sound) => sound,
            Err(e) => {
                warn!("Couldn't load music {}: {}", request.file.display(), e);
                self.events.emit_lossy(SyncEvent::MusicFailed {
                    request_id: request.id,
                    path: request.file.clone(),
                    reason: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
                return Err(e);
            }
        };

        // The latest check, the start command and the publish share one
        // critical section so a concurrent stop or newer request cannot slip
        // between them.
        let old = {
            let mut state = self.shared.lock();
            if state.queue.is_latest(request.id) {
                sound.start_at(start_at);
                let slot =
                    PlaybackSlot::starting(request.id, sound, current.timing, new_timing, has_timing);
                Some(std::mem::replace(&mut state.playing, Box::new(slot)))
            } else {
                None
            }
        };
        let Some(mut old) = old else {
            debug!(
                "Request {} superseded before starting, not starting {}",
                request.id,
                request.file.display()
            );
            return Ok(StartOutcome::Superseded);
        };
        if old.unload().is_some() {
            debug!("Stopped previous music after publishing {}", request.file.display());
        }
        drop(old);

        info!(
            "Started music {} (timing: {}, aligned: {})",
            request.file.display(),
            has_timing,
            start_at.is_some()
        );
        self.events.emit_lossy(SyncEvent::MusicStarted {
            request_id: request.id,
            path: request.file,
            has_timing,
            aligned: start_at.is_some(),
            timestamp: chrono::Utc::now(),
        });

        Ok(StartOutcome::Started {
            has_timing,
            aligned: start_at.is_some(),
            start_at,
        })
    }

    fn current_state(&self) -> CurrentState {
        let state = self.shared.lock();
        let position = self.clock.snapshot();
        CurrentState {
            timing: Arc::clone(state.playing.timing()),
            has_timing: state.playing.has_timing(),
            updating_timer: state.updating_timer,
            music_seconds: position.music_seconds,
            song_beat: position.song_beat,
            last_update: position.last_update,
        }
    }

    fn resolve_timing(&self, request: &StartRequest) -> Option<TimingModel> {
        match self.loader.load_timing(&request.timing_file) {
            Ok(timing) => Some(timing),
            Err(e) if e.is_not_found() => {
                debug!("No timing file at {}", request.timing_file.display());
                None
            }
            Err(e) => {
                warn!("Couldn't load {}, \"{}\"", request.timing_file.display(), e);
                None
            }
        }
    }
}

/// Loop length that ends on the same beat fraction the loop starts on
///
/// The end is pushed forward (never back) by less than one beat.
pub fn corrected_loop_length(timing: &TimingModel, start_seconds: f64, length_seconds: f64) -> f64 {
    let start_beat = timing.beat_from_elapsed(start_seconds);
    let end_beat = timing.beat_from_elapsed(start_seconds + length_seconds);

    let mut difference = beat_fraction(start_beat) - beat_fraction(end_beat);
    if difference < 0.0 {
        difference += 1.0;
    }

    timing.elapsed_from_beat(end_beat + difference) - start_seconds
}

/// Seconds from "now plus presumed latency" until the current clock reaches
/// the next beat whose fraction matches the incoming song's start beat
///
/// `music_seconds` is the last published position; the result is never
/// negative and is less than one beat of the current timing.
pub fn aligned_start_distance(
    current: &TimingModel,
    incoming: &TimingModel,
    music_seconds: f64,
    start_seconds: f64,
    presumed_latency: f64,
) -> f64 {
    let current_second = music_seconds + presumed_latency;
    let current_beat = current.beat_from_elapsed(current_second);
    let current_fraction = beat_fraction(current_beat);

    let mut start_fraction = beat_fraction(incoming.beat_from_elapsed(start_seconds));
    if start_fraction < current_fraction {
        start_fraction += 1.0;
    }

    let beat_to_start_on = current_beat.floor() + start_fraction;
    current.elapsed_from_beat(beat_to_start_on) - current_second
}

/// Default-tempo timing whose elapsed 0 lands on the fraction of `song_beat`
pub fn untimed_model_for_phase(song_beat: f64) -> TimingModel {
    let timing = TimingModel::default();
    let offset = timing.elapsed_from_beat(beat_fraction(song_beat));
    timing.with_beat0_offset(offset)
}
