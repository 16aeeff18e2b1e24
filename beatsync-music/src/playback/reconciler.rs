//! Per-frame song position reconciliation
//!
//! Runs on the caller thread once per frame. Produces the published song
//! position from the playing sound when the sound system reports an exact
//! position, and extrapolates from the last published position otherwise
//! (nothing playing, or a freshly started sound that is not audible yet).
//!
//! The one place a slot's pending timing becomes its confirmed timing is the
//! first exact reading after a delayed start, so beats never jump while the
//! new song is still silent.

use std::sync::Arc;

use beatsync_common::events::{EventBus, SyncEvent};
use tracing::{debug, trace};

use super::shared::SyncShared;
use crate::state::SongClock;

/// What one [`SyncReconciler::update`] did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    /// Song timer is off; nothing published
    Disabled,
    /// No sound playing; position advanced by the frame delta
    Extrapolated,
    /// Sound started but not audible yet; advanced by the frame delta using
    /// the previous timing
    Approximate,
    /// Published the sound's exact position
    Exact {
        /// This reading installed the slot's pending timing
        timing_confirmed: bool,
    },
}

pub struct SyncReconciler {
    shared: Arc<SyncShared>,
    clock: SongClock,
    events: EventBus,
}

impl SyncReconciler {
    pub fn new(shared: Arc<SyncShared>, clock: SongClock, events: EventBus) -> Self {
        Self {
            shared,
            clock,
            events,
        }
    }

    /// Advance the song clock by one frame of `delta_seconds`
    ///
    /// Negative or non-finite deltas are treated as 0 so the extrapolated
    /// position never moves backwards.
    pub fn update(&self, delta_seconds: f64) -> ReconcileOutcome {
        let delta = if delta_seconds.is_finite() && delta_seconds > 0.0 {
            delta_seconds
        } else {
            0.0
        };

        let mut confirmed = None;
        let outcome = {
            let mut state = self.shared.lock();

            if !state.updating_timer {
                return ReconcileOutcome::Disabled;
            }

            let slot = &mut state.playing;
            let position = if slot.is_playing() {
                slot.position()
            } else {
                None
            };

            match position {
                None => {
                    let seconds = self.clock.music_seconds() + delta;
                    self.clock.update_song_position(seconds, slot.timing());
                    ReconcileOutcome::Extrapolated
                }
                Some(position) if position.approximate => {
                    let seconds = self.clock.music_seconds() + delta;
                    self.clock.update_song_position(seconds, slot.timing());
                    trace!("Approximate position, extrapolated to {:.3}s", seconds);
                    ReconcileOutcome::Approximate
                }
                Some(position) => {
                    let timing_confirmed = slot.confirm_timing();
                    if timing_confirmed {
                        confirmed = slot.request_id().map(|id| (id, position.seconds));
                    }
                    self.clock.update_song_position(position.seconds, slot.timing());
                    ReconcileOutcome::Exact { timing_confirmed }
                }
            }
        };

        if let Some((request_id, music_seconds)) = confirmed {
            debug!(
                "Music audible at {:.3}s, switched to its timing (request {})",
                music_seconds, request_id
            );
            self.events.emit_lossy(SyncEvent::TimingConfirmed {
                request_id,
                music_seconds,
                timestamp: chrono::Utc::now(),
            });
        }

        outcome
    }
}
