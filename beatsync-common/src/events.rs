//! Event types and EventBus
//!
//! Music synchronization events are broadcast to any number of observers
//! (logging, UI, tests) through a tokio broadcast channel. Emitting never
//! blocks, so the music start thread and the frame update can publish freely.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Music synchronization events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A start request was queued (it may still be superseded)
    MusicRequested {
        request_id: Uuid,
        path: PathBuf,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The music start thread committed a new playing song
    MusicStarted {
        request_id: Uuid,
        path: PathBuf,
        /// True when the song came with its own timing data
        has_timing: bool,
        /// True when the start was delayed to keep the beat phase
        aligned: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A request could not be started; the previous song is left as it was
    MusicFailed {
        request_id: Uuid,
        path: PathBuf,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The new song became audible and its timing replaced the previous one
    TimingConfirmed {
        request_id: Uuid,
        /// Music position at the moment of the swap
        music_seconds: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Music was stopped by the caller
    MusicStopped {
        path: PathBuf,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl SyncEvent {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::MusicRequested { .. } => "MusicRequested",
            SyncEvent::MusicStarted { .. } => "MusicStarted",
            SyncEvent::MusicFailed { .. } => "MusicFailed",
            SyncEvent::TimingConfirmed { .. } => "TimingConfirmed",
            SyncEvent::MusicStopped { .. } => "MusicStopped",
        }
    }
}

/// Central event distribution bus
///
/// Wraps `tokio::sync::broadcast`:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use beatsync_common::events::{EventBus, SyncEvent};
///
/// let bus = EventBus::new(16);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(SyncEvent::MusicStopped {
///     path: "song.ogg".into(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert_eq!(rx.try_recv().unwrap().kind(), "MusicStopped");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    ///
    /// A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: SyncEvent) -> Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SyncEvent) {
        if let Err(broadcast::error::SendError(event)) = self.tx.send(event) {
            trace!("No subscribers for {}", event.kind());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
