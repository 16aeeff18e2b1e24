//! State shared between the caller thread and the music start thread
//!
//! Everything the two threads exchange sits behind one mutex: the start
//! request mailbox, the current playback slot and the song timer flag. The
//! lock is only ever held for pointer swaps and flag reads, never for I/O.
//!
//! Lock order: `SyncShared::state` before the `SongClock` lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::request::StartRequestQueue;
use super::slot::PlaybackSlot;

/// Data guarded by the shared mutex
#[derive(Debug)]
pub struct SyncState {
    /// Next music to start
    pub queue: StartRequestQueue,
    /// Slot governing the song clock
    pub playing: Box<PlaybackSlot>,
    /// Whether per-frame reconciliation publishes positions
    pub updating_timer: bool,
}

/// Shared mutex, wakeup signal and shutdown flag
#[derive(Debug)]
pub struct SyncShared {
    state: Mutex<SyncState>,
    wakeup: Condvar,
    shutdown: AtomicBool,
}

impl SyncShared {
    /// Idle slot with default timing, empty mailbox, timer off
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SyncState {
                queue: StartRequestQueue::new(),
                playing: Box::new(PlaybackSlot::idle()),
                updating_timer: false,
            }),
            wakeup: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock()
    }

    /// Wake the music start thread
    pub fn notify(&self) {
        self.wakeup.notify_all();
    }

    /// Sleep until notified or `timeout` passes; the lock is released meanwhile
    pub fn wait(&self, guard: &mut MutexGuard<'_, SyncState>, timeout: Duration) {
        // Timeout and notification are handled the same way by the caller
        let _ = self.wakeup.wait_for(guard, timeout);
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _guard = self.state.lock();
        self.wakeup.notify_all();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

impl Default for SyncShared {
    fn default() -> Self {
        Self::new()
    }
}
