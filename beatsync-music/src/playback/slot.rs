//! Playback slot
//!
//! A slot owns the sound that governs the song clock together with the timing
//! model that converts its position to beats. Slots are built complete by the
//! music start thread and replaced wholesale; the only in-place change is the
//! one-shot timing confirmation made by the reconciler.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start──▶ Starting ──first exact position──▶ Playing
//!                 (old timing,                       (new timing)
//!                  approximate reads)
//! ```

use std::path::Path;
use std::sync::Arc;

use beatsync_common::timing::TimingModel;
use uuid::Uuid;

use crate::sound::{SoundHandle, SoundPosition};

/// Where a slot is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotPhase {
    /// No sound (startup, or music stopped)
    Idle,
    /// Sound commanded to start; still governed by the previous song's timing
    Starting,
    /// Sound confirmed audible; governed by its own timing
    Playing,
}

pub struct PlaybackSlot {
    /// Request that produced this slot (None for the startup slot)
    request_id: Option<Uuid>,
    sound: Option<Box<dyn SoundHandle>>,
    /// Timing currently used to publish beats
    timing: Arc<TimingModel>,
    /// Timing of this slot's own song, installed once the sound is heard
    new_timing: Arc<TimingModel>,
    has_timing: bool,
    timing_delayed: bool,
}

impl std::fmt::Debug for PlaybackSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSlot")
            .field("request_id", &self.request_id)
            .field("sound", &self.sound.as_ref().map(|s| s.path().to_path_buf()))
            .field("has_timing", &self.has_timing)
            .field("timing_delayed", &self.timing_delayed)
            .finish()
    }
}

impl PlaybackSlot {
    /// Startup slot: no sound, default 120 BPM timing
    pub fn idle() -> Self {
        let timing = Arc::new(TimingModel::default());
        Self {
            request_id: None,
            sound: None,
            new_timing: Arc::clone(&timing),
            timing,
            has_timing: false,
            timing_delayed: false,
        }
    }

    /// Slot for a sound that has just been started
    ///
    /// `timing` is the timing of the song being replaced and keeps governing
    /// the clock until [`confirm_timing`](Self::confirm_timing) installs
    /// `new_timing`.
    pub fn starting(
        request_id: Uuid,
        sound: Box<dyn SoundHandle>,
        timing: Arc<TimingModel>,
        new_timing: TimingModel,
        has_timing: bool,
    ) -> Self {
        Self {
            request_id: Some(request_id),
            sound: Some(sound),
            timing,
            new_timing: Arc::new(new_timing),
            has_timing,
            timing_delayed: true,
        }
    }

    pub fn request_id(&self) -> Option<Uuid> {
        self.request_id
    }

    /// Timing used to publish beats right now
    pub fn timing(&self) -> &Arc<TimingModel> {
        &self.timing
    }

    /// Timing waiting to be installed (equal to `timing` once confirmed)
    pub fn pending_timing(&self) -> &Arc<TimingModel> {
        &self.new_timing
    }

    /// True when the song came with real timing data
    pub fn has_timing(&self) -> bool {
        self.has_timing
    }

    pub fn is_timing_delayed(&self) -> bool {
        self.timing_delayed
    }

    pub fn phase(&self) -> SlotPhase {
        match (&self.sound, self.timing_delayed) {
            (None, _) => SlotPhase::Idle,
            (Some(_), true) => SlotPhase::Starting,
            (Some(_), false) => SlotPhase::Playing,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.sound.as_ref().map(|s| s.is_playing()).unwrap_or(false)
    }

    pub fn position(&self) -> Option<SoundPosition> {
        self.sound.as_ref().map(|s| s.position())
    }

    /// File of the loaded sound
    pub fn music_path(&self) -> Option<&Path> {
        self.sound.as_ref().map(|s| s.path())
    }

    /// Install the pending timing; true only on the first call after a start
    pub fn confirm_timing(&mut self) -> bool {
        if !self.timing_delayed {
            return false;
        }
        self.timing = Arc::clone(&self.new_timing);
        self.timing_delayed = false;
        true
    }

    /// Stop the sound and detach it from the slot
    ///
    /// The handle is returned so the caller can drop it outside the lock.
    pub fn unload(&mut self) -> Option<Box<dyn SoundHandle>> {
        let mut sound = self.sound.take()?;
        sound.stop();
        Some(sound)
    }
}
