//! Sound system seam
//!
//! The synchronization engine never decodes or mixes audio. It loads sounds
//! through a [`SoundDriver`], starts them at an instant, and reads back their
//! playback position. Real output backends and the silent [`NullSoundDriver`]
//! implement the same traits.

mod null;

use std::path::Path;
use std::time::Instant;

use crate::error::Result;

pub use null::{NullSound, NullSoundDriver};

/// How a loaded sound should play
#[derive(Debug, Clone, PartialEq)]
pub struct SoundParams {
    /// Loop the played region instead of stopping at its end
    pub looping: bool,
    /// Position in the file where playback begins
    pub start_seconds: f64,
    /// Length of the played region; `None` plays to the end of the file
    pub length_seconds: Option<f64>,
    /// Fade-out applied at the end of the region
    pub fade_seconds: f64,
}

impl Default for SoundParams {
    fn default() -> Self {
        Self {
            looping: false,
            start_seconds: 0.0,
            length_seconds: None,
            fade_seconds: 0.0,
        }
    }
}

/// Playback position reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundPosition {
    /// Position in the file, in seconds
    pub seconds: f64,
    /// True until the backend confirms the sound is actually audible.
    /// The value of `seconds` is only an estimate meanwhile.
    pub approximate: bool,
}

/// Loads sounds for playback
pub trait SoundDriver: Send + Sync {
    /// Open `path` for playback with `params`
    ///
    /// May block on file I/O. Never called with the engine's lock held.
    fn load(&self, path: &Path, params: &SoundParams) -> Result<Box<dyn SoundHandle>>;

    /// Minimum time between asking a sound to start and hearing it, in seconds
    fn min_start_latency(&self) -> f64;
}

/// One loaded sound
pub trait SoundHandle: Send {
    /// Begin playback at `when` (as soon as possible if `None`)
    ///
    /// Called with the engine's lock held. Must only command the start and
    /// return, never block on I/O.
    fn start_at(&mut self, when: Option<Instant>);

    /// Stop playback; a stopped sound never plays again
    fn stop(&mut self);

    /// True from `start_at` until stopped or finished
    fn is_playing(&self) -> bool;

    fn position(&self) -> SoundPosition;

    /// File this sound was loaded from
    fn path(&self) -> &Path;
}
