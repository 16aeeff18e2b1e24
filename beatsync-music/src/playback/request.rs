//! Music start requests
//!
//! A request is created on the caller thread and consumed exactly once by the
//! music start thread. The mailbox holds at most one request: a newer submit
//! replaces an older one that was never taken, since only the latest player
//! intent matters and starting audio is expensive.

use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

/// Extension of the timing file looked up next to a music file
pub const TIMING_FILE_EXTENSION: &str = "sm";

/// Caller-facing options for [`MusicSync::play_music`](crate::MusicSync::play_music)
#[derive(Debug, Clone, PartialEq)]
pub struct PlayMusicOptions {
    /// Timing file to use instead of `<music file>.sm`
    pub timing_file: Option<PathBuf>,
    /// Loop the played region
    pub force_loop: bool,
    /// Position in the file where playback begins
    pub start_seconds: f64,
    /// Length of the played region; `None` plays to the end
    pub length_seconds: Option<f64>,
    /// Fade-out length at the end of the region
    pub fade_seconds: f64,
}

impl Default for PlayMusicOptions {
    fn default() -> Self {
        Self {
            timing_file: None,
            force_loop: false,
            start_seconds: 0.0,
            length_seconds: None,
            fade_seconds: 0.0,
        }
    }
}

/// A resolved music start request
#[derive(Debug, Clone, PartialEq)]
pub struct StartRequest {
    /// Identifies this request in logs and events
    pub id: Uuid,
    pub file: PathBuf,
    /// Timing file to try (explicit, or derived from `file`)
    pub timing_file: PathBuf,
    pub force_loop: bool,
    pub start_seconds: f64,
    pub length_seconds: Option<f64>,
    pub fade_seconds: f64,
}

impl StartRequest {
    /// Build a request, deriving the timing file path when none is given
    ///
    /// ```rust
    /// use beatsync_music::playback::{PlayMusicOptions, StartRequest};
    /// use std::path::Path;
    ///
    /// let request = StartRequest::new("songs/a/music.ogg", PlayMusicOptions::default());
    /// assert_eq!(request.timing_file, Path::new("songs/a/music.sm"));
    /// ```
    pub fn new(file: impl AsRef<Path>, options: PlayMusicOptions) -> Self {
        let file = file.as_ref().to_path_buf();
        let timing_file = options
            .timing_file
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| file.with_extension(TIMING_FILE_EXTENSION));

        Self {
            id: Uuid::new_v4(),
            file,
            timing_file,
            force_loop: options.force_loop,
            start_seconds: options.start_seconds,
            length_seconds: options.length_seconds,
            fade_seconds: options.fade_seconds,
        }
    }
}

/// Single-slot mailbox for the next music start
///
/// Not synchronized by itself: it lives inside the engine's shared mutex,
/// which makes `submit` and `take_if_present` atomic with respect to each
/// other.
///
/// The queue also remembers the id of the latest submitted request after it
/// is taken. A request that is no longer the latest (superseded or
/// cancelled while it was loading) must not start audio.
#[derive(Debug, Default)]
pub struct StartRequestQueue {
    pending: Option<StartRequest>,
    latest: Option<Uuid>,
    superseded: u64,
}

impl StartRequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `request`, dropping any request not yet taken
    pub fn submit(&mut self, request: StartRequest) {
        self.latest = Some(request.id);
        if let Some(old) = self.pending.replace(request) {
            self.superseded += 1;
            debug!(
                "Start request {} ({}) superseded before it was started",
                old.id,
                old.file.display()
            );
        }
    }

    /// Remove and return the pending request, if any
    pub fn take_if_present(&mut self) -> Option<StartRequest> {
        self.pending.take()
    }

    /// Drop the pending request and forget the latest one
    pub fn cancel(&mut self) -> Option<StartRequest> {
        self.latest = None;
        self.pending.take()
    }

    /// True if `id` is the most recent request and was not cancelled
    pub fn is_latest(&self, id: Uuid) -> bool {
        self.latest == Some(id)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }

    /// Number of requests dropped because a newer one arrived first
    pub fn superseded_count(&self) -> u64 {
        self.superseded
    }
}
