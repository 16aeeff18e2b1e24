//! Shared song position state
//!
//! The song clock is the game-state output of the synchronization engine:
//! the current music seconds and song beat, read by note rendering and
//! judgment code, written once per frame by the reconciler.

use std::sync::Arc;
use std::time::Instant;

use beatsync_common::timing::TimingModel;
use parking_lot::RwLock;

/// Published song position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SongPosition {
    /// Seconds into the music
    pub music_seconds: f64,
    /// Beat at `music_seconds`
    pub song_beat: f64,
    /// Tempo at `music_seconds`
    pub beats_per_second: f64,
    /// True while the song is inside a stop
    pub freeze: bool,
    /// When this position was published
    pub last_update: Instant,
}

/// Shared song clock accessible by all components
///
/// Cloning is cheap; clones share the same position. Uses RwLock for
/// concurrent reads with one writer per frame.
#[derive(Debug, Clone)]
pub struct SongClock {
    position: Arc<RwLock<SongPosition>>,
}

impl SongClock {
    /// Clock at second 0, beat 0, default tempo
    pub fn new() -> Self {
        let timing = TimingModel::default();
        let info = timing.beat_info_from_elapsed(0.0);
        Self {
            position: Arc::new(RwLock::new(SongPosition {
                music_seconds: 0.0,
                song_beat: info.beat,
                beats_per_second: info.beats_per_second,
                freeze: info.freeze,
                last_update: Instant::now(),
            })),
        }
    }

    /// Copy of the current position
    pub fn snapshot(&self) -> SongPosition {
        *self.position.read()
    }

    pub fn music_seconds(&self) -> f64 {
        self.position.read().music_seconds
    }

    pub fn song_beat(&self) -> f64 {
        self.position.read().song_beat
    }

    /// Publish a new position, deriving the beat through `timing`
    pub fn update_song_position(&self, music_seconds: f64, timing: &TimingModel) {
        let info = timing.beat_info_from_elapsed(music_seconds);
        *self.position.write() = SongPosition {
            music_seconds,
            song_beat: info.beat,
            beats_per_second: info.beats_per_second,
            freeze: info.freeze,
            last_update: Instant::now(),
        };
    }
}

impl Default for SongClock {
    fn default() -> Self {
        Self::new()
    }
}
