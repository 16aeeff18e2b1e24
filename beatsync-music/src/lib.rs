//! # beatsync Music Synchronization Library (beatsync-music)
//!
//! Keeps a rhythm game's beat clock locked to background music.
//!
//! **Purpose:** Start music asynchronously on a dedicated thread, align each
//! new song to the beat phase of the one before it, and publish a
//! continuously moving `(seconds, beat)` pair every frame, hiding the sound
//! system's startup latency.
//!
//! **Architecture:** caller thread (`MusicSync::update`, `play_music`) and one
//! music start thread share a single mutex-guarded mailbox and playback slot.

pub mod config;
pub mod error;
pub mod playback;
pub mod sound;
pub mod state;

pub use config::SyncSettings;
pub use error::{Error, Result};
pub use playback::{MusicSync, PlayMusicOptions};
pub use state::{SongClock, SongPosition};
