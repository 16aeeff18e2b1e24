//! Test helpers for beatsync-music integration tests
//!
//! - ScriptedDriver: sound driver whose sounds report whatever position the
//!   test sets, with an optional gate that holds loads
//! - MapTimingLoader: in-memory timing files
//! - wait_until: bounded polling for threaded tests

#![allow(dead_code)]

pub mod scripted_sound;
pub mod timing_fixtures;

use std::time::{Duration, Instant};

pub use scripted_sound::{LoadRecord, ScriptedDriver};
pub use timing_fixtures::MapTimingLoader;

/// Poll `condition` every millisecond until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}
