//! beatsync-music specific configuration

use std::time::Duration;

use beatsync_common::config::MusicConfig;

use crate::error::{Error, Result};

/// Runtime settings for the music synchronization engine
///
/// Built from the `[music]` section of the TOML config.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Longest the music start thread sleeps without checking the mailbox
    pub poll_interval: Duration,
    /// Seconds added to the driver's minimum start latency when aligning
    pub presumed_latency_nudge: f64,
    /// Start music on the background thread
    pub threaded_start: bool,
    /// Event bus buffer size
    pub event_capacity: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&MusicConfig::default())
    }
}

impl From<&MusicConfig> for SyncSettings {
    fn from(config: &MusicConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            presumed_latency_nudge: config.presumed_latency_nudge_seconds(),
            threaded_start: config.threaded_start,
            event_capacity: config.event_capacity,
        }
    }
}

impl SyncSettings {
    /// Settings for deterministic use: music starts inline on the caller
    pub fn unthreaded() -> Self {
        Self {
            threaded_start: false,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be non-zero".to_string()));
        }
        if !self.presumed_latency_nudge.is_finite() || self.presumed_latency_nudge < 0.0 {
            return Err(Error::Config(format!(
                "presumed latency nudge must be a non-negative number, got {}",
                self.presumed_latency_nudge
            )));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}
