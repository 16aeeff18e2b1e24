//! Silent wall-clock sound driver
//!
//! Plays nothing, but keeps time exactly like a real device would: a started
//! sound reports an approximate position until its start latency has passed,
//! then reports the wall-clock position within the played region. Used by
//! the demo binary and for headless runs.
//!
//! WAV files are probed with `hound` to learn their length; other files are
//! treated as endless unless the caller gives an explicit length.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use super::{SoundDriver, SoundHandle, SoundParams, SoundPosition};
use crate::error::{Error, Result};

/// Start latency reported when none is configured (20ms)
pub const DEFAULT_START_LATENCY: f64 = 0.020;

/// Silent driver; see module docs
#[derive(Debug, Clone)]
pub struct NullSoundDriver {
    start_latency: f64,
}

impl NullSoundDriver {
    /// Driver whose sounds become audible `start_latency` seconds after they
    /// are asked to start
    pub fn new(start_latency: f64) -> Self {
        let start_latency = if start_latency.is_finite() && start_latency >= 0.0 {
            start_latency
        } else {
            DEFAULT_START_LATENCY
        };
        Self { start_latency }
    }
}

impl Default for NullSoundDriver {
    fn default() -> Self {
        Self::new(DEFAULT_START_LATENCY)
    }
}

/// Length of a WAV file in seconds
fn probe_wav_length(path: &Path) -> Result<f64> {
    let reader = hound::WavReader::open(path).map_err(|e| Error::sound_load(path, e))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(Error::sound_load(path, "sample rate is 0"));
    }
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

impl SoundDriver for NullSoundDriver {
    fn load(&self, path: &Path, params: &SoundParams) -> Result<Box<dyn SoundHandle>> {
        if !path.is_file() {
            return Err(Error::sound_load(path, "no such file"));
        }
        if !params.start_seconds.is_finite() || params.start_seconds < 0.0 {
            return Err(Error::sound_load(
                path,
                format!("bad start position {}", params.start_seconds),
            ));
        }

        let stream_length = if is_wav(path) {
            Some(probe_wav_length(path)?)
        } else {
            None
        };

        debug!(
            "Null driver loaded {} (stream length {:?}, {:?})",
            path.display(),
            stream_length,
            params
        );

        Ok(Box::new(NullSound {
            path: path.to_path_buf(),
            params: params.clone(),
            stream_length,
            start_latency: Duration::from_secs_f64(self.start_latency),
            audible_at: None,
            stopped: false,
        }))
    }

    fn min_start_latency(&self) -> f64 {
        self.start_latency
    }
}

/// Sound handle produced by [`NullSoundDriver`]
#[derive(Debug)]
pub struct NullSound {
    path: PathBuf,
    params: SoundParams,
    /// Length of the whole file, if known
    stream_length: Option<f64>,
    start_latency: Duration,
    /// Instant the sound becomes audible; None until started
    audible_at: Option<Instant>,
    stopped: bool,
}

impl NullSound {
    /// End of the played region in file seconds, if bounded
    fn region_end(&self) -> Option<f64> {
        match (self.params.length_seconds, self.stream_length) {
            (Some(length), Some(stream)) => Some((self.params.start_seconds + length).min(stream)),
            (Some(length), None) => Some(self.params.start_seconds + length),
            (None, stream) => stream,
        }
    }

    /// Seconds of audio played since becoming audible (0 before)
    fn played_seconds(&self, now: Instant) -> Option<f64> {
        let audible_at = self.audible_at?;
        Some(now.saturating_duration_since(audible_at).as_secs_f64())
    }

    fn finished(&self, now: Instant) -> bool {
        if self.params.looping {
            return false;
        }
        match (self.played_seconds(now), self.region_end()) {
            (Some(played), Some(end)) => self.params.start_seconds + played >= end,
            _ => false,
        }
    }
}

impl SoundHandle for NullSound {
    fn start_at(&mut self, when: Option<Instant>) {
        let earliest = Instant::now() + self.start_latency;
        let audible_at = match when {
            Some(when) if when > earliest => when,
            _ => earliest,
        };
        self.audible_at = Some(audible_at);
        self.stopped = false;
    }

    fn stop(&mut self) {
        self.stopped = true;
    }

    fn is_playing(&self) -> bool {
        self.audible_at.is_some() && !self.stopped && !self.finished(Instant::now())
    }

    fn position(&self) -> SoundPosition {
        let now = Instant::now();
        let start = self.params.start_seconds;

        let played = match self.audible_at {
            Some(audible_at) if now >= audible_at => now.duration_since(audible_at).as_secs_f64(),
            _ => {
                return SoundPosition {
                    seconds: start,
                    approximate: true,
                }
            }
        };

        let seconds = match self.region_end() {
            Some(end) if self.params.looping && end > start => start + played % (end - start),
            Some(end) => (start + played).min(end),
            None => start + played,
        };

        SoundPosition {
            seconds,
            approximate: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
