//! Beat timing model
//!
//! Maps elapsed song seconds to musical beats and back, using piecewise
//! constant BPM segments, optional stop (freeze) segments and a beat-zero
//! offset.
//!
//! # Offset Convention
//!
//! Conversions first add `beat0_offset_seconds` to the elapsed time, so a
//! model with offset `0.5` is already half a second into the song at elapsed
//! time zero. Simfile `#OFFSET` values use the same sign.
//!
//! # Immutability
//!
//! A `TimingModel` is never edited once it governs a playing song. Code that
//! needs a different model builds a new one (see [`TimingModel::with_beat0_offset`])
//! and installs it wholesale, so a reader can never observe half an update.
//!
//! # Examples
//!
//! ```rust
//! use beatsync_common::timing::TimingModel;
//!
//! let timing = TimingModel::default(); // constant 120 BPM
//! assert_eq!(timing.beat_from_elapsed(2.0), 4.0);
//! assert_eq!(timing.elapsed_from_beat(4.0), 2.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Tempo used when no timing data is available
pub const DEFAULT_BPM: f64 = 120.0;

// ============================================================================
// Segment Types
// ============================================================================

/// Tempo change point: from `start_beat` onward the song runs at `bpm`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BpmSegment {
    /// Beat at which this tempo takes effect
    pub start_beat: f64,
    /// Beats per minute
    pub bpm: f64,
}

impl BpmSegment {
    pub fn new(start_beat: f64, bpm: f64) -> Self {
        Self { start_beat, bpm }
    }

    /// Tempo in beats per second
    pub fn beats_per_second(&self) -> f64 {
        self.bpm / 60.0
    }
}

/// Stop (freeze): the beat holds at `start_beat` for `stop_seconds`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopSegment {
    /// Beat at which the song pauses
    pub start_beat: f64,
    /// Length of the pause in seconds
    pub stop_seconds: f64,
}

impl StopSegment {
    pub fn new(start_beat: f64, stop_seconds: f64) -> Self {
        Self {
            start_beat,
            stop_seconds,
        }
    }
}

/// Result of an elapsed-time lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatInfo {
    /// Beat position
    pub beat: f64,
    /// Tempo of the segment containing the position
    pub beats_per_second: f64,
    /// True while the position lies inside a stop
    pub freeze: bool,
}

// ============================================================================
// TimingModel
// ============================================================================

/// Piecewise tempo map with beat-zero offset
///
/// Segments are kept sorted by start beat. Construct through [`TimingModel::new`]
/// (validated) or [`TimingModel::constant`].
///
/// Deserialization goes through the same validation as [`TimingModel::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTimingModel")]
pub struct TimingModel {
    bpm_segments: Vec<BpmSegment>,
    stop_segments: Vec<StopSegment>,
    beat0_offset_seconds: f64,
}

/// Unvalidated wire form of [`TimingModel`]
#[derive(Deserialize)]
struct RawTimingModel {
    bpm_segments: Vec<BpmSegment>,
    #[serde(default)]
    stop_segments: Vec<StopSegment>,
    #[serde(default)]
    beat0_offset_seconds: f64,
}

impl TryFrom<RawTimingModel> for TimingModel {
    type Error = Error;

    fn try_from(raw: RawTimingModel) -> Result<Self> {
        TimingModel::new(raw.beat0_offset_seconds, raw.bpm_segments, raw.stop_segments)
    }
}

impl TimingModel {
    /// Build a validated timing model
    ///
    /// Segments may be given in any order; they are sorted by start beat.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTiming`] when there is no BPM segment, a BPM is
    /// not finite and positive, a stop length is negative, or any value is NaN
    /// or infinite.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use beatsync_common::timing::{BpmSegment, StopSegment, TimingModel};
    ///
    /// let timing = TimingModel::new(
    ///     0.0,
    ///     vec![BpmSegment::new(16.0, 60.0), BpmSegment::new(0.0, 120.0)],
    ///     vec![StopSegment::new(8.0, 1.0)],
    /// )
    /// .unwrap();
    /// assert_eq!(timing.bpm_segments()[0].start_beat, 0.0);
    ///
    /// assert!(TimingModel::new(0.0, vec![], vec![]).is_err());
    /// ```
    pub fn new(
        beat0_offset_seconds: f64,
        mut bpm_segments: Vec<BpmSegment>,
        mut stop_segments: Vec<StopSegment>,
    ) -> Result<Self> {
        if !beat0_offset_seconds.is_finite() {
            return Err(Error::InvalidTiming(format!(
                "beat 0 offset must be finite, got {}",
                beat0_offset_seconds
            )));
        }
        if bpm_segments.is_empty() {
            return Err(Error::InvalidTiming("no BPM segments".to_string()));
        }
        for seg in &bpm_segments {
            if !seg.start_beat.is_finite() || !seg.bpm.is_finite() || seg.bpm <= 0.0 {
                return Err(Error::InvalidTiming(format!(
                    "bad BPM segment {}={}",
                    seg.start_beat, seg.bpm
                )));
            }
        }
        for stop in &stop_segments {
            if !stop.start_beat.is_finite()
                || !stop.stop_seconds.is_finite()
                || stop.stop_seconds < 0.0
            {
                return Err(Error::InvalidTiming(format!(
                    "bad stop segment {}={}",
                    stop.start_beat, stop.stop_seconds
                )));
            }
        }

        // Finite values were checked above, so total_cmp gives the numeric order
        bpm_segments.sort_by(|a, b| a.start_beat.total_cmp(&b.start_beat));
        stop_segments.sort_by(|a, b| a.start_beat.total_cmp(&b.start_beat));

        Ok(Self {
            bpm_segments,
            stop_segments,
            beat0_offset_seconds,
        })
    }

    /// Constant-tempo model starting at beat 0 with no offset
    ///
    /// `bpm` must be positive; non-positive or non-finite values fall back to
    /// [`DEFAULT_BPM`].
    pub fn constant(bpm: f64) -> Self {
        let bpm = if bpm.is_finite() && bpm > 0.0 {
            bpm
        } else {
            DEFAULT_BPM
        };
        Self {
            bpm_segments: vec![BpmSegment::new(0.0, bpm)],
            stop_segments: Vec::new(),
            beat0_offset_seconds: 0.0,
        }
    }

    /// Copy of this model with a different beat-zero offset
    pub fn with_beat0_offset(&self, beat0_offset_seconds: f64) -> Self {
        Self {
            bpm_segments: self.bpm_segments.clone(),
            stop_segments: self.stop_segments.clone(),
            beat0_offset_seconds,
        }
    }

    pub fn bpm_segments(&self) -> &[BpmSegment] {
        &self.bpm_segments
    }

    pub fn stop_segments(&self) -> &[StopSegment] {
        &self.stop_segments
    }

    pub fn beat0_offset_seconds(&self) -> f64 {
        self.beat0_offset_seconds
    }

    /// Tempo in effect at `beat`
    pub fn bpm_at_beat(&self, beat: f64) -> f64 {
        self.bpm_segments
            .iter()
            .rev()
            .find(|seg| seg.start_beat <= beat)
            .unwrap_or(&self.bpm_segments[0])
            .bpm
    }

    /// Beat, tempo and freeze state at `elapsed_seconds`
    ///
    /// Walks the BPM segments in order, consuming elapsed time segment by
    /// segment. Stops inside a segment consume time without advancing the beat;
    /// a position that lands inside a stop reports the stop's beat with
    /// `freeze = true`.
    pub fn beat_info_from_elapsed(&self, elapsed_seconds: f64) -> BeatInfo {
        let mut elapsed = elapsed_seconds + self.beat0_offset_seconds;
        let count = self.bpm_segments.len();

        for (i, seg) in self.bpm_segments.iter().enumerate() {
            let is_first = i == 0;
            let is_last = i + 1 == count;
            let next_start = if is_last {
                f64::INFINITY
            } else {
                self.bpm_segments[i + 1].start_beat
            };
            let bps = seg.beats_per_second();

            for stop in &self.stop_segments {
                if !is_first && seg.start_beat >= stop.start_beat {
                    continue;
                }
                if !is_last && stop.start_beat > next_start {
                    continue;
                }

                // Stop lies within this segment
                let freeze_start = (stop.start_beat - seg.start_beat) / bps;
                if freeze_start >= elapsed {
                    break;
                }

                elapsed -= stop.stop_seconds;

                if freeze_start >= elapsed {
                    return BeatInfo {
                        beat: stop.start_beat,
                        beats_per_second: bps,
                        freeze: true,
                    };
                }
            }

            let seconds_in_segment = (next_start - seg.start_beat) / bps;
            if is_last || elapsed <= seconds_in_segment {
                return BeatInfo {
                    beat: seg.start_beat + elapsed * bps,
                    beats_per_second: bps,
                    freeze: false,
                };
            }

            elapsed -= seconds_in_segment;
        }

        // Unreachable for a validated model: the last segment always returns
        BeatInfo {
            beat: 0.0,
            beats_per_second: DEFAULT_BPM / 60.0,
            freeze: false,
        }
    }

    /// Beat at `elapsed_seconds`
    pub fn beat_from_elapsed(&self, elapsed_seconds: f64) -> f64 {
        self.beat_info_from_elapsed(elapsed_seconds).beat
    }

    /// Elapsed seconds at which `beat` is reached
    ///
    /// A beat that coincides with a stop maps to the moment the stop begins;
    /// beats after a stop include its full length.
    pub fn elapsed_from_beat(&self, beat: f64) -> f64 {
        let mut elapsed = -self.beat0_offset_seconds;

        for stop in &self.stop_segments {
            if stop.start_beat >= beat {
                break;
            }
            elapsed += stop.stop_seconds;
        }

        let mut remaining = beat - self.bpm_segments[0].start_beat;
        let count = self.bpm_segments.len();

        for (i, seg) in self.bpm_segments.iter().enumerate() {
            let bps = seg.beats_per_second();

            if i + 1 == count {
                elapsed += remaining / bps;
            } else {
                let beats_in_segment = self.bpm_segments[i + 1].start_beat - seg.start_beat;
                elapsed += remaining.min(beats_in_segment) / bps;
                remaining -= beats_in_segment;
            }

            if remaining <= 0.0 {
                break;
            }
        }

        elapsed
    }
}

impl Default for TimingModel {
    /// Constant [`DEFAULT_BPM`], beat 0 at elapsed 0
    fn default() -> Self {
        Self::constant(DEFAULT_BPM)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Fractional part of a beat, always in `[0, 1)`
///
/// Negative beats wrap forward: `-0.25` has fraction `0.75`.
///
/// ```rust
/// use beatsync_common::timing::beat_fraction;
///
/// assert_eq!(beat_fraction(3.25), 0.25);
/// assert_eq!(beat_fraction(-0.25), 0.75);
/// ```
pub fn beat_fraction(beat: f64) -> f64 {
    let fraction = beat - beat.floor();
    // -1e-17 - floor(-1e-17) rounds up to exactly 1.0
    if fraction >= 1.0 {
        0.0
    } else {
        fraction
    }
}

// ============================================================================
// Tests Module
// ============================================================================

#[cfg(test)]
#[path = "timing_tests.rs"]
mod tests;
