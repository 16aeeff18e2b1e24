//! Simfile timing reader
//!
//! Reads the timing tags of a `.sm` simfile and builds a [`TimingModel`].
//! Only `#OFFSET`, `#BPMS` and `#STOPS` (plus its older spelling `#FREEZES`)
//! are interpreted; every other tag is skipped.
//!
//! # File Format
//!
//! ```text
//! // comment until end of line
//! #TITLE:Some Song;
//! #OFFSET:-0.012;
//! #BPMS:0.000=120.000,
//! 16.000=180.000;
//! #STOPS:8.000=1.000;
//! ```
//!
//! A tag runs from `#` to the next `;`. A missing `;` is tolerated when the
//! next tag starts on a new line.

use std::path::Path;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::timing::{BpmSegment, StopSegment, TimingModel};

/// Source of timing data for a music file
///
/// Implementations must report a missing resource as an error for which
/// [`Error::is_not_found`] is true, so callers can tell "no timing file" from
/// "broken timing file".
pub trait TimingLoader: Send + Sync {
    fn load_timing(&self, path: &Path) -> Result<TimingModel>;
}

/// Loads timing from `.sm` simfiles on disk
#[derive(Debug, Clone, Copy, Default)]
pub struct SimfileTimingLoader;

impl TimingLoader for SimfileTimingLoader {
    fn load_timing(&self, path: &Path) -> Result<TimingModel> {
        if !path.is_file() {
            return Err(Error::NotFound(path.display().to_string()));
        }

        trace!("Found timing file '{}'", path.display());
        let content = std::fs::read_to_string(path)?;
        parse_simfile_timing(&content, &path.display().to_string())
    }
}

/// One `#TAG:value;` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsdTag {
    /// Tag name, upper-cased
    pub name: String,
    /// Raw value with surrounding whitespace trimmed
    pub value: String,
}

/// Split simfile text into tags
///
/// ```rust
/// use beatsync_common::simfile::split_tags;
///
/// let tags = split_tags("#offset:0.5;\n#BPMS:0=120; // tempo");
/// assert_eq!(tags[0].name, "OFFSET");
/// assert_eq!(tags[1].value, "0=120");
/// ```
pub fn split_tags(content: &str) -> Vec<MsdTag> {
    let stripped = strip_comments(content);
    let mut tags = Vec::new();
    let mut rest = stripped.as_str();

    while let Some(hash) = rest.find('#') {
        rest = &rest[hash + 1..];

        let end = tag_end(rest);
        let body = &rest[..end];
        rest = if end < rest.len() && rest.as_bytes()[end] == b';' {
            &rest[end + 1..]
        } else {
            &rest[end..]
        };

        let (name, value) = match body.split_once(':') {
            Some((name, value)) => (name, value),
            None => (body, ""),
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }

        tags.push(MsdTag {
            name: name.to_ascii_uppercase(),
            value: value.trim().to_string(),
        });
    }

    tags
}

/// Byte index where the current tag body ends: the next `;`, or a `#` that
/// begins a line (missing semicolon), or end of input
fn tag_end(rest: &str) -> usize {
    let bytes = rest.as_bytes();
    let mut at_line_start = false;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b';' => return i,
            b'#' if at_line_start => return i,
            b'\n' => at_line_start = true,
            b' ' | b'\t' | b'\r' => {}
            _ => at_line_start = false,
        }
    }
    bytes.len()
}

fn strip_comments(content: &str) -> String {
    content
        .lines()
        .map(|line| match line.find("//") {
            Some(pos) => &line[..pos],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse a `beat=value,beat=value` list
fn parse_pairs(tag: &str, value: &str, source: &str) -> Result<Vec<(f64, f64)>> {
    let mut pairs = Vec::new();
    for entry in value.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (beat, amount) = entry.split_once('=').ok_or_else(|| Error::TimingParse {
            path: source.to_string(),
            message: format!("#{} entry '{}' is not beat=value", tag, entry),
        })?;
        let beat = parse_number(tag, beat, source)?;
        let amount = parse_number(tag, amount, source)?;
        pairs.push((beat, amount));
    }
    Ok(pairs)
}

fn parse_number(tag: &str, text: &str, source: &str) -> Result<f64> {
    text.trim().parse::<f64>().map_err(|e| Error::TimingParse {
        path: source.to_string(),
        message: format!("#{} value '{}': {}", tag, text.trim(), e),
    })
}

/// Build a timing model from simfile text
///
/// `source` names the file in error messages.
///
/// # Errors
///
/// - [`Error::TimingParse`] for unparseable numbers or entries
/// - [`Error::InvalidTiming`] when the file has no usable `#BPMS` or the values
///   fail [`TimingModel::new`] validation
///
/// # Examples
///
/// ```rust
/// use beatsync_common::simfile::parse_simfile_timing;
///
/// let timing = parse_simfile_timing("#OFFSET:0.25;\n#BPMS:0=150;", "song.sm").unwrap();
/// assert_eq!(timing.beat0_offset_seconds(), 0.25);
/// assert_eq!(timing.bpm_at_beat(0.0), 150.0);
/// ```
pub fn parse_simfile_timing(content: &str, source: &str) -> Result<TimingModel> {
    let mut offset = 0.0;
    let mut bpms = Vec::new();
    let mut stops = Vec::new();

    for tag in split_tags(content) {
        match tag.name.as_str() {
            "OFFSET" => {
                if !tag.value.is_empty() {
                    offset = parse_number("OFFSET", &tag.value, source)?;
                }
            }
            "BPMS" => {
                bpms = parse_pairs("BPMS", &tag.value, source)?
                    .into_iter()
                    .map(|(beat, bpm)| BpmSegment::new(beat, bpm))
                    .collect();
            }
            "STOPS" | "FREEZES" => {
                stops = parse_pairs(&tag.name, &tag.value, source)?
                    .into_iter()
                    .map(|(beat, seconds)| StopSegment::new(beat, seconds))
                    .collect();
            }
            _ => {}
        }
    }

    debug!(
        "Parsed timing from {}: offset={}, {} BPM segment(s), {} stop(s)",
        source,
        offset,
        bpms.len(),
        stops.len()
    );

    TimingModel::new(offset, bpms, stops)
        .map_err(|e| Error::InvalidTiming(format!("{}: {}", source, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_tags_handles_multiline_values() {
        let tags = split_tags("#BPMS:0.000=120.000,\n16.000=180.000;\n#STOPS:;");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].value, "0.000=120.000,\n16.000=180.000");
        assert_eq!(tags[1].name, "STOPS");
        assert_eq!(tags[1].value, "");
    }

    #[test]
    fn test_split_tags_recovers_missing_semicolon() {
        let tags = split_tags("#TITLE:No Terminator\n#OFFSET:0.1;");
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].value, "No Terminator");
        assert_eq!(tags[1].name, "OFFSET");
    }

    #[test]
    fn test_split_tags_strips_comments() {
        let tags = split_tags("// #OFFSET:9;\n#OFFSET:0.5; // trailing");
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].value, "0.5");
    }

    #[test]
    fn test_parse_full_timing() {
        let text = "#TITLE:Test;\n#OFFSET:-0.012;\n#BPMS:0.000=120.000,16.000=180.000;\n#STOPS:8.000=1.000;\n#NOTES:dance-single:::::\n0000\n;";
        let timing = parse_simfile_timing(text, "test.sm").unwrap();

        assert_eq!(timing.beat0_offset_seconds(), -0.012);
        assert_eq!(timing.bpm_segments().len(), 2);
        assert_eq!(timing.bpm_segments()[1], BpmSegment::new(16.0, 180.0));
        assert_eq!(timing.stop_segments(), &[StopSegment::new(8.0, 1.0)]);
    }

    #[test]
    fn test_freezes_alias() {
        let timing = parse_simfile_timing("#BPMS:0=100;#FREEZES:4=0.5;", "old.sm").unwrap();
        assert_eq!(timing.stop_segments(), &[StopSegment::new(4.0, 0.5)]);
    }

    #[test]
    fn test_missing_bpms_is_invalid() {
        let err = parse_simfile_timing("#OFFSET:0;", "nobpm.sm").unwrap_err();
        assert!(matches!(err, Error::InvalidTiming(_)));
    }

    #[test]
    fn test_garbage_number_is_parse_error() {
        let err = parse_simfile_timing("#BPMS:0=fast;", "bad.sm").unwrap_err();
        assert!(matches!(err, Error::TimingParse { .. }));

        let err = parse_simfile_timing("#BPMS:0=120;#OFFSET:soon;", "bad.sm").unwrap_err();
        assert!(matches!(err, Error::TimingParse { .. }));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = SimfileTimingLoader
            .load_timing(Path::new("/nonexistent/beatsync/song.sm"))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
