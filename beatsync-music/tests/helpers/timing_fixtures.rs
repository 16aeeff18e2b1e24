//! In-memory timing files

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use beatsync_common::simfile::TimingLoader;
use beatsync_common::timing::TimingModel;
use beatsync_common::{Error, Result};

enum Entry {
    Timing(TimingModel),
    Broken,
}

/// Timing loader backed by a map; unknown paths are not found
#[derive(Default)]
pub struct MapTimingLoader {
    entries: HashMap<PathBuf, Entry>,
}

impl MapTimingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<PathBuf>, timing: TimingModel) -> Self {
        self.entries.insert(path.into(), Entry::Timing(timing));
        self
    }

    /// A timing file that exists but cannot be parsed
    pub fn with_broken(mut self, path: impl Into<PathBuf>) -> Self {
        self.entries.insert(path.into(), Entry::Broken);
        self
    }
}

impl TimingLoader for MapTimingLoader {
    fn load_timing(&self, path: &Path) -> Result<TimingModel> {
        match self.entries.get(path) {
            Some(Entry::Timing(timing)) => Ok(timing.clone()),
            Some(Entry::Broken) => Err(Error::TimingParse {
                path: path.display().to_string(),
                message: "#BPMS value 'fast': invalid float literal".to_string(),
            }),
            None => Err(Error::NotFound(path.display().to_string())),
        }
    }
}
