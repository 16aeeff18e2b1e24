//! Scripted sound driver
//!
//! Every load is recorded. A loaded sound starts out approximate at its
//! start position and only becomes exact when the test says so, which makes
//! the approximate-to-exact transition deterministic. Loads and starts can
//! each be held at a gate to widen race windows.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use beatsync_music::sound::{SoundDriver, SoundHandle, SoundParams, SoundPosition};
use beatsync_music::{Error, Result};
use parking_lot::{Condvar, Mutex};

/// Observable state of one scripted sound
#[derive(Debug, Clone)]
struct SoundScript {
    started: bool,
    start_at: Option<Instant>,
    stopped: bool,
    seconds: f64,
    approximate: bool,
}

/// One `load` call and the controls of the sound it returned
#[derive(Debug)]
pub struct LoadRecord {
    pub path: PathBuf,
    pub params: SoundParams,
    script: Mutex<SoundScript>,
}

impl LoadRecord {
    pub fn is_started(&self) -> bool {
        self.script.lock().started
    }

    pub fn is_stopped(&self) -> bool {
        self.script.lock().stopped
    }

    /// Instant passed to `start_at` (None: immediate, or never started)
    pub fn start_at(&self) -> Option<Instant> {
        self.script.lock().start_at
    }

    /// Make the sound report an exact position
    pub fn set_exact(&self, seconds: f64) {
        let mut script = self.script.lock();
        script.seconds = seconds;
        script.approximate = false;
    }

    pub fn set_approximate(&self, seconds: f64) {
        let mut script = self.script.lock();
        script.seconds = seconds;
        script.approximate = true;
    }
}

struct ScriptedSound {
    record: Arc<LoadRecord>,
    start_gate: Arc<Gate>,
}

impl SoundHandle for ScriptedSound {
    fn start_at(&mut self, when: Option<Instant>) {
        self.start_gate.pass();
        let mut script = self.record.script.lock();
        script.started = true;
        script.start_at = when;
    }

    fn stop(&mut self) {
        self.record.script.lock().stopped = true;
    }

    fn is_playing(&self) -> bool {
        let script = self.record.script.lock();
        script.started && !script.stopped
    }

    fn position(&self) -> SoundPosition {
        let script = self.record.script.lock();
        SoundPosition {
            seconds: script.seconds,
            approximate: script.approximate,
        }
    }

    fn path(&self) -> &Path {
        &self.record.path
    }
}

#[derive(Default)]
struct GateState {
    closed: bool,
    waiting: usize,
}

/// Blocks callers of `pass` while closed
#[derive(Default)]
struct Gate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl Gate {
    fn close(&self) {
        self.state.lock().closed = true;
    }

    fn open(&self) {
        self.state.lock().closed = false;
        self.changed.notify_all();
    }

    fn waiting(&self) -> usize {
        self.state.lock().waiting
    }

    fn pass(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            return;
        }
        state.waiting += 1;
        while state.closed {
            self.changed.wait_for(&mut state, Duration::from_millis(50));
        }
        state.waiting -= 1;
    }
}

/// Sound driver for tests; see module docs
pub struct ScriptedDriver {
    latency: f64,
    loads: Mutex<Vec<Arc<LoadRecord>>>,
    failing: Mutex<HashSet<PathBuf>>,
    load_gate: Gate,
    start_gate: Arc<Gate>,
}

impl ScriptedDriver {
    pub fn new(latency: f64) -> Arc<Self> {
        Arc::new(Self {
            latency,
            loads: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            load_gate: Gate::default(),
            start_gate: Arc::new(Gate::default()),
        })
    }

    /// Make every load of `path` fail
    pub fn fail_on(&self, path: impl Into<PathBuf>) {
        self.failing.lock().insert(path.into());
    }

    /// Hold every load until [`open_gate`](Self::open_gate)
    pub fn close_gate(&self) {
        self.load_gate.close();
    }

    pub fn open_gate(&self) {
        self.load_gate.open();
    }

    /// Loads currently held at the gate
    pub fn waiting_at_gate(&self) -> usize {
        self.load_gate.waiting()
    }

    /// Hold every `start_at` call until [`release_starts`](Self::release_starts)
    pub fn hold_starts(&self) {
        self.start_gate.close();
    }

    pub fn release_starts(&self) {
        self.start_gate.open();
    }

    /// Sounds currently inside a held `start_at`
    pub fn waiting_at_start(&self) -> usize {
        self.start_gate.waiting()
    }

    pub fn loads(&self) -> Vec<Arc<LoadRecord>> {
        self.loads.lock().clone()
    }

    pub fn load_count(&self) -> usize {
        self.loads.lock().len()
    }

    /// Most recent load of `path`
    pub fn load_of(&self, path: impl AsRef<Path>) -> Option<Arc<LoadRecord>> {
        self.loads
            .lock()
            .iter()
            .rev()
            .find(|r| r.path == path.as_ref())
            .cloned()
    }

    pub fn last_load(&self) -> Option<Arc<LoadRecord>> {
        self.loads.lock().last().cloned()
    }
}

impl SoundDriver for ScriptedDriver {
    fn load(&self, path: &Path, params: &SoundParams) -> Result<Box<dyn SoundHandle>> {
        self.load_gate.pass();

        if self.failing.lock().contains(path) {
            return Err(Error::SoundLoad {
                path: path.to_path_buf(),
                message: "scripted failure".to_string(),
            });
        }

        let record = Arc::new(LoadRecord {
            path: path.to_path_buf(),
            params: params.clone(),
            script: Mutex::new(SoundScript {
                started: false,
                start_at: None,
                stopped: false,
                seconds: params.start_seconds,
                approximate: true,
            }),
        });
        self.loads.lock().push(Arc::clone(&record));

        Ok(Box::new(ScriptedSound {
            record,
            start_gate: Arc::clone(&self.start_gate),
        }))
    }

    fn min_start_latency(&self) -> f64 {
        self.latency
    }
}
