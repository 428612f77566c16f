//! Testing utilities for the livepatch workspace
//!
//! Shared fixtures: on-disk source trees, a manual clock, a scripted watch
//! backend and helpers that load a base program.

#![allow(missing_docs)]

use livepatch_compile::{CompilationAdapter, CompiledModule};
use livepatch_runtime::Program;
use livepatch_watch::{Clock, EventSink, WatchBackend, WatchError};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Name given to the base module by [`load_base`]
pub const BASE_MODULE: &str = "app";

/// A temporary source tree
#[derive(Debug)]
pub struct TempProject {
    dir: TempDir,
}

impl TempProject {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write a file, creating parent directories
    pub fn write(&self, relative: &str, text: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, text).unwrap();
        path
    }

    pub fn remove(&self, relative: &str) {
        std::fs::remove_file(self.path(relative)).unwrap();
    }
}

impl Default for TempProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Compile `files` into a fresh program as the on-disk base module
pub fn load_base(project: &TempProject, files: &[PathBuf]) -> Arc<Program> {
    let program = Arc::new(Program::new());
    let base = load_base_into(&program, project, files);
    assert!(base.success(), "base failed to compile: {:?}", base.diagnostics());
    program
}

pub fn load_base_into(program: &Arc<Program>, project: &TempProject, files: &[PathBuf]) -> CompiledModule {
    CompilationAdapter::new(Arc::clone(program)).compile_base(BASE_MODULE, project.root(), files)
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn now_instant(&self) -> Instant {
        *self.now.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now_instant()
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    sink: Option<EventSink>,
    arms: usize,
    fail_arms: usize,
}

/// Watch backend driven by a [`ScriptControl`]
#[derive(Debug)]
pub struct ScriptedBackend {
    state: Arc<Mutex<ScriptState>>,
}

/// Test-side handle for a [`ScriptedBackend`]
#[derive(Debug, Clone)]
pub struct ScriptControl {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedBackend {
    pub fn new() -> (Self, ScriptControl) {
        let state = Arc::new(Mutex::new(ScriptState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            ScriptControl { state },
        )
    }
}

impl WatchBackend for ScriptedBackend {
    fn arm(&mut self, _root: &Path, sink: EventSink) -> Result<(), WatchError> {
        let mut state = self.state.lock();
        state.arms += 1;
        if state.fail_arms > 0 {
            state.fail_arms -= 1;
            return Err(WatchError::backend("scripted arm failure"));
        }
        state.sink = Some(sink);
        Ok(())
    }

    fn disarm(&mut self) {
        self.state.lock().sink = None;
    }
}

impl ScriptControl {
    /// Deliver a change event if the backend is armed
    pub fn emit(&self, path: impl AsRef<Path>) -> bool {
        let sink = self.state.lock().sink.clone();
        sink.is_some_and(|s| s.record(path))
    }

    /// Deliver a backend error if the backend is armed
    pub fn error(&self, message: &str) {
        let sink = self.state.lock().sink.clone();
        if let Some(sink) = sink {
            sink.report_error(message);
        }
    }

    pub fn arm_count(&self) -> usize {
        self.state.lock().arms
    }

    pub fn is_armed(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    /// Make the next `n` arm attempts fail
    pub fn fail_next_arms(&self, n: usize) {
        self.state.lock().fail_arms = n;
    }
}
