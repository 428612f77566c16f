//! Live patch session: glues watching, compiling, diffing and patching to
//! the host's lifecycle

use crate::config::{ConfigSource, LivePatchConfig};
use crate::error::SessionError;
use crate::health::{check_environment, HealthIssue};
use crate::state::{validate_transition, SessionState};
use chrono::{DateTime, Utc};
use livepatch_compile::{CompilationAdapter, Diagnostic};
use livepatch_diff::DiffEngine;
use livepatch_patch::{DetourRedirector, PatchEngine, PatchSummary, Redirector};
use livepatch_runtime::{MethodHandle, Program};
use livepatch_watch::{ChangeAggregator, EventSink, WatchState};
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Notifications from the host's execution lifecycle
pub trait HostLifecycle {
    /// The host entered its monitored execution mode
    fn on_session_entered(&mut self);

    /// The host is leaving its monitored execution mode
    fn on_session_exiting(&mut self);

    /// Called once per host frame
    fn on_tick(&mut self) -> TickOutcome;
}

/// What one tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No session is active
    Inactive,
    /// Nothing to do
    Quiet,
    /// Changes settled while auto-apply is off; pass them to `apply_now`
    ChangesDetected(Vec<PathBuf>),
    /// A compile and patch cycle ran
    Cycle(CycleReport),
}

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CycleOutcome {
    /// Redirections were installed
    Patched,
    /// Compiled, but no running method matched
    NoChanges,
    /// Compilation failed; nothing was loaded
    CompileFailed,
    /// The cycle hit an internal error or panic
    Failed(String),
}

/// Record of one compile, diff and patch cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Files the cycle was asked to compile
    pub files: Vec<PathBuf>,
    /// Compiled module name
    pub module: Option<String>,
    /// Fingerprint of the compiled sources
    pub fingerprint: Option<String>,
    /// Compiler diagnostics
    pub diagnostics: Vec<Diagnostic>,
    /// Matched methods
    pub changes: usize,
    /// Compiled methods without a running counterpart
    pub unmatched: usize,
    /// Patch counts, when patching ran
    pub summary: Option<PatchSummary>,
    /// Result
    pub outcome: CycleOutcome,
    /// When the cycle ended
    pub finished_at: DateTime<Utc>,
}

impl CycleReport {
    fn new(files: &[PathBuf], outcome: CycleOutcome) -> Self {
        Self {
            files: files.to_vec(),
            module: None,
            fingerprint: None,
            diagnostics: Vec::new(),
            changes: 0,
            unmatched: 0,
            summary: None,
            outcome,
            finished_at: Utc::now(),
        }
    }

    /// Whether redirections were installed
    #[inline]
    #[must_use]
    pub fn patched(&self) -> bool {
        self.outcome == CycleOutcome::Patched
    }
}

/// Everything a host or status window wants to know about a session
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Session id, while a session is active
    pub session_id: Option<Uuid>,
    /// State machine state
    pub state: SessionState,
    /// Whether the file watch is armed
    pub watching: bool,
    /// Whether any redirection is installed
    pub patching_active: bool,
    /// Methods patched since the session started
    pub session_patch_count: usize,
    /// Active redirections: original handle -> description
    pub active_patches: BTreeMap<String, String>,
    /// Problems found on session entry
    pub health_issues: Vec<String>,
    /// Last cycle, if any
    pub last_cycle: Option<CycleReport>,
}

/// The session orchestrator
///
/// Owns the change aggregator, compilation adapter, diff engine and patch
/// engine, and moves between [`SessionState`]s as the host ticks. Errors
/// and panics inside a cycle are contained here and never reach the host.
pub struct LivePatchSession {
    program: Arc<Program>,
    root: PathBuf,
    config_source: Box<dyn ConfigSource>,
    config: LivePatchConfig,
    aggregator: ChangeAggregator,
    adapter: CompilationAdapter,
    diff: DiffEngine,
    engine: PatchEngine,
    state: SessionState,
    session_id: Option<Uuid>,
    patch_count: usize,
    health: Vec<HealthIssue>,
    last_cycle: Option<CycleReport>,
}

impl std::fmt::Debug for LivePatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivePatchSession")
            .field("root", &self.root)
            .field("state", &self.state)
            .field("session_id", &self.session_id)
            .field("patch_count", &self.patch_count)
            .finish_non_exhaustive()
    }
}

impl LivePatchSession {
    /// Session watching `root` with the `notify` backend and detour redirection
    #[must_use]
    pub fn new(
        program: Arc<Program>,
        root: impl Into<PathBuf>,
        config: impl ConfigSource + 'static,
    ) -> Self {
        let snapshot = config.snapshot();
        let aggregator = ChangeAggregator::new(snapshot.path_filter(), snapshot.debounce());
        let redirector = Box::new(DetourRedirector::new(Arc::clone(&program)));
        Self::with_components(program, root, config, aggregator, redirector)
    }

    /// Session with an explicit aggregator and redirector
    #[must_use]
    pub fn with_components(
        program: Arc<Program>,
        root: impl Into<PathBuf>,
        config: impl ConfigSource + 'static,
        aggregator: ChangeAggregator,
        redirector: Box<dyn Redirector>,
    ) -> Self {
        let snapshot = config.snapshot();
        let adapter = CompilationAdapter::new(Arc::clone(&program))
            .with_options(snapshot.compile.clone())
            .with_included_modules(snapshot.included_modules.clone());
        let diff = DiffEngine::new().with_included_modules(snapshot.included_modules.clone());
        Self {
            program,
            root: root.into(),
            config_source: Box::new(config),
            config: snapshot,
            aggregator,
            adapter,
            diff,
            engine: PatchEngine::new(redirector),
            state: SessionState::Idle,
            session_id: None,
            patch_count: 0,
            health: Vec::new(),
            last_cycle: None,
        }
    }

    /// Run compile, diff and patch on an explicit list of files
    ///
    /// Accepted while watching, or idle inside an active session; the
    /// session returns to that state afterwards. Failures inside the cycle
    /// are reported in the returned [`CycleReport`].
    ///
    /// # Errors
    /// Returns error if no session is active or a cycle is already running.
    pub fn apply_now<I, P>(&mut self, files: I) -> Result<CycleReport, SessionError>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        if !self.is_active() {
            return Err(SessionError::NotActive);
        }
        if self.state.is_busy() {
            return Err(SessionError::Busy(self.state));
        }
        let files: Vec<PathBuf> = files.into_iter().map(Into::into).collect();
        info!("Manual live patch of {} file(s)", files.len());
        Ok(self.run_cycle(&files, self.state))
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a session has been entered and not exited
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session_id.is_some()
    }

    /// Whether any redirection is installed
    #[inline]
    #[must_use]
    pub fn is_patching_active(&self) -> bool {
        self.engine.active_count() > 0
    }

    /// Methods patched since the session started
    #[inline]
    #[must_use]
    pub fn session_patch_count(&self) -> usize {
        self.patch_count
    }

    /// Active redirections: original handle -> description
    #[must_use]
    pub fn active_patches(&self) -> BTreeMap<MethodHandle, String> {
        self.engine.active_patches()
    }

    /// Session id, while a session is active
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    /// Problems found on session entry
    #[inline]
    #[must_use]
    pub fn health_issues(&self) -> &[HealthIssue] {
        &self.health
    }

    /// Last cycle, if any
    #[inline]
    #[must_use]
    pub fn last_cycle(&self) -> Option<&CycleReport> {
        self.last_cycle.as_ref()
    }

    /// Program being patched
    #[inline]
    #[must_use]
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    /// Watched root
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Handle for injecting changed paths without the file watcher
    #[must_use]
    pub fn sink(&self) -> EventSink {
        self.aggregator.sink()
    }

    /// Snapshot for status displays
    #[must_use]
    pub fn status(&self) -> StatusReport {
        StatusReport {
            session_id: self.session_id,
            state: self.state,
            watching: self.aggregator.state() == WatchState::Armed,
            patching_active: self.is_patching_active(),
            session_patch_count: self.patch_count,
            active_patches: self
                .engine
                .active_patches()
                .into_iter()
                .map(|(handle, description)| (handle.to_string(), description))
                .collect(),
            health_issues: self.health.iter().map(ToString::to_string).collect(),
            last_cycle: self.last_cycle.clone(),
        }
    }

    fn refresh_config(&mut self) {
        let config = self.config_source.snapshot();
        if config == self.config {
            return;
        }
        debug!("Applying updated live patch settings");
        self.aggregator
            .update_settings(config.path_filter(), config.debounce());
        self.adapter.set_options(config.compile.clone());
        self.adapter
            .set_included_modules(config.included_modules.clone());
        self.diff.set_included_modules(config.included_modules.clone());
        self.config = config;
    }

    fn transition(&mut self, to: SessionState) -> Result<(), SessionError> {
        validate_transition(self.state, to)?;
        debug!("Session state {} -> {to}", self.state);
        self.state = to;
        Ok(())
    }

    /// Return to a resting state after a cycle, whatever happened in it
    fn settle(&mut self, resting: SessionState) {
        if self.state == resting {
            return;
        }
        if let Err(e) = self.transition(resting) {
            warn!("{e}; forcing state to {resting}");
            self.state = resting;
        }
    }

    fn run_cycle(&mut self, files: &[PathBuf], resting: SessionState) -> CycleReport {
        let report = match self.transition(SessionState::Compiling) {
            Err(e) => {
                error!("Cannot start live patch cycle: {e}");
                CycleReport::new(files, CycleOutcome::Failed(e.to_string()))
            }
            Ok(()) => match catch_unwind(AssertUnwindSafe(|| self.compile_and_patch(files))) {
                Ok(Ok(report)) => report,
                Ok(Err(e)) => {
                    error!("Live patch cycle failed: {e:?}");
                    CycleReport::new(files, CycleOutcome::Failed(e.to_string()))
                }
                Err(payload) => {
                    let message = panic_message(&*payload);
                    error!("Live patch cycle panicked: {message}");
                    CycleReport::new(files, CycleOutcome::Failed(format!("panic: {message}")))
                }
            },
        };
        self.settle(resting);
        self.last_cycle = Some(report.clone());
        report
    }

    fn compile_and_patch(&mut self, files: &[PathBuf]) -> Result<CycleReport, SessionError> {
        let compiled = self.adapter.compile_paths(files);
        let mut report = CycleReport::new(files, CycleOutcome::CompileFailed);
        report.module = Some(compiled.name().to_string());
        report.fingerprint = compiled.fingerprint().map(str::to_string);
        report.diagnostics = compiled.diagnostics().to_vec();

        if !compiled.success() {
            warn!(
                "Compilation of {} failed with {} error(s); nothing patched",
                compiled.name(),
                compiled.errors().count()
            );
            return Ok(report);
        }

        let diff = self.diff.diff(&compiled, &self.program);
        report.changes = diff.changes.len();
        report.unmatched = diff.unmatched.len();
        if !diff.has_changes() {
            info!("{} compiled; no running methods to patch", compiled.name());
            report.outcome = CycleOutcome::NoChanges;
            return Ok(report);
        }

        self.transition(SessionState::Patching)?;
        let summary = self.engine.apply_patches(&diff.changes)?;
        self.patch_count += diff.changes.len();
        info!(
            "Patched {} of {} method(s) from {}",
            summary.success_count,
            summary.total(),
            compiled.name()
        );

        report.summary = Some(summary);
        report.outcome = CycleOutcome::Patched;
        report.finished_at = Utc::now();
        Ok(report)
    }
}

impl HostLifecycle for LivePatchSession {
    fn on_session_entered(&mut self) {
        if self.is_active() {
            return;
        }
        let id = Uuid::new_v4();
        self.session_id = Some(id);
        self.refresh_config();

        if let Err(e) = self.engine.initialize() {
            error!("Patch engine failed to initialize: {e}");
        }
        self.aggregator.start_watching(self.root.clone());

        self.health = if self.config.check_environment_health {
            check_environment(&self.root, &self.config, self.engine.is_initialized())
        } else {
            Vec::new()
        };
        for issue in &self.health {
            warn!("Live patch environment: {issue}");
        }

        if self.config.auto_apply {
            self.settle(SessionState::Watching);
        }
        info!(session = %id, root = %self.root.display(), state = %self.state, "Live patch session started");
    }

    fn on_session_exiting(&mut self) {
        let Some(id) = self.session_id.take() else {
            return;
        };
        self.aggregator.stop_watching();
        let reverted = self.engine.clear_all_patches();
        self.patch_count = 0;
        self.settle(SessionState::Idle);
        info!(session = %id, reverted, "Live patch session ended");
    }

    fn on_tick(&mut self) -> TickOutcome {
        if !self.is_active() {
            return TickOutcome::Inactive;
        }
        self.refresh_config();

        let auto_apply = self.config.auto_apply;
        match (self.state, auto_apply) {
            (SessionState::Idle, true) => self.settle(SessionState::Watching),
            (SessionState::Watching, false) => self.settle(SessionState::Idle),
            _ => {}
        }

        let Some(batch) = self.aggregator.poll() else {
            return TickOutcome::Quiet;
        };
        let files: Vec<PathBuf> = batch.into_paths().into_iter().collect();

        if !auto_apply {
            info!("{} changed file(s) waiting for a manual apply", files.len());
            return TickOutcome::ChangesDetected(files);
        }
        TickOutcome::Cycle(self.run_cycle(&files, SessionState::Watching))
    }
}

impl Drop for LivePatchSession {
    fn drop(&mut self) {
        self.on_session_exiting();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
