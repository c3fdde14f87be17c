//! Per-instance application context.
//!
//! [`ApplicationContext`] is plain data with accessors: identity, current and
//! target lifecycle state, timestamps, captured launch/kill parameters, and
//! the typed runtime payload. It has no business logic. [`LiveContext`] pairs
//! a context with its completion signals and is what the registry, the queue,
//! and the event router share.
//!
//! # Locking
//!
//! The record sits behind its own mutex. The worker takes it briefly to read
//! or write fields and never holds it while blocking on a completion signal,
//! so the router can post signals (and take the same lock for the crash fast
//! path) at any time.

use super::error::{LifecycleError, Result};
use super::signal::CompletionSignals;
use super::state::LifecycleState;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Container configuration handed through to the runtime collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// User id the container runs as. Falls back to the configured default.
    pub user_id: Option<u32>,
    /// Group id the container runs as. Falls back to the configured default.
    pub group_id: Option<u32>,
    /// Ports the container is allowed to bind.
    pub ports: Vec<u16>,
    /// Host paths mapped into the container.
    pub paths: Vec<String>,
    /// `KEY=VALUE` entries added to the container environment.
    pub environment: Vec<String>,
    pub system_memory_limit: Option<u64>,
    pub gpu_memory_limit: Option<u64>,
    /// Runtime-specific settings passed through untouched.
    pub extra: BTreeMap<String, String>,
}

/// Launch parameters captured when a launch request is accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchParams {
    pub app_path: String,
    pub app_config: String,
    pub runtime_path: String,
    pub runtime_config: RuntimeConfig,
    pub launch_intent: Option<String>,
    pub environment: Vec<String>,
    pub debug: bool,
    pub launch_args: String,
}

/// Kill parameters captured when a terminate request is accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillParams {
    /// Skip graceful termination and kill the container outright.
    pub force: bool,
}

/// What the runtime collaborator currently holds for this instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RuntimeState {
    /// No container has been started.
    #[default]
    Idle,
    /// Container reported started.
    Running { started_at: Instant },
    Suspended,
    Hibernated,
    /// Container exited, on its own or on request.
    Exited { error_code: Option<i32> },
}

impl RuntimeState {
    /// `true` once a container exists that must be torn down.
    #[must_use]
    pub const fn has_container(&self) -> bool {
        matches!(
            self,
            Self::Running { .. } | Self::Suspended | Self::Hibernated
        )
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running { .. } => "running",
            Self::Suspended => "suspended",
            Self::Hibernated => "hibernated",
            Self::Exited { .. } => "exited",
        }
    }
}

/// Record of one application instance.
#[derive(Debug, Clone)]
pub struct ApplicationContext {
    app_id: String,
    app_instance_id: String,
    current_state: LifecycleState,
    target_state: LifecycleState,
    last_state_change_time: Instant,
    last_state_change_at: DateTime<Utc>,
    state_change_id: u64,
    active_session_id: Option<String>,
    most_recent_intent: Option<String>,
    launch_params: Arc<LaunchParams>,
    kill_params: KillParams,
    runtime_state: RuntimeState,
    display_client: Option<String>,
    pending_requests: usize,
    projected_state: LifecycleState,
}

impl ApplicationContext {
    /// Creates an unassigned context in `UNLOADED`.
    #[must_use]
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_instance_id: String::new(),
            current_state: LifecycleState::Unloaded,
            target_state: LifecycleState::Unloaded,
            last_state_change_time: Instant::now(),
            last_state_change_at: Utc::now(),
            state_change_id: 0,
            active_session_id: None,
            most_recent_intent: None,
            launch_params: Arc::new(LaunchParams::default()),
            kill_params: KillParams::default(),
            runtime_state: RuntimeState::Idle,
            display_client: None,
            pending_requests: 0,
            projected_state: LifecycleState::Unloaded,
        }
    }

    /// Assigns the per-launch instance id.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty id, `AlreadyInitialized` if an id was
    /// already assigned.
    pub fn assign_instance_id(&mut self, app_instance_id: impl Into<String>) -> Result<()> {
        let app_instance_id = app_instance_id.into();
        if app_instance_id.is_empty() {
            return Err(LifecycleError::InvalidArgument(
                "app instance id must not be empty".to_string(),
            ));
        }
        if !self.app_instance_id.is_empty() {
            return Err(LifecycleError::AlreadyInitialized(format!(
                "{} already bound to {}",
                self.app_id, self.app_instance_id
            )));
        }
        self.app_instance_id = app_instance_id;
        Ok(())
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn app_instance_id(&self) -> &str {
        &self.app_instance_id
    }

    pub const fn current_state(&self) -> LifecycleState {
        self.current_state
    }

    /// Moves `current_state` and stamps both clocks.
    pub fn set_current_state(&mut self, state: LifecycleState) {
        self.current_state = state;
        self.last_state_change_time = Instant::now();
        self.last_state_change_at = Utc::now();
    }

    pub const fn target_state(&self) -> LifecycleState {
        self.target_state
    }

    pub fn set_target_state(&mut self, state: LifecycleState) {
        self.target_state = state;
    }

    pub const fn last_state_change_time(&self) -> Instant {
        self.last_state_change_time
    }

    pub const fn last_state_change_at(&self) -> DateTime<Utc> {
        self.last_state_change_at
    }

    pub const fn state_change_id(&self) -> u64 {
        self.state_change_id
    }

    /// Bumps and returns the state change id.
    pub fn next_state_change_id(&mut self) -> u64 {
        self.state_change_id += 1;
        self.state_change_id
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.active_session_id.as_deref()
    }

    pub fn set_active_session_id(&mut self, session_id: Option<String>) {
        self.active_session_id = session_id;
    }

    pub fn most_recent_intent(&self) -> Option<&str> {
        self.most_recent_intent.as_deref()
    }

    pub fn set_most_recent_intent(&mut self, intent: Option<String>) {
        self.most_recent_intent = intent;
    }

    /// Shared snapshot of the launch parameters in effect.
    pub fn application_launch_params(&self) -> Arc<LaunchParams> {
        Arc::clone(&self.launch_params)
    }

    pub fn set_launch_params(&mut self, params: LaunchParams) {
        self.launch_params = Arc::new(params);
    }

    pub const fn application_kill_params(&self) -> KillParams {
        self.kill_params
    }

    pub fn set_kill_params(&mut self, params: KillParams) {
        self.kill_params = params;
    }

    pub const fn runtime_state(&self) -> RuntimeState {
        self.runtime_state
    }

    pub fn set_runtime_state(&mut self, state: RuntimeState) {
        self.runtime_state = state;
    }

    pub fn display_client(&self) -> Option<&str> {
        self.display_client.as_deref()
    }

    pub fn set_display_client(&mut self, client: Option<String>) {
        self.display_client = client;
    }

    /// Number of accepted requests that have not finished executing.
    pub const fn pending_requests(&self) -> usize {
        self.pending_requests
    }

    /// State the context will be in once every pending request succeeds.
    pub const fn projected_state(&self) -> LifecycleState {
        if self.pending_requests == 0 {
            self.current_state
        } else {
            self.projected_state
        }
    }

    /// Records that a request aiming at `target` was accepted.
    pub fn note_request_accepted(&mut self, target: LifecycleState) {
        self.pending_requests += 1;
        self.projected_state = target;
    }

    /// Records that one accepted request finished, successfully or not.
    pub fn note_request_finished(&mut self) {
        self.pending_requests = self.pending_requests.saturating_sub(1);
        if self.pending_requests == 0 {
            self.projected_state = self.current_state;
        }
    }
}

/// An application context shared between the registry, queued requests, and
/// the event router.
#[derive(Debug)]
pub struct LiveContext {
    app_id: String,
    app_instance_id: String,
    record: Mutex<ApplicationContext>,
    signals: CompletionSignals,
}

/// Shared handle to a [`LiveContext`].
pub type ContextHandle = Arc<LiveContext>;

impl LiveContext {
    /// Wraps an assigned context.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the context has no instance id yet.
    pub fn new(record: ApplicationContext) -> Result<ContextHandle> {
        if record.app_instance_id().is_empty() {
            return Err(LifecycleError::InvalidArgument(format!(
                "context for {} has no instance id",
                record.app_id()
            )));
        }
        Ok(Arc::new(Self {
            app_id: record.app_id().to_string(),
            app_instance_id: record.app_instance_id().to_string(),
            record: Mutex::new(record),
            signals: CompletionSignals::default(),
        }))
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn app_instance_id(&self) -> &str {
        &self.app_instance_id
    }

    pub fn lock(&self) -> MutexGuard<'_, ApplicationContext> {
        self.record.lock()
    }

    /// Copy of the record at this instant.
    pub fn snapshot(&self) -> ApplicationContext {
        self.record.lock().clone()
    }

    pub const fn signals(&self) -> &CompletionSignals {
        &self.signals
    }
}
