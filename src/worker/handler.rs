//! State executor: applies dequeued requests to their contexts.
//!
//! For each request the executor re-validates it against the context's
//! current state, expands it into edges through the [`TransitionTable`], and
//! walks the edges one by one. Each edge runs its [`Action`], which calls the
//! runtime or window collaborator and then blocks on a completion signal with a
//! deadline. The context lock is only held for short reads and writes, never
//! across a wait.
//!
//! Whatever happens, the request ends with exactly one `on_app_state_changed`
//! notification. Its `error_reason` is empty on success, otherwise the
//! [`LifecycleError::reason`] of the failure. A context that settles in
//! `UNLOADED` leaves the registry before that notification goes out.
//!
//! Kill parameters are read from the request, never from the context, so a
//! later terminate cannot change how an earlier queued one runs.

use super::messages::StateTransitionRequest;
use super::queue::TransitionProcessor;
use super::transitions::{Action, TransitionTable};
use crate::app::registry::ContextRegistry;
use crate::collaborators::{DebugSettings, RunRequest, RuntimeCollaborator, WindowCollaborator};
use crate::domain::error::{LifecycleError, Result};
use crate::domain::{
    ApplicationContext, ContextHandle, KillParams, LifecycleState, LiveContext, RequestType,
    RuntimeState, SignalKind, SignalOutcome,
};
use crate::events::{ListenerSet, StateChange};
use crate::Config;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Runtime config `extra` key naming the session a spawned container joins.
pub const SESSION_ID_KEY: &str = "sessionId";

/// Timeouts and defaults the executor applies.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub completion_timeout: Duration,
    pub first_frame_timeout: Duration,
    pub kill_timeout: Duration,
    pub default_user_id: u32,
    pub default_group_id: u32,
}

impl From<&Config> for ExecutorSettings {
    fn from(config: &Config) -> Self {
        Self {
            completion_timeout: config.completion_timeout(),
            first_frame_timeout: config.first_frame_timeout(),
            kill_timeout: config.kill_timeout(),
            default_user_id: config.default_user_id,
            default_group_id: config.default_group_id,
        }
    }
}

/// Runs requests on the worker thread.
pub struct StateExecutor {
    registry: Arc<ContextRegistry>,
    runtime: Arc<dyn RuntimeCollaborator>,
    window: Arc<dyn WindowCollaborator>,
    listeners: Arc<ListenerSet>,
    table: TransitionTable,
    settings: ExecutorSettings,
}

impl StateExecutor {
    pub fn new(
        registry: Arc<ContextRegistry>,
        runtime: Arc<dyn RuntimeCollaborator>,
        window: Arc<dyn WindowCollaborator>,
        listeners: Arc<ListenerSet>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            registry,
            runtime,
            window,
            listeners,
            table: TransitionTable::default(),
            settings,
        }
    }

    /// Executes one request and reports it. Returns `true` on success.
    fn handle_request(&self, request: &StateTransitionRequest) -> bool {
        let old_state = request.context.lock().current_state();
        let result = self.execute(request);
        let reason = match &result {
            Ok(()) => "",
            Err(e) => {
                tracing::warn!(
                    app_instance_id = %request.app_instance_id(),
                    request_type = %request.request_type,
                    error = %e,
                    "request failed"
                );
                e.reason()
            }
        };
        self.finish(request, old_state, reason);
        result.is_ok()
    }

    fn execute(&self, request: &StateTransitionRequest) -> Result<()> {
        let handle = &request.context;
        let current = handle.lock().current_state();
        if request.request_type == RequestType::Terminate && current == LifecycleState::Unloaded {
            tracing::debug!(app_instance_id = %handle.app_instance_id(), "already unloaded");
            return Ok(());
        }
        let path = self
            .table
            .plan(current, request.request_type, request.target_state)?;
        {
            let mut record = handle.lock();
            record.set_target_state(request.target_state);
            if request.request_type == RequestType::Terminate {
                record.set_kill_params(request.kill_params);
            }
        }

        if request.request_type == RequestType::SendIntent {
            return self.deliver_intent(handle, request.intent.as_deref().unwrap_or_default());
        }

        let navigation_intent = request.intent.clone().unwrap_or_default();
        for edge in path {
            let state_change_id = handle.lock().next_state_change_id();
            tracing::debug!(
                from = %edge.from,
                to = %edge.to,
                action = ?edge.action,
                state_change_id,
                "walking edge"
            );

            self.perform(handle, edge.action, request.kill_params)?;

            {
                let mut record = handle.lock();
                let now = record.current_state();
                // A crash reported mid-terminate already moved the context to TERMINATING.
                let crashed_into_edge = edge.to == LifecycleState::Terminating && now == edge.to;
                if now != edge.from && !crashed_into_edge {
                    return Err(LifecycleError::Collaborator(format!(
                        "state moved to {now} during {:?}",
                        edge.action
                    )));
                }
                if !crashed_into_edge {
                    record.set_current_state(edge.to);
                }
            }

            self.listeners.app_lifecycle_state_changed(&StateChange {
                app_id: handle.app_id().to_string(),
                app_instance_id: handle.app_instance_id().to_string(),
                old_state: edge.from,
                new_state: edge.to,
                navigation_intent: navigation_intent.clone(),
                error_reason: String::new(),
                state_change_id,
            });
        }

        if let Some(intent) = &request.intent {
            handle.lock().set_most_recent_intent(Some(intent.clone()));
        }
        Ok(())
    }

    fn finish(&self, request: &StateTransitionRequest, old_state: LifecycleState, reason: &str) {
        let handle = &request.context;
        let (new_state, state_change_id) = {
            let mut record = handle.lock();
            record.note_request_finished();
            (record.current_state(), record.state_change_id())
        };
        self.registry.remove_if_settled(handle.app_instance_id());

        self.listeners.app_state_changed(&StateChange {
            app_id: handle.app_id().to_string(),
            app_instance_id: handle.app_instance_id().to_string(),
            old_state,
            new_state,
            navigation_intent: request.intent.clone().unwrap_or_default(),
            error_reason: reason.to_string(),
            state_change_id,
        });
    }

    fn perform(&self, handle: &ContextHandle, action: Action, kill: KillParams) -> Result<()> {
        match action {
            Action::Load => {
                let mut record = handle.lock();
                record.set_runtime_state(RuntimeState::Idle);
                record.set_display_client(None);
                Ok(())
            }
            Action::Spawn => self.spawn(handle),
            Action::AwaitReady => {
                self.await_signal(handle, SignalKind::AppReady, self.settings.completion_timeout)
            }
            Action::AwaitReadyAndActivate => {
                self.await_signal(handle, SignalKind::AppReady, self.settings.completion_timeout)?;
                self.activate(handle)
            }
            Action::Activate => self.activate(handle),
            Action::Deactivate => Ok(()),
            Action::Suspend => self.container_step(
                handle,
                |runtime, id| runtime.suspend(id),
                RuntimeState::Suspended,
            ),
            Action::Resume => self.container_step(
                handle,
                |runtime, id| runtime.resume(id),
                RuntimeState::Running {
                    started_at: Instant::now(),
                },
            ),
            Action::Hibernate => self.container_step(
                handle,
                |runtime, id| runtime.hibernate(id),
                RuntimeState::Hibernated,
            ),
            Action::Wake => self.container_step(
                handle,
                |runtime, id| runtime.wake(id),
                RuntimeState::Suspended,
            ),
            Action::Terminate => self.terminate(handle, kill.force),
            Action::Unload => self.unload(handle, kill.force),
        }
    }

    fn spawn(&self, handle: &ContextHandle) -> Result<()> {
        let signals = handle.signals();
        for kind in [SignalKind::AppRunning, SignalKind::AppReady, SignalKind::FirstFrame] {
            signals.get(kind).reset();
        }

        let client = self.window.create_display(handle.app_instance_id())?;
        handle.lock().set_display_client(Some(client));

        let run_request = self.run_request(handle);
        handle.lock().set_active_session_id(
            run_request.runtime_config.extra.get(SESSION_ID_KEY).cloned(),
        );
        self.runtime.run(&run_request)?;
        self.await_signal(handle, SignalKind::AppRunning, self.settings.completion_timeout)
    }

    fn run_request(&self, handle: &ContextHandle) -> RunRequest {
        let params = handle.lock().application_launch_params();
        let mut runtime_config = params.runtime_config.clone();
        let mut environment = params.environment.clone();
        environment.append(&mut runtime_config.environment);
        runtime_config.environment = environment;

        RunRequest {
            app_id: handle.app_id().to_string(),
            app_instance_id: handle.app_instance_id().to_string(),
            user_id: runtime_config.user_id.unwrap_or(self.settings.default_user_id),
            group_id: runtime_config.group_id.unwrap_or(self.settings.default_group_id),
            ports: runtime_config.ports.clone(),
            paths: runtime_config.paths.clone(),
            debug_settings: DebugSettings {
                enabled: params.debug,
                port: None,
            },
            runtime_config,
            launch_args: params.launch_args.clone(),
        }
    }

    fn activate(&self, handle: &ContextHandle) -> Result<()> {
        if self.window.render_ready(handle.app_instance_id())? {
            return Ok(());
        }
        self.await_signal(handle, SignalKind::FirstFrame, self.settings.first_frame_timeout)
    }

    fn container_step(
        &self,
        handle: &ContextHandle,
        call: impl FnOnce(&dyn RuntimeCollaborator, &str) -> Result<()>,
        reached: RuntimeState,
    ) -> Result<()> {
        handle.signals().get(SignalKind::AppReady).reset();
        call(self.runtime.as_ref(), handle.app_instance_id())?;
        self.await_signal(handle, SignalKind::AppReady, self.settings.completion_timeout)?;
        handle.lock().set_runtime_state(reached);
        Ok(())
    }

    fn terminate(&self, handle: &ContextHandle, force: bool) -> Result<()> {
        let signal = handle.signals().get(SignalKind::AppTerminating);
        signal.reset();

        let has_container = handle.lock().runtime_state().has_container();
        if !has_container {
            tracing::debug!(app_instance_id = %handle.app_instance_id(), "no container to stop");
            signal.post();
            return Ok(());
        }

        if force {
            self.runtime.kill(handle.app_instance_id())
        } else {
            self.runtime.terminate(handle.app_instance_id())
        }
    }

    fn unload(&self, handle: &ContextHandle, force: bool) -> Result<()> {
        let id = handle.app_instance_id();

        match handle
            .signals()
            .get(SignalKind::AppTerminating)
            .wait(self.settings.completion_timeout)
        {
            SignalOutcome::Posted => {}
            SignalOutcome::Failed(reason) => return Err(LifecycleError::Collaborator(reason)),
            SignalOutcome::TimedOut if force => {
                return Err(LifecycleError::CollaboratorTimeout {
                    app_instance_id: id.to_string(),
                    signal: SignalKind::AppTerminating.as_str(),
                })
            }
            SignalOutcome::TimedOut => {
                tracing::warn!(app_instance_id = %id, "graceful terminate timed out, killing");
                self.runtime.kill(id)?;
                self.await_signal(handle, SignalKind::AppTerminating, self.settings.kill_timeout)?;
            }
        }

        let mut record = handle.lock();
        if record.runtime_state().has_container() {
            record.set_runtime_state(RuntimeState::Exited { error_code: None });
        }
        record.set_display_client(None);
        record.set_active_session_id(None);
        Ok(())
    }

    fn deliver_intent(&self, handle: &ContextHandle, intent: &str) -> Result<()> {
        handle.lock().next_state_change_id();
        self.runtime.deliver_intent(handle.app_instance_id(), intent)?;
        handle.lock().set_most_recent_intent(Some(intent.to_string()));
        Ok(())
    }

    fn await_signal(&self, handle: &ContextHandle, kind: SignalKind, timeout: Duration) -> Result<()> {
        match handle.signals().get(kind).wait(timeout) {
            SignalOutcome::Posted => Ok(()),
            SignalOutcome::Failed(reason) => Err(LifecycleError::Collaborator(reason)),
            SignalOutcome::TimedOut => Err(LifecycleError::CollaboratorTimeout {
                app_instance_id: handle.app_instance_id().to_string(),
                signal: kind.as_str(),
            }),
        }
    }

    /// Starts a fresh instance of the app the request just terminated.
    fn relaunch(&self, request: &StateTransitionRequest, target: LifecycleState) -> Result<()> {
        let params = request.context.lock().application_launch_params();

        let mut record = ApplicationContext::new(request.app_id());
        record.assign_instance_id(uuid::Uuid::new_v4().to_string())?;
        record.set_launch_params((*params).clone());
        record.note_request_accepted(target);
        let handle = LiveContext::new(record)?;
        self.registry
            .update(|table| table.insert(Arc::clone(&handle)))?;

        tracing::debug!(
            app_id = %handle.app_id(),
            app_instance_id = %handle.app_instance_id(),
            target_state = %target,
            reason = %request.close_reason,
            "relaunching after kill"
        );
        let launch = StateTransitionRequest::new(handle, RequestType::Launch, target)
            .with_intent(params.launch_intent.clone());
        self.handle_request(&launch);
        Ok(())
    }
}

impl TransitionProcessor for StateExecutor {
    fn process(&mut self, request: &StateTransitionRequest) {
        let _trace_guard = request.trace_context.as_ref().and_then(|ctx| ctx.attach());
        let span = tracing::debug_span!(
            "process_request",
            app_id = %request.app_id(),
            app_instance_id = %request.app_instance_id(),
            request_type = %request.request_type,
            target_state = %request.target_state,
            queued_ms = u64::try_from(request.submitted_at.elapsed().as_millis()).unwrap_or(u64::MAX),
        );
        let _guard = span.entered();

        let succeeded = self.handle_request(request);
        if !succeeded || request.request_type != RequestType::Terminate {
            return;
        }
        if let Some(target) = request.close_reason.relaunch_target() {
            if let Err(e) = self.relaunch(request, target) {
                tracing::warn!(app_id = %request.app_id(), error = %e, "relaunch skipped");
            }
        }
    }

    fn reject(&mut self, request: &StateTransitionRequest, reason: &str) {
        let old_state = request.context.lock().current_state();
        tracing::debug!(
            app_instance_id = %request.app_instance_id(),
            request_type = %request.request_type,
            reason,
            "request rejected"
        );
        self.finish(request, old_state, reason);
    }
}

impl std::fmt::Debug for StateExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateExecutor")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
