//! Request handler: validates caller requests and feeds the queue.
//!
//! Validation happens against each context's *projected* state, the state it
//! will be in once every request already accepted for it succeeds. A request
//! that passes is counted as pending on the context and moved into the queue.
//! Success here means "accepted", never "reached the target".

use super::registry::ContextRegistry;
use crate::collaborators::RuntimeCollaborator;
use crate::domain::error::{LifecycleError, Result};
use crate::domain::{
    AppCloseReason, ApplicationContext, ContextHandle, KillParams, LaunchParams, LifecycleState,
    LiveContext, RequestType, SignalKind,
};
use crate::worker::{Action, StateTransitionQueue, StateTransitionRequest, TransitionTable};
use std::sync::Arc;
use uuid::Uuid;

/// Why the router is asking for a context to be torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    /// The container exited on its own; only act if nothing is pending.
    Exited,
    /// The runtime or the display reported a failure.
    Failed,
}

/// Entry point for every state-affecting request.
pub struct RequestHandler {
    registry: Arc<ContextRegistry>,
    queue: Arc<StateTransitionQueue>,
    runtime: Arc<dyn RuntimeCollaborator>,
    table: TransitionTable,
}

impl RequestHandler {
    pub fn new(
        registry: Arc<ContextRegistry>,
        queue: Arc<StateTransitionQueue>,
        runtime: Arc<dyn RuntimeCollaborator>,
    ) -> Self {
        Self {
            registry,
            queue,
            runtime,
            table: TransitionTable::default(),
        }
    }

    /// Accepts a launch of `app_id` toward `target`.
    ///
    /// Returns the instance id the launch applies to. A settled context for
    /// the same app is re-targeted and keeps its instance id; it takes the new
    /// `params` if the launch starts a container.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty app id or a target that is not launchable
    /// - `AlreadyInProgress` if the app still has pending requests
    /// - `InvalidTransition` if the existing context cannot reach `target`
    /// - `ShuttingDown` if the queue no longer accepts requests
    pub fn launch(&self, app_id: &str, target: LifecycleState, params: LaunchParams) -> Result<String> {
        if app_id.is_empty() {
            return Err(LifecycleError::InvalidArgument("app id must not be empty".to_string()));
        }
        if !target.is_launch_target() {
            return Err(LifecycleError::InvalidArgument(format!(
                "{target} is not a launch target"
            )));
        }

        let intent = params.launch_intent.clone();
        let (handle, kind) = self.registry.update(|table| {
            if let Some(existing) = table.by_app_id(app_id) {
                let mut record = existing.lock();
                if record.pending_requests() > 0 {
                    return Err(LifecycleError::AlreadyInProgress(app_id.to_string()));
                }
                let current = record.current_state();
                let kind = if current == target && intent.is_some() {
                    RequestType::SendIntent
                } else {
                    RequestType::Launch
                };
                let path = self.table.plan(current, kind, target)?;
                if path.iter().any(|edge| edge.action == Action::Spawn) {
                    record.set_launch_params(params);
                }
                record.note_request_accepted(target);
                drop(record);
                return Ok((Arc::clone(existing), kind));
            }

            let mut record = ApplicationContext::new(app_id);
            record.assign_instance_id(Uuid::new_v4().to_string())?;
            record.set_launch_params(params);
            record.note_request_accepted(target);
            let handle = LiveContext::new(record)?;
            table.insert(Arc::clone(&handle))?;
            Ok((handle, RequestType::Launch))
        })?;

        tracing::debug!(
            app_id,
            app_instance_id = %handle.app_instance_id(),
            request_type = %kind,
            target_state = %target,
            "launch accepted"
        );
        let request = StateTransitionRequest::new(Arc::clone(&handle), kind, target).with_intent(intent);
        self.enqueue(&handle, request)?;
        Ok(handle.app_instance_id().to_string())
    }

    /// Accepts a teardown of the instance.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty id, `NotFound` if no live context
    /// matches, `InvalidTransition` if the context is already unloaded.
    pub fn terminate(&self, app_instance_id: &str, force: bool, reason: AppCloseReason) -> Result<()> {
        let handle = self.lookup(app_instance_id)?;
        self.submit(
            &handle,
            RequestType::Terminate,
            LifecycleState::Terminating,
            reason,
            None,
            KillParams { force },
        )
    }

    /// Accepts a move of the instance toward `state`.
    ///
    /// The request kind is derived from the projected state and the target.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty id, `NotFound` if no live context
    /// matches, `InvalidTransition` if the move is not legal.
    pub fn set_target_state(
        &self,
        app_instance_id: &str,
        state: LifecycleState,
        intent: Option<String>,
    ) -> Result<()> {
        let handle = self.lookup(app_instance_id)?;
        let projected = handle.lock().projected_state();
        let kind = RequestType::for_target(projected, state);
        let target = match kind {
            RequestType::Terminate => LifecycleState::Terminating,
            _ => state,
        };
        self.submit(&handle, kind, target, AppCloseReason::UserExit, intent, KillParams::default())
    }

    /// Records and forwards a navigation intent without going through the queue.
    ///
    /// # Errors
    ///
    /// `NotFound` if no live context matches, `Collaborator` if the app is not
    /// in a state that can take intents or delivery failed.
    pub fn send_intent(&self, app_instance_id: &str, intent: &str) -> Result<()> {
        let handle = self.lookup(app_instance_id)?;
        let state = {
            let mut record = handle.lock();
            record.set_most_recent_intent(Some(intent.to_string()));
            record.current_state()
        };
        if !state.accepts_intents() {
            return Err(LifecycleError::Collaborator(format!(
                "no intent transport to {app_instance_id} in state {state}"
            )));
        }
        self.runtime.deliver_intent(app_instance_id, intent)
    }

    /// Completes the pending `app_ready` wait if `state_change_id` matches.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty app id or a stale id, `NotFound` if the
    /// app has no live context.
    pub fn state_change_complete(&self, app_id: &str, state_change_id: u64, success: bool) -> Result<()> {
        if app_id.is_empty() {
            return Err(LifecycleError::InvalidArgument("app id must not be empty".to_string()));
        }
        let handle = self
            .registry
            .find_by_app_id(app_id)
            .ok_or_else(|| LifecycleError::NotFound(app_id.to_string()))?;

        let current = handle.lock().state_change_id();
        if current != state_change_id {
            return Err(LifecycleError::InvalidArgument(format!(
                "state change {state_change_id} is not current for {app_id} (current {current})"
            )));
        }

        let signal = handle.signals().get(SignalKind::AppReady);
        if success {
            signal.post();
        } else {
            signal.fail(format!("state change {state_change_id} reported failure"));
        }
        Ok(())
    }

    /// Queues a teardown on behalf of the event router.
    ///
    /// Returns `true` if a request was queued.
    pub fn submit_cleanup(&self, handle: &ContextHandle, cleanup: Cleanup) -> bool {
        let accepted = {
            let mut record = handle.lock();
            let pending = record.pending_requests();
            let skip = match cleanup {
                Cleanup::Exited => pending > 0 || !record.current_state().is_live(),
                Cleanup::Failed => {
                    (pending > 0 && record.projected_state() == LifecycleState::Terminating)
                        || (pending == 0 && !record.current_state().is_live())
                }
            };
            if skip {
                false
            } else {
                record.note_request_accepted(LifecycleState::Terminating);
                true
            }
        };
        if !accepted {
            return false;
        }

        let reason = match cleanup {
            Cleanup::Exited => AppCloseReason::UserExit,
            Cleanup::Failed => AppCloseReason::Error,
        };
        let request = StateTransitionRequest::new(
            Arc::clone(handle),
            RequestType::Terminate,
            LifecycleState::Terminating,
        )
        .with_close_reason(reason);

        match self.enqueue(handle, request) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(app_instance_id = %handle.app_instance_id(), error = %e, "cleanup not queued");
                false
            }
        }
    }

    fn lookup(&self, app_instance_id: &str) -> Result<ContextHandle> {
        if app_instance_id.is_empty() {
            return Err(LifecycleError::InvalidArgument(
                "app instance id must not be empty".to_string(),
            ));
        }
        self.registry
            .get(app_instance_id)
            .ok_or_else(|| LifecycleError::NotFound(app_instance_id.to_string()))
    }

    fn submit(
        &self,
        handle: &ContextHandle,
        kind: RequestType,
        target: LifecycleState,
        reason: AppCloseReason,
        intent: Option<String>,
        kill_params: KillParams,
    ) -> Result<()> {
        {
            let mut record = handle.lock();
            self.table.plan(record.projected_state(), kind, target)?;
            record.note_request_accepted(target);
        }

        tracing::debug!(
            app_instance_id = %handle.app_instance_id(),
            request_type = %kind,
            target_state = %target,
            close_reason = %reason,
            "request accepted"
        );
        let request = StateTransitionRequest::new(Arc::clone(handle), kind, target)
            .with_close_reason(reason)
            .with_kill_params(kill_params)
            .with_intent(intent);
        self.enqueue(handle, request)
    }

    fn enqueue(&self, handle: &ContextHandle, request: StateTransitionRequest) -> Result<()> {
        if let Err(e) = self.queue.submit(request) {
            handle.lock().note_request_finished();
            self.registry.remove_if_settled(handle.app_instance_id());
            return Err(e);
        }
        Ok(())
    }
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler")
            .field("contexts", &self.registry.len())
            .field("queued", &self.queue.len())
            .finish()
    }
}
