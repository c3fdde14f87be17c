//! Public facade over the lifecycle core.
//!
//! [`LifecycleManager`] wires the registry, queue, executor, request handler
//! and event router together and exposes the operations the surrounding
//! plugin layer calls. It is an explicit object; several managers can run
//! side by side in one process.

use super::registry::ContextRegistry;
use super::requests::RequestHandler;
use crate::collaborators::{RuntimeCollaborator, WindowCollaborator};
use crate::domain::error::{LifecycleError, Result};
use crate::domain::{
    AppCloseReason, ApplicationContext, LaunchParams, LifecycleState, RuntimeConfig,
};
use crate::events::{EventInbox, EventRouter, LifecycleListener, ListenerSet, RouterHandle};
use crate::worker::{ExecutorSettings, StateExecutor, StateTransitionQueue};
use crate::Config;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Entry in the `get_loaded_apps` listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadedApp<'a> {
    app_id: &'a str,
    app_instance_id: &'a str,
    lifecycle_state: LifecycleState,
    #[serde(flatten)]
    details: Option<LoadedAppDetails<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadedAppDetails<'a> {
    target_state: LifecycleState,
    state_change_id: u64,
    active_session_id: Option<&'a str>,
    most_recent_intent: Option<&'a str>,
    last_state_change: String,
    runtime_state: &'static str,
    launch_args: String,
}

impl<'a> LoadedApp<'a> {
    fn from_context(ctx: &'a ApplicationContext, verbose: bool) -> Self {
        let details = verbose.then(|| LoadedAppDetails {
            target_state: ctx.target_state(),
            state_change_id: ctx.state_change_id(),
            active_session_id: ctx.active_session_id(),
            most_recent_intent: ctx.most_recent_intent(),
            last_state_change: ctx.last_state_change_at().to_rfc3339(),
            runtime_state: ctx.runtime_state().label(),
            launch_args: ctx.application_launch_params().launch_args.clone(),
        });
        Self {
            app_id: ctx.app_id(),
            app_instance_id: ctx.app_instance_id(),
            lifecycle_state: ctx.current_state(),
            details,
        }
    }
}

/// The lifecycle core.
pub struct LifecycleManager {
    registry: Arc<ContextRegistry>,
    listeners: Arc<ListenerSet>,
    requests: Arc<RequestHandler>,
    queue: Arc<StateTransitionQueue>,
    router: Mutex<RouterHandle>,
}

impl LifecycleManager {
    /// Starts the worker and the event router.
    ///
    /// `inbox` must be the receiving half of the channel whose publisher the
    /// collaborators were built with.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a thread cannot be spawned.
    pub fn start(
        config: &Config,
        runtime: Arc<dyn RuntimeCollaborator>,
        window: Arc<dyn WindowCollaborator>,
        inbox: EventInbox,
    ) -> Result<Self> {
        let registry = ContextRegistry::new();
        let listeners = Arc::new(ListenerSet::default());

        let executor = StateExecutor::new(
            Arc::clone(&registry),
            Arc::clone(&runtime),
            window,
            Arc::clone(&listeners),
            ExecutorSettings::from(config),
        );
        let queue = Arc::new(StateTransitionQueue::start(executor)?);
        let requests = Arc::new(RequestHandler::new(
            Arc::clone(&registry),
            Arc::clone(&queue),
            runtime,
        ));
        let router = Arc::new(EventRouter::new(
            Arc::clone(&registry),
            Arc::clone(&requests),
            Arc::clone(&listeners),
        ))
        .spawn(inbox)?;

        tracing::debug!(
            completion_timeout_ms = config.completion_timeout_ms,
            first_frame_timeout_ms = config.first_frame_timeout_ms,
            "lifecycle manager started"
        );
        Ok(Self {
            registry,
            listeners,
            requests,
            queue,
            router: Mutex::new(router),
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.add(listener);
    }

    /// Launches `app_id` toward `target_state` and returns its instance id.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::launch`].
    pub fn spawn_app(
        &self,
        app_id: &str,
        intent: Option<&str>,
        target_state: LifecycleState,
        runtime_config: RuntimeConfig,
        launch_args: &str,
    ) -> Result<String> {
        let params = LaunchParams {
            runtime_config,
            launch_intent: intent.map(str::to_string),
            launch_args: launch_args.to_string(),
            ..LaunchParams::default()
        };
        self.launch_app(app_id, target_state, params)
    }

    /// Launches with a full parameter block.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::launch`].
    pub fn launch_app(&self, app_id: &str, target_state: LifecycleState, params: LaunchParams) -> Result<String> {
        self.requests.launch(app_id, target_state, params)
    }

    /// Gracefully terminates the instance.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::terminate`].
    pub fn unload_app(&self, app_instance_id: &str) -> Result<()> {
        self.requests
            .terminate(app_instance_id, false, AppCloseReason::UserExit)
    }

    /// Kills the instance without a graceful terminate.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::terminate`].
    pub fn kill_app(&self, app_instance_id: &str) -> Result<()> {
        self.requests
            .terminate(app_instance_id, true, AppCloseReason::UserExit)
    }

    /// Closes the live instance of `app_id`.
    ///
    /// `KILL_AND_RUN` and `KILL_AND_ACTIVATE` kill the instance and then
    /// relaunch a fresh one to `PAUSED` or `ACTIVE`. The other reasons
    /// terminate gracefully.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty app id, `NotFound` if the app is not
    /// loaded, otherwise see [`RequestHandler::terminate`].
    pub fn close_app(&self, app_id: &str, reason: AppCloseReason) -> Result<()> {
        if app_id.is_empty() {
            return Err(LifecycleError::InvalidArgument("app id must not be empty".to_string()));
        }
        let handle = self
            .registry
            .find_by_app_id(app_id)
            .ok_or_else(|| LifecycleError::NotFound(app_id.to_string()))?;
        let force = reason.relaunch_target().is_some();
        self.requests
            .terminate(handle.app_instance_id(), force, reason)
    }

    /// Moves the instance toward `state`.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::set_target_state`].
    pub fn set_target_app_state(
        &self,
        app_instance_id: &str,
        state: LifecycleState,
        intent: Option<&str>,
    ) -> Result<()> {
        self.requests
            .set_target_state(app_instance_id, state, intent.map(str::to_string))
    }

    /// Delivers an intent to the instance, bypassing the queue.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::send_intent`].
    pub fn send_intent(&self, app_instance_id: &str, intent: &str) -> Result<()> {
        self.requests.send_intent(app_instance_id, intent)
    }

    /// Delivers an intent to whichever app is `ACTIVE`.
    ///
    /// # Errors
    ///
    /// `NotFound` if no app is active, otherwise see [`Self::send_intent`].
    pub fn send_intent_to_active_app(&self, intent: &str) -> Result<()> {
        let handle = self
            .registry
            .find_in_state(LifecycleState::Active)
            .ok_or_else(|| LifecycleError::NotFound("no active app".to_string()))?;
        self.requests.send_intent(handle.app_instance_id(), intent)
    }

    /// Whether a context exists for `app_id`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty app id.
    pub fn is_app_loaded(&self, app_id: &str) -> Result<bool> {
        if app_id.is_empty() {
            return Err(LifecycleError::InvalidArgument("app id must not be empty".to_string()));
        }
        Ok(self.registry.contains_app(app_id))
    }

    /// JSON array of the loaded apps, `"[]"` when none.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn get_loaded_apps(&self, verbose: bool) -> Result<String> {
        let snapshots = self.registry.snapshots();
        let apps: Vec<_> = snapshots
            .iter()
            .map(|ctx| LoadedApp::from_context(ctx, verbose))
            .collect();
        Ok(serde_json::to_string(&apps)?)
    }

    /// Explicit acknowledgement of a state change by the app.
    ///
    /// # Errors
    ///
    /// See [`RequestHandler::state_change_complete`].
    pub fn state_change_complete(&self, app_id: &str, state_change_id: u64, success: bool) -> Result<()> {
        self.requests
            .state_change_complete(app_id, state_change_id, success)
    }

    /// Copy of the instance's context, if it is live.
    pub fn context(&self, app_instance_id: &str) -> Option<ApplicationContext> {
        self.registry.get(app_instance_id).map(|handle| handle.snapshot())
    }

    /// Copy of the context for `app_id`, if it is live.
    pub fn context_for_app(&self, app_id: &str) -> Option<ApplicationContext> {
        self.registry.find_by_app_id(app_id).map(|handle| handle.snapshot())
    }

    /// Stops the worker, then the router. Queued requests are reported as
    /// `"shutdown"`.
    pub fn shutdown(&self) {
        self.queue.terminate();
        self.router.lock().stop();
        tracing::debug!("lifecycle manager stopped");
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("requests", &self.requests)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}
