//! Routes collaborator callbacks back into contexts.
//!
//! Runtime events are matched to a context by instance id, window events by
//! the display client id cached on the context at `create_display` time. The
//! router posts or fails completion signals, records runtime state, and asks
//! the request handler for teardowns. The only lifecycle state it writes
//! itself is the crash fast path: a runtime failure forces `TERMINATING` under
//! the context lock.

use super::channel::{CollaboratorEvent, EventInbox};
use super::notifications::{ListenerSet, StateChange};
use crate::app::registry::ContextRegistry;
use crate::app::requests::{Cleanup, RequestHandler};
use crate::collaborators::{ContainerState, RuntimeEvent, WindowEvent};
use crate::domain::error::Result;
use crate::domain::{ContextHandle, LifecycleState, RuntimeState, SignalKind};
use crossbeam_channel::{bounded, select, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// `error_reason` carried by the crash fast-path notification.
pub const RUNTIME_FAILURE: &str = "runtime_failure";

/// Dispatches collaborator events.
pub struct EventRouter {
    registry: Arc<ContextRegistry>,
    requests: Arc<RequestHandler>,
    listeners: Arc<ListenerSet>,
}

impl EventRouter {
    pub fn new(
        registry: Arc<ContextRegistry>,
        requests: Arc<RequestHandler>,
        listeners: Arc<ListenerSet>,
    ) -> Self {
        Self {
            registry,
            requests,
            listeners,
        }
    }

    /// Handles one event on the calling thread.
    pub fn dispatch(&self, event: CollaboratorEvent) {
        match event {
            CollaboratorEvent::Runtime(event) => self.on_runtime_event(event),
            CollaboratorEvent::Window(event) => self.on_window_event(event),
        }
    }

    /// Drains `inbox` on a dedicated thread until the handle is stopped.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn spawn(self: Arc<Self>, inbox: EventInbox) -> Result<RouterHandle> {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let thread = thread::Builder::new()
            .name("lifecycle-events".to_string())
            .spawn(move || {
                tracing::debug!("event router started");
                loop {
                    select! {
                        recv(inbox.rx) -> event => match event {
                            Ok(event) => self.dispatch(event),
                            Err(_) => break,
                        },
                        recv(stop_rx) -> _ => break,
                    }
                }
                tracing::debug!("event router stopped");
            })?;
        Ok(RouterHandle {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    fn on_runtime_event(&self, event: RuntimeEvent) {
        let Some(handle) = self.registry.get(event.app_instance_id()) else {
            tracing::debug!(?event, "runtime event for unknown instance ignored");
            return;
        };
        tracing::debug!(?event, "runtime event");

        match event {
            RuntimeEvent::Started { .. } => {
                handle.lock().set_runtime_state(RuntimeState::Running {
                    started_at: Instant::now(),
                });
                handle.signals().get(SignalKind::AppRunning).post();
            }
            RuntimeEvent::StateChanged { state, .. } => match state {
                ContainerState::Running | ContainerState::Suspended | ContainerState::Hibernated => {
                    handle.signals().get(SignalKind::AppReady).post();
                }
                ContainerState::Starting | ContainerState::Terminating | ContainerState::Stopped => {}
            },
            RuntimeEvent::Terminated { .. } => {
                {
                    let mut record = handle.lock();
                    if !matches!(record.runtime_state(), RuntimeState::Exited { .. }) {
                        record.set_runtime_state(RuntimeState::Exited { error_code: None });
                    }
                }
                handle.signals().get(SignalKind::AppTerminating).post();
                if self.requests.submit_cleanup(&handle, Cleanup::Exited) {
                    tracing::debug!(app_instance_id = %handle.app_instance_id(), "container exited, cleanup queued");
                }
            }
            RuntimeEvent::Failure { error_code, .. } => self.on_failure(&handle, error_code),
        }
    }

    fn on_failure(&self, handle: &ContextHandle, error_code: i32) {
        let change = {
            let mut record = handle.lock();
            let old_state = record.current_state();
            record.set_runtime_state(RuntimeState::Exited {
                error_code: Some(error_code),
            });
            if !old_state.is_live() || old_state == LifecycleState::Terminating {
                None
            } else {
                record.set_current_state(LifecycleState::Terminating);
                Some(StateChange {
                    app_id: handle.app_id().to_string(),
                    app_instance_id: handle.app_instance_id().to_string(),
                    old_state,
                    new_state: LifecycleState::Terminating,
                    navigation_intent: String::new(),
                    error_reason: RUNTIME_FAILURE.to_string(),
                    state_change_id: record.state_change_id(),
                })
            }
        };

        // Waiters wake only after the state change above is visible.
        let reason = format!("runtime failure {error_code}");
        let signals = handle.signals();
        signals.get(SignalKind::AppRunning).fail(reason.clone());
        signals.get(SignalKind::AppReady).fail(reason);
        signals.get(SignalKind::AppTerminating).post();

        tracing::warn!(
            app_instance_id = %handle.app_instance_id(),
            error_code,
            "runtime reported failure"
        );
        if let Some(change) = change {
            self.listeners.app_state_changed(&change);
        }
        self.requests.submit_cleanup(handle, Cleanup::Failed);
    }

    fn on_window_event(&self, event: WindowEvent) {
        match event {
            WindowEvent::Ready { client } => match self.registry.find_by_display_client(&client) {
                Some(handle) => handle.signals().get(SignalKind::FirstFrame).post(),
                None => tracing::debug!(client = %client, "first frame for unknown client ignored"),
            },
            WindowEvent::Disconnected { client } => {
                match self.registry.find_by_display_client(&client) {
                    Some(handle) => {
                        tracing::warn!(
                            app_instance_id = %handle.app_instance_id(),
                            client = %client,
                            "display disconnected"
                        );
                        self.requests.submit_cleanup(&handle, Cleanup::Failed);
                    }
                    None => tracing::debug!(client = %client, "disconnect for unknown client ignored"),
                }
            }
            WindowEvent::UserInactivity { minutes } => self.listeners.user_inactivity(minutes),
        }
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter").finish_non_exhaustive()
    }
}

/// Owns the router's dispatch thread.
#[derive(Debug)]
pub struct RouterHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl RouterHandle {
    /// Stops the dispatch thread and joins it, unless called from it.
    pub fn stop(&mut self) {
        drop(self.stop.take());
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            tracing::error!("event router thread panicked");
        }
    }
}

impl Drop for RouterHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
