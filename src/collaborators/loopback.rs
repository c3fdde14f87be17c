//! In-process collaborators that acknowledge every call.
//!
//! [`LoopbackRuntime`] and [`LoopbackWindow`] keep a small table of what they
//! were asked to do and publish the event a real runtime or window manager
//! would send back. The console binary runs on them, and tests use them as
//! the well-behaved baseline.

use super::runtime::{ContainerState, RunRequest, RuntimeCollaborator, RuntimeEvent};
use super::window::{WindowCollaborator, WindowEvent};
use crate::domain::error::{LifecycleError, Result};
use crate::events::EventPublisher;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Simulated runtime/container manager.
#[derive(Debug)]
pub struct LoopbackRuntime {
    publisher: EventPublisher,
    containers: Mutex<HashMap<String, ContainerState>>,
    intents: Mutex<Vec<(String, String)>>,
}

impl LoopbackRuntime {
    #[must_use]
    pub fn new(publisher: EventPublisher) -> Self {
        Self {
            publisher,
            containers: Mutex::new(HashMap::new()),
            intents: Mutex::new(Vec::new()),
        }
    }

    /// Container state the runtime believes the instance is in.
    pub fn container_state(&self, app_instance_id: &str) -> Option<ContainerState> {
        self.containers.lock().get(app_instance_id).copied()
    }

    /// Intents delivered so far, as `(instance, intent)` pairs.
    pub fn delivered_intents(&self) -> Vec<(String, String)> {
        self.intents.lock().clone()
    }

    fn transition(
        &self,
        app_instance_id: &str,
        allowed: &[ContainerState],
        next: ContainerState,
    ) -> Result<()> {
        let mut containers = self.containers.lock();
        let current = containers
            .get_mut(app_instance_id)
            .ok_or_else(|| LifecycleError::Collaborator(format!("no container {app_instance_id}")))?;
        if !allowed.contains(current) {
            return Err(LifecycleError::Collaborator(format!(
                "container {app_instance_id} is {current:?}, cannot move to {next:?}"
            )));
        }
        *current = next;
        drop(containers);

        tracing::debug!(app_instance_id, state = ?next, "loopback container state changed");
        self.publisher.publish(RuntimeEvent::StateChanged {
            app_instance_id: app_instance_id.to_string(),
            state: next,
        });
        Ok(())
    }

    fn stop(&self, app_instance_id: &str) -> Result<()> {
        if self.containers.lock().remove(app_instance_id).is_none() {
            return Err(LifecycleError::Collaborator(format!(
                "no container {app_instance_id}"
            )));
        }
        self.publisher.publish(RuntimeEvent::Terminated {
            app_instance_id: app_instance_id.to_string(),
        });
        Ok(())
    }
}

impl RuntimeCollaborator for LoopbackRuntime {
    fn run(&self, request: &RunRequest) -> Result<()> {
        let id = request.app_instance_id.clone();
        {
            let mut containers = self.containers.lock();
            if containers.contains_key(&id) {
                return Err(LifecycleError::Collaborator(format!(
                    "container {id} already running"
                )));
            }
            containers.insert(id.clone(), ContainerState::Running);
        }

        tracing::debug!(
            app_id = %request.app_id,
            app_instance_id = %id,
            user_id = request.user_id,
            group_id = request.group_id,
            "loopback container started"
        );
        self.publisher.publish(RuntimeEvent::Started {
            app_instance_id: id.clone(),
        });
        self.publisher.publish(RuntimeEvent::StateChanged {
            app_instance_id: id,
            state: ContainerState::Running,
        });
        Ok(())
    }

    fn terminate(&self, app_instance_id: &str) -> Result<()> {
        self.stop(app_instance_id)
    }

    fn kill(&self, app_instance_id: &str) -> Result<()> {
        self.stop(app_instance_id)
    }

    fn suspend(&self, app_instance_id: &str) -> Result<()> {
        self.transition(
            app_instance_id,
            &[ContainerState::Running],
            ContainerState::Suspended,
        )
    }

    fn resume(&self, app_instance_id: &str) -> Result<()> {
        self.transition(
            app_instance_id,
            &[ContainerState::Suspended],
            ContainerState::Running,
        )
    }

    fn hibernate(&self, app_instance_id: &str) -> Result<()> {
        self.transition(
            app_instance_id,
            &[ContainerState::Suspended],
            ContainerState::Hibernated,
        )
    }

    fn wake(&self, app_instance_id: &str) -> Result<()> {
        self.transition(
            app_instance_id,
            &[ContainerState::Hibernated],
            ContainerState::Suspended,
        )
    }

    fn deliver_intent(&self, app_instance_id: &str, intent: &str) -> Result<()> {
        if !self.containers.lock().contains_key(app_instance_id) {
            return Err(LifecycleError::Collaborator(format!(
                "no container {app_instance_id}"
            )));
        }
        self.intents
            .lock()
            .push((app_instance_id.to_string(), intent.to_string()));
        Ok(())
    }
}

/// Simulated window manager.
#[derive(Debug)]
pub struct LoopbackWindow {
    publisher: EventPublisher,
    next_client: AtomicU64,
    displays: Mutex<HashMap<String, String>>,
}

impl LoopbackWindow {
    #[must_use]
    pub fn new(publisher: EventPublisher) -> Self {
        Self {
            publisher,
            next_client: AtomicU64::new(1),
            displays: Mutex::new(HashMap::new()),
        }
    }

    /// Client id handed out for the instance, if a display exists.
    pub fn client_for(&self, app_instance_id: &str) -> Option<String> {
        self.displays.lock().get(app_instance_id).cloned()
    }

    /// Drops the instance's display and reports the disconnect.
    pub fn disconnect(&self, app_instance_id: &str) -> bool {
        let Some(client) = self.displays.lock().remove(app_instance_id) else {
            return false;
        };
        self.publisher.publish(WindowEvent::Disconnected { client })
    }
}

impl WindowCollaborator for LoopbackWindow {
    fn create_display(&self, app_instance_id: &str) -> Result<String> {
        let client = format!(
            "display-{}",
            self.next_client.fetch_add(1, Ordering::Relaxed)
        );
        self.displays
            .lock()
            .insert(app_instance_id.to_string(), client.clone());

        tracing::debug!(app_instance_id, client = %client, "loopback display created");
        self.publisher.publish(WindowEvent::Ready {
            client: client.clone(),
        });
        Ok(client)
    }

    fn render_ready(&self, app_instance_id: &str) -> Result<bool> {
        Ok(self.displays.lock().contains_key(app_instance_id))
    }
}
