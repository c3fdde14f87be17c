//! Inbound event channel from collaborators to the router.
//!
//! Collaborators are constructed with an [`EventPublisher`] and call it from
//! whatever thread their callbacks arrive on. The matching [`EventInbox`] is
//! handed to the lifecycle manager, whose router drains it on a dedicated
//! dispatch thread. The channel decouples collaborator callback threads from
//! context locking and lets collaborators be built before the manager exists.

use crate::collaborators::{RuntimeEvent, WindowEvent};
use crossbeam_channel::{unbounded, Receiver, Sender};

/// An event from either collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum CollaboratorEvent {
    Runtime(RuntimeEvent),
    Window(WindowEvent),
}

impl From<RuntimeEvent> for CollaboratorEvent {
    fn from(event: RuntimeEvent) -> Self {
        Self::Runtime(event)
    }
}

impl From<WindowEvent> for CollaboratorEvent {
    fn from(event: WindowEvent) -> Self {
        Self::Window(event)
    }
}

/// Sending half, cloned into every collaborator.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: Sender<CollaboratorEvent>,
}

impl EventPublisher {
    /// Publishes an event. Returns `false` if the router is gone.
    pub fn publish(&self, event: impl Into<CollaboratorEvent>) -> bool {
        let event = event.into();
        match self.tx.send(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(event = ?e.0, "event dropped, router no longer listening");
                false
            }
        }
    }
}

/// Receiving half, consumed by the router's dispatch thread.
#[derive(Debug)]
pub struct EventInbox {
    pub(crate) rx: Receiver<CollaboratorEvent>,
}

/// Creates a connected publisher/inbox pair.
#[must_use]
pub fn event_channel() -> (EventPublisher, EventInbox) {
    let (tx, rx) = unbounded();
    (EventPublisher { tx }, EventInbox { rx })
}
