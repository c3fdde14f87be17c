//! Outbound notifications to registered listeners.
//!
//! Every request the worker finishes produces exactly one
//! [`LifecycleListener::on_app_state_changed`]. Each edge the executor walks
//! successfully additionally produces an
//! [`LifecycleListener::on_app_lifecycle_state_changed`].

use crate::domain::LifecycleState;
use crossbeam_channel::Sender;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One observed state change, or a failed attempt at one.
///
/// For a failed request, `new_state` is the last state the context actually
/// reached, not the requested target. A launch that times out after its first
/// edge reports `UNLOADED -> LOADING` with a non-empty `error_reason`; only an
/// empty `error_reason` means the target was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    pub app_id: String,
    pub app_instance_id: String,
    pub old_state: LifecycleState,
    pub new_state: LifecycleState,
    pub navigation_intent: String,
    /// Short machine string, empty on success.
    pub error_reason: String,
    pub state_change_id: u64,
}

impl StateChange {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error_reason.is_empty()
    }
}

/// Receives lifecycle notifications.
///
/// Callbacks run on the worker or router thread and must not block on
/// lifecycle operations that wait for the queue to drain.
pub trait LifecycleListener: Send + Sync {
    fn on_app_state_changed(&self, change: &StateChange) {
        let _ = change;
    }

    fn on_app_lifecycle_state_changed(&self, change: &StateChange) {
        let _ = change;
    }

    fn on_user_inactivity(&self, minutes: f64) {
        let _ = minutes;
    }
}

/// A notification as a value, for listeners that forward over a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    AppStateChanged(StateChange),
    AppLifecycleStateChanged(StateChange),
    UserInactivity { minutes: f64 },
}

/// Listener that forwards every notification into a channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: Sender<Notification>,
}

impl ChannelListener {
    #[must_use]
    pub const fn new(tx: Sender<Notification>) -> Self {
        Self { tx }
    }

    fn forward(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("notification receiver dropped");
        }
    }
}

impl LifecycleListener for ChannelListener {
    fn on_app_state_changed(&self, change: &StateChange) {
        self.forward(Notification::AppStateChanged(change.clone()));
    }

    fn on_app_lifecycle_state_changed(&self, change: &StateChange) {
        self.forward(Notification::AppLifecycleStateChanged(change.clone()));
    }

    fn on_user_inactivity(&self, minutes: f64) {
        self.forward(Notification::UserInactivity { minutes });
    }
}

/// The registered listeners, shared by the worker and the router.
#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn LifecycleListener>>>,
}

impl ListenerSet {
    pub fn add(&self, listener: Arc<dyn LifecycleListener>) {
        self.listeners.write().push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    pub fn app_state_changed(&self, change: &StateChange) {
        tracing::debug!(
            app_id = %change.app_id,
            app_instance_id = %change.app_instance_id,
            old_state = %change.old_state,
            new_state = %change.new_state,
            error_reason = %change.error_reason,
            "app state changed"
        );
        for listener in self.snapshot() {
            listener.on_app_state_changed(change);
        }
    }

    pub fn app_lifecycle_state_changed(&self, change: &StateChange) {
        for listener in self.snapshot() {
            listener.on_app_lifecycle_state_changed(change);
        }
    }

    pub fn user_inactivity(&self, minutes: f64) {
        for listener in self.snapshot() {
            listener.on_user_inactivity(minutes);
        }
    }

    // Listeners run without the lock held so they may register others.
    fn snapshot(&self) -> Vec<Arc<dyn LifecycleListener>> {
        self.listeners.read().clone()
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &self.len())
            .finish()
    }
}
