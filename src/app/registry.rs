//! Table of live application contexts.
//!
//! Keyed by instance id and searchable by app id or display client. One lock
//! guards lookup, creation and removal. Lock order is registry first, then a
//! context's own lock; nothing takes the registry lock while holding a
//! context lock.

use crate::domain::error::{LifecycleError, Result};
use crate::domain::{ApplicationContext, ContextHandle, LifecycleState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// The unlocked table, handed to closures passed to [`ContextRegistry::update`].
#[derive(Debug, Default)]
pub struct ContextTable {
    contexts: HashMap<String, ContextHandle>,
}

impl ContextTable {
    pub fn get(&self, app_instance_id: &str) -> Option<&ContextHandle> {
        self.contexts.get(app_instance_id)
    }

    pub fn by_app_id(&self, app_id: &str) -> Option<&ContextHandle> {
        self.contexts.values().find(|handle| handle.app_id() == app_id)
    }

    /// Adds a context.
    ///
    /// # Errors
    ///
    /// `AlreadyInitialized` if the instance id or the app id is taken.
    pub fn insert(&mut self, handle: ContextHandle) -> Result<()> {
        if self.contexts.contains_key(handle.app_instance_id()) {
            return Err(LifecycleError::AlreadyInitialized(
                handle.app_instance_id().to_string(),
            ));
        }
        if self.by_app_id(handle.app_id()).is_some() {
            return Err(LifecycleError::AlreadyInitialized(handle.app_id().to_string()));
        }
        self.contexts
            .insert(handle.app_instance_id().to_string(), handle);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

/// Shared, locked context table.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    table: Mutex<ContextTable>,
}

impl ContextRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Runs `f` with the table locked.
    pub fn update<R>(&self, f: impl FnOnce(&mut ContextTable) -> R) -> R {
        f(&mut self.table.lock())
    }

    pub fn get(&self, app_instance_id: &str) -> Option<ContextHandle> {
        self.table.lock().get(app_instance_id).cloned()
    }

    pub fn find_by_app_id(&self, app_id: &str) -> Option<ContextHandle> {
        self.table.lock().by_app_id(app_id).cloned()
    }

    /// Finds the context whose display was created with `client`.
    pub fn find_by_display_client(&self, client: &str) -> Option<ContextHandle> {
        self.table
            .lock()
            .contexts
            .values()
            .find(|handle| handle.lock().display_client() == Some(client))
            .cloned()
    }

    /// Finds a context whose current state is `state`, lowest app id first.
    pub fn find_in_state(&self, state: LifecycleState) -> Option<ContextHandle> {
        let table = self.table.lock();
        let mut matches: Vec<_> = table
            .contexts
            .values()
            .filter(|handle| handle.lock().current_state() == state)
            .collect();
        matches.sort_by(|a, b| a.app_id().cmp(b.app_id()));
        matches.first().map(|handle| Arc::clone(handle))
    }

    pub fn contains_app(&self, app_id: &str) -> bool {
        self.table.lock().by_app_id(app_id).is_some()
    }

    /// Removes the context if it is `UNLOADED` with nothing pending.
    ///
    /// Completion signals are drained before the context leaves the table.
    pub fn remove_if_settled(&self, app_instance_id: &str) -> bool {
        let mut table = self.table.lock();
        let Some(handle) = table.contexts.get(app_instance_id) else {
            return false;
        };
        {
            let record = handle.lock();
            if record.current_state() != LifecycleState::Unloaded || record.pending_requests() > 0 {
                return false;
            }
        }
        let drained = handle.signals().drain();
        table.contexts.remove(app_instance_id);
        tracing::debug!(app_instance_id, drained, "context removed");
        true
    }

    /// Copies of every context, ordered by app id.
    pub fn snapshots(&self) -> Vec<ApplicationContext> {
        let table = self.table.lock();
        let mut records: Vec<_> = table.contexts.values().map(|handle| handle.snapshot()).collect();
        records.sort_by(|a, b| a.app_id().cmp(b.app_id()));
        records
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}
