//! Legal-transition table.
//!
//! The table is a fixed set of directed edges between lifecycle states, each
//! carrying the [`Action`] the executor performs to walk it. A request is
//! admitted by its `(current state, request type)` pair and then expanded into
//! the shortest edge sequence from the current state to its goal.
//!
//! ```text
//! UNLOADED ─Load→ LOADING ─Spawn→ INITIALIZING ─AwaitReady→ PAUSED
//!                                 INITIALIZING ─AwaitReadyAndActivate→ ACTIVE
//! PAUSED ─Activate→ ACTIVE ─Deactivate→ PAUSED
//! PAUSED ─Suspend→ SUSPENDED ─Resume→ PAUSED
//! SUSPENDED ─Hibernate→ HIBERNATED ─Wake→ SUSPENDED
//! any live state ─Terminate→ TERMINATING ─Unload→ UNLOADED
//! ```

use crate::domain::error::{LifecycleError, Result};
use crate::domain::{LifecycleState, RequestType};
use std::collections::VecDeque;

/// Work performed while walking one edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Bookkeeping only.
    Load,
    /// Create the display, start the container, wait for `app_running`.
    Spawn,
    /// Wait for the app to report ready.
    AwaitReady,
    /// Wait for ready, then bring the display to front.
    AwaitReadyAndActivate,
    /// Bring the display to front, waiting for a first frame if none yet.
    Activate,
    /// Bookkeeping only.
    Deactivate,
    Suspend,
    Resume,
    Hibernate,
    Wake,
    /// Ask the runtime to stop the container.
    Terminate,
    /// Wait for the container to exit, escalating to a kill on timeout.
    Unload,
}

/// A directed edge in the lifecycle graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub action: Action,
}

const fn edge(from: LifecycleState, to: LifecycleState, action: Action) -> Edge {
    Edge { from, to, action }
}

use LifecycleState::{
    Active, Hibernated, Initializing, Loading, Paused, Suspended, Terminating, Unloaded,
};

const EDGES: [Edge; 17] = [
    edge(Unloaded, Loading, Action::Load),
    edge(Loading, Initializing, Action::Spawn),
    edge(Initializing, Paused, Action::AwaitReady),
    edge(Initializing, Active, Action::AwaitReadyAndActivate),
    edge(Paused, Active, Action::Activate),
    edge(Active, Paused, Action::Deactivate),
    edge(Paused, Suspended, Action::Suspend),
    edge(Suspended, Paused, Action::Resume),
    edge(Suspended, Hibernated, Action::Hibernate),
    edge(Hibernated, Suspended, Action::Wake),
    edge(Loading, Terminating, Action::Terminate),
    edge(Initializing, Terminating, Action::Terminate),
    edge(Active, Terminating, Action::Terminate),
    edge(Paused, Terminating, Action::Terminate),
    edge(Suspended, Terminating, Action::Terminate),
    edge(Hibernated, Terminating, Action::Terminate),
    edge(Terminating, Unloaded, Action::Unload),
];

/// The lifecycle graph plus request gating.
#[derive(Debug, Clone, Copy)]
pub struct TransitionTable {
    edges: &'static [Edge],
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self { edges: &EDGES }
    }
}

impl TransitionTable {
    pub fn edges(&self) -> &'static [Edge] {
        self.edges
    }

    /// Whether a request of `kind` may start from `current`.
    #[must_use]
    pub const fn admits(current: LifecycleState, kind: RequestType) -> bool {
        match kind {
            RequestType::Launch => !matches!(current, Terminating),
            RequestType::Terminate => !matches!(current, Unloaded),
            RequestType::Suspend => matches!(current, Active | Paused | Hibernated),
            RequestType::Resume => matches!(current, Suspended | Hibernated | Paused | Active),
            RequestType::Hibernate => matches!(current, Active | Paused | Suspended),
            RequestType::SendIntent => matches!(current, Paused | Active),
        }
    }

    /// State a request aiming at `target` settles in.
    ///
    /// `TERMINATING` is transient; a terminate request finishes in `UNLOADED`.
    #[must_use]
    pub const fn settled_goal(target: LifecycleState) -> LifecycleState {
        match target {
            Terminating => Unloaded,
            other => other,
        }
    }

    /// Shortest edge sequence from `from` to `to`.
    ///
    /// Edges into `TERMINATING` are only considered when the goal is
    /// `TERMINATING` or `UNLOADED`. Returns an empty path when `from == to`.
    pub fn path(&self, from: LifecycleState, to: LifecycleState) -> Option<Vec<Edge>> {
        if from == to {
            return Some(Vec::new());
        }
        let allow_teardown = matches!(to, Terminating | Unloaded);

        let mut previous: [Option<Edge>; 8] = [None; 8];
        let mut seen = [false; 8];
        let mut frontier = VecDeque::from([from]);
        seen[index(from)] = true;

        while let Some(state) = frontier.pop_front() {
            if state == to {
                break;
            }
            for edge in self.edges.iter().filter(|e| e.from == state) {
                if edge.to == Terminating && !allow_teardown {
                    continue;
                }
                if !seen[index(edge.to)] {
                    seen[index(edge.to)] = true;
                    previous[index(edge.to)] = Some(*edge);
                    frontier.push_back(edge.to);
                }
            }
        }

        if !seen[index(to)] {
            return None;
        }
        let mut path = Vec::new();
        let mut cursor = to;
        while let Some(edge) = previous[index(cursor)] {
            path.push(edge);
            cursor = edge.from;
            if cursor == from {
                break;
            }
        }
        path.reverse();
        Some(path)
    }

    /// Admits the request and expands it into edges.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` if the request is not admitted from `current` or
    /// no path reaches the goal.
    pub fn plan(
        &self,
        current: LifecycleState,
        kind: RequestType,
        target: LifecycleState,
    ) -> Result<Vec<Edge>> {
        let invalid = || LifecycleError::InvalidTransition {
            from: current,
            request: kind,
            target,
        };
        if !Self::admits(current, kind) {
            return Err(invalid());
        }
        if kind == RequestType::SendIntent {
            return Ok(Vec::new());
        }
        self.path(current, Self::settled_goal(target)).ok_or_else(invalid)
    }
}

const fn index(state: LifecycleState) -> usize {
    match state {
        Unloaded => 0,
        Loading => 1,
        Initializing => 2,
        Active => 3,
        Paused => 4,
        Suspended => 5,
        Hibernated => 6,
        Terminating => 7,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actions(path: &[Edge]) -> Vec<Action> {
        path.iter().map(|e| e.action).collect()
    }

    #[test]
    fn launch_to_active_walks_full_startup() {
        let table = TransitionTable::default();
        let path = table.plan(Unloaded, RequestType::Launch, Active).unwrap();
        assert_eq!(
            actions(&path),
            vec![Action::Load, Action::Spawn, Action::AwaitReadyAndActivate]
        );
    }

    #[test]
    fn launch_to_loading_is_one_edge() {
        let table = TransitionTable::default();
        let path = table.plan(Unloaded, RequestType::Launch, Loading).unwrap();
        assert_eq!(actions(&path), vec![Action::Load]);
    }

    #[test]
    fn terminate_settles_in_unloaded() {
        let table = TransitionTable::default();
        let path = table.plan(Active, RequestType::Terminate, Terminating).unwrap();
        assert_eq!(actions(&path), vec![Action::Terminate, Action::Unload]);
        assert_eq!(path.last().unwrap().to, Unloaded);
    }

    #[test]
    fn terminate_from_terminating_only_unloads() {
        let table = TransitionTable::default();
        let path = table.plan(Terminating, RequestType::Terminate, Terminating).unwrap();
        assert_eq!(actions(&path), vec![Action::Unload]);
    }

    #[test]
    fn hibernate_from_active_passes_through_suspend() {
        let table = TransitionTable::default();
        let path = table.plan(Active, RequestType::Hibernate, Hibernated).unwrap();
        assert_eq!(
            actions(&path),
            vec![Action::Deactivate, Action::Suspend, Action::Hibernate]
        );
    }

    #[test]
    fn resume_from_hibernated_wakes_then_resumes() {
        let table = TransitionTable::default();
        let path = table.plan(Hibernated, RequestType::Resume, Active).unwrap();
        assert_eq!(
            actions(&path),
            vec![Action::Wake, Action::Resume, Action::Activate]
        );
    }

    #[test]
    fn gating_rejects_illegal_pairs() {
        let table = TransitionTable::default();
        for (state, kind) in [
            (Unloaded, RequestType::Terminate),
            (Terminating, RequestType::Launch),
            (Unloaded, RequestType::Suspend),
            (Loading, RequestType::Resume),
            (Hibernated, RequestType::Hibernate),
            (Suspended, RequestType::SendIntent),
        ] {
            let err = table.plan(state, kind, Active).unwrap_err();
            assert_eq!(err.reason(), "invalid_transition", "{state} {kind}");
        }
    }

    #[test]
    fn no_path_back_to_loading_from_live_state() {
        let table = TransitionTable::default();
        let err = table.plan(Active, RequestType::Launch, Loading).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[test]
    fn startup_never_routes_through_teardown() {
        let table = TransitionTable::default();
        for from in LifecycleState::ALL {
            for to in [Active, Paused, Suspended, Hibernated] {
                if let Some(path) = table.path(from, to) {
                    assert!(path.iter().all(|e| e.to != Terminating), "{from} -> {to}");
                }
            }
        }
    }

    #[test]
    fn same_state_is_an_empty_path() {
        let table = TransitionTable::default();
        assert!(table.plan(Active, RequestType::Resume, Active).unwrap().is_empty());
        assert!(table.plan(Paused, RequestType::SendIntent, Paused).unwrap().is_empty());
    }
}
