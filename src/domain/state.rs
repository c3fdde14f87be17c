//! Lifecycle state, request kinds, and close reasons.
//!
//! These enums are the vocabulary shared by callers, the executor, and
//! notifications. They serialize as `SCREAMING_SNAKE_CASE` strings so the
//! control protocol and `get_loaded_apps` output use the same names as the
//! surrounding plugin layer (`UNLOADED`, `ACTIVE`, `KILL_AND_RUN`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::LifecycleError;

/// Lifecycle state of one application instance.
///
/// ```text
/// UNLOADED → LOADING → INITIALIZING → {ACTIVE | PAUSED} ⇄ SUSPENDED ⇄ HIBERNATED
///                      any live state → TERMINATING → UNLOADED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Initial and terminal state; no runtime resources held.
    Unloaded,
    /// Accepted for launch, launch parameters captured.
    Loading,
    /// Container started, waiting for the app to report readiness.
    Initializing,
    /// Running and visible with focus.
    Active,
    /// Running without focus.
    Paused,
    /// Container frozen.
    Suspended,
    /// Container checkpointed out of memory.
    Hibernated,
    /// Teardown requested, waiting for the runtime to confirm exit.
    Terminating,
}

impl LifecycleState {
    /// All states, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Unloaded,
        Self::Loading,
        Self::Initializing,
        Self::Active,
        Self::Paused,
        Self::Suspended,
        Self::Hibernated,
        Self::Terminating,
    ];

    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unloaded => "UNLOADED",
            Self::Loading => "LOADING",
            Self::Initializing => "INITIALIZING",
            Self::Active => "ACTIVE",
            Self::Paused => "PAUSED",
            Self::Suspended => "SUSPENDED",
            Self::Hibernated => "HIBERNATED",
            Self::Terminating => "TERMINATING",
        }
    }

    /// `true` for every state in which the instance holds runtime resources
    /// or is on its way to holding them.
    #[must_use]
    pub const fn is_live(self) -> bool {
        !matches!(self, Self::Unloaded)
    }

    /// States a launch request may aim for.
    #[must_use]
    pub const fn is_launch_target(self) -> bool {
        !matches!(self, Self::Unloaded | Self::Terminating)
    }

    /// States in which the app process can receive an intent.
    #[must_use]
    pub const fn accepts_intents(self) -> bool {
        matches!(self, Self::Initializing | Self::Paused | Self::Active)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LifecycleError::InvalidArgument(format!("unknown lifecycle state: {s}")))
    }
}

/// Kind of state-affecting request carried through the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Launch,
    Terminate,
    Suspend,
    Resume,
    Hibernate,
    SendIntent,
}

impl RequestType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Launch => "LAUNCH",
            Self::Terminate => "TERMINATE",
            Self::Suspend => "SUSPEND",
            Self::Resume => "RESUME",
            Self::Hibernate => "HIBERNATE",
            Self::SendIntent => "SEND_INTENT",
        }
    }

    /// Picks the request kind that moves a context from `current` toward
    /// `target`.
    ///
    /// Used by `set_target_app_state`, which only knows the goal. Whether the
    /// resulting `(current, kind)` pair is legal is decided separately by the
    /// transition table.
    #[must_use]
    pub const fn for_target(current: LifecycleState, target: LifecycleState) -> Self {
        match target {
            LifecycleState::Unloaded | LifecycleState::Terminating => Self::Terminate,
            LifecycleState::Suspended => Self::Suspend,
            LifecycleState::Hibernated => Self::Hibernate,
            LifecycleState::Paused | LifecycleState::Active => match current {
                LifecycleState::Unloaded
                | LifecycleState::Loading
                | LifecycleState::Initializing => Self::Launch,
                _ => Self::Resume,
            },
            LifecycleState::Loading | LifecycleState::Initializing => Self::Launch,
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an application is being closed.
///
/// `KillAndRun` and `KillAndActivate` are scripted sequences: after the
/// instance is gone, a fresh instance of the same app is launched in the same
/// worker iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppCloseReason {
    #[default]
    UserExit,
    Error,
    KillAndRun,
    KillAndActivate,
}

impl AppCloseReason {
    /// State a relaunch should reach after the kill, if this reason chains one.
    #[must_use]
    pub const fn relaunch_target(self) -> Option<LifecycleState> {
        match self {
            Self::KillAndRun => Some(LifecycleState::Paused),
            Self::KillAndActivate => Some(LifecycleState::Active),
            Self::UserExit | Self::Error => None,
        }
    }
}

impl fmt::Display for AppCloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UserExit => "USER_EXIT",
            Self::Error => "ERROR",
            Self::KillAndRun => "KILL_AND_RUN",
            Self::KillAndActivate => "KILL_AND_ACTIVATE",
        })
    }
}
