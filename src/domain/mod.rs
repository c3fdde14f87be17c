//! Domain layer for the lifecycle core.
//!
//! This module contains the core domain types, independent of the collaborator
//! implementations or the request plumbing around them.
//!
//! # Organization
//!
//! - [`error`]: Error types and result aliases
//! - [`state`]: Lifecycle states, request kinds, close reasons
//! - [`context`]: Per-instance application context and parameter blocks
//! - [`signal`]: Completion signals for collaborator rendezvous

pub mod context;
pub mod error;
pub mod signal;
pub mod state;

pub use context::{
    ApplicationContext, ContextHandle, KillParams, LaunchParams, LiveContext, RuntimeConfig,
    RuntimeState,
};
pub use error::{LifecycleError, Result};
pub use signal::{CompletionSignal, CompletionSignals, SignalKind, SignalOutcome};
pub use state::{AppCloseReason, LifecycleState, RequestType};
