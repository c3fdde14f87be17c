//! Error types for the lifecycle core.
//!
//! This module defines the centralized error type [`LifecycleError`] and a type alias
//! [`Result`] for convenient error handling throughout the crate. All errors are
//! implemented using the `thiserror` crate for automatic `Error` trait implementation.
//!
//! Errors split into two groups by how they reach the caller:
//!
//! - **Synchronous**: `InvalidArgument`, `NotFound`, `InvalidTransition`,
//!   `AlreadyInProgress` are returned directly from the request API and the
//!   request is never enqueued.
//! - **Asynchronous**: `CollaboratorTimeout` and `Collaborator` happen after a
//!   request was accepted and are only reported through the `error_reason`
//!   field of state-change notifications.

use crate::domain::state::{LifecycleState, RequestType};
use thiserror::Error;

/// The main error type for lifecycle operations.
///
/// Every variant maps to a short machine string via [`LifecycleError::reason`],
/// which is what notifications and the control protocol carry.
///
/// # Examples
///
/// ```
/// use lifecycle_manager::LifecycleError;
///
/// let err = LifecycleError::NotFound("8d1f".to_string());
/// assert_eq!(err.reason(), "not_found");
/// ```
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// An identifier or parameter was empty or malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No live application context matches the given identifier.
    #[error("No live application context for {0}")]
    NotFound(String),

    /// The requested edge does not exist in the transition table.
    #[error("Invalid transition: {request} from {from} toward {target}")]
    InvalidTransition {
        /// State the context was in (or was projected to be in).
        from: LifecycleState,
        /// Kind of request that was refused.
        request: RequestType,
        /// State the request was aiming for.
        target: LifecycleState,
    },

    /// A request for the same application is still queued or executing.
    #[error("Request already in progress for {0}")]
    AlreadyInProgress(String),

    /// An application context was initialized twice.
    #[error("Application context already initialized: {0}")]
    AlreadyInitialized(String),

    /// A collaborator accepted an action but never signalled completion.
    #[error("Collaborator timed out waiting for {signal} on {app_instance_id}")]
    CollaboratorTimeout {
        /// Instance whose completion signal expired.
        app_instance_id: String,
        /// Name of the signal that was awaited.
        signal: &'static str,
    },

    /// A runtime or window collaborator call failed synchronously, or the
    /// collaborator reported a failure while an action was pending.
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// The request queue has been terminated.
    #[error("Lifecycle manager is shutting down")]
    ShuttingDown,

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem or I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LifecycleError {
    /// Returns the stable machine string for this error.
    ///
    /// These strings appear as `error_reason` in notifications; an empty string
    /// is reserved for success.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::AlreadyInProgress(_) => "already_in_progress",
            Self::AlreadyInitialized(_) => "already_initialized",
            Self::CollaboratorTimeout { .. } => "collaborator_timeout",
            Self::Collaborator(_) => "collaborator_error",
            Self::ShuttingDown => "shutdown",
            Self::Config(_) => "config_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
        }
    }
}

/// A specialized `Result` type for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;
