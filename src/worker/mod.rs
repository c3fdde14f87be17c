//! Request queue, its worker thread, and the state executor it drives.
//!
//! # Architecture
//!
//! - `messages`: the queued request type with trace context propagation
//! - `transitions`: the legal-transition table and path planning
//! - `queue`: FIFO plus the single worker thread
//! - `handler`: the executor that applies requests to contexts

pub mod handler;
pub mod messages;
pub mod queue;
pub mod transitions;

pub use handler::{ExecutorSettings, StateExecutor, SESSION_ID_KEY};
pub use messages::{StateTransitionRequest, TraceContext};
pub use queue::{StateTransitionQueue, TransitionProcessor};
pub use transitions::{Action, Edge, TransitionTable};
