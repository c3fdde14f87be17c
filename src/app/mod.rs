//! Application layer: the request-facing side of the lifecycle core.
//!
//! # Architecture
//!
//! ```text
//! caller → LifecycleManager → RequestHandler → StateTransitionQueue → StateExecutor
//!                                   ↑                                      │
//!                             EventRouter ←──── collaborator events ←──────┘
//! ```
//!
//! # Modules
//!
//! - [`manager`]: the public facade
//! - [`requests`]: validation and submission of state-affecting requests
//! - [`registry`]: the table of live contexts

pub mod manager;
pub mod registry;
pub mod requests;

pub use manager::LifecycleManager;
pub use registry::{ContextRegistry, ContextTable};
pub use requests::{Cleanup, RequestHandler};
