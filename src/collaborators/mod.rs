//! Collaborator seams: the runtime/container manager and the window/display manager.
//!
//! The core only orchestrates; the entities that spawn processes and composite
//! displays live behind these traits. Their asynchronous callbacks come back
//! through [`crate::events::EventPublisher`].
//!
//! # Modules
//!
//! - [`runtime`]: `RuntimeCollaborator` trait, run request, runtime events
//! - [`window`]: `WindowCollaborator` trait, window events
//! - [`loopback`]: in-process implementations that acknowledge every call

pub mod loopback;
pub mod runtime;
pub mod window;

pub use loopback::{LoopbackRuntime, LoopbackWindow};
pub use runtime::{ContainerState, DebugSettings, RunRequest, RuntimeCollaborator, RuntimeEvent};
pub use window::{WindowCollaborator, WindowEvent};
