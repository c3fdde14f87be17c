//! Line-oriented JSON control protocol.
//!
//! Each input line is one [`ControlCommand`]; each is answered by exactly one
//! [`ControlResponse`] line. The console binary drives a [`LifecycleManager`]
//! through [`handle_command`].
//!
//! ```text
//! {"command":"spawn","app_id":"com.test.app","target_state":"ACTIVE"}
//! {"status":"ok","value":{"appInstanceId":"5f0c…"}}
//! ```
//!
//! [`LifecycleManager`]: crate::LifecycleManager

pub mod handler;
pub mod messages;

pub use handler::handle_command;
pub use messages::{ControlCommand, ControlResponse};
