//! Runtime/container manager collaborator.
//!
//! The core never starts processes itself; it asks a [`RuntimeCollaborator`]
//! to do so and learns the outcome through [`RuntimeEvent`]s published on the
//! inbound event channel.

use crate::domain::error::{LifecycleError, Result};
use crate::domain::RuntimeConfig;
use serde::{Deserialize, Serialize};

/// Debugger settings for a container launch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugSettings {
    pub enabled: bool,
    /// Port the debugger listens on, when enabled.
    pub port: Option<u16>,
}

/// Everything the runtime needs to start one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub app_id: String,
    pub app_instance_id: String,
    pub user_id: u32,
    pub group_id: u32,
    pub ports: Vec<u16>,
    pub paths: Vec<String>,
    pub debug_settings: DebugSettings,
    pub runtime_config: RuntimeConfig,
    pub launch_args: String,
}

/// Container state as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerState {
    Starting,
    Running,
    Suspended,
    Hibernated,
    Terminating,
    Stopped,
}

/// Callbacks from the runtime, keyed by instance id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    Started {
        app_instance_id: String,
    },
    StateChanged {
        app_instance_id: String,
        state: ContainerState,
    },
    Terminated {
        app_instance_id: String,
    },
    Failure {
        app_instance_id: String,
        error_code: i32,
    },
}

impl RuntimeEvent {
    pub fn app_instance_id(&self) -> &str {
        match self {
            Self::Started { app_instance_id }
            | Self::StateChanged { app_instance_id, .. }
            | Self::Terminated { app_instance_id }
            | Self::Failure { app_instance_id, .. } => app_instance_id,
        }
    }
}

/// Abstraction over the runtime/container manager.
///
/// Every call returns once the runtime has *accepted* the action. Completion
/// arrives later as a [`RuntimeEvent`]. An `Err` means the call itself
/// failed and no event will follow.
pub trait RuntimeCollaborator: Send + Sync {
    /// Starts a container for the instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime refuses the launch.
    fn run(&self, request: &RunRequest) -> Result<()>;

    /// Asks the container to exit gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime does not know the instance.
    fn terminate(&self, app_instance_id: &str) -> Result<()>;

    /// Kills the container immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime does not know the instance.
    fn kill(&self, app_instance_id: &str) -> Result<()>;

    /// Freezes the container.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot suspend the instance.
    fn suspend(&self, app_instance_id: &str) -> Result<()>;

    /// Thaws a suspended container.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot resume the instance.
    fn resume(&self, app_instance_id: &str) -> Result<()>;

    /// Checkpoints a suspended container out of memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot hibernate the instance.
    fn hibernate(&self, app_instance_id: &str) -> Result<()>;

    /// Restores a hibernated container to the suspended state.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot wake the instance.
    fn wake(&self, app_instance_id: &str) -> Result<()>;

    /// Delivers a navigation intent to the running app.
    ///
    /// Runtimes without an intent transport keep the default, which fails.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no path to the app.
    fn deliver_intent(&self, app_instance_id: &str, intent: &str) -> Result<()> {
        let _ = intent;
        Err(LifecycleError::Collaborator(format!(
            "no intent transport for {app_instance_id}"
        )))
    }
}
