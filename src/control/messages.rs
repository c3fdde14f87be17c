//! Control protocol messages.

use crate::domain::{AppCloseReason, LifecycleError, LifecycleState, RuntimeConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One request read from the control stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Launch an app and answer with its instance id.
    Spawn {
        app_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        intent: Option<String>,
        target_state: LifecycleState,
        #[serde(default)]
        runtime_config: RuntimeConfig,
        #[serde(default)]
        launch_args: String,
    },

    /// Graceful terminate.
    Unload { app_instance_id: String },

    /// Forced terminate.
    Kill { app_instance_id: String },

    /// Close the live instance of an app.
    Close {
        app_id: String,
        #[serde(default)]
        reason: AppCloseReason,
    },

    SetState {
        app_instance_id: String,
        state: LifecycleState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        intent: Option<String>,
    },

    SendIntent {
        app_instance_id: String,
        intent: String,
    },

    SendIntentToActive { intent: String },

    IsLoaded { app_id: String },

    /// Loaded apps as a JSON array.
    List {
        #[serde(default)]
        verbose: bool,
    },

    StateChangeComplete {
        app_id: String,
        state_change_id: u64,
        #[serde(default = "default_success")]
        success: bool,
    },

    /// Stop the manager and end the session.
    Shutdown,
}

const fn default_success() -> bool {
    true
}

/// Answer to one [`ControlCommand`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ControlResponse {
    Ok {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
    },
    Error {
        /// Stable reason code, see [`LifecycleError::reason`].
        reason: String,
        message: String,
    },
}

impl ControlResponse {
    #[must_use]
    pub const fn ok() -> Self {
        Self::Ok { value: None }
    }

    #[must_use]
    pub const fn with_value(value: Value) -> Self {
        Self::Ok { value: Some(value) }
    }

    /// Response for a line that did not parse as a command.
    #[must_use]
    pub fn malformed(err: &serde_json::Error) -> Self {
        Self::Error {
            reason: "invalid_command".to_string(),
            message: err.to_string(),
        }
    }

    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

impl From<&LifecycleError> for ControlResponse {
    fn from(err: &LifecycleError) -> Self {
        Self::Error {
            reason: err.reason().to_string(),
            message: err.to_string(),
        }
    }
}
