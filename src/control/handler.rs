//! Command dispatch onto a [`LifecycleManager`].

use super::messages::{ControlCommand, ControlResponse};
use crate::domain::Result;
use crate::LifecycleManager;
use serde_json::{json, Value};

/// Executes one command and converts the outcome into a response.
pub fn handle_command(manager: &LifecycleManager, command: ControlCommand) -> ControlResponse {
    let span = tracing::debug_span!("control_command", command = command_name(&command));
    let _guard = span.enter();

    match execute(manager, command) {
        Ok(Some(value)) => ControlResponse::with_value(value),
        Ok(None) => ControlResponse::ok(),
        Err(e) => {
            tracing::debug!(reason = e.reason(), error = %e, "command failed");
            ControlResponse::from(&e)
        }
    }
}

fn execute(manager: &LifecycleManager, command: ControlCommand) -> Result<Option<Value>> {
    match command {
        ControlCommand::Spawn {
            app_id,
            intent,
            target_state,
            runtime_config,
            launch_args,
        } => {
            let id = manager.spawn_app(
                &app_id,
                intent.as_deref(),
                target_state,
                runtime_config,
                &launch_args,
            )?;
            Ok(Some(json!({ "appInstanceId": id })))
        }
        ControlCommand::Unload { app_instance_id } => {
            manager.unload_app(&app_instance_id)?;
            Ok(None)
        }
        ControlCommand::Kill { app_instance_id } => {
            manager.kill_app(&app_instance_id)?;
            Ok(None)
        }
        ControlCommand::Close { app_id, reason } => {
            manager.close_app(&app_id, reason)?;
            Ok(None)
        }
        ControlCommand::SetState {
            app_instance_id,
            state,
            intent,
        } => {
            manager.set_target_app_state(&app_instance_id, state, intent.as_deref())?;
            Ok(None)
        }
        ControlCommand::SendIntent {
            app_instance_id,
            intent,
        } => {
            manager.send_intent(&app_instance_id, &intent)?;
            Ok(None)
        }
        ControlCommand::SendIntentToActive { intent } => {
            manager.send_intent_to_active_app(&intent)?;
            Ok(None)
        }
        ControlCommand::IsLoaded { app_id } => Ok(Some(Value::Bool(manager.is_app_loaded(&app_id)?))),
        ControlCommand::List { verbose } => {
            let listing = manager.get_loaded_apps(verbose)?;
            Ok(Some(serde_json::from_str(&listing)?))
        }
        ControlCommand::StateChangeComplete {
            app_id,
            state_change_id,
            success,
        } => {
            manager.state_change_complete(&app_id, state_change_id, success)?;
            Ok(None)
        }
        ControlCommand::Shutdown => {
            manager.shutdown();
            Ok(None)
        }
    }
}

const fn command_name(command: &ControlCommand) -> &'static str {
    match command {
        ControlCommand::Spawn { .. } => "spawn",
        ControlCommand::Unload { .. } => "unload",
        ControlCommand::Kill { .. } => "kill",
        ControlCommand::Close { .. } => "close",
        ControlCommand::SetState { .. } => "set_state",
        ControlCommand::SendIntent { .. } => "send_intent",
        ControlCommand::SendIntentToActive { .. } => "send_intent_to_active",
        ControlCommand::IsLoaded { .. } => "is_loaded",
        ControlCommand::List { .. } => "list",
        ControlCommand::StateChangeComplete { .. } => "state_change_complete",
        ControlCommand::Shutdown => "shutdown",
    }
}
