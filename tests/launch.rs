//! Launch path: loading, spawning, readiness and first frame.

mod common;

use common::{fast_config, Harness};
use lifecycle_manager::worker::SESSION_ID_KEY;
use lifecycle_manager::{Config, LaunchParams, LifecycleError, LifecycleState, RuntimeConfig};
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Harness whose waits outlast a test driving the collaborator by hand.
fn patient() -> Harness {
    Harness::with_config(&Config {
        completion_timeout_ms: 3_000,
        first_frame_timeout_ms: 3_000,
        ..fast_config()
    })
}

#[test]
fn launch_to_loading_reports_one_edge() {
    let h = Harness::new();
    let id = h
        .manager
        .spawn_app("com.test.app", None, LifecycleState::Loading, RuntimeConfig::default(), "")
        .unwrap();

    let outcome = h.recording.next_outcome();
    assert_eq!(outcome.app_id, "com.test.app");
    assert_eq!(outcome.app_instance_id, id);
    assert_eq!(outcome.old_state, LifecycleState::Unloaded);
    assert_eq!(outcome.new_state, LifecycleState::Loading);
    assert_eq!(outcome.error_reason, "");

    let edge = h.recording.next_edge();
    assert_eq!((edge.old_state, edge.new_state), (LifecycleState::Unloaded, LifecycleState::Loading));
    assert!(h.recording.drain_edges().is_empty());

    assert!(h.manager.is_app_loaded("com.test.app").unwrap());
    assert!(h.runtime.runs().is_empty(), "loading must not start a container");
}

#[test]
fn launch_to_active_walks_every_edge_in_order() {
    let h = Harness::new();
    let id = h.launch("com.test.app", LifecycleState::Active);

    let edges: Vec<_> = (0..3).map(|_| h.recording.next_edge()).collect();
    let pairs: Vec<_> = edges.iter().map(|e| (e.old_state, e.new_state)).collect();
    assert_eq!(
        pairs,
        vec![
            (LifecycleState::Unloaded, LifecycleState::Loading),
            (LifecycleState::Loading, LifecycleState::Initializing),
            (LifecycleState::Initializing, LifecycleState::Active),
        ]
    );
    let ids: Vec<_> = edges.iter().map(|e| e.state_change_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let ctx = h.manager.context(&id).unwrap();
    assert_eq!(ctx.current_state(), LifecycleState::Active);
    assert_eq!(ctx.target_state(), LifecycleState::Active);
    assert_eq!(ctx.pending_requests(), 0);
    assert!(ctx.display_client().is_some());
    assert!(h.runtime.has_container(&id));
}

#[test]
fn one_notification_per_request() {
    let h = Harness::new();
    h.launch("com.test.app", LifecycleState::Paused);
    assert!(h.recording.quiet_for(Duration::from_millis(200)));
}

#[test]
fn run_request_merges_launch_and_runtime_settings() {
    let h = Harness::new();
    let params = LaunchParams {
        runtime_config: RuntimeConfig {
            group_id: Some(44),
            ports: vec![8080],
            environment: vec!["A=1".to_string()],
            ..RuntimeConfig::default()
        },
        environment: vec!["B=2".to_string()],
        debug: true,
        launch_args: "--fast".to_string(),
        ..LaunchParams::default()
    };
    h.manager
        .launch_app("com.test.app", LifecycleState::Paused, params)
        .unwrap();
    assert!(h.recording.next_outcome().is_success());

    let runs = h.runtime.runs();
    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.app_id, "com.test.app");
    assert_eq!(run.user_id, 1000);
    assert_eq!(run.group_id, 44);
    assert_eq!(run.ports, vec![8080]);
    assert_eq!(run.runtime_config.environment, vec!["B=2".to_string(), "A=1".to_string()]);
    assert!(run.debug_settings.enabled);
    assert_eq!(run.launch_args, "--fast");
}

#[test]
fn relaunch_that_spawns_uses_the_new_params() {
    let h = Harness::new();
    let id = h.launch("com.test.app", LifecycleState::Loading);

    let again = h
        .manager
        .spawn_app(
            "com.test.app",
            None,
            LifecycleState::Paused,
            RuntimeConfig {
                ports: vec![8080],
                ..RuntimeConfig::default()
            },
            "--second",
        )
        .unwrap();
    assert_eq!(again, id);
    assert!(h.recording.next_outcome().is_success());

    let runs = h.runtime.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].ports, vec![8080]);
    assert_eq!(runs[0].launch_args, "--second");
}

#[test]
fn session_id_comes_from_runtime_config() {
    let h = Harness::new();
    let mut runtime_config = RuntimeConfig::default();
    runtime_config
        .extra
        .insert(SESSION_ID_KEY.to_string(), "session-7".to_string());
    let params = LaunchParams {
        runtime_config,
        ..LaunchParams::default()
    };
    let id = h
        .manager
        .launch_app("com.test.app", LifecycleState::Paused, params)
        .unwrap();
    assert!(h.recording.next_outcome().is_success());
    assert_eq!(h.manager.context(&id).unwrap().active_session_id(), Some("session-7"));

    let verbose: serde_json::Value = serde_json::from_str(&h.manager.get_loaded_apps(true).unwrap()).unwrap();
    assert_eq!(verbose[0]["activeSessionId"], "session-7");

    h.manager.kill_app(&id).unwrap();
    assert!(h.recording.next_outcome().is_success());
    assert!(h.manager.context(&id).is_none());
}

#[test]
fn empty_app_id_is_rejected_without_enqueueing() {
    let h = Harness::new();
    let err = h
        .manager
        .spawn_app("", None, LifecycleState::Active, RuntimeConfig::default(), "")
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidArgument(_)));

    let err = h
        .manager
        .spawn_app("com.test.app", None, LifecycleState::Terminating, RuntimeConfig::default(), "")
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidArgument(_)));

    assert!(h.recording.quiet_for(Duration::from_millis(100)));
    assert_eq!(h.manager.get_loaded_apps(false).unwrap(), "[]");
}

#[test]
fn second_launch_while_pending_is_already_in_progress() {
    let h = Harness::new();
    h.runtime.silent.store(true, Ordering::SeqCst);

    let id = h
        .manager
        .spawn_app("com.test.app", None, LifecycleState::Active, RuntimeConfig::default(), "")
        .unwrap();
    let err = h
        .manager
        .spawn_app("com.test.app", None, LifecycleState::Active, RuntimeConfig::default(), "")
        .unwrap_err();
    assert!(matches!(err, LifecycleError::AlreadyInProgress(_)));

    let outcome = h.recording.next_outcome();
    assert_eq!(outcome.app_instance_id, id);
    assert_eq!(outcome.error_reason, "collaborator_timeout");
    assert_eq!(outcome.new_state, LifecycleState::Loading);
}

#[test]
fn relaunch_of_settled_context_keeps_instance_id() {
    let h = Harness::new();
    h.runtime.silent.store(true, Ordering::SeqCst);

    let first = h
        .manager
        .spawn_app("com.test.app", None, LifecycleState::Active, RuntimeConfig::default(), "")
        .unwrap();
    assert_eq!(h.recording.next_outcome().error_reason, "collaborator_timeout");

    let second = h
        .manager
        .spawn_app("com.test.app", None, LifecycleState::Loading, RuntimeConfig::default(), "")
        .unwrap();
    assert_eq!(first, second);

    let outcome = h.recording.next_outcome();
    assert!(outcome.is_success());
    assert_eq!((outcome.old_state, outcome.new_state), (LifecycleState::Loading, LifecycleState::Loading));
}

#[test]
fn silent_runtime_times_out_waiting_for_app_running() {
    let h = Harness::new();
    h.runtime.silent.store(true, Ordering::SeqCst);

    let id = h
        .manager
        .spawn_app("com.test.app", None, LifecycleState::Paused, RuntimeConfig::default(), "")
        .unwrap();
    let outcome = h.recording.next_outcome();
    assert_eq!(outcome.error_reason, "collaborator_timeout");

    // Nothing was started, so the teardown needs no runtime call.
    h.manager.kill_app(&id).unwrap();
    let outcome = h.recording.next_outcome();
    assert!(outcome.is_success());
    assert_eq!(outcome.new_state, LifecycleState::Unloaded);
    assert!(!h.manager.is_app_loaded("com.test.app").unwrap());
    assert_eq!(h.runtime.calls(), vec![format!("run {id}")]);
}

#[test]
fn failing_run_reports_collaborator_error() {
    let h = Harness::new();
    h.runtime.fail_run.store(true, Ordering::SeqCst);

    h.manager
        .spawn_app("com.test.app", None, LifecycleState::Active, RuntimeConfig::default(), "")
        .unwrap();
    let outcome = h.recording.next_outcome();
    assert_eq!(outcome.error_reason, "collaborator_error");
    assert_eq!(outcome.new_state, LifecycleState::Loading);
}

#[test]
fn activation_waits_for_first_frame() {
    let h = patient();
    h.window.hold_frames.store(true, Ordering::SeqCst);

    let id = h
        .manager
        .spawn_app("com.test.app", None, LifecycleState::Active, RuntimeConfig::default(), "")
        .unwrap();
    h.wait_for(&id, |ctx| ctx.display_client().is_some() && ctx.state_change_id() == 3);
    h.window.release_frame(&id);

    let outcome = h.recording.next_outcome();
    assert!(outcome.is_success(), "{}", outcome.error_reason);
    assert_eq!(outcome.new_state, LifecycleState::Active);
}

#[test]
fn missing_first_frame_times_out_in_initializing() {
    let h = Harness::new();
    h.window.hold_frames.store(true, Ordering::SeqCst);

    h.manager
        .spawn_app("com.test.app", None, LifecycleState::Active, RuntimeConfig::default(), "")
        .unwrap();
    let outcome = h.recording.next_outcome();
    assert_eq!(outcome.error_reason, "collaborator_timeout");
    assert_eq!(outcome.new_state, LifecycleState::Initializing);
}

#[test]
fn readiness_can_be_acknowledged_explicitly() {
    let h = patient();
    h.runtime.manual_ready.store(true, Ordering::SeqCst);

    let id = h
        .manager
        .spawn_app("com.test.app", None, LifecycleState::Paused, RuntimeConfig::default(), "")
        .unwrap();
    h.wait_for(&id, |ctx| ctx.state_change_id() == 3);

    let err = h.manager.state_change_complete("com.test.app", 2, true).unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidArgument(_)));
    let err = h.manager.state_change_complete("com.other.app", 3, true).unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound(_)));
    let err = h.manager.state_change_complete("", 3, true).unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidArgument(_)));

    h.manager.state_change_complete("com.test.app", 3, true).unwrap();
    let outcome = h.recording.next_outcome();
    assert!(outcome.is_success());
    assert_eq!(outcome.new_state, LifecycleState::Paused);
}

#[test]
fn negative_acknowledgement_fails_the_launch() {
    let h = patient();
    h.runtime.manual_ready.store(true, Ordering::SeqCst);

    let id = h
        .manager
        .spawn_app("com.test.app", None, LifecycleState::Paused, RuntimeConfig::default(), "")
        .unwrap();
    h.wait_for(&id, |ctx| ctx.state_change_id() == 3);

    h.manager.state_change_complete("com.test.app", 3, false).unwrap();
    let outcome = h.recording.next_outcome();
    assert_eq!(outcome.error_reason, "collaborator_error");
    assert_eq!(outcome.new_state, LifecycleState::Initializing);
}

#[test]
fn loaded_apps_listing() {
    let h = Harness::new();
    assert_eq!(h.manager.get_loaded_apps(true).unwrap(), "[]");

    h.manager
        .spawn_app("com.test.app", Some("home"), LifecycleState::Active, RuntimeConfig::default(), "--fast")
        .unwrap();
    let outcome = h.recording.next_outcome();
    assert!(outcome.is_success());
    assert_eq!(outcome.navigation_intent, "home");

    let brief: serde_json::Value = serde_json::from_str(&h.manager.get_loaded_apps(false).unwrap()).unwrap();
    assert_eq!(brief[0]["appId"], "com.test.app");
    assert_eq!(brief[0]["lifecycleState"], "ACTIVE");
    assert!(brief[0].get("targetState").is_none());

    let verbose: serde_json::Value = serde_json::from_str(&h.manager.get_loaded_apps(true).unwrap()).unwrap();
    let app = &verbose[0];
    assert_eq!(app["appInstanceId"], outcome.app_instance_id.as_str());
    assert_eq!(app["targetState"], "ACTIVE");
    assert_eq!(app["stateChangeId"], 3);
    assert_eq!(app["mostRecentIntent"], "home");
    assert_eq!(app["runtimeState"], "running");
    assert_eq!(app["launchArgs"], "--fast");
}

#[test]
fn managers_are_independent() {
    let a = Harness::new();
    let b = Harness::new();

    let in_a = a.launch("com.test.app", LifecycleState::Paused);
    let in_b = b.launch("com.test.app", LifecycleState::Paused);

    assert_ne!(in_a, in_b);
    assert!(a.manager.context(&in_b).is_none());
    assert!(b.manager.context(&in_a).is_none());
}
