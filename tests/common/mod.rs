//! Shared harness for lifecycle integration tests.
//!
//! [`Harness`] runs a real [`LifecycleManager`] against scripted
//! collaborators whose behavior each test can bend (stay silent, fail, hold
//! back frames or readiness), and records every notification on channels
//! that tests read with a timeout.

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use lifecycle_manager::collaborators::{
    ContainerState, RunRequest, RuntimeCollaborator, RuntimeEvent, WindowCollaborator,
    WindowEvent,
};
use lifecycle_manager::events::{event_channel, EventPublisher};
use lifecycle_manager::{
    ApplicationContext, Config, LifecycleError, LifecycleListener, LifecycleManager,
    LifecycleState, Result, StateChange,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long a test waits for something that should happen.
pub const PATIENCE: Duration = Duration::from_secs(5);

/// Timeouts short enough that failure paths finish quickly.
pub fn fast_config() -> Config {
    Config {
        completion_timeout_ms: 500,
        first_frame_timeout_ms: 300,
        kill_timeout_ms: 300,
        ..Config::default()
    }
}

// ============================================================================
// Scripted runtime
// ============================================================================

/// Runtime collaborator that acknowledges calls unless told otherwise.
pub struct ScriptedRuntime {
    publisher: EventPublisher,
    containers: Mutex<HashMap<String, ContainerState>>,
    calls: Mutex<Vec<String>>,
    runs: Mutex<Vec<RunRequest>>,
    intents: Mutex<Vec<(String, String)>>,
    /// Accept every call but never publish an event.
    pub silent: AtomicBool,
    /// Fail `run` outright.
    pub fail_run: AtomicBool,
    /// Publish `Started` on run but leave readiness to `state_change_complete`.
    pub manual_ready: AtomicBool,
    /// Accept graceful terminates without stopping the container.
    pub ignore_terminate: AtomicBool,
    /// Report a crash from inside `kill` and return only after the router saw it.
    pub crash_on_kill: AtomicBool,
}

impl ScriptedRuntime {
    pub fn new(publisher: EventPublisher) -> Self {
        Self {
            publisher,
            containers: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            runs: Mutex::new(Vec::new()),
            intents: Mutex::new(Vec::new()),
            silent: AtomicBool::new(false),
            fail_run: AtomicBool::new(false),
            manual_ready: AtomicBool::new(false),
            ignore_terminate: AtomicBool::new(false),
            crash_on_kill: AtomicBool::new(false),
        }
    }

    /// Calls received so far, as `"<call> <instance>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn runs(&self) -> Vec<RunRequest> {
        self.runs.lock().clone()
    }

    pub fn intents(&self) -> Vec<(String, String)> {
        self.intents.lock().clone()
    }

    pub fn has_container(&self, app_instance_id: &str) -> bool {
        self.containers.lock().contains_key(app_instance_id)
    }

    fn record(&self, call: &str, app_instance_id: &str) -> bool {
        self.calls.lock().push(format!("{call} {app_instance_id}"));
        !self.silent.load(Ordering::SeqCst)
    }

    fn move_to(&self, app_instance_id: &str, call: &str, state: ContainerState) -> Result<()> {
        if !self.record(call, app_instance_id) {
            return Ok(());
        }
        if let Some(current) = self.containers.lock().get_mut(app_instance_id) {
            *current = state;
        }
        self.publisher.publish(RuntimeEvent::StateChanged {
            app_instance_id: app_instance_id.to_string(),
            state,
        });
        Ok(())
    }

    fn stop(&self, app_instance_id: &str) {
        self.containers.lock().remove(app_instance_id);
        self.publisher.publish(RuntimeEvent::Terminated {
            app_instance_id: app_instance_id.to_string(),
        });
    }
}

impl RuntimeCollaborator for ScriptedRuntime {
    fn run(&self, request: &RunRequest) -> Result<()> {
        self.runs.lock().push(request.clone());
        let id = request.app_instance_id.as_str();
        if self.fail_run.load(Ordering::SeqCst) {
            self.record("run", id);
            return Err(LifecycleError::Collaborator("scripted run failure".to_string()));
        }
        if !self.record("run", id) {
            return Ok(());
        }

        self.containers
            .lock()
            .insert(id.to_string(), ContainerState::Running);
        self.publisher.publish(RuntimeEvent::Started {
            app_instance_id: id.to_string(),
        });
        if !self.manual_ready.load(Ordering::SeqCst) {
            self.publisher.publish(RuntimeEvent::StateChanged {
                app_instance_id: id.to_string(),
                state: ContainerState::Running,
            });
        }
        Ok(())
    }

    fn terminate(&self, app_instance_id: &str) -> Result<()> {
        if self.record("terminate", app_instance_id) && !self.ignore_terminate.load(Ordering::SeqCst) {
            self.stop(app_instance_id);
        }
        Ok(())
    }

    fn kill(&self, app_instance_id: &str) -> Result<()> {
        if self.crash_on_kill.load(Ordering::SeqCst) {
            self.record("kill", app_instance_id);
            self.containers.lock().remove(app_instance_id);
            self.publisher.publish(RuntimeEvent::Failure {
                app_instance_id: app_instance_id.to_string(),
                error_code: 9,
            });
            std::thread::sleep(Duration::from_millis(100));
            return Ok(());
        }
        if self.record("kill", app_instance_id) {
            self.stop(app_instance_id);
        }
        Ok(())
    }

    fn suspend(&self, app_instance_id: &str) -> Result<()> {
        self.move_to(app_instance_id, "suspend", ContainerState::Suspended)
    }

    fn resume(&self, app_instance_id: &str) -> Result<()> {
        self.move_to(app_instance_id, "resume", ContainerState::Running)
    }

    fn hibernate(&self, app_instance_id: &str) -> Result<()> {
        self.move_to(app_instance_id, "hibernate", ContainerState::Hibernated)
    }

    fn wake(&self, app_instance_id: &str) -> Result<()> {
        self.move_to(app_instance_id, "wake", ContainerState::Suspended)
    }

    fn deliver_intent(&self, app_instance_id: &str, intent: &str) -> Result<()> {
        self.record("intent", app_instance_id);
        self.intents
            .lock()
            .push((app_instance_id.to_string(), intent.to_string()));
        Ok(())
    }
}

// ============================================================================
// Scripted window manager
// ============================================================================

/// Window collaborator that can hold back first frames.
pub struct ScriptedWindow {
    publisher: EventPublisher,
    next_client: AtomicU64,
    displays: Mutex<HashMap<String, String>>,
    /// Never report a rendered frame on its own.
    pub hold_frames: AtomicBool,
}

impl ScriptedWindow {
    pub fn new(publisher: EventPublisher) -> Self {
        Self {
            publisher,
            next_client: AtomicU64::new(1),
            displays: Mutex::new(HashMap::new()),
            hold_frames: AtomicBool::new(false),
        }
    }

    /// Reports the first frame for the instance's display.
    pub fn release_frame(&self, app_instance_id: &str) {
        let client = self.displays.lock().get(app_instance_id).cloned();
        if let Some(client) = client {
            self.publisher.publish(WindowEvent::Ready { client });
        }
    }

    /// Drops the instance's display and reports the disconnect.
    pub fn disconnect(&self, app_instance_id: &str) {
        let client = self.displays.lock().remove(app_instance_id);
        if let Some(client) = client {
            self.publisher.publish(WindowEvent::Disconnected { client });
        }
    }
}

impl WindowCollaborator for ScriptedWindow {
    fn create_display(&self, app_instance_id: &str) -> Result<String> {
        let client = format!("client-{}", self.next_client.fetch_add(1, Ordering::SeqCst));
        self.displays
            .lock()
            .insert(app_instance_id.to_string(), client.clone());
        if !self.hold_frames.load(Ordering::SeqCst) {
            self.publisher.publish(WindowEvent::Ready {
                client: client.clone(),
            });
        }
        Ok(client)
    }

    fn render_ready(&self, app_instance_id: &str) -> Result<bool> {
        Ok(!self.hold_frames.load(Ordering::SeqCst)
            && self.displays.lock().contains_key(app_instance_id))
    }
}

// ============================================================================
// Recording listener
// ============================================================================

/// Listener that forwards every notification onto channels.
pub struct Recorder {
    outcomes: Sender<StateChange>,
    edges: Sender<StateChange>,
    inactivity: Sender<f64>,
}

impl LifecycleListener for Recorder {
    fn on_app_state_changed(&self, change: &StateChange) {
        let _ = self.outcomes.send(change.clone());
    }

    fn on_app_lifecycle_state_changed(&self, change: &StateChange) {
        let _ = self.edges.send(change.clone());
    }

    fn on_user_inactivity(&self, minutes: f64) {
        let _ = self.inactivity.send(minutes);
    }
}

/// Receiving side of a [`Recorder`].
pub struct Recording {
    pub outcomes: Receiver<StateChange>,
    pub edges: Receiver<StateChange>,
    pub inactivity: Receiver<f64>,
}

impl Recording {
    /// Next `on_app_state_changed`, panicking if none arrives in time.
    pub fn next_outcome(&self) -> StateChange {
        self.outcomes
            .recv_timeout(PATIENCE)
            .expect("no app state change notification")
    }

    pub fn next_edge(&self) -> StateChange {
        self.edges
            .recv_timeout(PATIENCE)
            .expect("no lifecycle state change notification")
    }

    /// `true` if no outcome arrives within `window`.
    pub fn quiet_for(&self, window: Duration) -> bool {
        matches!(
            self.outcomes.recv_timeout(window),
            Err(RecvTimeoutError::Timeout)
        )
    }

    /// Every edge notification received so far.
    pub fn drain_edges(&self) -> Vec<StateChange> {
        self.edges.try_iter().collect()
    }
}

fn recorder() -> (Arc<Recorder>, Recording) {
    let (outcomes_tx, outcomes) = unbounded();
    let (edges_tx, edges) = unbounded();
    let (inactivity_tx, inactivity) = unbounded();
    (
        Arc::new(Recorder {
            outcomes: outcomes_tx,
            edges: edges_tx,
            inactivity: inactivity_tx,
        }),
        Recording {
            outcomes,
            edges,
            inactivity,
        },
    )
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub manager: LifecycleManager,
    pub runtime: Arc<ScriptedRuntime>,
    pub window: Arc<ScriptedWindow>,
    /// Publisher for injecting collaborator events directly.
    pub publisher: EventPublisher,
    pub recording: Recording,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&fast_config())
    }

    pub fn with_config(config: &Config) -> Self {
        let (publisher, inbox) = event_channel();
        let runtime = Arc::new(ScriptedRuntime::new(publisher.clone()));
        let window = Arc::new(ScriptedWindow::new(publisher.clone()));
        let manager = LifecycleManager::start(
            config,
            Arc::clone(&runtime) as Arc<dyn RuntimeCollaborator>,
            Arc::clone(&window) as Arc<dyn WindowCollaborator>,
            inbox,
        )
        .expect("manager starts");

        let (listener, recording) = recorder();
        manager.add_listener(listener);
        Self {
            manager,
            runtime,
            window,
            publisher,
            recording,
        }
    }

    /// Launches `app_id` and waits for the launch to succeed.
    pub fn launch(&self, app_id: &str, target: LifecycleState) -> String {
        let id = self
            .manager
            .spawn_app(app_id, None, target, Default::default(), "")
            .expect("launch accepted");
        let outcome = self.recording.next_outcome();
        assert_eq!(outcome.app_instance_id, id);
        assert!(outcome.is_success(), "launch failed: {}", outcome.error_reason);
        assert_eq!(outcome.new_state, target);
        id
    }

    /// Polls the instance's context until `predicate` holds.
    pub fn wait_for(&self, app_instance_id: &str, predicate: impl Fn(&ApplicationContext) -> bool) -> ApplicationContext {
        let deadline = Instant::now() + PATIENCE;
        loop {
            if let Some(ctx) = self.manager.context(app_instance_id) {
                if predicate(&ctx) {
                    return ctx;
                }
            }
            assert!(Instant::now() < deadline, "condition on {app_instance_id} never held");
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}
