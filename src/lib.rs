//! Lifecycle manager: application lifecycle core for a device app platform.
//!
//! The crate accepts launch, terminate, suspend, resume and hibernate requests
//! for applications, serializes them through one global queue, and drives each
//! application instance through a fixed state graph. Process spawning and
//! display compositing are delegated to two external collaborators, a runtime
//! (container) manager and a window manager, whose asynchronous callbacks are
//! rendezvoused with through per-context completion signals.

#![allow(clippy::multiple_crate_versions)]

//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Console binary (main.rs, control/)                 │  ← JSON lines on stdio
//! └─────────────────────────────────────────────────────┘
//!                        │
//! ┌─────────────────────────────────────────────────────┐
//! │  Application Layer (app/)                           │  ← LifecycleManager
//! │  - Request validation against projected state       │
//! │  - Context registry                                 │
//! └─────────────────────────────────────────────────────┘
//!         │                                         ↑
//! ┌───────────────────────────┐   ┌───────────────────────────┐
//! │ Worker Layer (worker/)    │   │ Event Layer (events/)     │
//! │ - Global FIFO + 1 thread  │   │ - Inbound event channel   │
//! │ - Transition table        │   │ - Router into contexts    │
//! │ - State executor          │   │ - Listener notifications  │
//! └───────────────────────────┘   └───────────────────────────┘
//!         │                                         ↑
//! ┌─────────────────────────────────────────────────────┐
//! │  Collaborators (collaborators/)                     │
//! │  - Runtime / window traits, loopback implementations│
//! └─────────────────────────────────────────────────────┘
//!                        │
//! ┌─────────────────────────────────────────────────────┐
//! │  Domain & Infrastructure                            │
//! │  - Context, states, signals, errors (domain/)       │
//! │  - Data directory (infrastructure/)                 │
//! │  - Tracing with OTLP file export (observability/)   │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`app`]: public facade, request handler, context registry
//! - [`collaborators`]: runtime and window traits plus loopback implementations
//! - [`control`]: JSON-lines control protocol used by the console binary
//! - [`domain`]: contexts, lifecycle states, completion signals, errors
//! - [`events`]: inbound event routing and outbound notifications
//! - [`infrastructure`]: platform paths
//! - [`worker`]: request queue, transition table, executor
//! - `observability`: tracing setup (internal)
//!
//! # Configuration
//!
//! ```toml
//! completion_timeout_ms = 5000
//! first_frame_timeout_ms = 5000
//! kill_timeout_ms = 2000
//! default_user_id = 1000
//! default_group_id = 1000
//! trace_level = "debug"
//! trace_file = "traces.jsonl"
//! trace_max_bytes = 10485760
//! trace_backups = 3
//! ```
//!
//! # Example
//!
//! ```no_run
//! use lifecycle_manager::collaborators::{LoopbackRuntime, LoopbackWindow};
//! use lifecycle_manager::events::event_channel;
//! use lifecycle_manager::{initialize, Config, LifecycleState, RuntimeConfig};
//! use std::sync::Arc;
//!
//! let (publisher, inbox) = event_channel();
//! let runtime = Arc::new(LoopbackRuntime::new(publisher.clone()));
//! let window = Arc::new(LoopbackWindow::new(publisher));
//! let manager = initialize(&Config::default(), runtime, window, inbox)?;
//!
//! let id = manager.spawn_app("com.test.app", None, LifecycleState::Active, RuntimeConfig::default(), "")?;
//! assert!(manager.is_app_loaded("com.test.app")?);
//! manager.kill_app(&id)?;
//! # Ok::<(), lifecycle_manager::LifecycleError>(())
//! ```

pub mod app;
pub mod collaborators;
pub mod control;
pub mod domain;
pub mod events;
pub mod infrastructure;
pub mod worker;

pub mod observability;

pub use app::LifecycleManager;
pub use domain::{
    AppCloseReason, ApplicationContext, LaunchParams, LifecycleError, LifecycleState,
    RequestType, Result, RuntimeConfig,
};
pub use events::{LifecycleListener, StateChange};

use collaborators::{RuntimeCollaborator, WindowCollaborator};
use events::EventInbox;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_COMPLETION_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_FIRST_FRAME_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_KILL_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_ID: u32 = 1_000;
const DEFAULT_TRACE_MAX_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_TRACE_BACKUPS: usize = 3;

/// Runtime configuration.
///
/// Built from a TOML file or from a flat string map handed over by a host
/// process. Missing or unparsable values fall back to defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// How long to wait for a collaborator to confirm an action.
    pub completion_timeout_ms: u64,

    /// How long to wait for the first rendered frame when activating.
    pub first_frame_timeout_ms: u64,

    /// How long to wait for the container to exit after escalating to a kill.
    pub kill_timeout_ms: u64,

    /// User id for containers whose runtime config names none.
    pub default_user_id: u32,

    /// Group id for containers whose runtime config names none.
    pub default_group_id: u32,

    /// Tracing filter directive, overridden by `RUST_LOG`. Default: `"info"`
    pub trace_level: Option<String>,

    /// OTLP JSON trace file. Spans are only exported when this is set.
    ///
    /// Relative paths resolve against [`infrastructure::get_data_dir`].
    pub trace_file: Option<PathBuf>,

    /// Size at which the trace file is rotated.
    pub trace_max_bytes: u64,

    /// Rotated trace files to keep.
    pub trace_backups: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            completion_timeout_ms: DEFAULT_COMPLETION_TIMEOUT_MS,
            first_frame_timeout_ms: DEFAULT_FIRST_FRAME_TIMEOUT_MS,
            kill_timeout_ms: DEFAULT_KILL_TIMEOUT_MS,
            default_user_id: DEFAULT_ID,
            default_group_id: DEFAULT_ID,
            trace_level: None,
            trace_file: None,
            trace_max_bytes: DEFAULT_TRACE_MAX_BYTES,
            trace_backups: DEFAULT_TRACE_BACKUPS,
        }
    }
}

impl Config {
    /// Parses configuration from a flat string map.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::collections::BTreeMap;
    /// use lifecycle_manager::Config;
    ///
    /// let mut map = BTreeMap::new();
    /// map.insert("completion_timeout_ms".to_string(), "250".to_string());
    /// map.insert("kill_timeout_ms".to_string(), "soon".to_string());
    ///
    /// let config = Config::from_map(&map);
    /// assert_eq!(config.completion_timeout_ms, 250);
    /// assert_eq!(config.kill_timeout_ms, 2000);
    /// ```
    #[must_use]
    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        fn parsed<T: std::str::FromStr>(map: &BTreeMap<String, String>, key: &str, default: T) -> T {
            map.get(key)
                .and_then(|s| s.trim().parse::<T>().ok())
                .unwrap_or(default)
        }

        let defaults = Self::default();
        Self {
            completion_timeout_ms: parsed(map, "completion_timeout_ms", defaults.completion_timeout_ms),
            first_frame_timeout_ms: parsed(map, "first_frame_timeout_ms", defaults.first_frame_timeout_ms),
            kill_timeout_ms: parsed(map, "kill_timeout_ms", defaults.kill_timeout_ms),
            default_user_id: parsed(map, "default_user_id", defaults.default_user_id),
            default_group_id: parsed(map, "default_group_id", defaults.default_group_id),
            trace_level: map.get("trace_level").cloned(),
            trace_file: map.get("trace_file").map(PathBuf::from),
            trace_max_bytes: parsed(map, "trace_max_bytes", defaults.trace_max_bytes),
            trace_backups: parsed(map, "trace_backups", defaults.trace_backups),
        }
    }

    /// Reads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `Config` if it is not valid TOML or
    /// names unknown keys.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| LifecycleError::Config(format!("{}: {e}", path.display())))
    }

    #[must_use]
    pub const fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }

    #[must_use]
    pub const fn first_frame_timeout(&self) -> Duration {
        Duration::from_millis(self.first_frame_timeout_ms)
    }

    #[must_use]
    pub const fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }
}

/// Initializes tracing and starts a lifecycle manager.
///
/// # Errors
///
/// Returns an error if the worker or router thread cannot be spawned.
pub fn initialize(
    config: &Config,
    runtime: Arc<dyn RuntimeCollaborator>,
    window: Arc<dyn WindowCollaborator>,
    inbox: EventInbox,
) -> Result<LifecycleManager> {
    observability::init_tracing(config);
    tracing::debug!("initializing lifecycle manager");
    LifecycleManager::start(config, runtime, window, inbox)
}
