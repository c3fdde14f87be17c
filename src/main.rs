//! Command console for the lifecycle core.
//!
//! Runs a [`LifecycleManager`] against the loopback collaborators and speaks
//! the JSON-lines control protocol on stdio:
//!
//! ```text
//! stdin  → ControlCommand per line
//! stdout ← ControlResponse per command, Notification lines as they happen
//! stderr ← tracing output
//! ```
//!
//! The session ends on a `shutdown` command or at end of input.

#![allow(clippy::multiple_crate_versions)]

use clap::Parser;
use crossbeam_channel::Receiver;
use lifecycle_manager::collaborators::{LoopbackRuntime, LoopbackWindow};
use lifecycle_manager::control::{handle_command, ControlCommand, ControlResponse};
use lifecycle_manager::events::{event_channel, ChannelListener, Notification};
use lifecycle_manager::infrastructure::expand_tilde;
use lifecycle_manager::{initialize, Config, LifecycleManager};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

#[derive(Debug, Parser)]
#[command(name = "lifecycle-manager", version, about = "Application lifecycle console")]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<String>,

    /// Tracing filter, e.g. `debug` or `lifecycle_manager=trace`.
    #[arg(long)]
    trace_level: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match cli.config.as_deref() {
        Some(path) => match Config::from_toml_file(expand_tilde(path)) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("lifecycle-manager: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };
    if cli.trace_level.is_some() {
        config.trace_level = cli.trace_level;
    }

    let (publisher, inbox) = event_channel();
    let runtime = Arc::new(LoopbackRuntime::new(publisher.clone()));
    let window = Arc::new(LoopbackWindow::new(publisher));
    let manager = match initialize(&config, runtime, window, inbox) {
        Ok(manager) => manager,
        Err(e) => {
            eprintln!("lifecycle-manager: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (tx, rx) = crossbeam_channel::unbounded();
    manager.add_listener(Arc::new(ChannelListener::new(tx)));
    let printer = thread::Builder::new()
        .name("lifecycle-notify".to_string())
        .spawn(move || print_notifications(&rx));

    let status = run_session(&manager);
    manager.shutdown();
    drop(manager);
    if let Ok(printer) = printer {
        let _ = printer.join();
    }

    match status {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("lifecycle-manager: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_session(manager: &LifecycleManager) -> io::Result<()> {
    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let (response, done) = match serde_json::from_str::<ControlCommand>(&line) {
            Ok(command) => {
                let done = command == ControlCommand::Shutdown;
                (handle_command(manager, command), done)
            }
            Err(e) => (ControlResponse::malformed(&e), false),
        };
        emit(&response)?;
        if done {
            break;
        }
    }
    Ok(())
}

/// Runs until every listener sender is gone, i.e. the manager was dropped.
fn print_notifications(rx: &Receiver<Notification>) {
    for notification in rx {
        if emit(&notification).is_err() {
            break;
        }
    }
}

fn emit(value: &impl Serialize) -> io::Result<()> {
    let line = serde_json::to_string(value)?;
    let mut out = io::stdout().lock();
    writeln!(out, "{line}")?;
    out.flush()
}
