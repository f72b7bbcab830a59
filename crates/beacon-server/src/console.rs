//! Operator console on stdin.
//!
//! Runs on a plain thread with blocking reads, so a pending read never holds
//! up runtime shutdown.

use std::io::BufRead;
use std::sync::Arc;

use beacon_core::{EventQueue, SubscriberRegistry};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Quit,
    Empty,
    Unknown(String),
}

impl Command {
    #[must_use]
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Command::Empty,
            "s" | "status" => Command::Status,
            "q" | "quit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// Read commands from `input` until `quit` or end of input.
pub fn run_console<R: BufRead>(
    input: R,
    queue: &EventQueue,
    registry: &SubscriberRegistry,
    shutdown: &watch::Sender<bool>,
) {
    info!("Console ready: 's' for status, 'q' to quit");

    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Console read failed");
                return;
            }
        };

        match Command::parse(&line) {
            Command::Status => info!(
                pending_events = queue.len(),
                subscribers = registry.len(),
                "Status"
            ),
            Command::Quit => {
                info!("Shutdown requested from console");
                shutdown.send_replace(true);
                return;
            }
            Command::Empty => {}
            Command::Unknown(other) => warn!(command = %other, "Unknown command"),
        }
    }

    debug!("Console input closed");
}

/// Run the console on stdin in a background thread.
///
/// # Errors
///
/// Returns an error if the thread cannot be spawned.
pub fn spawn_stdin_console(
    queue: Arc<EventQueue>,
    registry: Arc<SubscriberRegistry>,
    shutdown: Arc<watch::Sender<bool>>,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("beacon-console".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            run_console(stdin.lock(), &queue, &registry, &shutdown);
        })
        .map(|_| ())
}
