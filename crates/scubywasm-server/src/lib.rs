//! Scubywasm server -- match supervision and the scenario service.
//!
//! Two long-running coordinators sit on top of the match runtime, both
//! driving matches as isolated child processes (the `scubywasm-run` binary)
//! so a guest that wedges its host takes down one worker, never the pool:
//!
//! - **[`Supervisor`]**: runs back-to-back matches against a directory of
//!   versioned team agents, persisting each finished log under monotonic
//!   `scubywasm-log_<n>.json` naming.
//! - **[`Service`]**: watches user home directories for agent modules and
//!   runs named scenarios in parallel, restarting a scenario (fresh results
//!   directory, round counter to zero) whenever its agent lineup changes.
//!
//! Shutdown is two-phase: coordinators flip a stop flag on the first
//! INT/TERM and stop scheduling, while in-flight matches drain -- worker
//! children live in their own process group and never see the signal.

#![deny(unsafe_code)]

pub mod agents;
pub mod logs;
pub mod scenario;
pub mod service;
pub mod supervisor;
pub mod worker;

pub use agents::select_team_agents;
pub use logs::LogWriter;
pub use scenario::{
    gather_agents, read_scenarios, AgentSource, Scenario, ScenarioContext, ScenarioSpec,
};
pub use service::{Service, ServiceConfig};
pub use supervisor::{Supervisor, SupervisorConfig};
pub use worker::{locate_runner, run_match, MatchJob};

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors surfaced by the supervisor and scenario service.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Filesystem failure: log write, agent read, directory creation.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A log or child-process payload failed to (de)serialize.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Invalid configuration (scenario file, unusable paths).
    #[error("{0}")]
    Config(String),

    /// A worker child process failed.
    #[error("worker failed: {0}")]
    Worker(String),
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Sleep for about `secs` seconds, waking early when `stop` flips.
pub(crate) fn idle_wait(stop: &AtomicBool, secs: u64) {
    for _ in 0..secs * 10 {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}
