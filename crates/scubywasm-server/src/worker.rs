//! Child-process match workers.
//!
//! Each match runs in its own OS process -- an invocation of the
//! `scubywasm-run` binary -- so a guest that takes down its host (native
//! crash, runaway memory) kills one worker and nothing else. Children are
//! placed in their own process group: terminal signals aimed at the
//! coordinator never reach them, which is what lets in-flight matches drain
//! during a graceful shutdown instead of dying with a half-written log.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use scubywasm_match::GameLog;

use crate::ServerError;

/// Immutable inputs for one match submission.
#[derive(Debug, Clone)]
pub struct MatchJob<'a> {
    pub engine: &'a Path,
    pub agents: &'a [PathBuf],
    pub seed: u32,
    pub multiplicity: u32,
    pub max_ticks: u64,
    pub fuel_limit: Option<u64>,
}

/// Find the `scubywasm-run` binary: next to the current executable first,
/// falling back to `PATH` lookup.
pub fn locate_runner() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join("scubywasm-run");
            if candidate.is_file() {
                return candidate;
            }
        }
    }
    PathBuf::from("scubywasm-run")
}

/// Run one match to completion in a child process and parse its log.
///
/// The child's stdout carries the JSON log; stderr passes through to the
/// coordinator's. A non-zero exit or unparsable output is a
/// [`ServerError::Worker`].
pub fn run_match(runner: &Path, job: &MatchJob<'_>) -> Result<GameLog, ServerError> {
    let mut cmd = Command::new(runner);
    cmd.arg(job.engine)
        .args(job.agents)
        .arg("--seed")
        .arg(job.seed.to_string())
        .arg("--multiplicity")
        .arg(job.multiplicity.to_string())
        .arg("--max-ticks")
        .arg(job.max_ticks.to_string());
    if let Some(fuel) = job.fuel_limit {
        cmd.arg("--fuel-limit").arg(fuel.to_string());
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    // Workers ignore coordinator signals: own process group, no TTY signal
    // delivery.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    tracing::debug!(
        runner = %runner.display(),
        seed = job.seed,
        teams = job.agents.len(),
        "spawning match worker"
    );

    let output = cmd
        .output()
        .map_err(|e| ServerError::Worker(format!("failed to spawn {}: {e}", runner.display())))?;

    if !output.status.success() {
        return Err(ServerError::Worker(format!(
            "{} exited with {}",
            runner.display(),
            output.status
        )));
    }

    let log: GameLog = serde_json::from_slice(&output.stdout)
        .map_err(|e| ServerError::Worker(format!("unparsable worker output: {e}")))?;
    Ok(log)
}
