//! The long-running scenario service.
//!
//! One worker per scenario drives the discover/restart/run-round loop; each
//! worker holds its immutable [`ScenarioContext`] for its lifetime. A round
//! that fails (worker crash, unwritable results) is reported and the loop
//! continues; only the stop flag ends it.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::scenario::{Scenario, ScenarioContext, ScenarioSpec};
use crate::worker::locate_runner;
use crate::{idle_wait, ServerError};

/// Service settings, fixed for the session.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub engine_wasm: PathBuf,
    pub results_dir: PathBuf,
    /// Root of the user-home tree scanned for agents (normally `/home`).
    pub home_root: PathBuf,
}

/// Runs every scenario in parallel until the stop flag flips.
pub struct Service {
    config: ServiceConfig,
}

impl Service {
    pub fn new(config: ServiceConfig) -> Self {
        Self { config }
    }

    /// Verify the results directory exists and is writable before any
    /// scenario starts.
    fn preflight(&self) -> Result<(), ServerError> {
        fs::create_dir_all(&self.config.results_dir)?;
        if !self.config.results_dir.is_dir() {
            return Err(ServerError::Config(format!(
                "results path {} is not a directory",
                self.config.results_dir.display()
            )));
        }
        tempfile::tempfile_in(&self.config.results_dir).map_err(|e| {
            ServerError::Config(format!(
                "results path {} is not writable: {e}",
                self.config.results_dir.display()
            ))
        })?;
        Ok(())
    }

    /// Drive one worker per scenario until `stop` is set. Each scenario's
    /// in-flight round drains before its worker exits.
    pub fn run(&self, specs: Vec<ScenarioSpec>, stop: Arc<AtomicBool>) -> Result<(), ServerError> {
        self.preflight()?;

        let ctx = ScenarioContext {
            engine_wasm: self.config.engine_wasm.clone(),
            results_dir: self.config.results_dir.clone(),
            home_root: self.config.home_root.clone(),
            runner: locate_runner(),
        };

        tracing::info!(
            scenarios = specs.len(),
            results = %self.config.results_dir.display(),
            "scenario service started"
        );

        let ctx = &ctx;
        let stop = stop.as_ref();

        std::thread::scope(|scope| {
            for spec in specs {
                scope.spawn(move || {
                    let mut scenario = Scenario::new(spec, rand::random());
                    while !stop.load(Ordering::SeqCst) {
                        if let Err(e) = scenario.run_round(ctx, stop) {
                            tracing::error!(
                                scenario = %scenario.name(),
                                round = scenario.round(),
                                error = %e,
                                "scenario round failed"
                            );
                            idle_wait(stop, 5);
                        }
                    }
                });
            }
        });

        tracing::info!("scenario service drained; shutting down");
        Ok(())
    }
}
