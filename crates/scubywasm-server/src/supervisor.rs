//! Back-to-back match supervision.
//!
//! The coordinator owns a seeded RNG that hands every match a fresh 32-bit
//! seed, so a whole session is reproducible from one `--seed`. Worker slots
//! run in parallel; agents are re-selected before every submission, so team
//! version bumps land between matches without a restart.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use scubywasm_match::MatchRecord;

use crate::agents::{select_team_agents, team_label};
use crate::logs::LogWriter;
use crate::worker::{locate_runner, run_match, MatchJob};
use crate::{idle_wait, ServerError};

/// Supervisor settings, fixed for the session.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub engine_wasm: PathBuf,
    pub agents_dir: PathBuf,
    pub workers: u32,
    pub seed: u64,
    pub multiplicity: u32,
    pub max_ticks: u64,
    pub fuel_limit: Option<u64>,
    pub log_dir: PathBuf,
    pub verbose: bool,
}

/// Runs continuous matches until the stop flag flips.
pub struct Supervisor {
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self { config }
    }

    /// Drive `workers` parallel match loops until `stop` is set. In-flight
    /// matches drain; no new ones are submitted after the flag flips.
    pub fn run(&self, stop: Arc<AtomicBool>) -> Result<(), ServerError> {
        let runner = locate_runner();
        let writer = Mutex::new(LogWriter::new(&self.config.log_dir, self.config.verbose)?);
        let seed_rng = Mutex::new(Pcg64::seed_from_u64(self.config.seed));

        tracing::info!(
            workers = self.config.workers,
            agents_dir = %self.config.agents_dir.display(),
            log_dir = %self.config.log_dir.display(),
            "supervisor started"
        );

        let stop = stop.as_ref();
        let runner = runner.as_path();
        let writer = &writer;
        let seed_rng = &seed_rng;

        std::thread::scope(|scope| {
            for slot in 0..self.config.workers {
                scope.spawn(move || self.worker_loop(slot, runner, writer, seed_rng, stop));
            }
        });

        tracing::info!("supervisor drained; shutting down");
        Ok(())
    }

    fn worker_loop(
        &self,
        slot: u32,
        runner: &std::path::Path,
        writer: &Mutex<LogWriter>,
        seed_rng: &Mutex<Pcg64>,
        stop: &AtomicBool,
    ) {
        while !stop.load(Ordering::SeqCst) {
            let agents = match select_team_agents(&self.config.agents_dir) {
                Ok(agents) => agents,
                Err(e) => {
                    tracing::error!(slot, error = %e, "agent selection failed");
                    idle_wait(stop, 5);
                    continue;
                }
            };
            if agents.is_empty() {
                tracing::warn!(slot, "no agents found; nothing to run");
                idle_wait(stop, 5);
                continue;
            }

            let seed = {
                let mut rng = seed_rng.lock().unwrap_or_else(|e| e.into_inner());
                rng.gen::<u32>()
            };

            let job = MatchJob {
                engine: &self.config.engine_wasm,
                agents: &agents,
                seed,
                multiplicity: self.config.multiplicity,
                max_ticks: self.config.max_ticks,
                fuel_limit: self.config.fuel_limit,
            };

            match run_match(runner, &job) {
                Ok(log) => {
                    let teams = agents.iter().map(|p| team_label(p)).collect();
                    let record = MatchRecord::new(teams, log);
                    let mut writer = writer.lock().unwrap_or_else(|e| e.into_inner());
                    if let Err(e) = writer.save(&record) {
                        tracing::error!(slot, error = %e, "failed to save game log");
                    }
                }
                Err(e) => {
                    tracing::error!(slot, seed, error = %e, "worker failed");
                }
            }
        }
    }
}
