//! Scenario definitions, agent discovery, and the per-round state machine.
//!
//! A scenario is a named tuple of match parameters plus a round cap. The
//! service discovers agents under `<home>/<user>/agents/<name>/*.wasm`
//! (newest mtime wins per agent name) and restarts a scenario -- round
//! counter to zero, fresh timestamped results directory -- whenever the
//! lineup changes: a different name set, or any tracked `(mtime, size)`
//! pair.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::SystemTime;

use serde::Deserialize;

use scubywasm_match::MatchRecord;

use crate::logs::LogWriter;
use crate::worker::{run_match, MatchJob};
use crate::{idle_wait, ServerError};

// ---------------------------------------------------------------------------
// ScenarioSpec
// ---------------------------------------------------------------------------

/// One element of the scenario file: a JSON array of these objects.
/// All five keys are required; unknown keys are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioSpec {
    pub name: String,
    pub multiplicity: u32,
    pub max_ticks: u64,
    pub fuel_limit: u64,
    pub max_rounds: u32,
}

/// Parse and validate the scenario file.
///
/// Scenarios always run with fuel metering on, so `fuel_limit` is bounded
/// here the same way the CLI bounds its flag.
pub fn read_scenarios(path: &Path) -> Result<Vec<ScenarioSpec>, ServerError> {
    let text = fs::read_to_string(path)
        .map_err(|e| ServerError::Config(format!("scenario file {}: {e}", path.display())))?;
    let specs: Vec<ScenarioSpec> = serde_json::from_str(&text)
        .map_err(|e| ServerError::Config(format!("scenario file {}: {e}", path.display())))?;

    let mut names = std::collections::HashSet::new();
    for spec in &specs {
        if spec.name.is_empty() {
            return Err(ServerError::Config("scenario name must not be empty".into()));
        }
        if !names.insert(spec.name.clone()) {
            return Err(ServerError::Config(format!(
                "duplicate scenario name '{}'",
                spec.name
            )));
        }
        if spec.multiplicity < 1 {
            return Err(ServerError::Config(format!(
                "scenario '{}': multiplicity must be >= 1",
                spec.name
            )));
        }
        if spec.max_ticks < 1 {
            return Err(ServerError::Config(format!(
                "scenario '{}': max_ticks must be >= 1",
                spec.name
            )));
        }
        if spec.fuel_limit < 100 {
            return Err(ServerError::Config(format!(
                "scenario '{}': fuel_limit must be >= 100 (got {})",
                spec.name, spec.fuel_limit
            )));
        }
    }
    Ok(specs)
}

// ---------------------------------------------------------------------------
// Agent discovery
// ---------------------------------------------------------------------------

/// A discovered agent module and the fingerprint used for change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSource {
    pub path: PathBuf,
    pub mtime: SystemTime,
    pub size: u64,
    pub user: String,
}

/// Scan `<home_root>/<user>/agents/<name>/*.wasm`, keeping the newest file
/// per agent name. Unreadable entries are skipped.
pub fn gather_agents(home_root: &Path) -> BTreeMap<String, AgentSource> {
    let mut agents: BTreeMap<String, AgentSource> = BTreeMap::new();

    let Ok(users) = fs::read_dir(home_root) else {
        return agents;
    };
    for user_dir in users.flatten() {
        if !user_dir.path().is_dir() {
            continue;
        }
        let user = user_dir.file_name().to_string_lossy().into_owned();

        let Ok(agent_dirs) = fs::read_dir(user_dir.path().join("agents")) else {
            continue;
        };
        for agent_dir in agent_dirs.flatten() {
            if !agent_dir.path().is_dir() {
                continue;
            }
            let name = agent_dir.file_name().to_string_lossy().into_owned();

            let Ok(files) = fs::read_dir(agent_dir.path()) else {
                continue;
            };
            for file in files.flatten() {
                let path = file.path();
                if path.extension().map_or(true, |ext| ext != "wasm") || !path.is_file() {
                    continue;
                }
                let Ok(meta) = file.metadata() else {
                    continue;
                };
                let Ok(mtime) = meta.modified() else {
                    continue;
                };

                let newer = agents.get(&name).map_or(true, |known| mtime > known.mtime);
                if newer {
                    agents.insert(
                        name.clone(),
                        AgentSource {
                            path,
                            mtime,
                            size: meta.len(),
                            user: user.clone(),
                        },
                    );
                }
            }
        }
    }

    agents
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// Immutable context every scenario worker receives at spawn.
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    pub engine_wasm: PathBuf,
    pub results_dir: PathBuf,
    pub home_root: PathBuf,
    pub runner: PathBuf,
}

/// Long-running state of one scenario: the tracked lineup, the round
/// counter, and the current results directory.
pub struct Scenario {
    spec: ScenarioSpec,
    seed: u32,
    agents: BTreeMap<String, AgentSource>,
    round: u32,
    result_dir: Option<PathBuf>,
    notified: bool,
}

impl Scenario {
    /// The seed is drawn once and reused for every round, restarts included.
    pub fn new(spec: ScenarioSpec, seed: u32) -> Self {
        Self {
            spec,
            seed,
            agents: BTreeMap::new(),
            round: 0,
            result_dir: None,
            notified: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Current round counter (resets on restart).
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Whether the discovered lineup differs from the tracked one.
    fn needs_restart(&self, discovered: &BTreeMap<String, AgentSource>) -> bool {
        if discovered.len() != self.agents.len() {
            return true;
        }
        for (name, source) in discovered {
            match self.agents.get(name) {
                None => return true,
                Some(known) => {
                    if known.mtime != source.mtime || known.size != source.size {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// One iteration of the scenario loop: discover, maybe restart, and --
    /// unless idle -- copy the lineup into the results directory, run one
    /// match, and persist its log.
    pub fn run_round(&mut self, ctx: &ScenarioContext, stop: &AtomicBool) -> Result<(), ServerError> {
        let discovered = gather_agents(&ctx.home_root);

        if discovered.is_empty() {
            self.round = 0;
            self.agents.clear();
            if !self.notified {
                tracing::warn!(scenario = %self.spec.name, "no agents found, sleeping");
                self.notified = true;
            }
            idle_wait(stop, 5);
            return Ok(());
        }

        if self.result_dir.is_none() || self.needs_restart(&discovered) {
            self.round = 0;
            self.agents = discovered;
            let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f").to_string();
            let dir = ctx.results_dir.join(&self.spec.name).join(stamp);
            fs::create_dir_all(&dir)?;
            tracing::info!(
                scenario = %self.spec.name,
                results = %dir.display(),
                agents = self.agents.len(),
                "scenario (re)started"
            );
            self.result_dir = Some(dir);
        } else if self.round >= self.spec.max_rounds {
            if !self.notified {
                tracing::info!(scenario = %self.spec.name, "reached max rounds, sleeping");
                self.notified = true;
            }
            idle_wait(stop, 5);
            return Ok(());
        }
        self.notified = false;

        let Some(result_dir) = self.result_dir.clone() else {
            return Ok(());
        };

        // Snapshot the lineup into the results directory, once per file.
        let mut team_files = Vec::with_capacity(self.agents.len());
        for (name, source) in &self.agents {
            let stem = source
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let dest = result_dir.join(format!("{}-{}-{}.wasm", source.user, name, stem));
            if !dest.exists() {
                fs::copy(&source.path, &dest)?;
            }
            team_files.push(dest);
        }

        let job = MatchJob {
            engine: &ctx.engine_wasm,
            agents: &team_files,
            seed: self.seed,
            multiplicity: self.spec.multiplicity,
            max_ticks: self.spec.max_ticks,
            fuel_limit: Some(self.spec.fuel_limit),
        };
        let log = run_match(&ctx.runner, &job)?;

        let teams = team_files
            .iter()
            .map(|p| {
                p.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
            .collect();

        // Fresh writer per round: re-scans indices left by earlier rounds.
        let mut writer = LogWriter::new(&result_dir, true)?;
        writer.save(&MatchRecord::new(teams, log))?;

        self.round += 1;
        Ok(())
    }
}
