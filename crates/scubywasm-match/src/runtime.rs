//! The match runtime: construction, seeding, and the per-tick protocol.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use scubywasm_abi::{AgentId, Config, Pose};
use scubywasm_host::{AgentBinding, AgentParams, EngineBinding, DEFAULT_CONSTRUCTION_FUEL_FACTOR};

use crate::history::{round_to, GameLog, TeamHistory};
use crate::MatchError;

// ---------------------------------------------------------------------------
// MatchOptions
// ---------------------------------------------------------------------------

/// Tunables for one match.
#[derive(Debug, Clone)]
pub struct MatchOptions {
    /// Ships per team.
    pub multiplicity: u32,
    /// Master seed; `None` draws one from OS entropy.
    pub seed: Option<u64>,
    /// Config pushed into the engine; `None` uses the engine's defaults.
    pub config: Option<Config>,
    /// Per-tick fuel budget per agent; `None` disables metering.
    pub fuel_limit: Option<u64>,
    /// Per-agent memory ceiling in bytes; `None` leaves stores unlimited.
    pub memory_limit: Option<usize>,
    /// Explicit initial poses (exactly N·M, in registration order);
    /// `None` generates the seeded grid layout.
    pub init_poses: Option<Vec<Pose>>,
    /// Multiplier on the fuel limit for the agent construction window.
    pub construction_fuel_factor: u64,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            multiplicity: 1,
            seed: None,
            config: None,
            fuel_limit: None,
            memory_limit: Some(64_000_000),
            init_poses: None,
            construction_fuel_factor: DEFAULT_CONSTRUCTION_FUEL_FACTOR,
        }
    }
}

// ---------------------------------------------------------------------------
// MatchRuntime
// ---------------------------------------------------------------------------

/// One team: its agent instance and the ids of its ships.
struct Team {
    agent: AgentBinding,
    ids: Vec<AgentId>,
}

impl std::fmt::Debug for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Team")
            .field("agent", &self.agent)
            .field("ids", &self.ids)
            .finish()
    }
}

/// Drives one match: a single-threaded engine, N agent sandboxes, and the
/// append-only history log.
#[derive(Debug)]
pub struct MatchRuntime {
    engine: EngineBinding,
    teams: Vec<Team>,
    history: Vec<TeamHistory>,
    ticks: u64,
    fuel_limit: Option<u64>,
}

impl MatchRuntime {
    /// Build a match: engine first, then per-agent seeds, then agents, then
    /// initial poses, then registration -- all seeded draws in that fixed
    /// order so one seed reproduces the whole initial configuration.
    pub fn new(
        engine_wasm: &[u8],
        agent_wasms: &[Vec<u8>],
        options: MatchOptions,
    ) -> Result<Self, MatchError> {
        let n = agent_wasms.len();
        let m = options.multiplicity as usize;

        let mut engine = EngineBinding::new(engine_wasm, options.config)?;
        let config = engine.config();

        let mut rng = match options.seed {
            Some(seed) => Pcg64::seed_from_u64(seed),
            None => Pcg64::from_entropy(),
        };

        // One 32-bit seed per agent, in team order, before any pose draw.
        let seeds: Vec<u32> = (0..n).map(|_| rng.gen_range(1..=u32::MAX)).collect();

        let mut agents = Vec::with_capacity(n);
        for (team, wasm) in agent_wasms.iter().enumerate() {
            let params = AgentParams {
                n_agents_total: (n * m) as i32,
                multiplicity: m as i32,
                seed: seeds[team],
                config,
                fuel_limit: options.fuel_limit,
                memory_limit: options.memory_limit,
                construction_fuel_factor: options.construction_fuel_factor,
            };
            let agent = AgentBinding::new(wasm, params)
                .map_err(|source| MatchError::AgentConstruction { team, source })?;
            if agent.trapped() {
                tracing::warn!(team, "agent trapped during initialization");
            }
            agents.push(agent);
        }

        let poses = match options.init_poses {
            Some(poses) => {
                if poses.len() != n * m {
                    return Err(MatchError::PoseCount {
                        expected: n * m,
                        got: poses.len(),
                    });
                }
                poses
            }
            None => spawn_poses(n * m, &mut rng),
        };

        let mut ids = Vec::with_capacity(n * m);
        for pose in &poses {
            ids.push(engine.add_agent(*pose)?);
        }

        let teams: Vec<Team> = agents
            .into_iter()
            .enumerate()
            .map(|(i, agent)| Team {
                agent,
                ids: ids[i * m..(i + 1) * m].to_vec(),
            })
            .collect();
        let history = teams.iter().map(|team| TeamHistory::new(&team.ids)).collect();

        tracing::debug!(
            teams = n,
            multiplicity = m,
            fuel_limit = ?options.fuel_limit,
            "match constructed"
        );

        Ok(Self {
            engine,
            teams,
            history,
            ticks: 0,
            fuel_limit: options.fuel_limit,
        })
    }

    /// The authoritative match configuration.
    pub fn config(&self) -> Config {
        self.engine.config()
    }

    /// Ticks the engine has advanced so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run one round of the per-tick protocol, returning the number of
    /// teams still alive.
    ///
    /// Phases, in strict order: (A) refuel and reset observations, (B)
    /// observe every id and broadcast to every agent, (C) collect actions,
    /// (D) log fuel, (E) advance the engine by `n_times` ticks -- skipped
    /// (physics frozen) when at most one team remains, so the caller can
    /// end the match with the final observation still logged.
    ///
    /// # Errors
    ///
    /// Only engine traps; agent failures latch the agent and the tick
    /// completes.
    pub fn tick(&mut self, n_times: u32) -> Result<usize, MatchError> {
        // Phase A -- refuel & reset observations.
        for team in &mut self.teams {
            team.agent.refuel();
            team.agent.clear_world_state();
        }

        // Phase B -- observe & broadcast, team index asc, then id asc.
        let n_teams = self.teams.len();
        let mut team_alive = vec![false; n_teams];
        for t in 0..n_teams {
            let ids = self.teams[t].ids.clone();
            let mut team_score = 0i32;
            for &id in &ids {
                let alive = self.engine.is_alive(id)?;
                let ship = self.engine.ship_pose(id)?;
                let (shot, lifetime) = self.engine.shot_pose(id)?;
                let score = self.engine.score(id)?;

                team_alive[t] |= alive;
                team_score += score;

                self.history[t].record_ship(id, ship, alive);
                self.history[t].record_shot(id, shot, lifetime);

                // Every agent sees every id, the owning team included.
                for team in &mut self.teams {
                    team.agent.update_ship(id, alive, ship);
                    team.agent.update_shot(id, lifetime, shot);
                    team.agent.update_score(id, score);
                }
            }
            self.history[t].scores.push(team_score);
        }

        // Phase C -- actions, same total order; trapped or silent agents
        // are substituted with 0.
        let tick_no = self.ticks as i32;
        for t in 0..n_teams {
            let ids = self.teams[t].ids.clone();
            for &id in &ids {
                let action = self.teams[t].agent.make_action(id, tick_no).unwrap_or(0);
                self.history[t].record_action(id, action);
                self.engine.set_action(id, action)?;
            }
        }

        // Phase D -- log fuel.
        for t in 0..n_teams {
            let fuel = self.teams[t].agent.fuel();
            self.history[t].fuel.push(fuel);
        }

        // Phase E -- advance or freeze.
        let teams_alive = team_alive.iter().filter(|&&alive| alive).count();
        if teams_alive > 1 {
            self.engine.tick(n_times as i32)?;
            self.ticks += u64::from(n_times);
        }

        Ok(teams_alive)
    }

    /// Tick until at most one team is alive or `max_ticks` rounds have run.
    /// Returns the last observed alive-team count.
    pub fn run_to_completion(&mut self, max_ticks: u64) -> Result<usize, MatchError> {
        let mut teams_alive = self.teams.len();
        for _ in 0..max_ticks {
            teams_alive = self.tick(1)?;
            if teams_alive <= 1 {
                break;
            }
        }
        Ok(teams_alive)
    }

    /// Snapshot the history log.
    pub fn log(&self) -> GameLog {
        GameLog {
            ticks: self.ticks,
            ship_hit_radius: round_to(self.engine.config().ship_hit_radius, 3),
            history: self.history.clone(),
        }
    }

    /// Whether any team's fuel meter is running.
    pub fn fuel_metering(&self) -> bool {
        self.fuel_limit.is_some()
    }
}

// ---------------------------------------------------------------------------
// Initial poses
// ---------------------------------------------------------------------------

/// Generate `count` spawn poses on a jittered `G×G` grid, `G = ceil(√count)`,
/// shuffled and truncated. Draw order per cell is x-jitter, y-jitter,
/// heading; one shuffle follows.
fn spawn_poses(count: usize, rng: &mut Pcg64) -> Vec<Pose> {
    if count == 0 {
        return Vec::new();
    }

    let grid = (count as f64).sqrt().ceil() as usize;
    let spacing = 1.0 / grid as f32;

    let mut poses = Vec::with_capacity(grid * grid);
    for i in 0..grid {
        for j in 0..grid {
            let x = (i as f32 + rng.gen_range(0.4..0.6)) * spacing;
            let y = (j as f32 + rng.gen_range(0.4..0.6)) * spacing;
            let heading = rng.gen_range(0.0..360.0);
            poses.push(Pose { x, y, heading });
        }
    }

    poses.shuffle(rng);
    poses.truncate(count);
    poses
}
