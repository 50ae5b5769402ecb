//! Typed facade over an agent module's ABI, with quotas and trap latching.
//!
//! An agent is untrusted: it may loop forever, overrun its memory, or trap
//! outright. The binding keeps all of that contained with two mechanisms:
//!
//! - **Fuel policy**: with a fuel limit F, the store is refilled to F at the
//!   start of every tick and never topped up mid-tick. Instantiation and
//!   `init_agent` run on a one-shot grace tank of `factor·F` (default
//!   [`DEFAULT_CONSTRUCTION_FUEL_FACTOR`]) to absorb one-time setup cost.
//! - **Trap latching**: the first failure of any guest entry moves the
//!   binding from [`AgentState::Ready`] to [`AgentState::Latched`], one-way.
//!   Latched, every method short-circuits without re-entering the guest:
//!   mutators become no-ops and `make_action` answers `None`.
//!
//! Module-level failures (bad bytes, unsatisfiable imports, missing exports)
//! are construction errors instead; those are fatal to the match.

use wasmtime::TypedFunc;

use scubywasm_abi::{Action, AgentId, Config, Pose};

use crate::sandbox::{Sandbox, SandboxSpec};
use crate::HostError;

/// Default multiplier applied to the fuel limit for the construction window.
pub const DEFAULT_CONSTRUCTION_FUEL_FACTOR: u64 = 100;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Everything an agent needs to come up.
#[derive(Debug, Clone, Copy)]
pub struct AgentParams {
    /// Total ships in the match (N teams × multiplicity).
    pub n_agents_total: i32,
    /// Ships per team.
    pub multiplicity: i32,
    /// Per-agent 32-bit seed derived from the master seed.
    pub seed: u32,
    /// The match configuration, pushed field-by-field after `init_agent`.
    pub config: Config,
    /// Per-tick fuel budget; `None` disables metering.
    pub fuel_limit: Option<u64>,
    /// Linear memory ceiling in bytes; `None` leaves the store unlimited.
    pub memory_limit: Option<usize>,
    /// Multiplier on `fuel_limit` for the construction window.
    pub construction_fuel_factor: u64,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Latching state of an agent binding. Transitions are one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgentState {
    /// Guest calls go through.
    Ready,
    /// A guest entry failed; every call is now a silent no-op.
    Latched,
}

/// Resolved agent exports.
struct AgentExports {
    init_agent: TypedFunc<(i32, i32, i32), i32>,
    set_config_parameter: TypedFunc<(i32, i32, f32), ()>,
    clear_world_state: TypedFunc<i32, ()>,
    update_ship: TypedFunc<(i32, i32, i32, f32, f32, f32), ()>,
    update_shot: TypedFunc<(i32, i32, i32, f32, f32, f32), ()>,
    update_score: TypedFunc<(i32, i32, i32), ()>,
    make_action: TypedFunc<(i32, i32, i32), i32>,
}

// ---------------------------------------------------------------------------
// AgentBinding
// ---------------------------------------------------------------------------

/// One agent instance bound to one agent context.
pub struct AgentBinding {
    sandbox: Sandbox,
    exports: AgentExports,
    ctx: i32,
    state: AgentState,
    fuel_limit: Option<u64>,
}

impl AgentBinding {
    /// Instantiate the agent, create its context, and push the config.
    ///
    /// A trap raised by guest code during `init_agent` or the config push
    /// latches the binding instead of failing: the agent stays in the match
    /// as a zero-substituted participant.
    ///
    /// # Errors
    ///
    /// Module-level failures only: compile, instantiation, missing or
    /// mis-typed exports.
    pub fn new(wasm: &[u8], params: AgentParams) -> Result<Self, HostError> {
        let fuel_metering = params.fuel_limit.is_some();
        let spec = SandboxSpec {
            fuel_metering,
            initial_fuel: params
                .fuel_limit
                .map(|f| f.saturating_mul(params.construction_fuel_factor)),
            memory_limit: params.memory_limit,
            wasi: true,
        };
        let mut sandbox = Sandbox::new(wasm, spec)?;

        let exports = AgentExports {
            init_agent: sandbox.typed_func("init_agent")?,
            set_config_parameter: sandbox.typed_func("set_config_parameter")?,
            clear_world_state: sandbox.typed_func("clear_world_state")?,
            update_ship: sandbox.typed_func("update_ship")?,
            update_shot: sandbox.typed_func("update_shot")?,
            update_score: sandbox.typed_func("update_score")?,
            make_action: sandbox.typed_func("make_action")?,
        };

        let mut agent = Self {
            sandbox,
            exports,
            ctx: 0,
            state: AgentState::Ready,
            fuel_limit: params.fuel_limit,
        };
        agent.initialize(&params);
        Ok(agent)
    }

    /// Run `init_agent` and push the five config parameters positionally.
    fn initialize(&mut self, params: &AgentParams) {
        let init = self.exports.init_agent.clone();
        let ctx = match self.sandbox.call(
            &init,
            (
                params.n_agents_total,
                params.multiplicity,
                params.seed as i32,
            ),
        ) {
            Ok(ctx) => ctx,
            Err(e) => {
                self.latch("init_agent", e);
                return;
            }
        };
        self.ctx = ctx;

        let set_param = self.exports.set_config_parameter.clone();
        for (index, value) in params.config.parameter_values().into_iter().enumerate() {
            if let Err(e) = self
                .sandbox
                .call(&set_param, (ctx, index as i32, value))
            {
                self.latch("set_config_parameter", e);
                return;
            }
        }
    }

    fn latch(&mut self, call: &'static str, error: HostError) {
        tracing::warn!(call, %error, "agent trapped; latching for the rest of the match");
        self.state = AgentState::Latched;
    }

    /// Whether this agent has latched.
    pub fn trapped(&self) -> bool {
        self.state == AgentState::Latched
    }

    /// Reset the fuel tank to the per-tick budget.
    ///
    /// No-op when latched or when metering is disabled.
    pub fn refuel(&mut self) {
        if self.state == AgentState::Latched {
            return;
        }
        let Some(limit) = self.fuel_limit else {
            return;
        };
        if let Err(e) = self.sandbox.set_fuel(limit) {
            self.latch("refuel", e);
        }
    }

    /// Remaining fuel, or `None` when metering is disabled.
    ///
    /// Still answers after a latch so the log keeps recording the drained
    /// tank.
    pub fn fuel(&self) -> Option<u64> {
        self.fuel_limit.map(|_| self.sandbox.fuel())
    }

    /// Drop all observations from the previous tick.
    pub fn clear_world_state(&mut self) {
        if self.state == AgentState::Latched {
            return;
        }
        let func = self.exports.clear_world_state.clone();
        if let Err(e) = self.sandbox.call(&func, self.ctx) {
            self.latch("clear_world_state", e);
        }
    }

    /// Broadcast one ship observation.
    pub fn update_ship(&mut self, id: AgentId, alive: bool, pose: Pose) {
        if self.state == AgentState::Latched {
            return;
        }
        let func = self.exports.update_ship.clone();
        let alive = if alive { 1 } else { 0 };
        if let Err(e) = self.sandbox.call(
            &func,
            (self.ctx, id.to_raw(), alive, pose.x, pose.y, pose.heading),
        ) {
            self.latch("update_ship", e);
        }
    }

    /// Broadcast one shot observation.
    pub fn update_shot(&mut self, id: AgentId, lifetime: i32, pose: Pose) {
        if self.state == AgentState::Latched {
            return;
        }
        let func = self.exports.update_shot.clone();
        if let Err(e) = self.sandbox.call(
            &func,
            (self.ctx, id.to_raw(), lifetime, pose.x, pose.y, pose.heading),
        ) {
            self.latch("update_shot", e);
        }
    }

    /// Broadcast one score observation.
    pub fn update_score(&mut self, id: AgentId, score: i32) {
        if self.state == AgentState::Latched {
            return;
        }
        let func = self.exports.update_score.clone();
        if let Err(e) = self.sandbox.call(&func, (self.ctx, id.to_raw(), score)) {
            self.latch("update_score", e);
        }
    }

    /// Ask the agent for `id`'s next action at `tick`.
    ///
    /// `None` when latched (before or during this call); the caller
    /// substitutes the engine's idle action.
    pub fn make_action(&mut self, id: AgentId, tick: i32) -> Option<Action> {
        if self.state == AgentState::Latched {
            return None;
        }
        let func = self.exports.make_action.clone();
        match self.sandbox.call(&func, (self.ctx, id.to_raw(), tick)) {
            Ok(action) => Some(action),
            Err(e) => {
                self.latch("make_action", e);
                None
            }
        }
    }
}

impl std::fmt::Debug for AgentBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentBinding")
            .field("ctx", &self.ctx)
            .field("state", &self.state)
            .field("fuel_limit", &self.fuel_limit)
            .finish_non_exhaustive()
    }
}
