//! Typed facade over the engine module's ABI.
//!
//! The engine owns the world: physics, collisions, scoring. The binding
//! resolves every export at construction, finalizes the match [`Config`]
//! (pushed in or read back from the engine's defaults), and creates the
//! single engine context all later calls refer to.
//!
//! Engine faults are not latched: a trap inside the engine is fatal to the
//! match and every method surfaces it as an error.

use wasmtime::TypedFunc;

use scubywasm_abi::{Action, AgentId, Config, Pose};

use crate::sandbox::{Sandbox, SandboxSpec};
use crate::HostError;

/// Resolved engine exports. Context-taking calls receive the handle from
/// `create_context` as their first argument.
struct EngineExports {
    add_agent: TypedFunc<(i32, i32), i32>,
    set_action: TypedFunc<(i32, i32, i32), ()>,
    tick: TypedFunc<(i32, i32), ()>,
    get_ship_pose: TypedFunc<(i32, i32, i32), ()>,
    get_shot_pose: TypedFunc<(i32, i32, i32), i32>,
    is_alive: TypedFunc<(i32, i32), i32>,
    get_score: TypedFunc<(i32, i32), i32>,
}

/// One engine instance bound to one match context.
pub struct EngineBinding {
    sandbox: Sandbox,
    exports: EngineExports,
    ctx: i32,
    pose_ptr: i32,
    config: Config,
}

impl EngineBinding {
    /// Instantiate the engine and create its match context.
    ///
    /// With `Some(config)`, the record is written into the engine's config
    /// buffer before `create_context`; with `None`, the engine's defaults
    /// are read back and snapshotted as the authoritative [`Config`].
    pub fn new(wasm: &[u8], config: Option<Config>) -> Result<Self, HostError> {
        let mut sandbox = Sandbox::new(wasm, SandboxSpec::default())?;

        let get_config_buffer: TypedFunc<(), i32> = sandbox.typed_func("get_config_buffer")?;
        let get_pose_buffer: TypedFunc<(), i32> = sandbox.typed_func("get_pose_buffer")?;
        let set_default_config: TypedFunc<i32, ()> = sandbox.typed_func("set_default_config")?;
        let create_context: TypedFunc<i32, i32> = sandbox.typed_func("create_context")?;

        let exports = EngineExports {
            add_agent: sandbox.typed_func("add_agent")?,
            set_action: sandbox.typed_func("set_action")?,
            tick: sandbox.typed_func("tick")?,
            get_ship_pose: sandbox.typed_func("get_ship_pose")?,
            get_shot_pose: sandbox.typed_func("get_shot_pose")?,
            is_alive: sandbox.typed_func("is_alive")?,
            get_score: sandbox.typed_func("get_score")?,
        };

        let cfg_ptr = sandbox.call(&get_config_buffer, ())?;
        let config = match config {
            Some(cfg) => {
                sandbox.write_record(cfg_ptr, &cfg)?;
                cfg
            }
            None => {
                sandbox.call(&set_default_config, cfg_ptr)?;
                sandbox.read_record(cfg_ptr)?
            }
        };

        let ctx = sandbox.call(&create_context, cfg_ptr)?;
        let pose_ptr = sandbox.call(&get_pose_buffer, ())?;

        tracing::debug!(ctx, ?config, "engine context created");

        Ok(Self {
            sandbox,
            exports,
            ctx,
            pose_ptr,
            config,
        })
    }

    /// The authoritative match configuration.
    pub fn config(&self) -> Config {
        self.config
    }

    /// Register a ship at `pose`; the engine assigns and returns its id.
    pub fn add_agent(&mut self, pose: Pose) -> Result<AgentId, HostError> {
        self.sandbox.write_record(self.pose_ptr, &pose)?;
        let raw = self
            .sandbox
            .call(&self.exports.add_agent, (self.ctx, self.pose_ptr))?;
        Ok(AgentId::from_raw(raw))
    }

    /// Queue `action` for `id`, applied on the next advance.
    pub fn set_action(&mut self, id: AgentId, action: Action) -> Result<(), HostError> {
        self.sandbox
            .call(&self.exports.set_action, (self.ctx, id.to_raw(), action))
    }

    /// Advance the simulation by `n_times` ticks.
    pub fn tick(&mut self, n_times: i32) -> Result<(), HostError> {
        self.sandbox.call(&self.exports.tick, (self.ctx, n_times))
    }

    /// Current pose of `id`'s ship.
    pub fn ship_pose(&mut self, id: AgentId) -> Result<Pose, HostError> {
        self.sandbox.call(
            &self.exports.get_ship_pose,
            (self.ctx, id.to_raw(), self.pose_ptr),
        )?;
        self.sandbox.read_record(self.pose_ptr)
    }

    /// Current pose and remaining lifetime of `id`'s shot.
    pub fn shot_pose(&mut self, id: AgentId) -> Result<(Pose, i32), HostError> {
        let lifetime = self.sandbox.call(
            &self.exports.get_shot_pose,
            (self.ctx, id.to_raw(), self.pose_ptr),
        )?;
        let pose = self.sandbox.read_record(self.pose_ptr)?;
        Ok((pose, lifetime))
    }

    /// Whether `id`'s ship is alive.
    pub fn is_alive(&mut self, id: AgentId) -> Result<bool, HostError> {
        let alive = self
            .sandbox
            .call(&self.exports.is_alive, (self.ctx, id.to_raw()))?;
        Ok(alive == 1)
    }

    /// Current score of `id`.
    pub fn score(&mut self, id: AgentId) -> Result<i32, HostError> {
        self.sandbox
            .call(&self.exports.get_score, (self.ctx, id.to_raw()))
    }
}

impl std::fmt::Debug for EngineBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBinding")
            .field("ctx", &self.ctx)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
