//! Scubywasm host -- Wasmtime sandboxes and typed ABI bindings.
//!
//! One match runs one engine module and N agent modules, each inside its own
//! [`Sandbox`]: a Wasmtime instance with an optional fuel meter, an optional
//! memory ceiling, optional WASI, and packed-record access to guest linear
//! memory. On top of the sandbox sit two typed facades:
//!
//! - **[`EngineBinding`]**: the world's rules. Every ABI export is resolved
//!   at construction; a trap inside the engine is fatal to the match.
//! - **[`AgentBinding`]**: one team's pilot. Adds per-tick fuel budgets and
//!   trap latching: the first guest-side failure of any kind flips the
//!   binding into a one-way latched state, after which every call is a
//!   silent no-op returning a sentinel. The match continues without it.
//!
//! A host function `debug.debug_log(ptr, len)` is importable by every guest
//! and forwards UTF-8 slices from guest memory to the tracing sink.

#![deny(unsafe_code)]

pub mod agent;
pub mod engine;
mod sandbox;

pub use agent::{AgentBinding, AgentParams, DEFAULT_CONSTRUCTION_FUEL_FACTOR};
pub use engine::EngineBinding;
pub use sandbox::{Sandbox, SandboxSpec};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by sandbox construction and guest calls.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The WASM binary could not be compiled (invalid bytecode or WAT).
    #[error("WASM compilation failed: {0}")]
    Compile(String),

    /// Linking or instantiation failed (e.g. an unsatisfied import, or a
    /// declared memory larger than the store's ceiling).
    #[error("WASM instantiation failed: {0}")]
    Instantiation(String),

    /// A required export is missing or has an unexpected signature.
    #[error("missing required export '{name}'")]
    MissingExport {
        /// Name of the missing export.
        name: String,
    },

    /// The guest exhausted its fuel budget.
    #[error("guest ran out of fuel")]
    OutOfFuel,

    /// The guest trapped (unreachable, out-of-bounds access, ...).
    #[error("guest trap: {0}")]
    Trap(String),

    /// A host-side read/write of guest memory was out of bounds.
    #[error("guest memory access out of bounds: ptr={ptr}, len={len}, memory_size={size}")]
    MemoryAccess {
        ptr: i32,
        len: usize,
        size: usize,
    },

    /// Any other Wasmtime-level failure.
    #[error("WASM runtime error: {0}")]
    Runtime(String),
}

/// Classify a Wasmtime call error into [`HostError`].
///
/// Fuel exhaustion is surfaced as its own variant so callers can tell a
/// budget overrun from a genuine guest bug; both latch an agent the same way.
pub(crate) fn classify_trap(error: anyhow::Error) -> HostError {
    for cause in error.chain() {
        if let Some(trap) = cause.downcast_ref::<wasmtime::Trap>() {
            if *trap == wasmtime::Trap::OutOfFuel {
                return HostError::OutOfFuel;
            }
            return HostError::Trap(format!("{error}"));
        }
    }
    HostError::Runtime(format!("{error}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use scubywasm_abi::{Config, Pose};

    /// Load a WAT fixture from the tests/fixtures directory.
    fn fixture_bytes(name: &str) -> Vec<u8> {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name);
        std::fs::read(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {}", path.display(), e))
    }

    fn test_config() -> Config {
        Config {
            ship_max_turn_rate: 6.0,
            ship_max_velocity: 0.01,
            ship_hit_radius: 0.0125,
            shot_velocity: 0.02,
            shot_lifetime: 60,
        }
    }

    // -- Sandbox ------------------------------------------------------------

    #[test]
    fn sandbox_instantiates_and_reads_records() {
        let bytes = fixture_bytes("engine.wat");
        let mut sandbox = Sandbox::new(&bytes, SandboxSpec::default()).unwrap();

        let get_pose_buffer: wasmtime::TypedFunc<(), i32> =
            sandbox.typed_func("get_pose_buffer").unwrap();
        let ptr = sandbox.call(&get_pose_buffer, ()).unwrap();

        let pose = Pose {
            x: 0.5,
            y: 0.25,
            heading: 90.0,
        };
        sandbox.write_record(ptr, &pose).unwrap();
        let back: Pose = sandbox.read_record(ptr).unwrap();
        assert_eq!(back, pose);
    }

    #[test]
    fn sandbox_rejects_invalid_bytes() {
        let err = Sandbox::new(b"not wasm at all", SandboxSpec::default()).unwrap_err();
        assert!(matches!(err, HostError::Compile(_)), "got: {err:?}");
    }

    #[test]
    fn sandbox_reports_missing_export() {
        let bytes = fixture_bytes("engine.wat");
        let mut sandbox = Sandbox::new(&bytes, SandboxSpec::default()).unwrap();
        let Err(err) = sandbox.typed_func::<(), i32>("no_such_export") else {
            panic!("expected missing export error");
        };
        assert!(
            matches!(err, HostError::MissingExport { ref name } if name == "no_such_export"),
            "got: {err:?}"
        );
    }

    #[test]
    fn sandbox_bounds_checks_guest_memory() {
        let bytes = fixture_bytes("engine.wat");
        let mut sandbox = Sandbox::new(&bytes, SandboxSpec::default()).unwrap();
        // One page of memory; a read far past the end must fail cleanly.
        let err = sandbox.read_record::<Pose>(70_000).unwrap_err();
        assert!(matches!(err, HostError::MemoryAccess { .. }), "got: {err:?}");
    }

    #[test]
    fn sandbox_runs_wasm_call_ctors_on_startup() {
        let bytes = fixture_bytes("agent_idle.wat");
        let mut sandbox = Sandbox::new(&bytes, SandboxSpec::default()).unwrap();
        // agent_idle.wat sets a flag inside __wasm_call_ctors.
        let ctors_ran: wasmtime::TypedFunc<(), i32> = sandbox.typed_func("ctors_ran").unwrap();
        assert_eq!(sandbox.call(&ctors_ran, ()).unwrap(), 1);
    }

    #[test]
    fn sandbox_provides_debug_log_import() {
        // agent_debug.wat calls debug.debug_log during init_agent; it only
        // instantiates if the import is supplied.
        let bytes = fixture_bytes("agent_debug.wat");
        let mut sandbox = Sandbox::new(&bytes, SandboxSpec::default()).unwrap();
        let init: wasmtime::TypedFunc<(i32, i32, i32), i32> =
            sandbox.typed_func("init_agent").unwrap();
        assert_eq!(sandbox.call(&init, (2, 1, 7)).unwrap(), 1);
    }

    #[test]
    fn sandbox_fuel_round_trips() {
        let bytes = fixture_bytes("agent_idle.wat");
        let spec = SandboxSpec {
            fuel_metering: true,
            initial_fuel: Some(1_000_000),
            ..SandboxSpec::default()
        };
        let mut sandbox = Sandbox::new(&bytes, spec).unwrap();
        sandbox.set_fuel(5_000).unwrap();
        assert_eq!(sandbox.fuel(), 5_000);
    }

    // -- EngineBinding ------------------------------------------------------

    #[test]
    fn engine_snapshots_default_config() {
        let bytes = fixture_bytes("engine.wat");
        let engine = EngineBinding::new(&bytes, None).unwrap();
        // Defaults baked into the fixture.
        assert_eq!(engine.config().shot_lifetime, 60);
        assert!((engine.config().ship_max_turn_rate - 6.0).abs() < f32::EPSILON);
    }

    #[test]
    fn engine_accepts_pushed_config() {
        let bytes = fixture_bytes("engine.wat");
        let cfg = Config {
            shot_lifetime: 17,
            ..test_config()
        };
        let engine = EngineBinding::new(&bytes, Some(cfg)).unwrap();
        assert_eq!(engine.config(), cfg);
    }

    #[test]
    fn engine_registers_and_queries_ships() {
        let bytes = fixture_bytes("engine.wat");
        let mut engine = EngineBinding::new(&bytes, None).unwrap();

        let pose = Pose {
            x: 0.5,
            y: 0.5,
            heading: 45.0,
        };
        let a = engine.add_agent(pose).unwrap();
        let b = engine
            .add_agent(Pose {
                x: 0.1,
                y: 0.9,
                heading: 0.0,
            })
            .unwrap();
        assert_eq!(a.to_raw(), 0);
        assert_eq!(b.to_raw(), 1);

        assert!(engine.is_alive(a).unwrap());
        assert_eq!(engine.ship_pose(a).unwrap(), pose);
        assert_eq!(engine.score(a).unwrap(), 0);

        // Queue scoring actions and advance.
        engine.set_action(a, 3).unwrap();
        engine.set_action(b, 5).unwrap();
        engine.tick(1).unwrap();
        assert_eq!(engine.score(a).unwrap(), 3);
        assert_eq!(engine.score(b).unwrap(), 5);

        let (shot, lifetime) = engine.shot_pose(a).unwrap();
        assert_eq!(lifetime, 0);
        assert!((shot.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn engine_trap_surfaces_as_error() {
        let bytes = fixture_bytes("engine.wat");
        let mut engine = EngineBinding::new(&bytes, None).unwrap();
        let id = engine
            .add_agent(Pose {
                x: 0.0,
                y: 0.0,
                heading: 0.0,
            })
            .unwrap();
        // Action 777 makes the fixture engine hit unreachable inside tick().
        engine.set_action(id, 777).unwrap();
        let err = engine.tick(1).unwrap_err();
        assert!(matches!(err, HostError::Trap(_)), "got: {err:?}");
    }

    // -- AgentBinding -------------------------------------------------------

    fn agent_params(seed: u32) -> AgentParams {
        AgentParams {
            n_agents_total: 2,
            multiplicity: 1,
            seed,
            config: test_config(),
            fuel_limit: None,
            memory_limit: None,
            construction_fuel_factor: DEFAULT_CONSTRUCTION_FUEL_FACTOR,
        }
    }

    #[test]
    fn agent_initializes_and_acts() {
        let bytes = fixture_bytes("agent_counter.wat");
        let mut agent = AgentBinding::new(&bytes, agent_params(42)).unwrap();
        assert!(!agent.trapped());

        let id = scubywasm_abi::AgentId::from_raw(0);
        agent.clear_world_state();
        agent.update_ship(
            id,
            true,
            Pose {
                x: 0.5,
                y: 0.5,
                heading: 0.0,
            },
        );
        agent.update_ship(
            scubywasm_abi::AgentId::from_raw(1),
            false,
            Pose {
                x: 0.2,
                y: 0.2,
                heading: 10.0,
            },
        );
        // The counter fixture answers with the number of ship updates seen
        // since the last clear_world_state.
        assert_eq!(agent.make_action(id, 0), Some(2));

        agent.clear_world_state();
        assert_eq!(agent.make_action(id, 1), Some(0));
    }

    #[test]
    fn agent_without_fuel_limit_reports_no_fuel() {
        let bytes = fixture_bytes("agent_idle.wat");
        let agent = AgentBinding::new(&bytes, agent_params(1)).unwrap();
        assert_eq!(agent.fuel(), None);
    }

    #[test]
    fn agent_fuel_exhaustion_latches() {
        let bytes = fixture_bytes("agent_fuel_hog.wat");
        let params = AgentParams {
            fuel_limit: Some(10_000),
            ..agent_params(7)
        };
        let mut agent = AgentBinding::new(&bytes, params).unwrap();
        assert!(!agent.trapped(), "construction grace should cover init");

        agent.refuel();
        let id = scubywasm_abi::AgentId::from_raw(0);
        // make_action spins forever; the fuel meter cuts it off.
        assert_eq!(agent.make_action(id, 0), None);
        assert!(agent.trapped());

        // Latched: no further guest entry, sentinel results, refuel is a no-op.
        agent.refuel();
        assert_eq!(agent.fuel(), Some(0));
        assert_eq!(agent.make_action(id, 1), None);
        agent.clear_world_state();
        assert!(agent.trapped());
    }

    #[test]
    fn agent_trap_during_init_latches_but_constructs() {
        // Grows memory past the 2-page ceiling inside init_agent and traps.
        let bytes = fixture_bytes("agent_grow.wat");
        let params = AgentParams {
            memory_limit: Some(131_072),
            ..agent_params(3)
        };
        let mut agent = AgentBinding::new(&bytes, params).unwrap();
        assert!(agent.trapped());
        assert_eq!(agent.make_action(scubywasm_abi::AgentId::from_raw(0), 0), None);
    }

    #[test]
    fn agent_missing_export_fails_construction() {
        let bytes = fixture_bytes("agent_no_make_action.wat");
        let err = AgentBinding::new(&bytes, agent_params(1)).unwrap_err();
        assert!(
            matches!(err, HostError::MissingExport { ref name } if name == "make_action"),
            "got: {err:?}"
        );
    }

    #[test]
    fn agent_refuel_restores_per_tick_budget() {
        let bytes = fixture_bytes("agent_counter.wat");
        let params = AgentParams {
            fuel_limit: Some(100_000),
            ..agent_params(9)
        };
        let mut agent = AgentBinding::new(&bytes, params).unwrap();

        agent.refuel();
        assert_eq!(agent.fuel(), Some(100_000));

        let id = scubywasm_abi::AgentId::from_raw(0);
        agent.clear_world_state();
        agent.make_action(id, 0);
        let after = agent.fuel().unwrap();
        assert!(after < 100_000, "guest calls must consume fuel");

        agent.refuel();
        assert_eq!(agent.fuel(), Some(100_000));
    }
}
