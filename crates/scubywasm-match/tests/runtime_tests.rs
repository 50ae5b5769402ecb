//! End-to-end match runtime tests against WAT fixture modules.
//!
//! The fixture engine applies a queued action as a score increment, kills a
//! ship on action 999, and traps on action 777. The counter agent answers
//! with the number of ship updates it received since the last reset, which
//! makes the observation broadcast visible in the action log.

use scubywasm_abi::Pose;
use scubywasm_match::{GameLog, MatchError, MatchOptions, MatchRuntime};

fn fixture_bytes(name: &str) -> Vec<u8> {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read(&path)
        .unwrap_or_else(|e| panic!("failed to read fixture {}: {}", path.display(), e))
}

fn options(seed: u64) -> MatchOptions {
    MatchOptions {
        seed: Some(seed),
        ..MatchOptions::default()
    }
}

/// Every per-team series must have exactly `expected` entries.
fn assert_arity(log: &GameLog, expected: usize) {
    for (t, team) in log.history.iter().enumerate() {
        assert_eq!(team.scores.len(), expected, "team {t} scores");
        assert_eq!(team.fuel.len(), expected, "team {t} fuel");
        for (id, ship) in &team.ships {
            assert_eq!(ship.x.len(), expected, "team {t} ship {id} x");
            assert_eq!(ship.y.len(), expected, "team {t} ship {id} y");
            assert_eq!(ship.heading.len(), expected, "team {t} ship {id} heading");
            assert_eq!(ship.alive.len(), expected, "team {t} ship {id} alive");
        }
        for (id, shot) in &team.shots {
            assert_eq!(shot.x.len(), expected, "team {t} shot {id} x");
            assert_eq!(shot.y.len(), expected, "team {t} shot {id} y");
            assert_eq!(shot.lifetime.len(), expected, "team {t} shot {id} lifetime");
        }
        for (id, actions) in &team.actions {
            assert_eq!(actions.len(), expected, "team {t} actions {id}");
        }
    }
}

// -- Single team ------------------------------------------------------------

#[test]
fn single_team_freezes_physics_after_first_observation() {
    let engine = fixture_bytes("engine.wat");
    let agents = vec![fixture_bytes("agent_idle.wat")];

    let mut game = MatchRuntime::new(&engine, &agents, options(1)).unwrap();
    let teams_alive = game.run_to_completion(5).unwrap();

    assert_eq!(teams_alive, 1);
    let log = game.log();
    // The engine never advanced, but the first observation is recorded.
    assert_eq!(log.ticks, 0);
    assert_arity(&log, 1);
    // Metering disabled: fuel logs null.
    assert_eq!(log.history[0].fuel[0], None);
}

// -- Determinism ------------------------------------------------------------

#[test]
fn duel_with_fixed_seed_is_byte_identical() {
    let engine = fixture_bytes("engine.wat");
    let agents = vec![
        fixture_bytes("agent_counter.wat"),
        fixture_bytes("agent_counter.wat"),
    ];
    let opts = MatchOptions {
        multiplicity: 2,
        fuel_limit: Some(1_000_000),
        ..options(42)
    };

    let run = || {
        let mut game = MatchRuntime::new(&engine, &agents, opts.clone()).unwrap();
        game.run_to_completion(5).unwrap();
        serde_json::to_string(&game.log()).unwrap()
    };

    let first = run();
    let second = run();
    assert_eq!(
        blake3::hash(first.as_bytes()),
        blake3::hash(second.as_bytes())
    );
    assert_eq!(first, second);

    let log: GameLog = serde_json::from_str(&first).unwrap();
    assert_eq!(log.ticks, 5);
    assert_arity(&log, 5);
}

#[test]
fn different_seeds_give_different_initial_configurations() {
    let engine = fixture_bytes("engine.wat");
    let agents = vec![
        fixture_bytes("agent_idle.wat"),
        fixture_bytes("agent_idle.wat"),
    ];

    let log_for = |seed| {
        let mut game = MatchRuntime::new(&engine, &agents, options(seed)).unwrap();
        game.tick(1).unwrap();
        serde_json::to_string(&game.log()).unwrap()
    };

    assert_ne!(log_for(1), log_for(2));
}

// -- Arity & broadcast ------------------------------------------------------

#[test]
fn all_series_stay_parallel_after_every_tick() {
    let engine = fixture_bytes("engine.wat");
    let agents = vec![
        fixture_bytes("agent_counter.wat"),
        fixture_bytes("agent_counter.wat"),
    ];
    let opts = MatchOptions {
        multiplicity: 2,
        ..options(9)
    };

    let mut game = MatchRuntime::new(&engine, &agents, opts).unwrap();
    for round in 1..=4 {
        game.tick(1).unwrap();
        assert_arity(&game.log(), round);
    }
}

#[test]
fn every_agent_sees_every_ship_before_acting() {
    let engine = fixture_bytes("engine.wat");
    let agents = vec![
        fixture_bytes("agent_counter.wat"),
        fixture_bytes("agent_counter.wat"),
    ];
    let opts = MatchOptions {
        multiplicity: 2,
        ..options(13)
    };

    let mut game = MatchRuntime::new(&engine, &agents, opts).unwrap();
    game.run_to_completion(3).unwrap();

    // Four ships in the match; the counter agents answer with the number of
    // ship updates received that tick, so a full broadcast logs 4 for every
    // id on every tick.
    let log = game.log();
    for team in &log.history {
        for actions in team.actions.values() {
            assert!(actions.iter().all(|&a| a == 4), "actions: {actions:?}");
        }
    }
}

// -- Failure isolation ------------------------------------------------------

#[test]
fn fuel_exhaustion_latches_team_and_zeroes_actions() {
    let engine = fixture_bytes("engine.wat");
    let agents = vec![
        fixture_bytes("agent_fuel_hog.wat"),
        fixture_bytes("agent_idle.wat"),
    ];
    let opts = MatchOptions {
        fuel_limit: Some(10_000),
        ..options(3)
    };

    let mut game = MatchRuntime::new(&engine, &agents, opts).unwrap();
    // Neither ship dies (the engine only kills on 999), so this runs the
    // full three rounds with the hog latched from the first action.
    game.run_to_completion(3).unwrap();

    let log = game.log();
    assert_arity(&log, 3);

    let hog = &log.history[0];
    for actions in hog.actions.values() {
        assert!(actions.iter().all(|&a| a == 0), "actions: {actions:?}");
    }
    // Latched agents are never refueled: the tank stays drained.
    assert!(hog.fuel.iter().all(|&f| f == Some(0)), "fuel: {:?}", hog.fuel);

    let idle = &log.history[1];
    assert!(idle.fuel.iter().all(|f| f.unwrap_or(0) > 0));
}

#[test]
fn memory_overrun_during_init_is_zero_substituted_all_match() {
    let engine = fixture_bytes("engine.wat");
    let agents = vec![
        fixture_bytes("agent_grow.wat"),
        fixture_bytes("agent_counter.wat"),
    ];
    let opts = MatchOptions {
        memory_limit: Some(131_072),
        ..options(5)
    };

    let mut game = MatchRuntime::new(&engine, &agents, opts).unwrap();
    game.run_to_completion(3).unwrap();

    let log = game.log();
    assert_arity(&log, 3);

    // The overrunning agent contributes nothing but its engine-governed
    // ship; its actions are all substitutes.
    for actions in log.history[0].actions.values() {
        assert!(actions.iter().all(|&a| a == 0));
    }
    // Its ship still exists and is observed by the healthy team.
    for actions in log.history[1].actions.values() {
        assert!(actions.iter().all(|&a| a == 2));
    }
}

#[test]
fn late_trap_latches_from_that_tick_onward() {
    let engine = fixture_bytes("engine.wat");
    let agents = vec![
        fixture_bytes("agent_trap_late.wat"),
        fixture_bytes("agent_idle.wat"),
    ];

    let mut game = MatchRuntime::new(&engine, &agents, options(17)).unwrap();
    game.run_to_completion(5).unwrap();

    let log = game.log();
    let actions = log.history[0].actions.values().next().unwrap();
    assert_eq!(actions, &vec![1, 1, 0, 0, 0]);
}

#[test]
fn engine_trap_is_fatal_but_log_stays_consistent() {
    let engine = fixture_bytes("engine.wat");
    let agents = vec![
        fixture_bytes("agent_poison.wat"),
        fixture_bytes("agent_idle.wat"),
    ];

    let mut game = MatchRuntime::new(&engine, &agents, options(7)).unwrap();
    let err = game.tick(1).unwrap_err();
    assert!(matches!(err, MatchError::Engine(_)), "got: {err:?}");

    // Phases A-D completed before the advance failed.
    assert_arity(&game.log(), 1);
    assert_eq!(game.ticks(), 0);
}

// -- Termination ------------------------------------------------------------

#[test]
fn elimination_ends_the_match_with_final_observation() {
    let engine = fixture_bytes("engine.wat");
    let agents = vec![
        fixture_bytes("agent_suicide.wat"),
        fixture_bytes("agent_idle.wat"),
    ];

    let mut game = MatchRuntime::new(&engine, &agents, options(11)).unwrap();
    let teams_alive = game.run_to_completion(10).unwrap();

    assert_eq!(teams_alive, 1);
    // One advance (which kills the suicidal ship), then a frozen final tick.
    assert_eq!(game.ticks(), 1);

    let log = game.log();
    assert_arity(&log, 2);
    let ship = log.history[0].ships.values().next().unwrap();
    assert_eq!(ship.alive, vec![true, false]);
}

// -- Initial poses ----------------------------------------------------------

#[test]
fn wrong_pose_count_is_rejected() {
    let engine = fixture_bytes("engine.wat");
    let agents = vec![
        fixture_bytes("agent_idle.wat"),
        fixture_bytes("agent_idle.wat"),
    ];
    let opts = MatchOptions {
        init_poses: Some(vec![Pose {
            x: 0.5,
            y: 0.5,
            heading: 0.0,
        }]),
        ..options(1)
    };

    let err = MatchRuntime::new(&engine, &agents, opts).unwrap_err();
    assert!(
        matches!(err, MatchError::PoseCount { expected: 2, got: 1 }),
        "got: {err:?}"
    );
}

#[test]
fn explicit_poses_are_registered_in_order() {
    let engine = fixture_bytes("engine.wat");
    let agents = vec![
        fixture_bytes("agent_idle.wat"),
        fixture_bytes("agent_idle.wat"),
    ];
    let opts = MatchOptions {
        init_poses: Some(vec![
            Pose {
                x: 0.25,
                y: 0.25,
                heading: 0.0,
            },
            Pose {
                x: 0.75,
                y: 0.75,
                heading: 90.0,
            },
        ]),
        ..options(1)
    };

    let mut game = MatchRuntime::new(&engine, &agents, opts).unwrap();
    game.tick(1).unwrap();

    let log = game.log();
    let first = log.history[0].ships.values().next().unwrap();
    let second = log.history[1].ships.values().next().unwrap();
    assert_eq!((first.x[0], first.y[0]), (0.25, 0.25));
    assert_eq!((second.x[0], second.y[0]), (0.75, 0.75));
    assert_eq!(second.heading[0], 90.0);
}

// -- Config -----------------------------------------------------------------

#[test]
fn pushed_hit_radius_lands_rounded_in_the_header() {
    let engine = fixture_bytes("engine.wat");
    let agents = vec![fixture_bytes("agent_idle.wat")];
    let opts = MatchOptions {
        config: Some(scubywasm_abi::Config {
            ship_max_turn_rate: 6.0,
            ship_max_velocity: 0.01,
            ship_hit_radius: 0.123_45,
            shot_velocity: 0.02,
            shot_lifetime: 60,
        }),
        ..options(1)
    };

    let mut game = MatchRuntime::new(&engine, &agents, opts).unwrap();
    game.tick(1).unwrap();
    assert_eq!(game.log().ship_hit_radius, 0.123);
}
