//! Scubywasm match runtime -- one engine, N agents, one deterministic log.
//!
//! [`MatchRuntime`] binds a single engine instance to N isolated agent
//! instances and drives the per-tick protocol in a strict order: refuel and
//! reset observations, observe and broadcast the whole world to every agent,
//! collect actions, log fuel, then advance the engine -- or freeze physics
//! once at most one team is left alive.
//!
//! Determinism is an observable property: given the same engine bytes,
//! agent bytes, seed, config, and multiplicity, the serialized history log
//! is byte-identical across runs on the same platform. All random draws
//! (per-agent seeds, then grid-jittered initial poses) come from one seeded
//! generator in a fixed order.
//!
//! Misbehaving agents never abort a match: traps latch the offending agent
//! and its actions are zero-substituted from then on. A trap inside the
//! engine is fatal and surfaces as an error.

#![deny(unsafe_code)]

pub mod history;
pub mod runtime;

pub use history::{GameLog, MatchRecord, ShipTrack, ShotTrack, TeamHistory};
pub use runtime::{MatchOptions, MatchRuntime};

use scubywasm_host::HostError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that end (or prevent) a match.
///
/// Agent *traps* are deliberately absent: they degrade the agent in place
/// and the match continues.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    /// Engine construction failed or the engine trapped mid-match. Fatal.
    #[error("engine failure: {0}")]
    Engine(#[from] HostError),

    /// An agent module failed to instantiate or lacks a required export.
    /// The match is not started.
    #[error("agent for team {team} failed to construct: {source}")]
    AgentConstruction {
        /// Team index in registration order.
        team: usize,
        /// The underlying host error.
        source: HostError,
    },

    /// The caller supplied the wrong number of initial poses.
    #[error("expected {expected} initial poses, got {got}")]
    PoseCount { expected: usize, got: usize },
}
