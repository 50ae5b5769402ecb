//! Scubywasm ABI -- shared data model and wire records.
//!
//! The host and the guest modules (one engine, N agents) exchange a handful
//! of fixed-layout records through guest linear memory: the match [`Config`]
//! and ship/shot [`Pose`]s. This crate defines those types, the opaque
//! [`AgentId`] handed out by the engine at registration, and the packed
//! little-endian encoding used on the wire.
//!
//! Layouts are byte-exact: `Config` is `<ffffi>` (20 bytes), `Pose` is
//! `<fff>` (12 bytes), both little-endian regardless of host endianness.

#![deny(unsafe_code)]

use serde::{Deserialize, Serialize};

pub mod wire;

pub use wire::{WireError, WireRecord};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Immutable match configuration, shared by the engine and every agent.
///
/// Either read back from the engine's defaults or pushed into the engine
/// before context creation; in both cases the engine and all agents see
/// identical bytes for the whole match.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Maximum ship turn rate, degrees per tick.
    pub ship_max_turn_rate: f32,
    /// Maximum ship velocity, arena units per tick.
    pub ship_max_velocity: f32,
    /// Collision radius of a ship, arena units.
    pub ship_hit_radius: f32,
    /// Velocity of a shot, arena units per tick.
    pub shot_velocity: f32,
    /// Lifetime of a shot, in ticks.
    pub shot_lifetime: i32,
}

impl Config {
    /// Config fields in the positional order of the agent ABI's
    /// `set_config_parameter(ctx, index, value)` call: indices `0..=4`, with
    /// `shot_lifetime` widened to `f32` in the final slot.
    pub fn parameter_values(&self) -> [f32; 5] {
        [
            self.ship_max_turn_rate,
            self.ship_max_velocity,
            self.ship_hit_radius,
            self.shot_velocity,
            self.shot_lifetime as f32,
        ]
    }
}

// ---------------------------------------------------------------------------
// Pose
// ---------------------------------------------------------------------------

/// Position and orientation of a ship or shot.
///
/// `x` and `y` are normalized to `[0, 1)` on the toroidal arena; `heading`
/// is in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub heading: f32,
}

// ---------------------------------------------------------------------------
// AgentId
// ---------------------------------------------------------------------------

/// Opaque identifier assigned by the engine when a ship is registered.
///
/// The same id names a ship, its single outstanding shot, and its score.
/// Ids are dense in `[0, N·M)` for N teams of multiplicity M.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AgentId(i32);

impl AgentId {
    pub fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub fn to_raw(self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// An agent-chosen action, opaque to the host.
///
/// The engine interprets the value; the host only substitutes `0` when an
/// agent is trapped or declines to answer.
pub type Action = i32;
