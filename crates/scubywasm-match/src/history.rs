//! History log structures and the JSON schema they serialize to.
//!
//! Per team, per agent id: parallel append-only arrays for ship state, shot
//! state, and chosen actions, plus team-level per-tick score and fuel
//! series. All arrays within a team have equal length after every tick.
//!
//! Numeric outputs are rounded for log compactness: positions to 4
//! decimals, headings to 1, and the header's `ship_hit_radius` to 3. Maps
//! are `BTreeMap` keyed by agent id so serialization order is stable and
//! logs from identical runs are byte-identical.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use scubywasm_abi::{Action, AgentId, Pose};

/// Round `value` to `decimals` decimal places as an `f64`.
pub(crate) fn round_to(value: f32, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (f64::from(value) * factor).round() / factor
}

// ---------------------------------------------------------------------------
// Tracks
// ---------------------------------------------------------------------------

/// Time series for one ship.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShipTrack {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub heading: Vec<f64>,
    pub alive: Vec<bool>,
}

/// Time series for one ship's single outstanding shot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShotTrack {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub lifetime: Vec<i32>,
}

// ---------------------------------------------------------------------------
// TeamHistory
// ---------------------------------------------------------------------------

/// One team's slice of the history log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamHistory {
    /// Ship series keyed by agent id.
    pub ships: BTreeMap<AgentId, ShipTrack>,
    /// Shot series keyed by agent id.
    pub shots: BTreeMap<AgentId, ShotTrack>,
    /// Chosen action per tick, keyed by agent id. Trapped agents log `0`.
    pub actions: BTreeMap<AgentId, Vec<Action>>,
    /// Team-aggregate score per tick.
    pub scores: Vec<i32>,
    /// Remaining fuel per tick; `None` when metering is disabled.
    pub fuel: Vec<Option<u64>>,
}

impl TeamHistory {
    /// Empty history with one track per registered id.
    pub(crate) fn new(ids: &[AgentId]) -> Self {
        let mut history = Self::default();
        for &id in ids {
            history.ships.insert(id, ShipTrack::default());
            history.shots.insert(id, ShotTrack::default());
            history.actions.insert(id, Vec::new());
        }
        history
    }

    pub(crate) fn record_ship(&mut self, id: AgentId, pose: Pose, alive: bool) {
        let track = self.ships.entry(id).or_default();
        track.x.push(round_to(pose.x, 4));
        track.y.push(round_to(pose.y, 4));
        track.heading.push(round_to(pose.heading, 1));
        track.alive.push(alive);
    }

    pub(crate) fn record_shot(&mut self, id: AgentId, pose: Pose, lifetime: i32) {
        let track = self.shots.entry(id).or_default();
        track.x.push(round_to(pose.x, 4));
        track.y.push(round_to(pose.y, 4));
        track.lifetime.push(lifetime);
    }

    pub(crate) fn record_action(&mut self, id: AgentId, action: Action) {
        self.actions.entry(id).or_default().push(action);
    }
}

// ---------------------------------------------------------------------------
// GameLog
// ---------------------------------------------------------------------------

/// The full history log of one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameLog {
    /// Number of ticks the engine actually advanced.
    pub ticks: u64,
    /// Ship collision radius from the match config, rounded to 3 decimals.
    pub ship_hit_radius: f64,
    /// Per-team history, in team registration order.
    pub history: Vec<TeamHistory>,
}

// ---------------------------------------------------------------------------
// MatchRecord
// ---------------------------------------------------------------------------

/// A [`GameLog`] wrapped with match-level metadata, as persisted by the
/// supervisor and the scenario service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Team names in registration order.
    pub teams: Vec<String>,
    /// Last logged score per team.
    pub final_scores: Vec<i32>,
    /// The underlying log, flattened into the same JSON object.
    #[serde(flatten)]
    pub log: GameLog,
}

impl MatchRecord {
    /// Wrap a log, deriving `final_scores` from each team's score series.
    pub fn new(teams: Vec<String>, log: GameLog) -> Self {
        let final_scores = log
            .history
            .iter()
            .map(|team| team.scores.last().copied().unwrap_or(0))
            .collect();
        Self {
            teams,
            final_scores,
            log,
        }
    }
}
