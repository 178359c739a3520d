//! Engine parameters.
//!
//! Plain serde-derived structs with `Default` impls carrying the
//! canonical constants. The CLI layers its typed config format on top of
//! these; the library itself never reads files.

use crate::error::{EngineError, ErrorCode};
use serde::{Deserialize, Serialize};

/// What to do when the two winners belong to different, both-classified
/// sets (see the adaptation step).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovePolicy {
    /// Move the winner whose class matches the oracle's classification
    /// of the input signal.
    MoveMatchingSet,
    /// Move neither winner; the step only maintains topology.
    MoveNeither,
}

/// Nearest-neighbour index selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NnParams {
    /// Exhaustive scan. Correct for any dimension, O(n) per query.
    Linear,
    /// Uniform grid over an axis-aligned bounding box, expanded on
    /// demand when positions fall outside. `aabb` is `[min, max]` per
    /// axis, flattened; `cells_per_axis` fixes the resolution.
    Grid { aabb: Vec<f64>, cells_per_axis: usize },
    /// Vantage-point tree rebuilt when more than `rebuild_fraction` of
    /// the points have drifted out of their indexed position.
    VpTree { rebuild_fraction: f64 },
}

impl Default for NnParams {
    fn default() -> Self {
        NnParams::Linear
    }
}

/// Parameters of the planning engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanParams {
    /// Dimension of the configuration space.
    pub dim: usize,
    /// Winner learning rate.
    pub eb: f64,
    /// Neighbour learning rate.
    pub en: f64,
    /// Error decay applied to the split pair on insertion.
    pub alpha: f64,
    /// Per-step error decay.
    pub beta: f64,
    /// Edges older than this are pruned.
    pub age_max: u32,
    /// Degree cap per vertex.
    pub r_max: usize,
    /// Steps per insertion cycle.
    pub lambda: usize,
    /// Spatial resolution for path refinement and obstacle repulsion.
    /// Compared squared internally.
    pub h: f64,
    /// Vertices grown before oracle classification starts.
    pub warm_start: usize,
    /// Back-off (in cycles) between failed path-extraction attempts.
    pub prune_delay: u64,
    /// Draws per tournament in `random_node`.
    pub tournament: usize,
    /// NONE vertices deeper than this are not admissible in path search.
    pub max_depth_free: u32,
    /// Invoke the oracle's `callback` every this many cycles.
    pub callback_period: u64,
    /// Winner selection when the two nearest are in different classes.
    pub policy: MovePolicy,
    /// Seed a coincident triangle when an inserted vertex ends isolated.
    pub island_seed: bool,
    /// Emit triangular faces on edge creation (surface variant).
    pub surface: bool,
    pub nn: NnParams,
}

impl Default for PlanParams {
    fn default() -> Self {
        Self {
            dim: 2,
            eb: 0.05,
            en: 0.0006,
            alpha: 0.95,
            beta: 0.9995,
            age_max: 200,
            r_max: 4,
            lambda: 200,
            h: 0.1,
            warm_start: 5000,
            prune_delay: 50,
            tournament: 3,
            max_depth_free: 5,
            callback_period: 50,
            policy: MovePolicy::MoveMatchingSet,
            island_seed: true,
            surface: false,
            nn: NnParams::Linear,
        }
    }
}

impl PlanParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.dim == 0 {
            return Err(EngineError::new(ErrorCode::InvalidParams, "dim must be >= 1"));
        }
        if self.r_max < 2 {
            return Err(EngineError::new(
                ErrorCode::InvalidParams,
                "r_max must be >= 2 (insertion connects two edges per vertex)",
            ));
        }
        if self.lambda == 0 {
            return Err(EngineError::new(ErrorCode::InvalidParams, "lambda must be >= 1"));
        }
        if !(0.0..1.0).contains(&self.alpha) {
            return Err(EngineError::new(ErrorCode::InvalidParams, "alpha must be in (0, 1)"));
        }
        if !(0.0..=1.0).contains(&self.beta) {
            return Err(EngineError::new(ErrorCode::InvalidParams, "beta must be in (0, 1]"));
        }
        if self.h <= 0.0 {
            return Err(EngineError::new(ErrorCode::InvalidParams, "h must be positive"));
        }
        if self.tournament == 0 {
            return Err(EngineError::new(ErrorCode::InvalidParams, "tournament must be >= 1"));
        }
        Ok(())
    }
}

/// Parameters of the classical GNG engine — the subset of [`PlanParams`]
/// the unclassified learner uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GngParams {
    pub dim: usize,
    pub eb: f64,
    pub en: f64,
    pub alpha: f64,
    pub beta: f64,
    pub age_max: u32,
    pub lambda: usize,
    /// Invoke the oracle's `callback` every this many insertions.
    pub callback_period: u64,
    pub nn: NnParams,
}

impl Default for GngParams {
    fn default() -> Self {
        Self {
            dim: 2,
            eb: 0.05,
            en: 0.0006,
            alpha: 0.95,
            beta: 0.9995,
            age_max: 200,
            lambda: 200,
            callback_period: 50,
            nn: NnParams::Linear,
        }
    }
}

impl GngParams {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.dim == 0 {
            return Err(EngineError::new(ErrorCode::InvalidParams, "dim must be >= 1"));
        }
        if self.lambda == 0 {
            return Err(EngineError::new(ErrorCode::InvalidParams, "lambda must be >= 1"));
        }
        if !(0.0..1.0).contains(&self.alpha) {
            return Err(EngineError::new(ErrorCode::InvalidParams, "alpha must be in (0, 1)"));
        }
        if !(0.0..=1.0).contains(&self.beta) {
            return Err(EngineError::new(ErrorCode::InvalidParams, "beta must be in (0, 1]"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PlanParams::default().validate().unwrap();
        GngParams::default().validate().unwrap();
    }

    #[test]
    fn degree_cap_floor() {
        let p = PlanParams { r_max: 1, ..Default::default() };
        assert!(p.validate().is_err());
    }

    #[test]
    fn zero_resolution_rejected() {
        let p = PlanParams { h: 0.0, ..Default::default() };
        assert!(p.validate().is_err());
    }
}
