use std::{fmt, ops::Index};

use serde::{Deserialize, Serialize};

use crate::config::StrategyWeightConfig;

/// Movement strategies a lost subject mixes between. Each variant owns the
/// directional factor it applies to a candidate move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    StayPut,
    RouteTravel,
    Backtrack,
    DirectTravel,
    RandomTravel,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::StayPut,
        Strategy::RouteTravel,
        Strategy::Backtrack,
        Strategy::DirectTravel,
        Strategy::RandomTravel,
    ];

    /// Strategies that move mass off the source cell.
    pub const MOVING: [Strategy; 4] = [
        Strategy::RouteTravel,
        Strategy::Backtrack,
        Strategy::DirectTravel,
        Strategy::RandomTravel,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::StayPut => "stay_put",
            Strategy::RouteTravel => "route_travel",
            Strategy::Backtrack => "backtrack",
            Strategy::DirectTravel => "direct_travel",
            Strategy::RandomTravel => "random_travel",
        }
    }

    /// Unnormalized preference for one candidate move. StayPut never moves and
    /// returns 0.
    pub fn move_factor(self, mv: &MoveContext) -> f64 {
        match self {
            Strategy::StayPut => 0.0,
            Strategy::RouteTravel => mv.trail_attraction.max(0.0).powf(mv.trail_adherence),
            Strategy::Backtrack => mv.outward_cos.map_or(1.0, |cos| 1.0 - cos),
            Strategy::DirectTravel => {
                let heading = mv.outward_cos.map_or(1.0, |cos| 1.0 + cos);
                let uphill = (1.0 + mv.uphill_bias * mv.grade.clamp(-1.0, 1.0)).max(0.0);
                heading * uphill
            }
            Strategy::RandomTravel => 1.0,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a strategy sees about a single move from a source cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveContext {
    /// Cosine between the move and the outward direction from the last-known
    /// location; `None` when the source is the last-known cell itself.
    pub outward_cos: Option<f64>,
    /// Signed rise over run of the move.
    pub grade: f64,
    pub trail_attraction: f64,
    pub trail_adherence: f64,
    pub uphill_bias: f64,
}

/// Share of each strategy, indexed by [`Strategy::index`]. Sums to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyWeights([f64; 5]);

impl StrategyWeights {
    /// Clamp negatives to zero and rescale to a total of 1. An all-zero input
    /// becomes pure StayPut.
    pub fn new(weights: [f64; 5]) -> Self {
        let mut weights = weights.map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 });
        let total: f64 = weights.iter().sum();
        if total > 0.0 {
            weights.iter_mut().for_each(|w| *w /= total);
        } else {
            weights = [1.0, 0.0, 0.0, 0.0, 0.0];
        }
        Self(weights)
    }

    pub fn stay_only() -> Self {
        Self([1.0, 0.0, 0.0, 0.0, 0.0])
    }

    pub fn get(&self, strategy: Strategy) -> f64 {
        self.0[strategy.index()]
    }

    pub fn stay(&self) -> f64 {
        self.get(Strategy::StayPut)
    }

    pub fn moving(&self) -> f64 {
        1.0 - self.stay()
    }

    pub fn as_array(&self) -> [f64; 5] {
        self.0
    }

    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mut out = [0.0; 5];
        for (idx, value) in out.iter_mut().enumerate() {
            *value = self.0[idx] + (other.0[idx] - self.0[idx]) * t;
        }
        Self::new(out)
    }

    /// Scale moving strategies, then rescale them so StayPut keeps exactly `stay`.
    pub fn with_stay_and_scales(&self, stay: f64, scales: [f64; 4]) -> Self {
        let stay = stay.clamp(0.0, 1.0);
        let mut moving = [0.0; 4];
        let scaled = Strategy::MOVING.iter().zip(scales);
        for (slot, (strategy, scale)) in moving.iter_mut().zip(scaled) {
            *slot = self.get(*strategy) * scale.max(0.0);
        }
        let total: f64 = moving.iter().sum();
        if total <= 0.0 {
            return Self::stay_only();
        }
        let mut out = [0.0; 5];
        out[Strategy::StayPut.index()] = stay;
        for (strategy, value) in Strategy::MOVING.iter().zip(moving) {
            out[strategy.index()] = value / total * (1.0 - stay);
        }
        Self(out)
    }
}

impl Index<Strategy> for StrategyWeights {
    type Output = f64;

    fn index(&self, strategy: Strategy) -> &f64 {
        &self.0[strategy.index()]
    }
}

impl From<StrategyWeightConfig> for StrategyWeights {
    fn from(value: StrategyWeightConfig) -> Self {
        Self::new([
            value.stay_put,
            value.route_travel,
            value.backtrack,
            value.direct_travel,
            value.random_travel,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_move(outward_cos: Option<f64>) -> MoveContext {
        MoveContext {
            outward_cos,
            grade: 0.0,
            trail_attraction: 1.0,
            trail_adherence: 1.0,
            uphill_bias: 0.0,
        }
    }

    #[test]
    fn index_matches_all_order() {
        for (idx, strategy) in Strategy::ALL.iter().enumerate() {
            assert_eq!(strategy.index(), idx);
        }
    }

    #[test]
    fn direct_and_backtrack_are_mirror_images() {
        let outward = flat_move(Some(1.0));
        let inward = flat_move(Some(-1.0));
        assert_eq!(Strategy::DirectTravel.move_factor(&outward), 2.0);
        assert_eq!(Strategy::DirectTravel.move_factor(&inward), 0.0);
        assert_eq!(Strategy::Backtrack.move_factor(&outward), 0.0);
        assert_eq!(Strategy::Backtrack.move_factor(&inward), 2.0);
    }

    #[test]
    fn factors_are_uniform_at_last_known_cell() {
        let mv = flat_move(None);
        for strategy in Strategy::MOVING {
            assert_eq!(strategy.move_factor(&mv), 1.0, "{strategy}");
        }
    }

    #[test]
    fn route_follows_trails_by_adherence() {
        let mut mv = flat_move(Some(0.0));
        mv.trail_attraction = 4.0;
        mv.trail_adherence = 1.5;
        assert!((Strategy::RouteTravel.move_factor(&mv) - 8.0).abs() < 1e-12);
    }

    #[test]
    fn uphill_bias_favors_climbing() {
        let mut up = flat_move(Some(0.0));
        up.uphill_bias = 0.6;
        up.grade = 0.2;
        let mut down = up;
        down.grade = -0.2;
        let direct = Strategy::DirectTravel;
        assert!(direct.move_factor(&up) > direct.move_factor(&down));
    }

    #[test]
    fn weights_normalize_and_rescale() {
        let weights = StrategyWeights::new([2.0, 2.0, 2.0, 2.0, 2.0]);
        assert!((weights.stay() - 0.2).abs() < 1e-12);
        let scaled = weights.with_stay_and_scales(0.5, [2.0, 1.0, 1.0, 0.0]);
        let total: f64 = scaled.as_array().iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(scaled.stay(), 0.5);
        assert!((scaled[Strategy::RouteTravel] - 0.25).abs() < 1e-12);
        assert_eq!(scaled[Strategy::RandomTravel], 0.0);
        assert_eq!(StrategyWeights::new([0.0; 5]), StrategyWeights::stay_only());
    }
}
