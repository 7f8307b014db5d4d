//! Subject profile and time-since-loss to movement-phase parameters.
//!
//! The phase state machine is stateless: every call derives the phase from
//! `hours_elapsed` alone, so ticks can be recomputed in any order.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    config::{BehaviorConfig, ExperienceProfile, SimulationConfig},
    strategy::StrategyWeights,
};

/// Floor on StayPut once the subject is sheltering.
pub const SHELTER_MIN_STAY: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub age: u32,
    #[serde(default)]
    pub sex: Sex,
    #[serde(default)]
    pub experience: ExperienceLevel,
}

impl SubjectProfile {
    pub fn new(age: u32, sex: Sex, experience: ExperienceLevel) -> Self {
        Self {
            age,
            sex,
            experience,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Panic,
    Transition,
    Exhaustion,
    Shelter,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Panic => "panic",
            Phase::Transition => "transition",
            Phase::Exhaustion => "exhaustion",
            Phase::Shelter => "shelter",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the engine needs to know about the subject for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhaseParameters {
    pub phase: Phase,
    pub hours_elapsed: f64,
    /// Distance covered in one tick, phase multipliers included.
    pub base_distance_m: f64,
    pub weights: StrategyWeights,
    /// Speed-up while the subject is still moving with purpose (panic, transition).
    pub panic_multiplier: f64,
    /// Slow-down once fatigue sets in (exhaustion, shelter).
    pub exhaustion_multiplier: f64,
    pub uphill_bias: f64,
    pub trail_adherence: f64,
}

impl PhaseParameters {
    pub fn speed_multiplier(&self) -> f64 {
        self.panic_multiplier * self.exhaustion_multiplier
    }
}

#[derive(Debug, Clone)]
pub struct BehaviorModel {
    config: Arc<BehaviorConfig>,
    tick_hours: f64,
}

impl BehaviorModel {
    pub fn new(config: Arc<BehaviorConfig>, tick_hours: f64) -> Self {
        Self { config, tick_hours }
    }

    pub fn builtin() -> Self {
        Self::new(BehaviorConfig::builtin(), SimulationConfig::default().tick_hours())
    }

    pub fn config(&self) -> &BehaviorConfig {
        &self.config
    }

    pub fn phase_at(&self, hours_elapsed: f64) -> Phase {
        let bounds = &self.config.phases;
        let hours = hours_elapsed.max(0.0);
        if hours < bounds.panic_end_hours {
            Phase::Panic
        } else if hours < bounds.transition_end_hours {
            Phase::Transition
        } else if hours < bounds.exhaustion_end_hours {
            Phase::Exhaustion
        } else {
            Phase::Shelter
        }
    }

    /// Walking speed before phase effects.
    pub fn base_speed_kmh(&self, profile: &SubjectProfile) -> f64 {
        let sex = match profile.sex {
            Sex::Male => self.config.sex.male,
            Sex::Female => self.config.sex.female,
            Sex::Unknown => self.config.sex.unknown,
        };
        self.config.speed_for_age(profile.age) * sex
    }

    pub fn compute_phase(&self, profile: &SubjectProfile, hours_elapsed: f64) -> PhaseParameters {
        let config = &*self.config;
        let hours = if hours_elapsed.is_finite() { hours_elapsed.max(0.0) } else { 0.0 };
        let phase = self.phase_at(hours);

        let (panic_multiplier, exhaustion_multiplier, uphill_bias, weights) = match phase {
            Phase::Panic => (
                config.panic.speed_multiplier,
                1.0,
                config.panic.uphill_bias,
                StrategyWeights::from(config.panic.weights),
            ),
            Phase::Transition => (
                config.transition.speed_multiplier,
                1.0,
                config.transition.uphill_bias,
                StrategyWeights::from(config.transition.weights),
            ),
            Phase::Exhaustion => {
                let start = config.phases.transition_end_hours;
                let span = (config.phases.exhaustion_end_hours - start).max(f64::EPSILON);
                let t = ((hours - start) / span).clamp(0.0, 1.0);
                let profile = &config.exhaustion;
                let weights = StrategyWeights::from(profile.weights_start)
                    .lerp(&StrategyWeights::from(profile.weights_end), t);
                (
                    1.0,
                    profile.speed_start + (profile.speed_end - profile.speed_start) * t,
                    profile.uphill_bias,
                    weights,
                )
            }
            Phase::Shelter => (
                1.0,
                config.shelter.speed_multiplier,
                config.shelter.uphill_bias,
                StrategyWeights::from(config.shelter.weights),
            ),
        };

        let experience = self.experience(profile.experience);
        let stay = match phase {
            Phase::Shelter => weights.stay().max(SHELTER_MIN_STAY),
            _ => weights.stay(),
        };
        let weights = weights.with_stay_and_scales(
            stay,
            [experience.trail_adherence, 1.0, 1.0, experience.random_scale],
        );

        let speed_kmh = self.base_speed_kmh(profile) * panic_multiplier * exhaustion_multiplier;
        PhaseParameters {
            phase,
            hours_elapsed: hours,
            base_distance_m: (speed_kmh * 1000.0 * self.tick_hours).max(0.0),
            weights,
            panic_multiplier,
            exhaustion_multiplier,
            uphill_bias,
            trail_adherence: experience.trail_adherence,
        }
    }

    fn experience(&self, level: ExperienceLevel) -> &ExperienceProfile {
        match level {
            ExperienceLevel::Low => &self.config.experience.low,
            ExperienceLevel::Medium => &self.config.experience.medium,
            ExperienceLevel::High => &self.config.experience.high,
        }
    }
}

/// [`BehaviorModel::compute_phase`] against the builtin constants and a 15-minute tick.
pub fn compute_phase(profile: &SubjectProfile, hours_elapsed: f64) -> PhaseParameters {
    BehaviorModel::builtin().compute_phase(profile, hours_elapsed)
}
