use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Speed-weighted scoring for correct answers.
///
/// A correct answer is worth `base_points * (1 - latency_fraction * decay_weight)`,
/// never less than `min_points`. Wrong or missing answers are worth nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringRules {
    pub base_points: u64,
    pub decay_weight: f64,
    pub min_points: u64,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            base_points: 1000,
            decay_weight: 1.0,
            min_points: 100,
        }
    }
}

impl ScoringRules {
    pub fn validate(&self) -> Result<(), String> {
        if self.base_points == 0 {
            return Err("base_points must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.decay_weight) {
            return Err(format!(
                "decay_weight must be within [0, 1], got {}",
                self.decay_weight
            ));
        }
        if self.min_points > self.base_points {
            return Err(format!(
                "min_points ({}) exceeds base_points ({})",
                self.min_points, self.base_points
            ));
        }
        Ok(())
    }

    pub fn points(&self, correct: bool, latency: Duration, round_duration: Duration) -> u64 {
        if !correct {
            return 0;
        }
        let fraction = latency_fraction(latency, round_duration);
        let raw = self.base_points as f64 * (1.0 - fraction * self.decay_weight);
        (raw.round().max(0.0) as u64).max(self.min_points)
    }
}

/// Elapsed share of the round, clamped to `[0, 1]`.
pub fn latency_fraction(latency: Duration, round_duration: Duration) -> f64 {
    if round_duration.is_zero() {
        return 1.0;
    }
    (latency.as_secs_f64() / round_duration.as_secs_f64()).clamp(0.0, 1.0)
}

#[cfg(test)]
#[path = "tests/scoring_tests.rs"]
mod tests;
