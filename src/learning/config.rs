//! Learning engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Configuration for accuracy tracking, regime detection and weight adaptation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    // === Adaptation ===
    /// Evaluated decisions required since the last adaptation
    pub min_sample_size: u64,

    /// Fraction of the gap to the blended target closed per adaptation
    pub learning_rate: f64,

    /// Pull toward the default weights (0 = pure accuracy, 1 = pure defaults)
    pub regularization: f64,

    /// Lowest weight any factor may take
    pub weight_floor: f64,

    /// Highest weight any factor may take
    pub weight_ceiling: f64,

    /// Observations below which a factor is assumed 50% accurate
    pub min_factor_samples: u64,

    /// Relative weight change (percent) worth recording as a lesson
    pub lesson_change_pct: f64,

    // === Factor accuracy ===
    /// Score above which a factor is read as bullish
    pub bullish_above: f64,

    /// Score below which a factor is read as bearish
    pub bearish_below: f64,

    /// Realized move (percent) within which a neutral factor counts as right
    pub neutral_tolerance_pct: f64,

    // === HOLD drift ===
    /// Days a HOLD is tracked before its drift is scored
    pub hold_review_days: i64,

    /// Absolute drift (percent) under which a HOLD counts as right
    pub hold_drift_pct: f64,

    // === Regime ===
    /// Benchmark closes considered when detecting the regime
    pub regime_window: usize,

    /// Window return (percent) that marks a trend at typical volatility
    pub trend_threshold_pct: f64,

    /// Daily volatility (percent) treated as typical for the threshold scale
    pub reference_volatility_pct: f64,

    // === Scheduled cycle ===
    /// Only decisions younger than this are re-evaluated
    pub window_days: i64,

    /// Upper bound on decisions evaluated per cycle
    pub max_evaluations_per_cycle: usize,

    /// Upper bound on stored decisions folded in per learning cycle
    pub max_learned_per_cycle: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            // Adaptation
            min_sample_size: 10,
            learning_rate: 0.15,
            regularization: 0.5,
            weight_floor: 0.02,
            weight_ceiling: 0.50,
            min_factor_samples: 3,
            lesson_change_pct: 5.0,      // 5% relative move

            // Factor accuracy
            bullish_above: 60.0,
            bearish_below: 40.0,
            neutral_tolerance_pct: 5.0,

            // HOLD drift
            hold_review_days: 5,
            hold_drift_pct: 3.0,

            // Regime
            regime_window: 20,           // ~one trading month
            trend_threshold_pct: 3.0,
            reference_volatility_pct: 1.0,

            // Scheduled cycle
            window_days: 30,
            max_evaluations_per_cycle: 30,
            max_learned_per_cycle: 500,
        }
    }
}

impl LearningConfig {
    /// Reject bounds that cannot hold for a five-factor vector summing to 1.
    pub fn validate(&self) -> Result<(), EngineError> {
        let factors = crate::models::Factor::COUNT as f64;
        if !(0.0..=1.0).contains(&self.learning_rate) || !(0.0..=1.0).contains(&self.regularization) {
            return Err(EngineError::invariant(
                "learning rate and regularization must lie in [0, 1]",
            ));
        }
        if self.weight_floor < 0.0
            || self.weight_floor >= self.weight_ceiling
            || self.weight_floor * factors > 1.0
            || self.weight_ceiling * factors < 1.0
        {
            return Err(EngineError::invariant(format!(
                "weight bounds [{}, {}] cannot produce a vector summing to 1",
                self.weight_floor, self.weight_ceiling
            )));
        }
        if self.bearish_below >= self.bullish_above {
            return Err(EngineError::invariant("bearish cut-off must sit below bullish cut-off"));
        }
        if self.hold_review_days < 0 || self.hold_drift_pct <= 0.0 {
            return Err(EngineError::invariant(
                "HOLD review needs a non-negative delay and a positive drift band",
            ));
        }
        if self.regime_window < 2 {
            return Err(EngineError::invariant("regime window needs at least two closes"));
        }
        Ok(())
    }
}
