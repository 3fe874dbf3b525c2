//! Bounded online adaptation of factor weights.
//!
//! Each weight moves a fraction (the learning rate) of the way toward a blend
//! of an accuracy-proportional target and its default weight. The result is
//! clamped to the configured bounds and renormalized so the bounds still hold.

use crate::error::EngineError;
use crate::models::{default_weights, Factor, FactorMap, LearningState, WEIGHT_SUM_TOLERANCE};

use super::config::LearningConfig;

/// Accuracy spread below which factors are considered indistinguishable.
const EQUAL_ACCURACY_EPSILON: f64 = 1e-9;

/// One factor's move in a proposal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightChange {
    pub factor: Factor,
    pub old: f64,
    pub new: f64,
    pub accuracy: f64,
}

impl WeightChange {
    /// Relative change in percent of the old weight.
    pub fn relative_change_pct(&self) -> f64 {
        if self.old == 0.0 {
            return if self.new == 0.0 { 0.0 } else { 100.0 };
        }
        (self.new - self.old) / self.old * 100.0
    }

    pub fn lesson(&self) -> String {
        let verb = if self.new > self.old { "Increased" } else { "Reduced" };
        format!(
            "{} {} weight {:.3} → {:.3} (accuracy {:.0}%)",
            verb,
            self.factor.label(),
            self.old,
            self.new,
            self.accuracy * 100.0
        )
    }
}

/// Candidate successor weights.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightProposal {
    pub weights: FactorMap<f64>,
    pub accuracies: FactorMap<f64>,
    pub changes: Vec<WeightChange>,
}

/// Accuracy used for adaptation, 0.5 until a factor has enough observations.
pub fn effective_accuracies(state: &LearningState, config: &LearningConfig) -> FactorMap<f64> {
    state.factor_accuracy.map(|_, counter| {
        if counter.total < config.min_factor_samples {
            0.5
        } else {
            counter.accuracy()
        }
    })
}

/// Propose successor weights from the accumulated accuracy.
///
/// Fails with `InsufficientSample` below the configured sample size and with
/// `DegenerateInput` when every factor is equally accurate.
pub fn propose_weights(state: &LearningState, config: &LearningConfig) -> Result<WeightProposal, EngineError> {
    let have = state.evaluated_since_adaptation;
    if have < config.min_sample_size {
        return Err(EngineError::InsufficientSample {
            have,
            need: config.min_sample_size,
        });
    }

    let accuracies = effective_accuracies(state, config);
    let (lo, hi) = accuracies
        .values()
        .fold((f64::MAX, f64::MIN), |(lo, hi), &a| (lo.min(a), hi.max(a)));
    if hi - lo < EQUAL_ACCURACY_EPSILON {
        return Err(EngineError::DegenerateInput(format!(
            "all factor accuracies equal ({:.3})",
            hi
        )));
    }

    let total: f64 = accuracies.values().sum();
    let defaults = default_weights();
    let current = state.current_weights.weights();

    let nudged = FactorMap::from_fn(|f| {
        let target = accuracies[f] / total;
        let blended = (1.0 - config.regularization) * target + config.regularization * defaults[f];
        current[f] + config.learning_rate * (blended - current[f])
    });

    let weights = clamp_and_normalize(&nudged, config.weight_floor, config.weight_ceiling)?;

    let changes = Factor::ALL
        .iter()
        .map(|&f| WeightChange {
            factor: f,
            old: current[f],
            new: weights[f],
            accuracy: accuracies[f],
        })
        .collect();

    Ok(WeightProposal {
        weights,
        accuracies,
        changes,
    })
}

/// Clamp each weight to `[floor, ceiling]` and rescale to sum to 1.
///
/// The excess (or shortfall) is taken from each factor in proportion to its
/// room above the floor (or below the ceiling), so one pass lands inside the
/// bounds exactly.
pub fn clamp_and_normalize(weights: &FactorMap<f64>, floor: f64, ceiling: f64) -> Result<FactorMap<f64>, EngineError> {
    let mut clamped = weights.map(|_, &w| if w.is_finite() { w.clamp(floor, ceiling) } else { floor });
    let sum: f64 = clamped.values().sum();
    let gap = sum - 1.0;

    if gap.abs() > f64::EPSILON {
        let room = clamped.map(|_, &w| if gap > 0.0 { w - floor } else { ceiling - w });
        let total_room: f64 = room.values().sum();
        if total_room + f64::EPSILON < gap.abs() {
            return Err(EngineError::invariant(format!(
                "bounds [{}, {}] cannot absorb a sum of {:.6}",
                floor, ceiling, sum
            )));
        }
        for f in Factor::ALL {
            let share = if total_room > 0.0 { room[f] / total_room } else { 0.0 };
            clamped[f] = (clamped[f] - gap * share).clamp(floor, ceiling);
        }
    }

    let sum: f64 = clamped.values().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(EngineError::invariant(format!(
            "renormalized weights sum to {:.9}",
            sum
        )));
    }
    Ok(clamped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AccuracyCounter;

    fn state_with_accuracy(counts: [(u64, u64); 5], evaluated: u64) -> LearningState {
        let mut state = LearningState::new();
        for (f, (correct, total)) in Factor::ALL.iter().zip(counts) {
            state.factor_accuracy[*f] = AccuracyCounter { correct, total };
        }
        state.evaluated_since_adaptation = evaluated;
        state
    }

    fn assert_valid(weights: &FactorMap<f64>, config: &LearningConfig) {
        let sum: f64 = weights.values().sum();
        assert!((sum - 1.0).abs() < 1e-6, "sum {}", sum);
        for &w in weights.values() {
            assert!(w >= config.weight_floor - 1e-12 && w <= config.weight_ceiling + 1e-12);
        }
    }

    #[test]
    fn test_below_min_sample_is_rejected() {
        let config = LearningConfig::default();
        let state = state_with_accuracy([(9, 10), (1, 10), (5, 10), (5, 10), (5, 10)], 9);
        let err = propose_weights(&state, &config).unwrap_err();
        assert_eq!(err, EngineError::InsufficientSample { have: 9, need: 10 });
    }

    #[test]
    fn test_equal_accuracies_are_degenerate() {
        let config = LearningConfig::default();
        let state = state_with_accuracy([(6, 10); 5], 20);
        assert!(matches!(
            propose_weights(&state, &config),
            Err(EngineError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_accurate_factor_gains_weight() {
        let config = LearningConfig::default();
        let state = state_with_accuracy([(3, 10), (5, 10), (9, 10), (5, 10), (5, 10)], 20);
        let proposal = propose_weights(&state, &config).unwrap();

        assert_valid(&proposal.weights, &config);
        assert!(proposal.weights[Factor::Momentum] > 0.20);
        assert!(proposal.weights[Factor::Technical] < 0.30);
    }

    #[test]
    fn test_sparse_factor_uses_prior() {
        let config = LearningConfig::default();
        let state = state_with_accuracy([(2, 2), (5, 10), (8, 10), (5, 10), (5, 10)], 20);
        let accuracies = effective_accuracies(&state, &config);
        assert_eq!(accuracies[Factor::Technical], 0.5);
        assert_eq!(accuracies[Factor::Momentum], 0.8);
    }

    #[test]
    fn test_clamp_and_normalize_respects_bounds() {
        let config = LearningConfig::default();
        let skewed = FactorMap::from_fn(|f| if f == Factor::Technical { 0.9 } else { 0.0 });
        let weights = clamp_and_normalize(&skewed, config.weight_floor, config.weight_ceiling).unwrap();
        assert_valid(&weights, &config);
        assert!((weights[Factor::Technical] - 0.5).abs() < 1e-9);

        let tiny = FactorMap::from_fn(|_| 0.01);
        let weights = clamp_and_normalize(&tiny, config.weight_floor, config.weight_ceiling).unwrap();
        assert_valid(&weights, &config);
    }

    #[test]
    fn test_repeated_adaptation_stays_valid() {
        let config = LearningConfig::default();
        let mut state = state_with_accuracy([(10, 10), (0, 10), (0, 10), (0, 10), (1, 10)], 20);
        for _ in 0..50 {
            let proposal = propose_weights(&state, &config).unwrap();
            assert_valid(&proposal.weights, &config);
            let next = state.current_weights.successor(proposal.weights).unwrap();
            let entry = crate::models::WeightHistoryEntry::new(&next, 0.5, 20, "test");
            state.publish(next, entry).unwrap();
            state.evaluated_since_adaptation = 20;
        }
        assert_eq!(state.current_weights.version(), 51);
    }

    #[test]
    fn test_lesson_wording() {
        let change = WeightChange {
            factor: Factor::Momentum,
            old: 0.20,
            new: 0.23,
            accuracy: 0.7,
        };
        assert!((change.relative_change_pct() - 15.0).abs() < 1e-9);
        assert_eq!(change.lesson(), "Increased Momentum weight 0.200 → 0.230 (accuracy 70%)");
    }
}
