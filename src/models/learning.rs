//! Learning state: accuracy accumulators, calibration, regime, weight versions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

use super::decision::Action;
use super::factor::FactorMap;
use super::regime::MarketRegime;
use super::weights::{WeightHistoryEntry, WeightVector};

/// How many lessons are kept.
pub const MAX_LESSONS: usize = 100;

/// How many regime observations are kept.
pub const MAX_REGIME_HISTORY: usize = 100;

/// Running correct/total tally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccuracyCounter {
    pub correct: u64,
    pub total: u64,
}

impl AccuracyCounter {
    pub fn record(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
    }

    /// Fraction correct; 0.5 before any evidence.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.5
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

/// Realized hit rate of decisions whose confidence fell in a range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationBucket {
    /// Inclusive lower bound
    pub lower: u8,
    /// Exclusive upper bound, except for the top bucket
    pub upper: u8,
    pub predicted: u64,
    pub correct: u64,
}

impl CalibrationBucket {
    pub fn new(lower: u8, upper: u8) -> Self {
        Self {
            lower,
            upper,
            predicted: 0,
            correct: 0,
        }
    }

    /// Default bucket layout covering the confidence range [30, 95].
    pub fn default_layout() -> Vec<Self> {
        vec![
            Self::new(30, 45),
            Self::new(45, 60),
            Self::new(60, 75),
            Self::new(75, 95),
        ]
    }

    pub fn label(&self) -> String {
        format!("{}-{}", self.lower, self.upper)
    }

    pub fn hit_rate(&self) -> Option<f64> {
        (self.predicted > 0).then(|| self.correct as f64 / self.predicted as f64)
    }
}

/// Per-sector record of decisions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SectorPerformance {
    pub decisions: u64,
    pub correct: u64,
    pub total_pnl_pct: Decimal,
}

impl SectorPerformance {
    pub fn accuracy(&self) -> f64 {
        if self.decisions == 0 {
            0.0
        } else {
            self.correct as f64 / self.decisions as f64
        }
    }

    pub fn avg_pnl_pct(&self) -> Decimal {
        if self.decisions == 0 {
            Decimal::ZERO
        } else {
            self.total_pnl_pct / Decimal::from(self.decisions)
        }
    }
}

/// A regime classification together with the signal that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeObservation {
    pub timestamp: DateTime<Utc>,
    pub regime: MarketRegime,
    /// Benchmark return over the window in percent
    pub window_return_pct: f64,
    /// Standard deviation of daily returns in percent
    pub volatility_pct: f64,
}

/// Human-readable note about a weight change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub timestamp: DateTime<Utc>,
    pub lesson: String,
    pub evaluation_count: u64,
}

/// Everything the learning engine knows.
///
/// Instances are treated as immutable snapshots once shared; the learning
/// engine clones, modifies and republishes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningState {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // === Weights ===
    /// Currently published weight vector
    pub current_weights: WeightVector,

    /// Every vector ever published, by version
    pub weight_versions: BTreeMap<u64, WeightVector>,

    /// Append-only audit trail of published vectors
    pub weight_history: Vec<WeightHistoryEntry>,

    // === Accuracy ===
    pub factor_accuracy: FactorMap<AccuracyCounter>,
    pub action_accuracy: BTreeMap<Action, AccuracyCounter>,
    pub sector_performance: BTreeMap<String, SectorPerformance>,
    pub calibration: Vec<CalibrationBucket>,

    // === Regime ===
    pub market_regime: MarketRegime,
    pub regime_history: Vec<RegimeObservation>,

    // === Counters ===
    pub total_decisions_evaluated: u64,

    /// Evaluated decisions since the last published adaptation
    pub evaluated_since_adaptation: u64,

    /// Correct decisions since the last published adaptation
    pub correct_since_adaptation: u64,

    pub adaptations_count: u64,

    pub lessons: Vec<Lesson>,
}

impl LearningState {
    /// Fresh state with the default weights published as version 1.
    pub fn new() -> Self {
        let now = Utc::now();
        let weights = WeightVector::defaults();
        let entry = WeightHistoryEntry::new(&weights, 0.0, 0, "Registered default weights");

        Self {
            created_at: now,
            updated_at: now,
            weight_versions: BTreeMap::from([(weights.version(), weights.clone())]),
            current_weights: weights,
            weight_history: vec![entry],
            factor_accuracy: FactorMap::default(),
            action_accuracy: Action::ALL
                .iter()
                .map(|&a| (a, AccuracyCounter::default()))
                .collect(),
            sector_performance: BTreeMap::new(),
            calibration: CalibrationBucket::default_layout(),
            market_regime: MarketRegime::default(),
            regime_history: Vec::new(),
            total_decisions_evaluated: 0,
            evaluated_since_adaptation: 0,
            correct_since_adaptation: 0,
            adaptations_count: 0,
            lessons: Vec::new(),
        }
    }

    /// Install a successor weight vector.
    ///
    /// The version must be exactly one above the current one.
    pub fn publish(&mut self, weights: WeightVector, entry: WeightHistoryEntry) -> Result<(), EngineError> {
        let expected = self.current_weights.version() + 1;
        if weights.version() != expected {
            return Err(EngineError::invariant(format!(
                "published version {} but expected {}",
                weights.version(),
                expected
            )));
        }

        self.weight_versions.insert(weights.version(), weights.clone());
        self.weight_history.push(entry);
        self.current_weights = weights;
        self.adaptations_count += 1;
        self.evaluated_since_adaptation = 0;
        self.correct_since_adaptation = 0;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Hit rate of the decisions evaluated since the last adaptation.
    pub fn hit_rate_since_adaptation(&self) -> f64 {
        if self.evaluated_since_adaptation == 0 {
            0.0
        } else {
            self.correct_since_adaptation as f64 / self.evaluated_since_adaptation as f64
        }
    }

    /// Hit rate across every action ever evaluated.
    pub fn overall_accuracy(&self) -> f64 {
        let (correct, total) = self
            .action_accuracy
            .values()
            .fold((0, 0), |(c, t), a| (c + a.correct, t + a.total));
        if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        }
    }

    /// Bucket that a confidence value falls into.
    pub fn calibration_bucket_mut(&mut self, confidence: u8) -> Option<&mut CalibrationBucket> {
        let last = self.calibration.len().saturating_sub(1);
        self.calibration.iter_mut().enumerate().find_map(|(i, b)| {
            let in_range = confidence >= b.lower
                && (confidence < b.upper || (i == last && confidence <= b.upper));
            in_range.then_some(b)
        })
    }

    pub fn push_lesson(&mut self, lesson: String) {
        self.lessons.push(Lesson {
            timestamp: Utc::now(),
            lesson,
            evaluation_count: self.total_decisions_evaluated,
        });
        if self.lessons.len() > MAX_LESSONS {
            let excess = self.lessons.len() - MAX_LESSONS;
            self.lessons.drain(..excess);
        }
    }

    pub fn push_regime(&mut self, observation: RegimeObservation) {
        self.market_regime = observation.regime;
        self.regime_history.push(observation);
        if self.regime_history.len() > MAX_REGIME_HISTORY {
            let excess = self.regime_history.len() - MAX_REGIME_HISTORY;
            self.regime_history.drain(..excess);
        }
        self.updated_at = Utc::now();
    }
}

impl Default for LearningState {
    fn default() -> Self {
        Self::new()
    }
}
