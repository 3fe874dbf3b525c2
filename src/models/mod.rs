//! Data models for factor scores, weights, decisions, and learning state.

mod decision;
mod factor;
mod learning;
mod regime;
mod weights;

pub use decision::{Action, Decision, Evaluation, Outcome, TimeHorizon};
pub use factor::{Factor, FactorMap, FactorScore, Signal, NEUTRAL_SCORE};
pub use learning::{
    AccuracyCounter, CalibrationBucket, LearningState, Lesson, RegimeObservation,
    SectorPerformance,
};
pub use regime::MarketRegime;
pub use weights::{default_weights, WeightHistoryEntry, WeightVector, WEIGHT_SUM_TOLERANCE};
