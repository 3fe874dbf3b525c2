//! Decision engine: scoring, classification, exits and outcome evaluation.

pub mod classifier;
pub mod config;
pub mod decision_engine;
pub mod evaluator;
pub mod scoring;
pub mod targets;

pub use classifier::Classifier;
pub use config::{AtrMultiples, EngineConfig, RegimeThresholds, ThresholdTable};
pub use decision_engine::{AnalysisInput, DecisionEngine, ScanResult};
pub use evaluator::{directional_return_pct, evaluate_decision, PriceObservation};
pub use scoring::{aggregate, clamp_confidence, CompositeScore};
pub use targets::{PriceLevels, TargetCalculator, TargetStop, VolatilityRegime};
