//! Learning engine: accuracy tracking, regime detection and weight adaptation.

pub mod accuracy;
pub mod adaptation;
pub mod config;
pub mod engine;
pub mod regime;
pub mod summary;

pub use accuracy::{ingest, FactorDirection, IngestReport};
pub use adaptation::{clamp_and_normalize, propose_weights, WeightChange, WeightProposal};
pub use config::LearningConfig;
pub use engine::{run_learning_cycle, LearningCycleOutcome, LearningEngine};
pub use regime::detect_regime;
pub use summary::LearningSummary;
