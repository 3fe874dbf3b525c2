//! Learning engine: owns the learning state and publishes new weight vectors.
//!
//! Readers take `Arc` snapshots of the state. Every mutation goes through a
//! single async writer lock held across read → compute → publish, so two
//! cycles can never interleave and readers never see a half-applied update.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::{
    Decision, LearningState, MarketRegime, RegimeObservation, WeightHistoryEntry, WeightVector,
};

use super::accuracy::{ingest, IngestReport};
use super::adaptation::propose_weights;
use super::config::LearningConfig;
use super::regime::detect_regime;
use super::summary::LearningSummary;

/// Result of one learning cycle.
#[derive(Debug, Clone)]
pub struct LearningCycleOutcome {
    /// Published successor, if adaptation happened
    pub new_weights: Option<WeightVector>,

    /// State after the cycle
    pub state: LearningState,

    pub adapted: bool,

    /// Why the weights did or did not change
    pub reason: String,

    /// Closed decisions newly folded into the accuracy statistics
    pub ingested: usize,

    /// HOLD decisions whose drift was scored
    pub holds_reviewed: usize,

    /// Ids consumed by this cycle, to be marked as learned by the store
    pub learned: Vec<Uuid>,

    /// Lessons recorded during this cycle
    pub lessons: Vec<String>,
}

/// Ingest evaluated decisions and attempt one weight adaptation.
///
/// Pure over the input state: the caller decides whether to publish the
/// returned state. Too few samples or indistinguishable factors are reported
/// as a no-op; only a broken invariant is an error.
pub fn run_learning_cycle(
    state: &LearningState,
    evaluated: &[Decision],
    config: &LearningConfig,
) -> Result<LearningCycleOutcome, EngineError> {
    let mut next = state.clone();
    let report: IngestReport = ingest(&mut next, evaluated, config);
    if report.duplicates > 0 || report.not_ready > 0 {
        debug!(
            duplicates = report.duplicates,
            not_ready = report.not_ready,
            "Skipped decisions"
        );
    }

    let proposal = match propose_weights(&next, config) {
        Ok(p) => p,
        Err(e @ (EngineError::InsufficientSample { .. } | EngineError::DegenerateInput(_))) => {
            info!(reason = %e, "Weights unchanged");
            return Ok(LearningCycleOutcome {
                new_weights: None,
                state: next,
                adapted: false,
                reason: e.to_string(),
                ingested: report.ingested,
                holds_reviewed: report.holds_reviewed,
                learned: report.learned,
                lessons: Vec::new(),
            });
        }
        Err(e) => return Err(e),
    };

    let hit_rate = next.hit_rate_since_adaptation();
    let sample_size = next.evaluated_since_adaptation;
    let successor = next.current_weights.successor(proposal.weights)?;
    let reason = format!(
        "Adapted on {} evaluated decisions ({:.1}% hit rate)",
        sample_size,
        hit_rate * 100.0
    );
    let entry = WeightHistoryEntry::new(&successor, hit_rate, sample_size, reason.clone());
    next.publish(successor.clone(), entry)?;

    let lessons: Vec<String> = proposal
        .changes
        .iter()
        .filter(|c| c.relative_change_pct().abs() > config.lesson_change_pct)
        .map(|c| c.lesson())
        .collect();
    for lesson in &lessons {
        next.push_lesson(lesson.clone());
    }

    info!(
        version = successor.version(),
        sample = sample_size,
        hit_rate,
        lessons = lessons.len(),
        "Published new weights"
    );

    Ok(LearningCycleOutcome {
        new_weights: Some(successor),
        state: next,
        adapted: true,
        reason,
        ingested: report.ingested,
        holds_reviewed: report.holds_reviewed,
        learned: report.learned,
        lessons,
    })
}

/// Shared owner of the learning state.
pub struct LearningEngine {
    config: LearningConfig,
    state: RwLock<Arc<LearningState>>,
    writer: Mutex<()>,
}

impl LearningEngine {
    pub fn new(config: LearningConfig, state: LearningState) -> Self {
        Self {
            config,
            state: RwLock::new(Arc::new(state)),
            writer: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    /// Current state snapshot.
    pub async fn snapshot(&self) -> Arc<LearningState> {
        Arc::clone(&*self.state.read().await)
    }

    /// Currently published weights.
    pub async fn current_weights(&self) -> Arc<WeightVector> {
        Arc::new(self.snapshot().await.current_weights.clone())
    }

    pub async fn regime(&self) -> MarketRegime {
        self.snapshot().await.market_regime
    }

    pub async fn summary(&self) -> LearningSummary {
        LearningSummary::from_state(&*self.snapshot().await)
    }

    async fn publish(&self, state: LearningState) {
        *self.state.write().await = Arc::new(state);
    }

    /// Take the writer lock for one cycle.
    ///
    /// Other writers wait until the cycle is dropped, so the caller can load
    /// inputs and persist the result before anyone else reads the same rows.
    pub async fn begin_cycle(&self) -> LearningCycle<'_> {
        LearningCycle {
            engine: self,
            _guard: self.writer.lock().await,
        }
    }

    /// Detect the regime from benchmark closes and record it.
    pub async fn update_regime(&self, closes: &[Decimal]) -> Result<RegimeObservation, EngineError> {
        let _guard = self.writer.lock().await;
        let observation = detect_regime(closes, &self.config)?;

        let current = self.snapshot().await;
        if observation.regime != current.market_regime {
            warn!(
                from = %current.market_regime,
                to = %observation.regime,
                window_return_pct = observation.window_return_pct,
                "Market regime changed"
            );
        }

        let mut next = (*current).clone();
        next.push_regime(observation.clone());
        self.publish(next).await;
        Ok(observation)
    }
}

/// Exclusive learning cycle over the current state.
pub struct LearningCycle<'a> {
    engine: &'a LearningEngine,
    _guard: MutexGuard<'a, ()>,
}

impl LearningCycle<'_> {
    /// Compute the next state without publishing it.
    pub async fn run(&self, evaluated: &[Decision]) -> Result<LearningCycleOutcome, EngineError> {
        let current = self.engine.snapshot().await;
        run_learning_cycle(&current, evaluated, &self.engine.config)
    }

    /// Publish the state and release the writer lock.
    pub async fn commit(self, state: LearningState) {
        self.engine.publish(state).await;
    }
}
