//! Runner: periodic loop that keeps decisions, outcomes and weights current.
//!
//! Each tick:
//! - Reloads the price feed snapshot
//! - Refreshes the market regime from benchmark closes
//! - Optionally scans a watchlist and stores new decisions
//! - Evaluates open decisions against the latest quotes
//! - Runs a learning cycle and persists the learning state

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::engine::{evaluate_decision, AnalysisInput, DecisionEngine};
use crate::feed::{JsonFeed, PriceFeed};
use crate::learning::{LearningCycleOutcome, LearningEngine};
use crate::models::{Decision, RegimeObservation};

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Seconds between ticks
    pub interval_secs: u64,

    /// Price feed snapshot, re-read every tick
    pub feed_path: PathBuf,

    /// Analysis inputs to scan every tick, if any
    pub scan_path: Option<PathBuf>,
}

/// Counts from one evaluation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationPass {
    pub checked: usize,
    pub updated: usize,
    pub closed: usize,
    pub missing_quote: usize,
}

/// Read a JSON array of analysis inputs.
pub async fn load_inputs(path: &Path) -> Result<Vec<AnalysisInput>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read analysis inputs {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse analysis inputs {}", path.display()))
}

/// Detect the regime from the feed's benchmark closes and persist the state.
pub async fn refresh_regime(
    db: &Database,
    learning: &LearningEngine,
    feed: &dyn PriceFeed,
) -> Result<Option<RegimeObservation>> {
    let closes = feed.benchmark_closes();
    if closes.is_empty() {
        debug!("No benchmark closes, keeping current regime");
        return Ok(None);
    }

    let observation = learning.update_regime(closes).await?;
    db.save_learning_state(&*learning.snapshot().await).await?;
    info!(
        regime = %observation.regime,
        window_return_pct = observation.window_return_pct,
        volatility_pct = observation.volatility_pct,
        "Regime refreshed"
    );
    Ok(Some(observation))
}

/// Scan inputs under the current weights and regime, storing each decision.
pub async fn scan_and_store(
    db: &Database,
    engine: &Arc<DecisionEngine>,
    learning: &LearningEngine,
    inputs: Vec<AnalysisInput>,
) -> Result<Vec<Decision>> {
    let weights = learning.current_weights().await;
    let regime = learning.regime().await;

    let results = engine.scan(inputs, weights, regime).await;
    let mut decisions = Vec::with_capacity(results.len());
    for scan in results {
        match scan.result {
            Ok(decision) => {
                db.save_decision(&decision).await?;
                decisions.push(decision);
            }
            Err(e) => warn!(ticker = %scan.ticker, error = %e, "Could not compute decision"),
        }
    }
    Ok(decisions)
}

/// Evaluate recent open decisions against the feed and store the results.
///
/// Open calls and unscored HOLDs younger than `window_days` are checked, at
/// most `max_per_pass` of them, least recently evaluated first.
pub async fn evaluate_open(
    db: &Database,
    feed: &dyn PriceFeed,
    window_days: i64,
    max_per_pass: usize,
) -> Result<EvaluationPass> {
    let since = Utc::now() - chrono::Duration::days(window_days);
    let open = db.get_open_decisions(since, max_per_pass as i64).await?;
    let mut pass = EvaluationPass::default();

    for decision in open {
        pass.checked += 1;
        let observation = match feed.quote(&decision.ticker) {
            Some(o) => o,
            None => {
                pass.missing_quote += 1;
                debug!(ticker = %decision.ticker, "No quote for open decision");
                continue;
            }
        };

        let evaluated = evaluate_decision(&decision, &observation);
        if evaluated.evaluation().is_none() {
            continue;
        }
        if db.update_evaluation(&evaluated).await? {
            pass.updated += 1;
            if evaluated.is_terminal() {
                pass.closed += 1;
                info!(
                    ticker = %evaluated.ticker,
                    action = %evaluated.action,
                    outcome = ?evaluated.outcome(),
                    "Decision closed"
                );
            }
        }
    }

    Ok(pass)
}

/// Run a learning cycle over the stored decisions no cycle has consumed yet.
///
/// The writer lock is held from loading to commit, and the new state is only
/// published once the store has marked its inputs as learned.
pub async fn learn_from_store(db: &Database, learning: &LearningEngine) -> Result<LearningCycleOutcome> {
    let config = learning.config();
    let cycle = learning.begin_cycle().await;
    let ready = db
        .get_unlearned_decisions(config.hold_review_days, config.max_learned_per_cycle as i64)
        .await?;
    let outcome = cycle.run(&ready).await?;
    db.commit_learning(&outcome.state, &outcome.learned).await?;
    cycle.commit(outcome.state.clone()).await;
    Ok(outcome)
}

/// Periodic runner.
pub struct Runner {
    config: RunnerConfig,
    db: Database,
    engine: Arc<DecisionEngine>,
    learning: Arc<LearningEngine>,
    shutdown: Arc<AtomicBool>,
}

impl Runner {
    pub fn new(
        config: RunnerConfig,
        db: Database,
        engine: Arc<DecisionEngine>,
        learning: Arc<LearningEngine>,
    ) -> Self {
        Self {
            config,
            db,
            engine,
            learning,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Main loop.
    pub async fn run(&self) -> Result<()> {
        info!(
            interval = self.config.interval_secs,
            feed = %self.config.feed_path.display(),
            "Starting runner loop"
        );

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs.max(1)));

        // Register shutdown handler
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            ticker.tick().await;
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = self.tick().await {
                error!(error = %e, "Error in runner tick");
            }
        }

        db_flush(&self.db, &self.learning).await?;
        info!("Runner shutdown complete");
        Ok(())
    }

    /// Single iteration of the main loop.
    pub async fn tick(&self) -> Result<()> {
        debug!("Runner tick");

        // 1. Fresh prices
        let feed = JsonFeed::load(&self.config.feed_path).await?;

        // 2. Regime
        if let Err(e) = refresh_regime(&self.db, &self.learning, &feed).await {
            warn!(error = %e, "Regime refresh failed, keeping previous regime");
        }

        // 3. New decisions
        if let Some(path) = &self.config.scan_path {
            let inputs = load_inputs(path).await?;
            let stored = scan_and_store(&self.db, &self.engine, &self.learning, inputs).await?;
            info!(decisions = stored.len(), "Scan stored");
        }

        // 4. Outcomes
        let config = self.learning.config();
        let pass = evaluate_open(
            &self.db,
            &feed,
            config.window_days,
            config.max_evaluations_per_cycle,
        )
        .await?;
        info!(
            checked = pass.checked,
            updated = pass.updated,
            closed = pass.closed,
            missing = pass.missing_quote,
            "Evaluation pass"
        );

        // 5. Learning
        let outcome = learn_from_store(&self.db, &self.learning).await?;
        if outcome.adapted {
            info!(reason = %outcome.reason, lessons = outcome.lessons.len(), "Weights adapted");
        }

        Ok(())
    }
}

async fn db_flush(db: &Database, learning: &LearningEngine) -> Result<()> {
    db.save_learning_state(&*learning.snapshot().await).await
}
