//! Decision engine: turns factor scores into a complete trading decision.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::models::{Decision, Factor, FactorScore, MarketRegime, Signal, WeightVector};

use super::classifier::Classifier;
use super::config::EngineConfig;
use super::scoring::{aggregate, clamp_confidence};
use super::targets::{PriceLevels, TargetCalculator, VolatilityRegime};

/// Everything known about one ticker at analysis time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInput {
    pub ticker: String,

    #[serde(default)]
    pub sector: Option<String>,

    pub entry_price: Decimal,

    /// Average True Range in price units
    #[serde(default)]
    pub atr: Option<Decimal>,

    /// Explicit volatility regime; derived from the fields below when absent
    #[serde(default)]
    pub volatility: Option<VolatilityRegime>,

    /// Percentile of the current ATR within its own history (0-100)
    #[serde(default)]
    pub atr_percentile: Option<f64>,

    /// Implied-volatility index level
    #[serde(default)]
    pub vix: Option<f64>,

    /// ADX; the configured default is assumed when absent
    #[serde(default)]
    pub trend_strength: Option<f64>,

    #[serde(default)]
    pub levels: Option<PriceLevels>,

    #[serde(default)]
    pub scores: Vec<FactorScore>,

    /// Accumulation/distribution label used when no volume score is supplied
    #[serde(default)]
    pub volume_signal: Option<Signal>,
}

impl AnalysisInput {
    pub fn new(ticker: impl Into<String>, entry_price: Decimal, scores: Vec<FactorScore>) -> Self {
        Self {
            ticker: ticker.into(),
            sector: None,
            entry_price,
            atr: None,
            volatility: None,
            atr_percentile: None,
            vix: None,
            trend_strength: None,
            levels: None,
            scores,
            volume_signal: None,
        }
    }

    pub fn with_atr(mut self, atr: Decimal) -> Self {
        self.atr = Some(atr);
        self
    }

    /// Volatility regime: explicit, else from ATR percentile, else from VIX.
    pub fn volatility_regime(&self) -> VolatilityRegime {
        self.volatility
            .or_else(|| self.atr_percentile.map(VolatilityRegime::from_atr_percentile))
            .or_else(|| self.vix.map(VolatilityRegime::from_vix))
            .unwrap_or_default()
    }

    /// Factor scores with the volume signal folded in when needed.
    fn effective_scores(&self) -> Vec<FactorScore> {
        let mut scores = self.scores.clone();
        let has_volume = scores.iter().any(|s| s.factor == Factor::VolumeDelivery);
        if let (false, Some(signal)) = (has_volume, self.volume_signal) {
            scores.push(FactorScore::from_volume_signal(signal));
        }
        scores
    }
}

/// Result of analysing one ticker during a scan.
#[derive(Debug)]
pub struct ScanResult {
    pub ticker: String,
    pub result: Result<Decision, EngineError>,
}

/// Stateless decision engine.
pub struct DecisionEngine {
    config: EngineConfig,
    targets: TargetCalculator,
}

impl DecisionEngine {
    pub fn new(config: EngineConfig) -> Self {
        let targets = TargetCalculator::new(&config);
        Self { config, targets }
    }

    /// Build a decision for one ticker under a weight snapshot and regime.
    ///
    /// Only a missing or non-positive entry price fails; every other gap is
    /// absorbed (neutral factor, percentage ATR band) and lowers confidence.
    pub fn compute_decision(
        &self,
        input: &AnalysisInput,
        weights: &WeightVector,
        regime: MarketRegime,
    ) -> Result<Decision, EngineError> {
        if input.entry_price <= Decimal::ZERO {
            return Err(EngineError::MissingData(format!(
                "could not compute decision for {}: entry price {} is not positive",
                input.ticker, input.entry_price
            )));
        }

        let scores = input.effective_scores();
        let composite = aggregate(&scores, weights);

        let table = self.config.thresholds.for_regime(regime);
        let action = Classifier::action(composite.composite, table);

        let volatility = input.volatility_regime();
        let exits = self.targets.compute(
            input.entry_price,
            input.atr,
            action,
            volatility,
            input.levels.as_ref(),
        )?;

        let mut raw_confidence = composite.raw_confidence;
        if exits.used_fallback {
            raw_confidence -= self.config.missing_atr_confidence_penalty;
        }
        let confidence = clamp_confidence(raw_confidence);

        let atr_pct = (exits.effective_atr / input.entry_price * dec!(100))
            .to_f64()
            .unwrap_or(0.0);
        let adx = input.trend_strength.unwrap_or(self.config.default_adx);
        let time_horizon = Classifier::time_horizon(adx, atr_pct);
        let risk_rating = Classifier::risk_rating(adx, atr_pct);

        let mut reasoning = Classifier::reasoning(
            composite.composite,
            action,
            regime,
            &composite.scores,
            &composite.missing,
            self.config.reasoning_min_distance,
        );
        if exits.used_fallback {
            reasoning.push(format!(
                "ATR unavailable, exits sized on a {}% band",
                (self.config.fallback_atr_pct * dec!(100)).normalize()
            ));
        }
        if volatility != VolatilityRegime::Normal {
            reasoning.push(format!("Volatility {}, exit distances scaled", volatility.as_str()));
        }
        if exits.snapped_target || exits.snapped_stop {
            reasoning.push("Exits aligned to support/resistance".to_string());
        }

        if !composite.missing.is_empty() {
            debug!(ticker = %input.ticker, missing = ?composite.missing, "Factors substituted as neutral");
        }

        let decision = Decision::new(
            input.ticker.clone(),
            input.sector.clone(),
            input.entry_price,
            composite.composite,
            action,
            confidence,
            exits.target_price,
            exits.stop_loss,
            exits.risk_reward_ratio,
            risk_rating,
            time_horizon,
            composite.scores,
            composite.missing,
            weights.version(),
            regime,
            reasoning,
        );

        info!(
            ticker = %decision.ticker,
            action = %decision.action,
            composite = decision.composite_score,
            confidence = decision.confidence,
            weights = decision.weight_version,
            "Decision computed"
        );

        Ok(decision)
    }

    /// Analyse many tickers on blocking workers against one weight snapshot.
    ///
    /// At most `scan_workers` analyses run at once. Results come back in
    /// completion order.
    pub async fn scan(
        self: &Arc<Self>,
        inputs: Vec<AnalysisInput>,
        weights: Arc<WeightVector>,
        regime: MarketRegime,
    ) -> Vec<ScanResult> {
        let workers = self.config.scan_workers.max(1);
        info!(tickers = inputs.len(), workers, version = weights.version(), "Starting scan");

        stream::iter(inputs)
            .map(|input| {
                let engine = Arc::clone(self);
                let weights = Arc::clone(&weights);
                let ticker = input.ticker.clone();
                async move {
                    let handle = tokio::task::spawn_blocking(move || {
                        engine.compute_decision(&input, &weights, regime)
                    });
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(e) => Err(EngineError::invariant(format!(
                            "analysis task for {} failed: {}",
                            ticker, e
                        ))),
                    };
                    if let Err(e) = &result {
                        warn!(ticker = %ticker, error = %e, "Skipping ticker");
                    }
                    ScanResult { ticker, result }
                }
            })
            .buffer_unordered(workers)
            .collect()
            .await
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Action, NEUTRAL_SCORE};

    fn full_scores(values: [f64; 5]) -> Vec<FactorScore> {
        Factor::ALL
            .iter()
            .zip(values)
            .map(|(&f, v)| FactorScore::new(f, v))
            .collect()
    }

    #[test]
    fn test_reference_decision() {
        let engine = DecisionEngine::default();
        let mut input = AnalysisInput::new("INFY.NS", dec!(2500), full_scores([80.0, 85.0, 70.0, 60.0, 65.0]))
            .with_atr(dec!(40));
        input.sector = Some("Technology".to_string());

        let decision = engine
            .compute_decision(&input, &WeightVector::defaults(), MarketRegime::Sideways)
            .unwrap();

        assert!((decision.composite_score - 74.75).abs() < 1e-9);
        assert_eq!(decision.action, Action::StrongBuy);
        assert_eq!(decision.target_price, dec!(2580));
        assert_eq!(decision.stop_loss, dec!(2440));
        assert_eq!(decision.risk_reward_ratio, dec!(1.33));
        assert_eq!(decision.weight_version, 1);
        assert_eq!(decision.scores.len(), Factor::COUNT);
        assert!((30..=95).contains(&decision.confidence));
        assert!(decision.evaluation().is_none());
    }

    #[test]
    fn test_volatility_from_vix_widens_exits() {
        let engine = DecisionEngine::default();
        let mut input = AnalysisInput::new("INFY.NS", dec!(2500), full_scores([80.0, 85.0, 70.0, 60.0, 65.0]))
            .with_atr(dec!(40));
        input.vix = Some(25.0);
        assert_eq!(input.volatility_regime(), VolatilityRegime::Elevated);

        // Percentile beats VIX, explicit beats both
        input.atr_percentile = Some(10.0);
        assert_eq!(input.volatility_regime(), VolatilityRegime::Compressed);
        input.volatility = Some(VolatilityRegime::Elevated);

        let decision = engine
            .compute_decision(&input, &WeightVector::defaults(), MarketRegime::Sideways)
            .unwrap();
        assert_eq!(decision.target_price, dec!(2600));
        assert_eq!(decision.stop_loss, dec!(2425));
        assert!(decision.reasoning.iter().any(|r| r.contains("Volatility elevated")));
    }

    #[test]
    fn test_non_positive_entry_is_rejected() {
        let engine = DecisionEngine::default();
        let input = AnalysisInput::new("BAD.NS", Decimal::ZERO, full_scores([80.0; 5]));
        let err = engine
            .compute_decision(&input, &WeightVector::defaults(), MarketRegime::Sideways)
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingData(_)));
    }

    #[test]
    fn test_missing_atr_lowers_confidence() {
        let engine = DecisionEngine::default();
        let scores = full_scores([80.0, 85.0, 70.0, 60.0, 65.0]);
        let with_atr = AnalysisInput::new("A.NS", dec!(1000), scores.clone()).with_atr(dec!(15));
        let without_atr = AnalysisInput::new("A.NS", dec!(1000), scores);

        let weights = WeightVector::defaults();
        let a = engine.compute_decision(&with_atr, &weights, MarketRegime::Sideways).unwrap();
        let b = engine.compute_decision(&without_atr, &weights, MarketRegime::Sideways).unwrap();

        assert!(b.confidence < a.confidence);
        assert!(b.reasoning.iter().any(|r| r.contains("ATR unavailable")));
    }

    #[test]
    fn test_volume_signal_fills_missing_volume_score() {
        let engine = DecisionEngine::default();
        let mut input = AnalysisInput::new(
            "B.NS",
            dec!(500),
            full_scores([60.0, 60.0, 60.0, 60.0, 60.0])[..4].to_vec(),
        );
        input.volume_signal = Some(Signal::StrongBullish);

        let decision = engine
            .compute_decision(&input, &WeightVector::defaults(), MarketRegime::Sideways)
            .unwrap();
        let volume = decision.factor_score(Factor::VolumeDelivery).unwrap();
        assert_eq!(volume.score, 80.0);
        assert!(decision.missing_factors.is_empty());
    }

    #[test]
    fn test_missing_factors_recorded_as_neutral() {
        let engine = DecisionEngine::default();
        let input = AnalysisInput::new("C.NS", dec!(300), vec![FactorScore::new(Factor::Technical, 90.0)]);

        let decision = engine
            .compute_decision(&input, &WeightVector::defaults(), MarketRegime::Sideways)
            .unwrap();
        assert_eq!(decision.missing_factors.len(), 4);
        assert_eq!(decision.scores[Factor::Macro.index()].score, NEUTRAL_SCORE);
        assert!((decision.composite_score - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_json_scores_are_clamped() {
        let engine = DecisionEngine::default();
        let input: AnalysisInput = serde_json::from_str(
            r#"{
                "ticker": "RELIANCE.NS",
                "entry_price": "2500",
                "atr": "40",
                "scores": [
                    {"factor": "technical", "score": 400},
                    {"factor": "fundamental", "score": -300}
                ]
            }"#,
        )
        .unwrap();

        let decision = engine
            .compute_decision(&input, &WeightVector::defaults(), MarketRegime::Sideways)
            .unwrap();

        // (100 x 0.30 + 0 x 0.25) / 0.55
        assert!((decision.composite_score - 30.0 / 0.55).abs() < 1e-9);
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.scores[Factor::Technical.index()].score, 100.0);
        assert_eq!(decision.scores[Factor::Fundamental.index()].score, 0.0);
    }

    #[test]
    fn test_regime_changes_action() {
        let engine = DecisionEngine::default();
        let input = AnalysisInput::new("D.NS", dec!(100), full_scores([62.0; 5])).with_atr(dec!(2));
        let weights = WeightVector::defaults();

        let sideways = engine.compute_decision(&input, &weights, MarketRegime::Sideways).unwrap();
        let bear = engine.compute_decision(&input, &weights, MarketRegime::Bear).unwrap();
        assert_eq!(sideways.action, Action::Buy);
        assert_eq!(bear.action, Action::Hold);
        assert_eq!(bear.regime, MarketRegime::Bear);
    }

    #[tokio::test]
    async fn test_scan_runs_every_ticker() {
        let engine = Arc::new(DecisionEngine::default());
        let inputs = vec![
            AnalysisInput::new("A.NS", dec!(100), full_scores([80.0; 5])).with_atr(dec!(2)),
            AnalysisInput::new("B.NS", dec!(200), full_scores([20.0; 5])).with_atr(dec!(4)),
            AnalysisInput::new("C.NS", Decimal::ZERO, full_scores([50.0; 5])),
        ];

        let mut results = engine
            .scan(inputs, Arc::new(WeightVector::defaults()), MarketRegime::Sideways)
            .await;
        results.sort_by(|a, b| a.ticker.cmp(&b.ticker));

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].result.as_ref().unwrap().action, Action::StrongBuy);
        assert_eq!(results[1].result.as_ref().unwrap().action, Action::StrongSell);
        assert!(results[2].result.is_err());
    }
}
