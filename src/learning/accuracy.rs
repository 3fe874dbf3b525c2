//! Folding evaluated decisions into the accuracy accumulators.

use std::collections::HashSet;

use chrono::{Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Action, Decision, Evaluation, Factor, LearningState};

use super::config::LearningConfig;

/// Which way a factor score leaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl FactorDirection {
    pub fn from_score(score: f64, config: &LearningConfig) -> Self {
        if score > config.bullish_above {
            Self::Bullish
        } else if score < config.bearish_below {
            Self::Bearish
        } else {
            Self::Neutral
        }
    }

    /// Whether this reading agrees with a realized price move in percent.
    pub fn agrees_with(self, price_move_pct: f64, neutral_tolerance_pct: f64) -> bool {
        match self {
            Self::Bullish => price_move_pct > 0.0,
            Self::Bearish => price_move_pct < 0.0,
            Self::Neutral => price_move_pct.abs() <= neutral_tolerance_pct,
        }
    }
}

/// Counts from one ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Closed decisions folded into the accuracy statistics
    pub ingested: usize,

    /// HOLD decisions whose drift was scored
    pub holds_reviewed: usize,

    /// Decisions that appeared more than once in the batch
    pub duplicates: usize,

    /// Still open, or a HOLD not yet tracked long enough
    pub not_ready: usize,

    pub correct: usize,

    /// Every decision consumed by this pass, closed or HOLD
    pub learned: Vec<Uuid>,
}

/// Underlying price move in percent, undoing the sign flip of sell-side P&L.
fn price_move_pct(action: Action, realized_pnl_pct: Decimal) -> f64 {
    let pnl = realized_pnl_pct.to_f64().unwrap_or(0.0);
    if action.is_sell() {
        -pnl
    } else {
        pnl
    }
}

/// Whether a HOLD has been tracked long enough to score its drift.
fn hold_is_due(decision: &Decision, evaluation: &Evaluation, config: &LearningConfig) -> bool {
    evaluation.evaluated_at - decision.timestamp >= Duration::days(config.hold_review_days)
}

/// Fold each ready decision into the learning state.
///
/// Closed decisions update factor, action, sector and calibration accuracy
/// and count toward the next adaptation. A HOLD only scores its drift in
/// action accuracy once it is due, and never moves the weights. Factors that
/// were missing at analysis time are not scored. Callers hand each decision
/// in once; the ids consumed are returned so the store can mark them.
pub fn ingest(state: &mut LearningState, decisions: &[Decision], config: &LearningConfig) -> IngestReport {
    let mut report = IngestReport::default();
    let mut seen = HashSet::new();

    for decision in decisions {
        let evaluation = match decision.evaluation() {
            Some(e) => e,
            None => {
                report.not_ready += 1;
                continue;
            }
        };
        let ready = if decision.action == Action::Hold {
            hold_is_due(decision, evaluation, config)
        } else {
            evaluation.outcome.is_terminal()
        };
        if !ready {
            report.not_ready += 1;
            continue;
        }
        if !seen.insert(decision.id) {
            report.duplicates += 1;
            continue;
        }
        report.learned.push(decision.id);

        if decision.action == Action::Hold {
            let drift = evaluation.pnl_pct.to_f64().unwrap_or(0.0);
            let steady = drift.abs() < config.hold_drift_pct;
            state.action_accuracy.entry(Action::Hold).or_default().record(steady);
            report.holds_reviewed += 1;
            debug!(ticker = %decision.ticker, drift, steady, "Scored HOLD drift");
            continue;
        }

        let realized = evaluation.realized_pnl_pct;
        let price_move = price_move_pct(decision.action, realized);
        let correct = realized > Decimal::ZERO;

        for factor in Factor::ALL {
            if let Some(score) = decision.factor_score(factor) {
                let direction = FactorDirection::from_score(score.score, config);
                state.factor_accuracy[factor]
                    .record(direction.agrees_with(price_move, config.neutral_tolerance_pct));
            }
        }

        state.action_accuracy.entry(decision.action).or_default().record(correct);

        let sector = decision.sector.clone().unwrap_or_else(|| "Unknown".to_string());
        let perf = state.sector_performance.entry(sector).or_default();
        perf.decisions += 1;
        perf.total_pnl_pct += realized;
        if correct {
            perf.correct += 1;
        }

        if let Some(bucket) = state.calibration_bucket_mut(decision.confidence) {
            bucket.predicted += 1;
            if correct {
                bucket.correct += 1;
            }
        }

        state.total_decisions_evaluated += 1;
        state.evaluated_since_adaptation += 1;
        if correct {
            state.correct_since_adaptation += 1;
            report.correct += 1;
        }
        report.ingested += 1;

        debug!(
            ticker = %decision.ticker,
            action = %decision.action,
            outcome = %evaluation.outcome,
            correct,
            "Learned from decision"
        );
    }

    if !report.learned.is_empty() {
        state.updated_at = Utc::now();
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{evaluate_decision, PriceObservation};
    use crate::models::{FactorScore, MarketRegime, Outcome, TimeHorizon};
    use rust_decimal_macros::dec;

    fn make_decision(action: Action, scores: [f64; 5], confidence: u8) -> Decision {
        Decision::new(
            "HDFCBANK.NS".to_string(),
            Some("Financials".to_string()),
            dec!(100),
            70.0,
            action,
            confidence,
            if action.is_sell() { dec!(90) } else { dec!(110) },
            if action.is_sell() { dec!(105) } else { dec!(95) },
            dec!(2),
            5,
            TimeHorizon::Swing,
            Factor::ALL
                .iter()
                .zip(scores)
                .map(|(&f, s)| FactorScore::new(f, s))
                .collect(),
            vec![],
            1,
            MarketRegime::Sideways,
            vec![],
        )
    }

    #[test]
    fn test_factor_direction() {
        let config = LearningConfig::default();
        assert_eq!(FactorDirection::from_score(61.0, &config), FactorDirection::Bullish);
        assert_eq!(FactorDirection::from_score(60.0, &config), FactorDirection::Neutral);
        assert_eq!(FactorDirection::from_score(39.0, &config), FactorDirection::Bearish);
        assert!(FactorDirection::Neutral.agrees_with(-4.0, 5.0));
        assert!(!FactorDirection::Neutral.agrees_with(10.0, 5.0));
    }

    #[test]
    fn test_ingest_target_hit() {
        let config = LearningConfig::default();
        let mut state = LearningState::new();
        let d = make_decision(Action::Buy, [80.0, 30.0, 50.0, 65.0, 70.0], 70);
        let d = evaluate_decision(&d, &PriceObservation::at(dec!(112)));
        assert_eq!(d.outcome(), Some(Outcome::TargetHit));

        let report = ingest(&mut state, &[d], &config);
        assert_eq!(report.ingested, 1);
        assert_eq!(report.correct, 1);

        // +10% move: bullish right, bearish wrong, neutral outside tolerance
        assert_eq!(state.factor_accuracy[Factor::Technical].correct, 1);
        assert_eq!(state.factor_accuracy[Factor::Fundamental].correct, 0);
        assert_eq!(state.factor_accuracy[Factor::Momentum].correct, 0);
        assert_eq!(state.factor_accuracy[Factor::Momentum].total, 1);
        assert_eq!(state.action_accuracy[&Action::Buy].correct, 1);
        assert_eq!(state.sector_performance["Financials"].total_pnl_pct, dec!(10));
        assert_eq!(state.calibration[2].predicted, 1);
        assert_eq!(state.evaluated_since_adaptation, 1);
    }

    #[test]
    fn test_sell_stop_hit_counts_against_bearish_factors() {
        let config = LearningConfig::default();
        let mut state = LearningState::new();
        let d = make_decision(Action::Sell, [30.0, 30.0, 30.0, 30.0, 70.0], 50);
        let d = evaluate_decision(&d, &PriceObservation::at(dec!(106)));
        assert_eq!(d.outcome(), Some(Outcome::StoplossHit));

        ingest(&mut state, &[d], &config);
        assert_eq!(state.factor_accuracy[Factor::Technical].correct, 0);
        assert_eq!(state.factor_accuracy[Factor::VolumeDelivery].correct, 1);
        assert_eq!(state.action_accuracy[&Action::Sell].correct, 0);
        assert_eq!(state.correct_since_adaptation, 0);
    }

    #[test]
    fn test_duplicates_and_open_decisions_are_skipped() {
        let config = LearningConfig::default();
        let mut state = LearningState::new();
        let closed = evaluate_decision(
            &make_decision(Action::Buy, [70.0; 5], 70),
            &PriceObservation::at(dec!(120)),
        );
        let open = evaluate_decision(
            &make_decision(Action::Buy, [70.0; 5], 70),
            &PriceObservation::at(dec!(101)),
        );
        let pending = make_decision(Action::Buy, [70.0; 5], 70);

        let report = ingest(&mut state, &[closed.clone(), open, pending, closed.clone()], &config);
        assert_eq!(report.ingested, 1);
        assert_eq!(report.not_ready, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.learned, vec![closed.id]);
        assert_eq!(state.total_decisions_evaluated, 1);
    }

    fn aged_hold(days: i64, close: Decimal) -> Decision {
        let mut d = make_decision(Action::Hold, [50.0; 5], 40);
        d.timestamp = Utc::now() - Duration::days(days);
        evaluate_decision(&d, &PriceObservation::at(close))
    }

    #[test]
    fn test_hold_drift_scores_action_accuracy_only() {
        let config = LearningConfig::default();
        let mut state = LearningState::new();
        let steady = aged_hold(7, dec!(102));
        let drifted = aged_hold(7, dec!(96));
        assert_eq!(steady.outcome(), Some(Outcome::Hold));

        let before = state.clone();
        let report = ingest(&mut state, &[steady.clone(), drifted.clone()], &config);

        assert_eq!(report.holds_reviewed, 2);
        assert_eq!(report.ingested, 0);
        assert_eq!(report.learned, vec![steady.id, drifted.id]);

        // |+2%| is inside the 3% band, |-4%| is not
        assert_eq!(state.action_accuracy[&Action::Hold].total, 2);
        assert_eq!(state.action_accuracy[&Action::Hold].correct, 1);

        assert_eq!(state.factor_accuracy, before.factor_accuracy);
        assert_eq!(state.calibration, before.calibration);
        assert!(state.sector_performance.is_empty());
        assert_eq!(state.evaluated_since_adaptation, 0);
        assert_eq!(state.total_decisions_evaluated, 0);
    }

    #[test]
    fn test_hold_waits_for_review_delay() {
        let config = LearningConfig::default();
        let mut state = LearningState::new();
        let young = aged_hold(2, dec!(101));

        let report = ingest(&mut state, &[young], &config);
        assert_eq!(report.not_ready, 1);
        assert!(report.learned.is_empty());
        assert_eq!(state.action_accuracy[&Action::Hold].total, 0);
    }

    #[test]
    fn test_missing_factors_are_not_scored() {
        let config = LearningConfig::default();
        let mut state = LearningState::new();
        let mut d = make_decision(Action::Buy, [70.0; 5], 70);
        d.missing_factors = vec![Factor::Macro];
        let d = evaluate_decision(&d, &PriceObservation::at(dec!(120)));

        ingest(&mut state, &[d], &config);
        assert_eq!(state.factor_accuracy[Factor::Macro].total, 0);
        assert_eq!(state.factor_accuracy[Factor::Technical].total, 1);
    }
}
