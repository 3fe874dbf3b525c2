//! Maps composite scores and market context to actions, horizons and risk.

use crate::models::{Action, Factor, FactorScore, MarketRegime, TimeHorizon, NEUTRAL_SCORE};

use super::config::ThresholdTable;

/// Decision classifier.
pub struct Classifier;

impl Classifier {
    /// Action for a composite under a threshold table.
    ///
    /// Each cut-off is inclusive from below: exactly `buy` is BUY, exactly
    /// `hold_low` is HOLD and exactly `sell` is SELL.
    pub fn action(composite: f64, table: &ThresholdTable) -> Action {
        if composite >= table.strong_buy {
            Action::StrongBuy
        } else if composite >= table.buy {
            Action::Buy
        } else if composite >= table.hold_low {
            Action::Hold
        } else if composite >= table.sell {
            Action::Sell
        } else {
            Action::StrongSell
        }
    }

    /// Holding period from trend strength (ADX) and ATR as a percent of price.
    pub fn time_horizon(adx: f64, atr_pct: f64) -> TimeHorizon {
        if adx > 30.0 && atr_pct < 2.0 {
            TimeHorizon::Position
        } else if adx > 25.0 {
            TimeHorizon::Medium
        } else if atr_pct > 3.0 {
            TimeHorizon::ShortTerm
        } else {
            TimeHorizon::Swing
        }
    }

    /// Risk rating 1-10: rises with volatility, falls with trend strength.
    pub fn risk_rating(adx: f64, atr_pct: f64) -> u8 {
        let raw = 3.0 + 1.2 * atr_pct + (25.0 - adx) / 8.0;
        if !raw.is_finite() {
            return 10;
        }
        raw.round().clamp(1.0, 10.0) as u8
    }

    /// Reasoning lines: a headline, then one line per factor that sits at
    /// least `min_distance` from neutral in the direction of the action.
    /// HOLD cites strong factors on either side.
    pub fn reasoning(
        composite: f64,
        action: Action,
        regime: MarketRegime,
        scores: &[FactorScore],
        missing: &[Factor],
        min_distance: f64,
    ) -> Vec<String> {
        let mut lines = vec![format!(
            "Composite {:.1} in {} regime → {}",
            composite, regime, action
        )];

        for score in scores {
            if missing.contains(&score.factor) {
                continue;
            }
            let tilt = score.tilt();
            let cited = match action.direction() {
                1 => tilt >= min_distance,
                -1 => tilt <= -min_distance,
                _ => tilt.abs() >= min_distance,
            };
            if cited {
                let leaning = if tilt > 0.0 { "bullish" } else { "bearish" };
                lines.push(format!(
                    "{} {} ({:.0} vs neutral {:.0})",
                    score.factor.label(),
                    leaning,
                    score.score,
                    NEUTRAL_SCORE
                ));
            }
        }

        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|f| f.label()).collect();
            lines.push(format!("Missing data treated as neutral: {}", names.join(", ")));
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::RegimeThresholds;

    #[test]
    fn test_sideways_bands() {
        let table = RegimeThresholds::default().sideways;
        assert_eq!(Classifier::action(74.75, &table), Action::StrongBuy);
        assert_eq!(Classifier::action(65.0, &table), Action::Buy);
        assert_eq!(Classifier::action(50.0, &table), Action::Hold);
        assert_eq!(Classifier::action(35.0, &table), Action::Sell);
        assert_eq!(Classifier::action(10.0, &table), Action::StrongSell);
    }

    #[test]
    fn test_cut_offs_are_inclusive_from_below() {
        let table = RegimeThresholds::default().sideways;
        assert_eq!(Classifier::action(72.0, &table), Action::StrongBuy);
        assert_eq!(Classifier::action(60.0, &table), Action::Buy);
        assert_eq!(Classifier::action(42.0, &table), Action::Hold);
        assert_eq!(Classifier::action(41.99, &table), Action::Sell);
        assert_eq!(Classifier::action(30.0, &table), Action::Sell);
        assert_eq!(Classifier::action(29.99, &table), Action::StrongSell);

        let bear = RegimeThresholds::default().bear;
        assert_eq!(Classifier::action(46.0, &bear), Action::Hold);
        assert_eq!(Classifier::action(34.0, &bear), Action::Sell);
    }

    #[test]
    fn test_every_score_maps_to_one_action() {
        let tables = RegimeThresholds::default();
        for regime in MarketRegime::ALL {
            let table = tables.for_regime(regime);
            let mut previous = Action::StrongSell;
            for step in 0..=1000 {
                let composite = step as f64 / 10.0;
                let action = Classifier::action(composite, table);
                // Actions only move toward the buy side as the composite rises
                assert!(action <= previous, "{} at {} after {}", action, composite, previous);
                previous = action;
            }
        }
    }

    #[test]
    fn test_bear_regime_is_harder_to_buy() {
        let tables = RegimeThresholds::default();
        assert_eq!(Classifier::action(62.0, &tables.sideways), Action::Buy);
        assert_eq!(Classifier::action(62.0, &tables.bear), Action::Hold);
        assert_eq!(Classifier::action(58.0, &tables.bull), Action::Buy);
    }

    #[test]
    fn test_horizon_and_risk() {
        assert_eq!(Classifier::time_horizon(35.0, 1.5), TimeHorizon::Position);
        assert_eq!(Classifier::time_horizon(28.0, 2.5), TimeHorizon::Medium);
        assert_eq!(Classifier::time_horizon(15.0, 4.0), TimeHorizon::ShortTerm);
        assert_eq!(Classifier::time_horizon(20.0, 2.0), TimeHorizon::Swing);

        assert!(Classifier::risk_rating(40.0, 1.0) < Classifier::risk_rating(10.0, 5.0));
        assert_eq!(Classifier::risk_rating(25.0, 2.0), 5);
        assert_eq!(Classifier::risk_rating(5.0, 20.0), 10);
        assert_eq!(Classifier::risk_rating(90.0, 0.0), 1);
    }

    #[test]
    fn test_reasoning_cites_aligned_factors() {
        let scores = vec![
            FactorScore::new(Factor::Technical, 80.0),
            FactorScore::new(Factor::Fundamental, 30.0),
            FactorScore::new(Factor::Momentum, 55.0),
            FactorScore::neutral(Factor::Macro),
            FactorScore::new(Factor::VolumeDelivery, 65.0),
        ];
        let lines = Classifier::reasoning(
            70.0,
            Action::Buy,
            MarketRegime::Sideways,
            &scores,
            &[Factor::Macro],
            10.0,
        );

        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("Technical"));
        assert!(lines[2].starts_with("Volume"));
        assert!(lines[3].contains("Macro"));
    }
}
