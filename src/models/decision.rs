//! Trading decisions and their later evaluation against market prices.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

use super::factor::{Factor, FactorScore};
use super::regime::MarketRegime;

/// Recommended action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::StrongBuy,
        Action::Buy,
        Action::Hold,
        Action::Sell,
        Action::StrongSell,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::StrongBuy => "STRONG_BUY",
            Action::Buy => "BUY",
            Action::Hold => "HOLD",
            Action::Sell => "SELL",
            Action::StrongSell => "STRONG_SELL",
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, Action::StrongBuy | Action::Buy)
    }

    pub fn is_sell(&self) -> bool {
        matches!(self, Action::StrongSell | Action::Sell)
    }

    pub fn is_strong(&self) -> bool {
        matches!(self, Action::StrongBuy | Action::StrongSell)
    }

    /// +1 for the buy family, -1 for the sell family, 0 for hold.
    pub fn direction(&self) -> i8 {
        if self.is_buy() {
            1
        } else if self.is_sell() {
            -1
        } else {
            0
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of checking a decision against later prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// Neither target nor stop touched yet
    Open,
    /// HOLD decisions are only tracked for drift
    Hold,
    TargetHit,
    StoplossHit,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Open => "OPEN",
            Outcome::Hold => "HOLD",
            Outcome::TargetHit => "TARGET_HIT",
            Outcome::StoplossHit => "STOPLOSS_HIT",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Outcome::TargetHit | Outcome::StoplossHit)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected holding period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeHorizon {
    /// 3-7 days
    ShortTerm,
    /// 1-2 weeks
    Swing,
    /// 1-3 weeks
    Medium,
    /// 2-4 weeks
    Position,
}

impl TimeHorizon {
    pub fn label(&self) -> &'static str {
        match self {
            TimeHorizon::ShortTerm => "3-7 days",
            TimeHorizon::Swing => "1-2 weeks",
            TimeHorizon::Medium => "1-3 weeks",
            TimeHorizon::Position => "2-4 weeks",
        }
    }
}

impl fmt::Display for TimeHorizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Evaluation fields attached to a decision after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Last observed price
    pub current_price: Decimal,

    /// Highest price since the decision
    pub high_since: Decimal,

    /// Lowest price since the decision
    pub low_since: Decimal,

    /// Mark-to-market return in percent, positive when the call was right
    pub pnl_pct: Decimal,

    /// Return in percent at the level that closed the trade (target or stop)
    pub realized_pnl_pct: Decimal,

    pub outcome: Outcome,

    pub evaluated_at: DateTime<Utc>,
}

/// A single trading call for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: Uuid,
    pub ticker: String,
    #[serde(default)]
    pub sector: Option<String>,
    pub timestamp: DateTime<Utc>,

    /// Price at analysis time
    pub entry_price: Decimal,

    /// Weighted blend of factor scores (0-100)
    pub composite_score: f64,

    pub action: Action,

    /// Confidence in percent, always within [30, 95]
    pub confidence: u8,

    pub target_price: Decimal,
    pub stop_loss: Decimal,
    pub risk_reward_ratio: Decimal,

    /// 1 (lowest risk) to 10 (highest risk)
    pub risk_rating: u8,

    pub time_horizon: TimeHorizon,

    /// One snapshot per factor, in `Factor::ALL` order
    pub scores: Vec<FactorScore>,

    /// Factors that were absent and recorded as neutral
    #[serde(default)]
    pub missing_factors: Vec<Factor>,

    /// Version of the weight vector used for the composite
    pub weight_version: u64,

    /// Regime whose threshold table classified the composite
    #[serde(default)]
    pub regime: MarketRegime,

    pub reasoning: Vec<String>,

    #[serde(default)]
    evaluation: Option<Evaluation>,
}

impl Decision {
    /// Assemble a fresh, unevaluated decision.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ticker: String,
        sector: Option<String>,
        entry_price: Decimal,
        composite_score: f64,
        action: Action,
        confidence: u8,
        target_price: Decimal,
        stop_loss: Decimal,
        risk_reward_ratio: Decimal,
        risk_rating: u8,
        time_horizon: TimeHorizon,
        scores: Vec<FactorScore>,
        missing_factors: Vec<Factor>,
        weight_version: u64,
        regime: MarketRegime,
        reasoning: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticker,
            sector,
            timestamp: Utc::now(),
            entry_price,
            composite_score,
            action,
            confidence,
            target_price,
            stop_loss,
            risk_reward_ratio,
            risk_rating,
            time_horizon,
            scores,
            missing_factors,
            weight_version,
            regime,
            reasoning,
            evaluation: None,
        }
    }

    pub fn evaluation(&self) -> Option<&Evaluation> {
        self.evaluation.as_ref()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.evaluation.as_ref().map(|e| e.outcome)
    }

    /// True once the target or stop has been hit.
    pub fn is_terminal(&self) -> bool {
        self.outcome().is_some_and(|o| o.is_terminal())
    }

    pub fn is_actionable(&self) -> bool {
        self.action != Action::Hold
    }

    /// Snapshot score of a factor, `None` if it was substituted as neutral.
    pub fn factor_score(&self, factor: Factor) -> Option<&FactorScore> {
        if self.missing_factors.contains(&factor) {
            return None;
        }
        self.scores.iter().find(|s| s.factor == factor)
    }

    /// Attach evaluation fields.
    ///
    /// A terminal outcome is final: any attempt to replace it is rejected.
    pub fn apply_evaluation(&mut self, evaluation: Evaluation) -> Result<(), EngineError> {
        if let Some(current) = &self.evaluation {
            if current.outcome.is_terminal() {
                return Err(EngineError::invariant(format!(
                    "decision {} for {} already closed as {}",
                    self.id, self.ticker, current.outcome
                )));
            }
        }
        self.evaluation = Some(evaluation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_decision() -> Decision {
        Decision::new(
            "TCS.NS".to_string(),
            Some("Technology".to_string()),
            dec!(100),
            70.0,
            Action::Buy,
            75,
            dec!(110),
            dec!(95),
            dec!(2),
            4,
            TimeHorizon::Swing,
            Factor::ALL.iter().map(|&f| FactorScore::new(f, 70.0)).collect(),
            vec![Factor::Macro],
            1,
            MarketRegime::Sideways,
            vec![],
        )
    }

    fn make_evaluation(outcome: Outcome) -> Evaluation {
        Evaluation {
            current_price: dec!(111),
            high_since: dec!(111),
            low_since: dec!(99),
            pnl_pct: dec!(11),
            realized_pnl_pct: dec!(10),
            outcome,
            evaluated_at: Utc::now(),
        }
    }

    #[test]
    fn test_open_outcome_can_be_updated() {
        let mut d = make_decision();
        d.apply_evaluation(make_evaluation(Outcome::Open)).unwrap();
        d.apply_evaluation(make_evaluation(Outcome::TargetHit)).unwrap();
        assert!(d.is_terminal());
    }

    #[test]
    fn test_terminal_outcome_is_final() {
        let mut d = make_decision();
        d.apply_evaluation(make_evaluation(Outcome::StoplossHit)).unwrap();
        let err = d.apply_evaluation(make_evaluation(Outcome::TargetHit)).unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
        assert_eq!(d.outcome(), Some(Outcome::StoplossHit));
    }

    #[test]
    fn test_missing_factor_has_no_snapshot() {
        let d = make_decision();
        assert!(d.factor_score(Factor::Macro).is_none());
        assert!(d.factor_score(Factor::Technical).is_some());
    }

    #[test]
    fn test_action_serde_names() {
        assert_eq!(serde_json::to_string(&Action::StrongBuy).unwrap(), "\"STRONG_BUY\"");
        assert_eq!(serde_json::to_string(&Outcome::StoplossHit).unwrap(), "\"STOPLOSS_HIT\"");
        let parsed: Action = serde_json::from_str("\"STRONG_SELL\"").unwrap();
        assert_eq!(parsed, Action::StrongSell);
    }
}
