//! Outcome evaluation of emitted decisions against later prices.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{Action, Decision, Evaluation, Outcome};

/// Price seen after a decision was made.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub close: Decimal,

    /// Highest price since the decision, when the feed knows it
    #[serde(default)]
    pub high: Option<Decimal>,

    /// Lowest price since the decision, when the feed knows it
    #[serde(default)]
    pub low: Option<Decimal>,
}

impl PriceObservation {
    /// Observation of a single last price.
    pub fn at(close: Decimal) -> Self {
        Self {
            close,
            high: None,
            low: None,
        }
    }

    pub fn with_range(close: Decimal, high: Decimal, low: Decimal) -> Self {
        Self {
            close,
            high: Some(high),
            low: Some(low),
        }
    }
}

/// Percent return from `entry` to `price`, positive when the action was right.
pub fn directional_return_pct(entry: Decimal, price: Decimal, action: Action) -> Decimal {
    if entry.is_zero() {
        return Decimal::ZERO;
    }
    let pct = (price - entry) / entry * dec!(100);
    if action.is_sell() {
        -pct
    } else {
        pct
    }
}

/// Evaluate a decision against a later observation.
///
/// Terminal decisions are returned unchanged. The high/low range accumulates
/// across repeated evaluations so a touch seen once is never forgotten. The
/// target is checked before the stop when both were touched.
pub fn evaluate_decision(decision: &Decision, observation: &PriceObservation) -> Decision {
    if decision.is_terminal() {
        debug!(id = %decision.id, ticker = %decision.ticker, "Decision already closed");
        return decision.clone();
    }

    let close = observation.close;
    if close <= Decimal::ZERO {
        warn!(ticker = %decision.ticker, close = %close, "Unusable price, skipping evaluation");
        return decision.clone();
    }

    let previous = decision.evaluation();
    let mut high_since = observation.high.unwrap_or(close).max(close);
    let mut low_since = observation.low.unwrap_or(close).min(close);
    if let Some(prev) = previous {
        high_since = high_since.max(prev.high_since);
        low_since = low_since.min(prev.low_since);
    }

    let entry = decision.entry_price;
    let action = decision.action;
    let pnl_pct = directional_return_pct(entry, close, action).round_dp(2);

    let (outcome, exit_price) = if action == Action::Hold {
        (Outcome::Hold, close)
    } else if action.is_buy() {
        if high_since >= decision.target_price {
            (Outcome::TargetHit, decision.target_price)
        } else if low_since <= decision.stop_loss {
            (Outcome::StoplossHit, decision.stop_loss)
        } else {
            (Outcome::Open, close)
        }
    } else if low_since <= decision.target_price {
        (Outcome::TargetHit, decision.target_price)
    } else if high_since >= decision.stop_loss {
        (Outcome::StoplossHit, decision.stop_loss)
    } else {
        (Outcome::Open, close)
    };

    let realized_pnl_pct = directional_return_pct(entry, exit_price, action).round_dp(2);

    let evaluation = Evaluation {
        current_price: close,
        high_since,
        low_since,
        pnl_pct,
        realized_pnl_pct,
        outcome,
        evaluated_at: Utc::now(),
    };

    let mut updated = decision.clone();
    if let Err(e) = updated.apply_evaluation(evaluation) {
        warn!(error = %e, "Evaluation rejected");
        return decision.clone();
    }

    if outcome.is_terminal() {
        debug!(
            ticker = %decision.ticker,
            action = %action,
            outcome = %outcome,
            realized = %realized_pnl_pct,
            "Decision closed"
        );
    }

    updated
}
