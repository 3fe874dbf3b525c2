//! Market regime detection from benchmark closes.

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use statrs::statistics::Statistics;

use crate::error::EngineError;
use crate::models::{MarketRegime, RegimeObservation};

use super::config::LearningConfig;

/// Bounds on how far volatility may stretch or shrink the trend threshold.
const MIN_THRESHOLD_SCALE: f64 = 0.5;
const MAX_THRESHOLD_SCALE: f64 = 2.0;

/// Classify the market from the most recent `regime_window` closes.
///
/// The window return is compared against `trend_threshold_pct`, scaled by
/// how volatile daily returns were relative to the reference volatility: a
/// choppy market needs a bigger move before it counts as a trend.
pub fn detect_regime(closes: &[Decimal], config: &LearningConfig) -> Result<RegimeObservation, EngineError> {
    let start = closes.len().saturating_sub(config.regime_window);
    let window: Vec<f64> = closes[start..].iter().filter_map(|c| c.to_f64()).collect();

    if window.len() < 2 {
        return Err(EngineError::MissingData(format!(
            "need at least 2 benchmark closes, got {}",
            window.len()
        )));
    }
    if window.iter().any(|&c| c <= 0.0 || !c.is_finite()) {
        return Err(EngineError::MissingData("benchmark closes must be positive".to_string()));
    }

    let first = window[0];
    let last = window[window.len() - 1];
    let window_return_pct = (last / first - 1.0) * 100.0;

    let daily_returns: Vec<f64> = window.windows(2).map(|w| (w[1] / w[0] - 1.0) * 100.0).collect();
    let volatility_pct = if daily_returns.len() >= 2 {
        daily_returns.std_dev()
    } else {
        0.0
    };

    let scale = if config.reference_volatility_pct > 0.0 {
        (volatility_pct / config.reference_volatility_pct).clamp(MIN_THRESHOLD_SCALE, MAX_THRESHOLD_SCALE)
    } else {
        1.0
    };
    let threshold = config.trend_threshold_pct * scale;

    let regime = if window_return_pct > threshold {
        MarketRegime::Bull
    } else if window_return_pct < -threshold {
        MarketRegime::Bear
    } else {
        MarketRegime::Sideways
    };

    Ok(RegimeObservation {
        timestamp: Utc::now(),
        regime,
        window_return_pct,
        volatility_pct,
    })
}
