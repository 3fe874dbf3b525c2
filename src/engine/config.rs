//! Decision engine configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::MarketRegime;

/// Composite-score cut-offs for one regime.
///
/// Walking down the ladder, the first cut-off the composite reaches or exceeds
/// picks the label: `strong_buy`, `buy`, `hold_low` (HOLD), `sell` (SELL).
/// Anything below `sell` is STRONG_SELL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    pub strong_buy: f64,
    pub buy: f64,
    pub hold_low: f64,
    pub sell: f64,
}

impl ThresholdTable {
    pub const fn new(strong_buy: f64, buy: f64, hold_low: f64, sell: f64) -> Self {
        Self {
            strong_buy,
            buy,
            hold_low,
            sell,
        }
    }

    /// Cut-offs must be strictly decreasing and inside (0, 100).
    pub fn validate(&self) -> Result<(), EngineError> {
        let ordered = [100.0, self.strong_buy, self.buy, self.hold_low, self.sell, 0.0];
        if ordered.windows(2).all(|w| w[0] > w[1]) {
            Ok(())
        } else {
            Err(EngineError::invariant(format!(
                "threshold table not strictly decreasing: {:?}",
                self
            )))
        }
    }
}

/// One threshold table per market regime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeThresholds {
    pub bull: ThresholdTable,
    pub bear: ThresholdTable,
    pub sideways: ThresholdTable,
}

impl RegimeThresholds {
    pub fn for_regime(&self, regime: MarketRegime) -> &ThresholdTable {
        match regime {
            MarketRegime::Bull => &self.bull,
            MarketRegime::Bear => &self.bear,
            MarketRegime::Sideways => &self.sideways,
        }
    }
}

impl Default for RegimeThresholds {
    fn default() -> Self {
        Self {
            // Easier to buy, harder to sell
            bull: ThresholdTable::new(70.0, 57.0, 40.0, 28.0),
            // Harder to buy, easier to sell
            bear: ThresholdTable::new(76.0, 64.0, 46.0, 34.0),
            sideways: ThresholdTable::new(72.0, 60.0, 42.0, 30.0),
        }
    }
}

/// ATR multiples for the target and the stop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtrMultiples {
    pub target: Decimal,
    pub stop: Decimal,
}

/// Configuration for scoring, classification and target/stop sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Composite cut-offs per market regime
    pub thresholds: RegimeThresholds,

    /// ATR multiples for STRONG_BUY / STRONG_SELL
    pub strong_multiples: AtrMultiples,

    /// ATR multiples for BUY / SELL
    pub regular_multiples: AtrMultiples,

    /// ATR multiples for the HOLD band
    pub hold_multiples: AtrMultiples,

    /// Multiple scale when volatility is compressed
    pub compressed_volatility_scale: Decimal,

    /// Multiple scale when volatility is elevated
    pub elevated_volatility_scale: Decimal,

    /// ATR substitute as a fraction of entry price when ATR is missing or zero
    pub fallback_atr_pct: Decimal,

    /// How far (in ATRs) a support/resistance level may sit from the raw projection
    pub level_snap_tolerance_atr: Decimal,

    /// Distance from neutral a factor needs to be cited in the reasoning
    pub reasoning_min_distance: f64,

    /// Confidence lost when the ATR fallback is used
    pub missing_atr_confidence_penalty: f64,

    /// ADX assumed when trend strength is unknown
    pub default_adx: f64,

    /// Maximum number of tickers analysed concurrently during a scan
    pub scan_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: RegimeThresholds::default(),
            strong_multiples: AtrMultiples {
                target: dec!(2.0),
                stop: dec!(1.5),
            },
            regular_multiples: AtrMultiples {
                target: dec!(1.5),
                stop: dec!(1.25),
            },
            hold_multiples: AtrMultiples {
                target: dec!(1.0),
                stop: dec!(1.0),
            },
            compressed_volatility_scale: dec!(0.8),
            elevated_volatility_scale: dec!(1.25),
            fallback_atr_pct: dec!(0.015),   // 1.5% of price
            level_snap_tolerance_atr: dec!(0.75),
            reasoning_min_distance: 10.0,    // score <= 40 or >= 60
            missing_atr_confidence_penalty: 5.0,
            default_adx: 25.0,
            scan_workers: 8,
        }
    }
}

impl EngineConfig {
    /// Check the threshold tables and multiples for consistency.
    pub fn validate(&self) -> Result<(), EngineError> {
        for regime in MarketRegime::ALL {
            self.thresholds.for_regime(regime).validate()?;
        }

        for m in [self.strong_multiples, self.regular_multiples, self.hold_multiples] {
            if m.target <= Decimal::ZERO || m.stop <= Decimal::ZERO {
                return Err(EngineError::invariant(format!(
                    "ATR multiples must be positive: {:?}",
                    m
                )));
            }
        }

        if self.fallback_atr_pct <= Decimal::ZERO {
            return Err(EngineError::invariant("fallback ATR percentage must be positive"));
        }

        Ok(())
    }
}
