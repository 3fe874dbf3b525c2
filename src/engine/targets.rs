//! Target and stop-loss sizing from ATR, action strength and volatility.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;
use crate::models::Action;

use super::config::{AtrMultiples, EngineConfig};

/// Smallest price a target or stop may take.
const MIN_PRICE: Decimal = dec!(0.01);

/// Volatility backdrop used to widen or tighten the ATR multiples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolatilityRegime {
    Compressed,
    #[default]
    Normal,
    Elevated,
}

impl VolatilityRegime {
    /// Classify from the percentile of current ATR within its own history.
    pub fn from_atr_percentile(percentile: f64) -> Self {
        if percentile <= 25.0 {
            Self::Compressed
        } else if percentile >= 75.0 {
            Self::Elevated
        } else {
            Self::Normal
        }
    }

    /// Classify from an implied-volatility index level (India VIX scale).
    pub fn from_vix(vix: f64) -> Self {
        if vix < 13.0 {
            Self::Compressed
        } else if vix > 22.0 {
            Self::Elevated
        } else {
            Self::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compressed => "compressed",
            Self::Normal => "normal",
            Self::Elevated => "elevated",
        }
    }
}

/// Support and resistance levels reported by technical analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceLevels {
    #[serde(default)]
    pub supports: Vec<Decimal>,
    #[serde(default)]
    pub resistances: Vec<Decimal>,
}

/// Computed exit levels.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetStop {
    pub target_price: Decimal,
    pub stop_loss: Decimal,
    pub risk_reward_ratio: Decimal,

    /// ATR actually used (the substitute when the fallback kicked in)
    pub effective_atr: Decimal,

    /// ATR was missing or zero and the percentage band was used
    pub used_fallback: bool,

    pub snapped_target: bool,
    pub snapped_stop: bool,
}

/// Sizes targets and stops.
pub struct TargetCalculator {
    strong: AtrMultiples,
    regular: AtrMultiples,
    hold: AtrMultiples,
    compressed_scale: Decimal,
    elevated_scale: Decimal,
    fallback_atr_pct: Decimal,
    snap_tolerance_atr: Decimal,
}

impl TargetCalculator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            strong: config.strong_multiples,
            regular: config.regular_multiples,
            hold: config.hold_multiples,
            compressed_scale: config.compressed_volatility_scale,
            elevated_scale: config.elevated_volatility_scale,
            fallback_atr_pct: config.fallback_atr_pct,
            snap_tolerance_atr: config.level_snap_tolerance_atr,
        }
    }

    /// Compute target, stop and risk/reward.
    ///
    /// The target sits in the favorable direction of the action and the stop
    /// in the adverse one; HOLD gets a symmetric band above and below entry.
    /// When levels are supplied, each side snaps to the nearest level on the
    /// correct side of entry within the snap tolerance of the raw projection.
    pub fn compute(
        &self,
        entry: Decimal,
        atr: Option<Decimal>,
        action: Action,
        volatility: VolatilityRegime,
        levels: Option<&PriceLevels>,
    ) -> Result<TargetStop, EngineError> {
        if entry <= Decimal::ZERO {
            return Err(EngineError::MissingData(format!(
                "entry price must be positive, got {}",
                entry
            )));
        }

        let (effective_atr, used_fallback) = match atr {
            Some(a) if a > Decimal::ZERO => (a, false),
            _ => {
                let substitute = entry * self.fallback_atr_pct;
                debug!(entry = %entry, atr = ?atr, substitute = %substitute, "ATR unusable, using percentage band");
                (substitute, true)
            }
        };

        let multiples = if action.is_strong() {
            self.strong
        } else if action == Action::Hold {
            self.hold
        } else {
            self.regular
        };

        let scale = match volatility {
            VolatilityRegime::Compressed => self.compressed_scale,
            VolatilityRegime::Normal => Decimal::ONE,
            VolatilityRegime::Elevated => self.elevated_scale,
        };

        let target_distance = effective_atr * multiples.target * scale;
        let stop_distance = effective_atr * multiples.stop * scale;
        let bearish = action.is_sell();

        let (raw_target, raw_stop) = if bearish {
            (entry - target_distance, entry + stop_distance)
        } else {
            (entry + target_distance, entry - stop_distance)
        };

        let tolerance = effective_atr * self.snap_tolerance_atr;
        let (mut target, mut stop) = (raw_target, raw_stop);
        let (mut snapped_target, mut snapped_stop) = (false, false);

        if let Some(levels) = levels {
            let (target_side, stop_side) = if bearish {
                (&levels.supports, &levels.resistances)
            } else {
                (&levels.resistances, &levels.supports)
            };

            let target_above = !bearish;
            if let Some(level) = nearest_level(target_side, entry, target_above, raw_target, tolerance) {
                target = level;
                snapped_target = true;
            }
            if let Some(level) = nearest_level(stop_side, entry, !target_above, raw_stop, tolerance) {
                stop = level;
                snapped_stop = true;
            }
        }

        let target_price = target.max(MIN_PRICE).round_dp(2);
        let stop_loss = stop.max(MIN_PRICE).round_dp(2);

        let reward = (target_price - entry).abs();
        let risk = (entry - stop_loss).abs();
        let risk_reward_ratio = if risk > Decimal::ZERO {
            (reward / risk).round_dp(2)
        } else {
            Decimal::ZERO
        };

        Ok(TargetStop {
            target_price,
            stop_loss,
            risk_reward_ratio,
            effective_atr,
            used_fallback,
            snapped_target,
            snapped_stop,
        })
    }
}

/// Level closest to `projection` that lies on the requested side of entry and
/// within `tolerance` of the projection.
fn nearest_level(
    levels: &[Decimal],
    entry: Decimal,
    above_entry: bool,
    projection: Decimal,
    tolerance: Decimal,
) -> Option<Decimal> {
    levels
        .iter()
        .copied()
        .filter(|&l| if above_entry { l > entry } else { l < entry })
        .filter(|&l| (l - projection).abs() <= tolerance)
        .min_by_key(|&l| (l - projection).abs())
}
