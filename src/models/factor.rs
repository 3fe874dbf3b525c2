//! Scoring factors and the per-factor scores handed in by analysis providers.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Neutral midpoint of the 0-100 score scale.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// The fixed set of factors blended into a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    Technical,
    Fundamental,
    Momentum,
    Macro,
    #[serde(alias = "volume")]
    VolumeDelivery,
}

impl Factor {
    pub const COUNT: usize = 5;

    pub const ALL: [Factor; Factor::COUNT] = [
        Factor::Technical,
        Factor::Fundamental,
        Factor::Momentum,
        Factor::Macro,
        Factor::VolumeDelivery,
    ];

    /// Position of this factor in a `FactorMap`.
    pub const fn index(self) -> usize {
        match self {
            Factor::Technical => 0,
            Factor::Fundamental => 1,
            Factor::Momentum => 2,
            Factor::Macro => 3,
            Factor::VolumeDelivery => 4,
        }
    }

    /// Registered default weight.
    pub const fn default_weight(self) -> f64 {
        match self {
            Factor::Technical => 0.30,
            Factor::Fundamental => 0.25,
            Factor::Momentum => 0.20,
            Factor::Macro => 0.15,
            Factor::VolumeDelivery => 0.10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Factor::Technical => "technical",
            Factor::Fundamental => "fundamental",
            Factor::Momentum => "momentum",
            Factor::Macro => "macro",
            Factor::VolumeDelivery => "volume_delivery",
        }
    }

    /// Human-readable label used in reasoning and lessons.
    pub fn label(&self) -> &'static str {
        match self {
            Factor::Technical => "Technical",
            Factor::Fundamental => "Fundamental",
            Factor::Momentum => "Momentum",
            Factor::Macro => "Macro",
            Factor::VolumeDelivery => "Volume/delivery",
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per factor, stored densely.
///
/// Serializes as a `{factor: value}` object; factors missing on input take
/// `T::default()`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(
    into = "BTreeMap<Factor, T>",
    from = "BTreeMap<Factor, T>",
    bound(serialize = "T: Clone + Serialize", deserialize = "T: Default + Deserialize<'de>")
)]
pub struct FactorMap<T>([T; Factor::COUNT]);

impl<T> FactorMap<T> {
    pub fn from_fn(f: impl FnMut(Factor) -> T) -> Self {
        Self(Factor::ALL.map(f))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Factor, &T)> {
        Factor::ALL.iter().map(move |&f| (f, &self.0[f.index()]))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }

    pub fn map<U>(&self, mut f: impl FnMut(Factor, &T) -> U) -> FactorMap<U> {
        FactorMap::from_fn(|factor| f(factor, &self.0[factor.index()]))
    }
}

impl<T: Default> Default for FactorMap<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<Factor> for FactorMap<T> {
    type Output = T;

    fn index(&self, factor: Factor) -> &T {
        &self.0[factor.index()]
    }
}

impl<T> IndexMut<Factor> for FactorMap<T> {
    fn index_mut(&mut self, factor: Factor) -> &mut T {
        &mut self.0[factor.index()]
    }
}

impl<T> From<FactorMap<T>> for BTreeMap<Factor, T> {
    fn from(map: FactorMap<T>) -> Self {
        Factor::ALL.into_iter().zip(map.0).collect()
    }
}

impl<T: Default> From<BTreeMap<Factor, T>> for FactorMap<T> {
    fn from(mut map: BTreeMap<Factor, T>) -> Self {
        Self::from_fn(|f| map.remove(&f).unwrap_or_default())
    }
}

/// Qualitative label attached to a factor score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    #[serde(alias = "strong_accumulation")]
    StrongBullish,
    #[serde(alias = "accumulation")]
    Bullish,
    #[default]
    Neutral,
    #[serde(alias = "distribution")]
    Bearish,
    #[serde(alias = "strong_distribution")]
    StrongBearish,
}

impl Signal {
    /// Label implied by a bare score.
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            Signal::StrongBullish
        } else if score >= 60.0 {
            Signal::Bullish
        } else if score > 40.0 {
            Signal::Neutral
        } else if score > 30.0 {
            Signal::Bearish
        } else {
            Signal::StrongBearish
        }
    }

    /// Score used when the volume/delivery factor only reports a signal.
    pub fn volume_score(self) -> f64 {
        match self {
            Signal::StrongBullish => 80.0,
            Signal::Bullish => 65.0,
            Signal::Neutral => 50.0,
            Signal::Bearish => 35.0,
            Signal::StrongBearish => 20.0,
        }
    }
}

/// Score for one factor of one ticker at analysis time.
///
/// Deserialized scores go through the same clamp as `FactorScore::new`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "FactorScoreRecord")]
pub struct FactorScore {
    pub factor: Factor,

    /// Score on the 0-100 scale, 50 is neutral
    pub score: f64,

    pub signal: Signal,

    /// Provider-specific numbers (rsi, pe, relative strength, ...)
    pub details: BTreeMap<String, f64>,
}

/// Raw provider payload. A missing signal is derived from the clamped score.
#[derive(Deserialize)]
struct FactorScoreRecord {
    factor: Factor,
    score: f64,
    #[serde(default)]
    signal: Option<Signal>,
    #[serde(default)]
    details: BTreeMap<String, f64>,
}

impl From<FactorScoreRecord> for FactorScore {
    fn from(record: FactorScoreRecord) -> Self {
        let mut score = FactorScore::new(record.factor, record.score);
        if let Some(signal) = record.signal {
            score.signal = signal;
        }
        score.details = record.details;
        score
    }
}

impl FactorScore {
    /// Create a score, clamping to [0, 100]. Non-finite scores become neutral.
    pub fn new(factor: Factor, score: f64) -> Self {
        let score = if score.is_finite() {
            score.clamp(0.0, 100.0)
        } else {
            NEUTRAL_SCORE
        };
        Self {
            factor,
            score,
            signal: Signal::from_score(score),
            details: BTreeMap::new(),
        }
    }

    /// Neutral placeholder recorded for a factor the providers did not supply.
    pub fn neutral(factor: Factor) -> Self {
        Self::new(factor, NEUTRAL_SCORE)
    }

    /// Volume/delivery score derived from an accumulation/distribution signal.
    pub fn from_volume_signal(signal: Signal) -> Self {
        Self {
            signal,
            ..Self::new(Factor::VolumeDelivery, signal.volume_score())
        }
    }

    /// Signed distance from neutral.
    pub fn tilt(&self) -> f64 {
        self.score - NEUTRAL_SCORE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        let total: f64 = Factor::ALL.iter().map(|f| f.default_weight()).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_factor_map_serializes_as_object() {
        let map = FactorMap::from_fn(|f| f.default_weight());
        let json = serde_json::to_value(map).unwrap();
        assert_eq!(json["technical"], 0.30);
        assert_eq!(json["volume_delivery"], 0.10);

        let back: FactorMap<f64> = serde_json::from_value(json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn test_factor_map_missing_keys_default() {
        let back: FactorMap<f64> =
            serde_json::from_str(r#"{"technical": 0.5, "volume": 0.5}"#).unwrap();
        assert_eq!(back[Factor::Technical], 0.5);
        assert_eq!(back[Factor::VolumeDelivery], 0.5);
        assert_eq!(back[Factor::Macro], 0.0);
    }

    #[test]
    fn test_score_is_clamped() {
        assert_eq!(FactorScore::new(Factor::Macro, 130.0).score, 100.0);
        assert_eq!(FactorScore::new(Factor::Macro, -4.0).score, 0.0);
        assert_eq!(FactorScore::new(Factor::Macro, f64::NAN).score, 50.0);
    }

    #[test]
    fn test_deserialized_scores_are_clamped() {
        let scores: Vec<FactorScore> = serde_json::from_str(
            r#"[
                {"factor": "technical", "score": 400},
                {"factor": "fundamental", "score": -300},
                {"factor": "volume", "score": 35, "signal": "distribution", "details": {"delivery_pct": 41.5}}
            ]"#,
        )
        .unwrap();

        assert_eq!(scores[0].score, 100.0);
        assert_eq!(scores[0].signal, Signal::StrongBullish);
        assert_eq!(scores[1].score, 0.0);
        assert_eq!(scores[1].signal, Signal::StrongBearish);
        assert_eq!(scores[2].signal, Signal::Bearish);
        assert_eq!(scores[2].details["delivery_pct"], 41.5);
    }

    #[test]
    fn test_volume_signal_aliases() {
        let signal: Signal = serde_json::from_str("\"strong_accumulation\"").unwrap();
        assert_eq!(signal, Signal::StrongBullish);

        let score = FactorScore::from_volume_signal(Signal::Bearish);
        assert_eq!(score.factor, Factor::VolumeDelivery);
        assert_eq!(score.score, 35.0);
        assert_eq!(score.signal, Signal::Bearish);
    }
}
