//! Versioned factor weight vectors and their audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

use super::factor::{Factor, FactorMap};

/// Allowed deviation of a weight vector's sum from 1.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// A published set of factor weights.
///
/// Weights are non-negative and sum to 1. A vector is never modified after
/// construction; adaptation publishes a successor with the next version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WeightVectorRecord")]
pub struct WeightVector {
    version: u64,
    weights: FactorMap<f64>,
    published_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct WeightVectorRecord {
    version: u64,
    weights: FactorMap<f64>,
    published_at: DateTime<Utc>,
}

impl TryFrom<WeightVectorRecord> for WeightVector {
    type Error = EngineError;

    fn try_from(record: WeightVectorRecord) -> Result<Self, Self::Error> {
        validate(&record.weights)?;
        Ok(Self {
            version: record.version,
            weights: record.weights,
            published_at: record.published_at,
        })
    }
}

impl WeightVector {
    /// Build a vector, rejecting weights that break the sum-to-one invariant.
    pub fn new(version: u64, weights: FactorMap<f64>) -> Result<Self, EngineError> {
        validate(&weights)?;
        Ok(Self {
            version,
            weights,
            published_at: Utc::now(),
        })
    }

    /// Version 1: the registered default weight of every factor.
    pub fn defaults() -> Self {
        Self {
            version: 1,
            weights: default_weights(),
            published_at: Utc::now(),
        }
    }

    /// Next version carrying new weights.
    pub fn successor(&self, weights: FactorMap<f64>) -> Result<Self, EngineError> {
        Self::new(self.version + 1, weights)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn weight(&self, factor: Factor) -> f64 {
        self.weights[factor]
    }

    pub fn weights(&self) -> &FactorMap<f64> {
        &self.weights
    }
}

/// Registered default weights as a map.
pub fn default_weights() -> FactorMap<f64> {
    FactorMap::from_fn(Factor::default_weight)
}

fn validate(weights: &FactorMap<f64>) -> Result<(), EngineError> {
    for (factor, &w) in weights.iter() {
        if !w.is_finite() || !(0.0..=1.0).contains(&w) {
            return Err(EngineError::invariant(format!(
                "weight for {} out of range: {}",
                factor, w
            )));
        }
    }

    let total: f64 = weights.values().sum();
    if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(EngineError::invariant(format!(
            "weights sum to {:.8}, expected 1",
            total
        )));
    }

    Ok(())
}

/// Append-only audit record written whenever a new weight vector is published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightHistoryEntry {
    pub timestamp: DateTime<Utc>,

    /// Version that was published
    pub version: u64,

    pub weights: FactorMap<f64>,

    /// Hit rate of the decisions that justified the change (0.0 to 1.0)
    pub hit_rate: f64,

    /// Number of evaluated decisions since the previous adaptation
    pub sample_size: u64,

    pub reason: String,
}

impl WeightHistoryEntry {
    pub fn new(vector: &WeightVector, hit_rate: f64, sample_size: u64, reason: impl Into<String>) -> Self {
        Self {
            timestamp: vector.published_at(),
            version: vector.version(),
            weights: *vector.weights(),
            hit_rate,
            sample_size,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let v = WeightVector::defaults();
        assert_eq!(v.version(), 1);
        assert!((v.weight(Factor::Technical) - 0.30).abs() < 1e-12);
        assert!(WeightVector::new(1, *v.weights()).is_ok());
    }

    #[test]
    fn test_rejects_bad_sum() {
        let mut w = default_weights();
        w[Factor::Macro] += 0.05;
        let err = WeightVector::new(2, w).unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
    }

    #[test]
    fn test_rejects_negative_weight() {
        let mut w = default_weights();
        w[Factor::Macro] = -0.05;
        w[Factor::Technical] += 0.20;
        assert!(WeightVector::new(2, w).is_err());
    }

    #[test]
    fn test_successor_bumps_version() {
        let v1 = WeightVector::defaults();
        let v2 = v1.successor(FactorMap::from_fn(|_| 0.2)).unwrap();
        assert_eq!(v2.version(), 2);
        assert_eq!(v1.version(), 1);
    }

    #[test]
    fn test_deserialize_validates() {
        let json = r#"{
            "version": 3,
            "weights": {"technical": 0.9, "fundamental": 0.9},
            "published_at": "2024-01-01T00:00:00Z"
        }"#;
        assert!(serde_json::from_str::<WeightVector>(json).is_err());

        let v = WeightVector::defaults();
        let round = serde_json::to_string(&v).unwrap();
        let back: WeightVector = serde_json::from_str(&round).unwrap();
        assert_eq!(back.version(), 1);
    }
}
