//! Scoring aggregator: blends factor scores into a composite and a confidence.

use statrs::statistics::Statistics;
use tracing::debug;

use crate::models::{Factor, FactorMap, FactorScore, WeightVector, NEUTRAL_SCORE};

/// Lowest confidence ever reported.
pub const MIN_CONFIDENCE: f64 = 30.0;

/// Highest confidence ever reported.
pub const MAX_CONFIDENCE: f64 = 95.0;

/// Output of the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeScore {
    /// Weighted blend over the factors that were present (0-100)
    pub composite: f64,

    /// Unclamped confidence before any penalties
    pub raw_confidence: f64,

    /// Share of the weight vector that was backed by real scores (0-1)
    pub coverage: f64,

    /// Population standard deviation of the present factor scores
    pub dispersion: f64,

    /// One score per factor in `Factor::ALL` order, neutral where missing
    pub scores: Vec<FactorScore>,

    pub missing: Vec<Factor>,
}

/// Combine factor scores under a weight vector.
///
/// Missing factors are recorded as neutral but excluded from the blend: the
/// composite is renormalized by the weight of the factors actually present,
/// so absent data never drags the score toward 50. When a factor appears more
/// than once the last entry wins.
pub fn aggregate(scores: &[FactorScore], weights: &WeightVector) -> CompositeScore {
    let mut present: FactorMap<Option<&FactorScore>> = FactorMap::default();
    for score in scores {
        if present[score.factor].is_some() {
            debug!(factor = %score.factor, "Duplicate factor score, keeping the latest");
        }
        present[score.factor] = Some(score);
    }

    let mut weighted_sum = 0.0;
    let mut used_weight = 0.0;
    let mut present_scores = Vec::with_capacity(Factor::COUNT);
    let mut snapshot = Vec::with_capacity(Factor::COUNT);
    let mut missing = Vec::new();

    for (factor, score) in present.iter() {
        match score {
            Some(s) => {
                let w = weights.weight(factor);
                weighted_sum += s.score * w;
                used_weight += w;
                present_scores.push(s.score);
                snapshot.push((*s).clone());
            }
            None => {
                missing.push(factor);
                snapshot.push(FactorScore::neutral(factor));
            }
        }
    }

    let composite = if used_weight > 0.0 {
        weighted_sum / used_weight
    } else {
        NEUTRAL_SCORE
    };

    let dispersion = if present_scores.len() >= 2 {
        present_scores.population_std_dev()
    } else {
        0.0
    };

    let coverage = used_weight.clamp(0.0, 1.0);

    CompositeScore {
        composite,
        raw_confidence: raw_confidence(composite, dispersion, coverage),
        coverage,
        dispersion,
        scores: snapshot,
        missing,
    }
}

/// Confidence before clamping.
///
/// Starts at 40, adds 1.1 per point of distance from neutral, adds up to 10
/// for tight agreement between factors and loses up to 10 for wide
/// disagreement. The part above the 30 floor is then scaled by coverage.
fn raw_confidence(composite: f64, dispersion: f64, coverage: f64) -> f64 {
    let distance = (composite - NEUTRAL_SCORE).abs();
    let agreement = (10.0 - dispersion * 0.5).clamp(-10.0, 10.0);
    let raw = 40.0 + 1.1 * distance + agreement;

    MIN_CONFIDENCE + (raw - MIN_CONFIDENCE).max(0.0) * coverage
}

/// Round and clamp a confidence to the reportable range.
pub fn clamp_confidence(value: f64) -> u8 {
    if !value.is_finite() {
        return MIN_CONFIDENCE as u8;
    }
    value.round().clamp(MIN_CONFIDENCE, MAX_CONFIDENCE) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_scores(values: [f64; 5]) -> Vec<FactorScore> {
        Factor::ALL
            .iter()
            .zip(values)
            .map(|(&f, v)| FactorScore::new(f, v))
            .collect()
    }

    #[test]
    fn test_default_weight_composite() {
        let scores = full_scores([80.0, 85.0, 70.0, 60.0, 65.0]);
        let result = aggregate(&scores, &WeightVector::defaults());

        assert!((result.composite - 74.75).abs() < 1e-9);
        assert!(result.missing.is_empty());
        assert!((result.coverage - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_factors_are_renormalized() {
        let scores = vec![
            FactorScore::new(Factor::Technical, 80.0),
            FactorScore::new(Factor::Fundamental, 60.0),
        ];
        let result = aggregate(&scores, &WeightVector::defaults());

        let expected = (80.0 * 0.30 + 60.0 * 0.25) / 0.55;
        assert!((result.composite - expected).abs() < 1e-9);
        assert_eq!(result.missing.len(), 3);
        assert_eq!(result.scores.len(), Factor::COUNT);
        assert_eq!(result.scores[Factor::Macro.index()].score, 50.0);
    }

    #[test]
    fn test_no_scores_is_neutral() {
        let result = aggregate(&[], &WeightVector::defaults());
        assert_eq!(result.composite, 50.0);
        assert_eq!(result.coverage, 0.0);
        assert_eq!(clamp_confidence(result.raw_confidence), 30);
    }

    #[test]
    fn test_composite_is_monotone_in_each_factor() {
        let base = [55.0, 40.0, 62.0, 48.0, 70.0];
        let weights = WeightVector::defaults();

        for factor in Factor::ALL {
            let mut previous = f64::MIN;
            for step in 0..=20 {
                let mut values = base;
                values[factor.index()] = step as f64 * 5.0;
                let composite = aggregate(&full_scores(values), &weights).composite;
                assert!(composite >= previous - 1e-12, "{} not monotone", factor);
                previous = composite;
            }
        }
    }

    #[test]
    fn test_confidence_stays_in_range() {
        let weights = WeightVector::defaults();
        for values in [[100.0; 5], [0.0; 5], [100.0, 0.0, 100.0, 0.0, 100.0], [50.0; 5]] {
            let result = aggregate(&full_scores(values), &weights);
            let c = clamp_confidence(result.raw_confidence);
            assert!((30..=95).contains(&c));
        }
    }

    #[test]
    fn test_agreement_raises_confidence() {
        let weights = WeightVector::defaults();
        let tight = aggregate(&full_scores([70.0, 70.0, 70.0, 70.0, 70.0]), &weights);
        let loose = aggregate(&full_scores([95.0, 45.0, 90.0, 50.0, 70.0]), &weights);
        assert!(tight.raw_confidence > loose.raw_confidence);
    }
}
