//! Human-readable digest of the learning state.

use rust_decimal::Decimal;

use crate::models::{Action, Factor, LearningState, MarketRegime};

/// Sectors shown in the summary.
const TOP_SECTORS: usize = 10;

/// Recent lessons shown in the summary.
const RECENT_LESSONS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct FactorRanking {
    pub factor: Factor,
    pub accuracy: f64,
    pub samples: u64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectorRanking {
    pub sector: String,
    pub accuracy: f64,
    pub decisions: u64,
    pub avg_pnl_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationRow {
    pub bucket: String,
    pub predicted: u64,
    pub hit_rate: Option<f64>,
}

/// Snapshot of what the learning engine has learned so far.
#[derive(Debug, Clone, PartialEq)]
pub struct LearningSummary {
    pub total_evaluated: u64,
    pub overall_accuracy: f64,
    pub weight_version: u64,
    pub adaptations: u64,
    pub evaluated_since_adaptation: u64,
    pub market_regime: MarketRegime,
    pub factor_rankings: Vec<FactorRanking>,
    pub action_accuracy: Vec<(Action, f64, u64)>,
    pub calibration: Vec<CalibrationRow>,
    pub top_sectors: Vec<SectorRanking>,
    pub recent_lessons: Vec<String>,
}

impl LearningSummary {
    pub fn from_state(state: &LearningState) -> Self {
        let mut factor_rankings: Vec<FactorRanking> = state
            .factor_accuracy
            .iter()
            .map(|(factor, counter)| FactorRanking {
                factor,
                accuracy: counter.accuracy(),
                samples: counter.total,
                weight: state.current_weights.weight(factor),
            })
            .collect();
        factor_rankings.sort_by(|a, b| b.accuracy.total_cmp(&a.accuracy));

        let action_accuracy = state
            .action_accuracy
            .iter()
            .filter(|(_, c)| c.total > 0)
            .map(|(&action, c)| (action, c.accuracy(), c.total))
            .collect();

        let calibration = state
            .calibration
            .iter()
            .map(|b| CalibrationRow {
                bucket: b.label(),
                predicted: b.predicted,
                hit_rate: b.hit_rate(),
            })
            .collect();

        let mut top_sectors: Vec<SectorRanking> = state
            .sector_performance
            .iter()
            .map(|(sector, perf)| SectorRanking {
                sector: sector.clone(),
                accuracy: perf.accuracy(),
                decisions: perf.decisions,
                avg_pnl_pct: perf.avg_pnl_pct(),
            })
            .collect();
        top_sectors.sort_by(|a, b| {
            b.accuracy
                .total_cmp(&a.accuracy)
                .then_with(|| b.avg_pnl_pct.cmp(&a.avg_pnl_pct))
        });
        top_sectors.truncate(TOP_SECTORS);

        let recent_lessons = state
            .lessons
            .iter()
            .rev()
            .take(RECENT_LESSONS)
            .map(|l| l.lesson.clone())
            .collect();

        Self {
            total_evaluated: state.total_decisions_evaluated,
            overall_accuracy: state.overall_accuracy(),
            weight_version: state.current_weights.version(),
            adaptations: state.adaptations_count,
            evaluated_since_adaptation: state.evaluated_since_adaptation,
            market_regime: state.market_regime,
            factor_rankings,
            action_accuracy,
            calibration,
            top_sectors,
            recent_lessons,
        }
    }
}

impl std::fmt::Display for LearningSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n{:=^60}", " LEARNING SUMMARY ")?;
        writeln!(f)?;
        writeln!(f, "Evaluated:      {} ({:.1}% correct)", self.total_evaluated, self.overall_accuracy * 100.0)?;
        writeln!(f, "Weights:        v{} after {} adaptations", self.weight_version, self.adaptations)?;
        writeln!(f, "Since adapting: {}", self.evaluated_since_adaptation)?;
        writeln!(f, "Regime:         {}", self.market_regime)?;
        writeln!(f)?;
        writeln!(f, "--- Factors ---")?;
        for r in &self.factor_rankings {
            writeln!(
                f,
                "{:<16} {:>6.1}% over {:>4}   weight {:.3}",
                r.factor.label(),
                r.accuracy * 100.0,
                r.samples,
                r.weight
            )?;
        }
        if !self.action_accuracy.is_empty() {
            writeln!(f)?;
            writeln!(f, "--- Actions ---")?;
            for (action, accuracy, total) in &self.action_accuracy {
                writeln!(f, "{:<12} {:>6.1}% over {}", action.as_str(), accuracy * 100.0, total)?;
            }
        }
        writeln!(f)?;
        writeln!(f, "--- Confidence Calibration ---")?;
        for row in &self.calibration {
            match row.hit_rate {
                Some(rate) => writeln!(f, "{:<8} {:>6.1}% of {}", row.bucket, rate * 100.0, row.predicted)?,
                None => writeln!(f, "{:<8}      - no samples", row.bucket)?,
            }
        }
        if !self.top_sectors.is_empty() {
            writeln!(f)?;
            writeln!(f, "--- Sectors ---")?;
            for s in &self.top_sectors {
                writeln!(
                    f,
                    "{:<20} {:>6.1}% over {:>3}   avg {:.2}%",
                    s.sector,
                    s.accuracy * 100.0,
                    s.decisions,
                    s.avg_pnl_pct
                )?;
            }
        }
        if !self.recent_lessons.is_empty() {
            writeln!(f)?;
            writeln!(f, "--- Recent Lessons ---")?;
            for lesson in &self.recent_lessons {
                writeln!(f, "- {}", lesson)?;
            }
        }
        writeln!(f, "{:=^60}", "")?;
        Ok(())
    }
}
