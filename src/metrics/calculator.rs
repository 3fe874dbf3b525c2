//! Performance report over evaluated decisions: hit rate, P&L, drawdown, breakdowns.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use statrs::statistics::Statistics;

use crate::models::{Decision, Outcome};

/// Aggregate over one group of decisions (a sector, an ISO week).
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    pub key: String,
    pub decisions: u32,
    pub winners: u32,
    pub total_pnl_pct: Decimal,
}

impl GroupStats {
    fn new(key: String) -> Self {
        Self {
            key,
            decisions: 0,
            winners: 0,
            total_pnl_pct: Decimal::ZERO,
        }
    }

    fn add(&mut self, pnl: Decimal) {
        self.decisions += 1;
        self.total_pnl_pct += pnl;
        if pnl > Decimal::ZERO {
            self.winners += 1;
        }
    }

    pub fn hit_rate(&self) -> f64 {
        if self.decisions == 0 {
            0.0
        } else {
            self.winners as f64 / self.decisions as f64
        }
    }

    pub fn avg_pnl_pct(&self) -> Decimal {
        if self.decisions == 0 {
            Decimal::ZERO
        } else {
            self.total_pnl_pct / Decimal::from(self.decisions)
        }
    }
}

/// Performance of a set of decisions.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceReport {
    pub generated_at: DateTime<Utc>,

    // === Counts ===
    pub total_decisions: u32,
    pub evaluated: u32,
    pub open: u32,
    pub targets_hit: u32,
    pub stops_hit: u32,
    pub winners: u32,
    pub losers: u32,
    pub hit_rate: f64,

    // === P&L (percent per decision) ===
    pub total_pnl_pct: Decimal,
    pub avg_pnl_pct: Decimal,
    pub best: Option<(String, Decimal)>,
    pub worst: Option<(String, Decimal)>,
    /// Sample standard deviation of per-decision P&L
    pub pnl_std_dev: f64,
    pub profit_factor: f64,
    /// Largest peak-to-trough fall of cumulative P&L, in percentage points
    pub max_drawdown_pct: Decimal,

    // === Breakdowns ===
    pub by_sector: Vec<GroupStats>,
    pub by_week: Vec<GroupStats>,
}

/// Calculator for decision performance.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Build a report over every actionable decision that has been evaluated.
    ///
    /// Closed decisions count at their realized P&L, open ones at their
    /// mark-to-market P&L. HOLD decisions only appear in `total_decisions`.
    pub fn performance_report(decisions: &[Decision]) -> PerformanceReport {
        let mut report = PerformanceReport {
            generated_at: Utc::now(),
            total_decisions: decisions.len() as u32,
            evaluated: 0,
            open: 0,
            targets_hit: 0,
            stops_hit: 0,
            winners: 0,
            losers: 0,
            hit_rate: 0.0,
            total_pnl_pct: Decimal::ZERO,
            avg_pnl_pct: Decimal::ZERO,
            best: None,
            worst: None,
            pnl_std_dev: 0.0,
            profit_factor: 0.0,
            max_drawdown_pct: Decimal::ZERO,
            by_sector: Vec::new(),
            by_week: Vec::new(),
        };

        let mut scored: Vec<(&Decision, Decimal)> = decisions
            .iter()
            .filter(|d| d.is_actionable())
            .filter_map(|d| d.evaluation().map(|e| (d, e.realized_pnl_pct)))
            .collect();
        if scored.is_empty() {
            return report;
        }
        scored.sort_by_key(|(d, _)| d.timestamp);

        let mut sectors: BTreeMap<String, GroupStats> = BTreeMap::new();
        let mut weeks: BTreeMap<String, GroupStats> = BTreeMap::new();

        for (decision, pnl) in &scored {
            report.evaluated += 1;
            match decision.outcome() {
                Some(Outcome::TargetHit) => report.targets_hit += 1,
                Some(Outcome::StoplossHit) => report.stops_hit += 1,
                _ => report.open += 1,
            }

            let sector = decision.sector.clone().unwrap_or_else(|| "Unknown".to_string());
            sectors.entry(sector.clone()).or_insert_with(|| GroupStats::new(sector)).add(*pnl);

            let week = decision.timestamp.iso_week();
            let week_key = format!("{}-W{:02}", week.year(), week.week());
            weeks.entry(week_key.clone()).or_insert_with(|| GroupStats::new(week_key)).add(*pnl);
        }

        let pnls: Vec<Decimal> = scored.iter().map(|(_, p)| *p).collect();
        Self::calculate_pnl_metrics(&mut report, &pnls);
        Self::calculate_drawdown(&mut report, &pnls);

        report.best = scored
            .iter()
            .max_by_key(|(_, p)| *p)
            .map(|(d, p)| (d.ticker.clone(), *p));
        report.worst = scored
            .iter()
            .min_by_key(|(_, p)| *p)
            .map(|(d, p)| (d.ticker.clone(), *p));

        report.by_sector = sectors.into_values().collect();
        report.by_sector.sort_by(|a, b| b.total_pnl_pct.cmp(&a.total_pnl_pct));
        report.by_week = weeks.into_values().collect();

        report
    }

    fn calculate_pnl_metrics(report: &mut PerformanceReport, pnls: &[Decimal]) {
        let (wins, losses): (Vec<Decimal>, Vec<Decimal>) =
            pnls.iter().partition(|&&p| p > Decimal::ZERO);

        report.winners = wins.len() as u32;
        report.losers = losses.iter().filter(|p| **p < Decimal::ZERO).count() as u32;
        report.total_pnl_pct = pnls.iter().copied().sum();
        report.avg_pnl_pct = (report.total_pnl_pct / Decimal::from(pnls.len() as u32)).round_dp(2);
        report.hit_rate = wins.len() as f64 / pnls.len() as f64;

        let gross_profit: Decimal = wins.iter().copied().sum();
        let gross_loss: Decimal = losses.iter().map(|l| l.abs()).sum();
        if gross_loss > Decimal::ZERO {
            report.profit_factor =
                gross_profit.to_f64().unwrap_or(0.0) / gross_loss.to_f64().unwrap_or(1.0);
        }

        if pnls.len() >= 2 {
            let returns: Vec<f64> = pnls.iter().filter_map(|p| p.to_f64()).collect();
            report.pnl_std_dev = returns.std_dev();
        }
    }

    /// Peak-to-trough fall of the cumulative P&L curve, in time order.
    fn calculate_drawdown(report: &mut PerformanceReport, pnls: &[Decimal]) {
        let mut equity = Decimal::ZERO;
        let mut peak = Decimal::ZERO;
        let mut max_dd = Decimal::ZERO;

        for pnl in pnls {
            equity += pnl;
            if equity > peak {
                peak = equity;
            }
            let dd = peak - equity;
            if dd > max_dd {
                max_dd = dd;
            }
        }

        report.max_drawdown_pct = max_dd;
    }
}

impl std::fmt::Display for PerformanceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n{:=^60}", " PERFORMANCE REPORT ")?;
        writeln!(f, "Generated: {}", self.generated_at.format("%Y-%m-%d %H:%M"))?;
        writeln!(f)?;
        writeln!(f, "--- Decisions ---")?;
        writeln!(f, "Total:       {} ({} evaluated, {} open)", self.total_decisions, self.evaluated, self.open)?;
        writeln!(f, "Targets Hit: {}", self.targets_hit)?;
        writeln!(f, "Stops Hit:   {}", self.stops_hit)?;
        writeln!(f, "Winners:     {} ({:.1}%)", self.winners, self.hit_rate * 100.0)?;
        writeln!(f, "Losers:      {}", self.losers)?;
        writeln!(f)?;
        writeln!(f, "--- P&L ---")?;
        writeln!(f, "Total:       {:.2}%", self.total_pnl_pct)?;
        writeln!(f, "Average:     {:.2}%", self.avg_pnl_pct)?;
        if let Some((ticker, pnl)) = &self.best {
            writeln!(f, "Best:        {} {:.2}%", ticker, pnl)?;
        }
        if let Some((ticker, pnl)) = &self.worst {
            writeln!(f, "Worst:       {} {:.2}%", ticker, pnl)?;
        }
        writeln!(f, "Std Dev:     {:.2}", self.pnl_std_dev)?;
        writeln!(f, "Profit Factor: {:.2}", self.profit_factor)?;
        writeln!(f, "Max Drawdown: {:.2} pts", self.max_drawdown_pct)?;

        if !self.by_sector.is_empty() {
            writeln!(f)?;
            writeln!(f, "--- By Sector ---")?;
            for g in &self.by_sector {
                writeln!(
                    f,
                    "{:<20} {:>3} decisions  {:>5.1}% hit  avg {:>6.2}%",
                    g.key,
                    g.decisions,
                    g.hit_rate() * 100.0,
                    g.avg_pnl_pct()
                )?;
            }
        }
        if !self.by_week.is_empty() {
            writeln!(f)?;
            writeln!(f, "--- By Week ---")?;
            for g in &self.by_week {
                writeln!(
                    f,
                    "{:<10} {:>3} decisions  {:>5.1}% hit  total {:>7.2}%",
                    g.key,
                    g.decisions,
                    g.hit_rate() * 100.0,
                    g.total_pnl_pct
                )?;
            }
        }
        writeln!(f, "{:=^60}", "")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{evaluate_decision, PriceObservation};
    use crate::models::{Action, Factor, FactorScore, MarketRegime, TimeHorizon};
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn make_decision(ticker: &str, sector: &str, action: Action, day: i64, close: Decimal) -> Decision {
        let mut d = Decision::new(
            ticker.to_string(),
            Some(sector.to_string()),
            dec!(100),
            65.0,
            action,
            60,
            if action.is_sell() { dec!(90) } else { dec!(110) },
            if action.is_sell() { dec!(105) } else { dec!(95) },
            dec!(2),
            5,
            TimeHorizon::Swing,
            Factor::ALL.iter().map(|&f| FactorScore::new(f, 65.0)).collect(),
            vec![],
            1,
            MarketRegime::Sideways,
            vec![],
        );
        // 2026-01-05 is a Monday
        d.timestamp = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap() + Duration::days(day);
        evaluate_decision(&d, &PriceObservation::at(close))
    }

    #[test]
    fn test_performance_report() {
        let decisions = vec![
            make_decision("TCS.NS", "Technology", Action::Buy, 0, dec!(112)),    // +10 target
            make_decision("INFY.NS", "Technology", Action::Buy, 1, dec!(90)),    // -5 stop
            make_decision("ONGC.NS", "Energy", Action::Sell, 2, dec!(85)),       // +10 target
            make_decision("BPCL.NS", "Energy", Action::Buy, 8, dec!(102)),       // +2 open
            make_decision("ITC.NS", "Consumer", Action::Hold, 9, dec!(130)),     // ignored
        ];

        let report = MetricsCalculator::performance_report(&decisions);

        assert_eq!(report.total_decisions, 5);
        assert_eq!(report.evaluated, 4);
        assert_eq!(report.targets_hit, 2);
        assert_eq!(report.stops_hit, 1);
        assert_eq!(report.open, 1);
        assert_eq!(report.winners, 3);
        assert_eq!(report.losers, 1);
        assert_eq!(report.total_pnl_pct, dec!(17));
        assert_eq!(report.avg_pnl_pct, dec!(4.25));
        assert_eq!(report.best.as_ref().unwrap().1, dec!(10));
        assert_eq!(report.worst.as_ref().unwrap().0, "INFY.NS");
        assert!((report.profit_factor - 22.0 / 5.0).abs() < 1e-9);
        assert_eq!(report.max_drawdown_pct, dec!(5));

        assert_eq!(report.by_sector[0].key, "Energy");
        assert_eq!(report.by_sector[0].total_pnl_pct, dec!(12));
        assert_eq!(report.by_week.len(), 2);
        assert_eq!(report.by_week[0].key, "2026-W02");
        assert_eq!(report.by_week[0].decisions, 3);
    }

    #[test]
    fn test_empty_report() {
        let report = MetricsCalculator::performance_report(&[]);
        assert_eq!(report.evaluated, 0);
        assert_eq!(report.hit_rate, 0.0);
        assert!(report.best.is_none());
        assert!(report.to_string().contains("PERFORMANCE REPORT"));
    }
}
