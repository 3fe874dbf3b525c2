//! Decision performance metrics.

mod calculator;

pub use calculator::{GroupStats, MetricsCalculator, PerformanceReport};
