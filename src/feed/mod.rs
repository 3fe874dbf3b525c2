//! Price feed: latest quotes per ticker and benchmark closes.
//!
//! The only implementation reads a JSON snapshot produced by an external
//! data job:
//!
//! ```json
//! {
//!   "as_of": "2026-10-16T10:00:00Z",
//!   "benchmark": { "symbol": "^NSEI", "closes": [24810.5, 24902.1] },
//!   "quotes": { "TCS.NS": { "close": 3412.5, "high": 3450.0, "low": 3380.0 } }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::PriceObservation;

/// Source of prices for evaluation and regime detection.
pub trait PriceFeed: Send + Sync {
    /// Latest observation for a ticker, `None` when the feed has no quote.
    fn quote(&self, ticker: &str) -> Option<PriceObservation>;

    /// Benchmark index closes, oldest first.
    fn benchmark_closes(&self) -> &[Decimal];
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BenchmarkSeries {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub closes: Vec<Decimal>,
}

/// Parsed snapshot file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedSnapshot {
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
    #[serde(default)]
    pub benchmark: BenchmarkSeries,
    #[serde(default)]
    pub quotes: HashMap<String, PriceObservation>,
}

/// Feed backed by a JSON snapshot on disk.
pub struct JsonFeed {
    snapshot: FeedSnapshot,
}

impl JsonFeed {
    /// Read and parse the snapshot at `path`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read price feed {}", path.display()))?;
        let snapshot: FeedSnapshot = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse price feed {}", path.display()))?;

        debug!(
            path = %path.display(),
            quotes = snapshot.quotes.len(),
            closes = snapshot.benchmark.closes.len(),
            "Loaded price feed"
        );

        Ok(Self { snapshot })
    }

    pub fn as_of(&self) -> Option<DateTime<Utc>> {
        self.snapshot.as_of
    }

    pub fn benchmark_symbol(&self) -> &str {
        &self.snapshot.benchmark.symbol
    }
}

impl PriceFeed for JsonFeed {
    fn quote(&self, ticker: &str) -> Option<PriceObservation> {
        self.snapshot.quotes.get(ticker).copied()
    }

    fn benchmark_closes(&self) -> &[Decimal] {
        &self.snapshot.benchmark.closes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SNAPSHOT: &str = r#"{
        "as_of": "2026-10-16T10:00:00Z",
        "benchmark": { "symbol": "^NSEI", "closes": ["24810.5", "24902.1", 24950] },
        "quotes": {
            "TCS.NS": { "close": "3412.5", "high": "3450", "low": "3380" },
            "ITC.NS": { "close": "455.2" }
        }
    }"#;

    #[tokio::test]
    async fn test_load_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");
        std::fs::write(&path, SNAPSHOT).unwrap();

        let feed = JsonFeed::load(&path).await.unwrap();
        assert_eq!(feed.benchmark_symbol(), "^NSEI");
        assert_eq!(feed.benchmark_closes().len(), 3);
        assert!(feed.as_of().is_some());

        let tcs = feed.quote("TCS.NS").unwrap();
        assert_eq!(tcs.close, dec!(3412.5));
        assert_eq!(tcs.high, Some(dec!(3450)));

        let itc = feed.quote("ITC.NS").unwrap();
        assert!(itc.low.is_none());
        assert!(feed.quote("WIPRO.NS").is_none());

        std::fs::write(&path, r#"{"quotes": {}}"#).unwrap();
        let reloaded = JsonFeed::load(&path).await.unwrap();
        assert!(reloaded.quote("TCS.NS").is_none());
        assert!(reloaded.benchmark_closes().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(JsonFeed::load(dir.path().join("absent.json")).await.is_err());
    }
}
