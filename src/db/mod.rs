//! Database persistence for decisions, weight versions and learning state.
//!
//! Stores everything needed to resume after restart:
//! - Every decision, with its evaluation once known
//! - Every published weight vector and the weight-change audit trail
//! - The learning state as a single JSON document

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqlitePoolOptions, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::models::{Decision, LearningState, WeightHistoryEntry, WeightVector};

/// Database connection pool.
pub struct Database {
    pool: SqlitePool,
}

/// Stored decision row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredDecision {
    pub id: String,
    pub ticker: String,
    pub action: String,
    pub outcome: Option<String>,
    pub body: String,
}

impl StoredDecision {
    pub fn decode(&self) -> Result<Decision> {
        serde_json::from_str(&self.body)
            .with_context(|| format!("Corrupt decision record {} ({})", self.id, self.ticker))
    }
}

/// Decision counts by lifecycle stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecisionCounts {
    pub total: i64,
    pub pending: i64,
    pub open: i64,
    pub closed: i64,
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    /// Create a new database connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all database migrations.
    async fn run_migrations(&self) -> Result<()> {
        // Decisions
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS decisions (
                id TEXT PRIMARY KEY,
                ticker TEXT NOT NULL,
                sector TEXT,
                action TEXT NOT NULL,
                confidence INTEGER NOT NULL,
                composite_score REAL NOT NULL,
                entry_price TEXT NOT NULL,
                target_price TEXT NOT NULL,
                stop_loss TEXT NOT NULL,
                weight_version INTEGER NOT NULL,
                regime TEXT NOT NULL,
                outcome TEXT,
                pnl_pct TEXT,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                evaluated_at TEXT,
                learned_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_decisions_ticker ON decisions(ticker)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_decisions_outcome ON decisions(outcome, created_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_decisions_learned ON decisions(learned_at, evaluated_at)")
            .execute(&self.pool)
            .await?;

        // Published weight vectors
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS weight_versions (
                version INTEGER PRIMARY KEY,
                weights TEXT NOT NULL,
                published_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Audit trail, one entry per published version
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS weight_history (
                version INTEGER PRIMARY KEY,
                timestamp TEXT NOT NULL,
                hit_rate REAL NOT NULL,
                sample_size INTEGER NOT NULL,
                reason TEXT NOT NULL,
                body TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Learning state singleton
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS learning_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ==================== Decisions ====================

    /// Store a freshly computed decision. Storing the same id twice is a no-op.
    pub async fn save_decision(&self, decision: &Decision) -> Result<bool> {
        let body = serde_json::to_string(decision).context("Failed to encode decision")?;
        let result = sqlx::query(
            r#"
            INSERT INTO decisions (
                id, ticker, sector, action, confidence, composite_score,
                entry_price, target_price, stop_loss, weight_version, regime,
                outcome, pnl_pct, body, created_at, evaluated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(decision.id.to_string())
        .bind(&decision.ticker)
        .bind(&decision.sector)
        .bind(decision.action.as_str())
        .bind(decision.confidence as i64)
        .bind(decision.composite_score)
        .bind(decision.entry_price.to_string())
        .bind(decision.target_price.to_string())
        .bind(decision.stop_loss.to_string())
        .bind(decision.weight_version as i64)
        .bind(decision.regime.as_str())
        .bind(decision.outcome().map(|o| o.as_str()))
        .bind(decision.evaluation().map(|e| e.pnl_pct.to_string()))
        .bind(body)
        .bind(timestamp(decision.timestamp))
        .bind(decision.evaluation().map(|e| timestamp(e.evaluated_at)))
        .execute(&self.pool)
        .await
        .context("Failed to save decision")?;

        Ok(result.rows_affected() > 0)
    }

    /// Write a decision's evaluation.
    ///
    /// Rows already closed as TARGET_HIT or STOPLOSS_HIT are left alone;
    /// returns whether the row was updated.
    pub async fn update_evaluation(&self, decision: &Decision) -> Result<bool> {
        let evaluation = match decision.evaluation() {
            Some(e) => e,
            None => return Ok(false),
        };
        let body = serde_json::to_string(decision).context("Failed to encode decision")?;

        let result = sqlx::query(
            r#"
            UPDATE decisions SET
                outcome = ?,
                pnl_pct = ?,
                body = ?,
                evaluated_at = ?
            WHERE id = ? AND (outcome IS NULL OR outcome IN ('OPEN', 'HOLD'))
            "#,
        )
        .bind(evaluation.outcome.as_str())
        .bind(evaluation.pnl_pct.to_string())
        .bind(body)
        .bind(timestamp(evaluation.evaluated_at))
        .bind(decision.id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to update evaluation")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_decision(&self, id: Uuid) -> Result<Option<Decision>> {
        let row = sqlx::query_as::<_, StoredDecision>(
            "SELECT id, ticker, action, outcome, body FROM decisions WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch decision")?;

        row.map(|r| r.decode()).transpose()
    }

    /// Most recent decisions, newest first, optionally for one ticker.
    pub async fn get_recent_decisions(&self, ticker: Option<&str>, limit: i64) -> Result<Vec<Decision>> {
        let rows = sqlx::query_as::<_, StoredDecision>(
            r#"
            SELECT id, ticker, action, outcome, body FROM decisions
            WHERE (? IS NULL OR ticker = ?)
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(ticker)
        .bind(ticker)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch decisions")?;

        rows.iter().map(StoredDecision::decode).collect()
    }

    /// Decisions still being tracked, created at or after `since`.
    ///
    /// Covers pending and open calls plus HOLDs whose drift is not scored
    /// yet. Never-evaluated rows come first, then the least recently
    /// evaluated, so a backlog larger than `limit` rotates through.
    pub async fn get_open_decisions(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<Decision>> {
        let rows = sqlx::query_as::<_, StoredDecision>(
            r#"
            SELECT id, ticker, action, outcome, body FROM decisions
            WHERE (outcome IS NULL OR outcome IN ('OPEN', 'HOLD'))
              AND NOT (action = 'HOLD' AND learned_at IS NOT NULL)
              AND created_at >= ?
            ORDER BY evaluated_at IS NOT NULL, evaluated_at ASC, created_at ASC
            LIMIT ?
            "#,
        )
        .bind(timestamp(since))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch open decisions")?;

        rows.iter().map(StoredDecision::decode).collect()
    }

    /// Every decision that has been evaluated at least once, oldest first.
    pub async fn get_evaluated_decisions(&self) -> Result<Vec<Decision>> {
        let rows = sqlx::query_as::<_, StoredDecision>(
            r#"
            SELECT id, ticker, action, outcome, body FROM decisions
            WHERE outcome IS NOT NULL
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch evaluated decisions")?;

        rows.iter().map(StoredDecision::decode).collect()
    }

    /// Decisions ready to learn from that no cycle has consumed yet.
    ///
    /// Closed calls, plus HOLDs last evaluated at least `hold_review_days`
    /// after they were made. Ordered by evaluation time.
    pub async fn get_unlearned_decisions(&self, hold_review_days: i64, limit: i64) -> Result<Vec<Decision>> {
        let rows = sqlx::query_as::<_, StoredDecision>(
            r#"
            SELECT id, ticker, action, outcome, body FROM decisions
            WHERE learned_at IS NULL
              AND (
                outcome IN ('TARGET_HIT', 'STOPLOSS_HIT')
                OR (outcome = 'HOLD' AND julianday(evaluated_at) - julianday(created_at) >= ?)
              )
            ORDER BY evaluated_at ASC, created_at ASC
            LIMIT ?
            "#,
        )
        .bind(hold_review_days as f64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch unlearned decisions")?;

        rows.iter().map(StoredDecision::decode).collect()
    }

    pub async fn get_decision_counts(&self) -> Result<DecisionCounts> {
        let row: (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN outcome IS NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN outcome IN ('OPEN', 'HOLD') THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN outcome IN ('TARGET_HIT', 'STOPLOSS_HIT') THEN 1 ELSE 0 END), 0)
            FROM decisions
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count decisions")?;

        Ok(DecisionCounts {
            total: row.0,
            pending: row.1,
            open: row.2,
            closed: row.3,
        })
    }

    // ==================== Weights ====================

    /// Weight-change audit trail, newest first.
    pub async fn get_weight_history(&self, limit: i64) -> Result<Vec<WeightHistoryEntry>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT body FROM weight_history ORDER BY version DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch weight history")?;

        rows.iter()
            .map(|body| serde_json::from_str(body).context("Corrupt weight history entry"))
            .collect()
    }

    pub async fn get_weight_version_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM weight_versions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ==================== Learning State ====================

    /// Persist the learning state together with any weight versions and
    /// history entries it carries that are not stored yet.
    pub async fn save_learning_state(&self, state: &LearningState) -> Result<()> {
        self.commit_learning(state, &[]).await
    }

    /// Persist the learning state and mark the decisions it consumed, in one
    /// transaction.
    pub async fn commit_learning(&self, state: &LearningState, learned: &[Uuid]) -> Result<()> {
        let body = serde_json::to_string(state).context("Failed to encode learning state")?;
        let mut tx = self.pool.begin().await.context("Failed to open transaction")?;

        for weights in state.weight_versions.values() {
            insert_weight_version(&mut tx, weights).await?;
        }
        for entry in &state.weight_history {
            insert_weight_history(&mut tx, entry).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO learning_state (id, body, updated_at)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(body)
        .bind(timestamp(state.updated_at))
        .execute(&mut *tx)
        .await
        .context("Failed to save learning state")?;

        let learned_at = timestamp(Utc::now());
        for id in learned {
            sqlx::query("UPDATE decisions SET learned_at = ? WHERE id = ? AND learned_at IS NULL")
                .bind(&learned_at)
                .bind(id.to_string())
                .execute(&mut *tx)
                .await
                .context("Failed to mark decision as learned")?;
        }

        tx.commit().await.context("Failed to commit learning state")?;
        Ok(())
    }

    pub async fn load_learning_state(&self) -> Result<Option<LearningState>> {
        let body: Option<String> = sqlx::query_scalar("SELECT body FROM learning_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load learning state")?;

        body.map(|b| serde_json::from_str(&b).context("Corrupt learning state"))
            .transpose()
    }

    /// Load the learning state, starting fresh (and persisting it) on first run.
    pub async fn load_or_init_learning_state(&self) -> Result<LearningState> {
        if let Some(state) = self.load_learning_state().await? {
            return Ok(state);
        }
        let state = LearningState::new();
        self.save_learning_state(&state).await?;
        Ok(state)
    }
}

/// Record a published weight vector. Versions are immutable: re-saving one is a no-op.
async fn insert_weight_version(conn: &mut SqliteConnection, weights: &WeightVector) -> Result<()> {
    let body = serde_json::to_string(weights.weights()).context("Failed to encode weights")?;
    sqlx::query(
        r#"
        INSERT INTO weight_versions (version, weights, published_at)
        VALUES (?, ?, ?)
        ON CONFLICT(version) DO NOTHING
        "#,
    )
    .bind(weights.version() as i64)
    .bind(body)
    .bind(timestamp(weights.published_at()))
    .execute(conn)
    .await
    .context("Failed to save weight version")?;

    Ok(())
}

/// Append a weight-change record. Existing entries are never touched.
async fn insert_weight_history(conn: &mut SqliteConnection, entry: &WeightHistoryEntry) -> Result<()> {
    let body = serde_json::to_string(entry).context("Failed to encode weight history")?;
    sqlx::query(
        r#"
        INSERT INTO weight_history (version, timestamp, hit_rate, sample_size, reason, body)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(version) DO NOTHING
        "#,
    )
    .bind(entry.version as i64)
    .bind(timestamp(entry.timestamp))
    .bind(entry.hit_rate)
    .bind(entry.sample_size as i64)
    .bind(&entry.reason)
    .bind(body)
    .execute(conn)
    .await
    .context("Failed to append weight history")?;

    Ok(())
}
