//! TradeSage Decision Engine
//!
//! Blends per-factor scores into BUY/SELL/HOLD calls with targets and stops,
//! tracks how those calls play out, and adapts the factor weights from the
//! realized outcomes.

mod config;
mod db;
mod engine;
mod error;
mod feed;
mod learning;
mod metrics;
mod models;
mod runner;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::Database;
use crate::engine::{evaluate_decision, AnalysisInput, DecisionEngine};
use crate::feed::{JsonFeed, PriceFeed};
use crate::learning::LearningEngine;
use crate::metrics::MetricsCalculator;
use crate::models::{Decision, Factor};
use crate::runner::{Runner, RunnerConfig};

/// Stock decision engine CLI.
#[derive(Parser)]
#[command(name = "tradesage")]
#[command(about = "Factor-weighted trading calls that learn from their outcomes", long_about = None)]
struct Cli {
    /// Database file path
    #[arg(short, long, env = "TRADESAGE_DATABASE", default_value = "sqlite:./tradesage.db?mode=rwc")]
    database: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// JSON configuration file (engine and learning settings)
    #[arg(short, long, env = "TRADESAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Price feed snapshot (JSON)
    #[arg(short, long, env = "TRADESAGE_FEED")]
    feed: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a decision for one ticker
    Analyze {
        /// Analysis input (JSON object)
        input: PathBuf,

        /// Store the decision for later evaluation
        #[arg(long)]
        save: bool,
    },

    /// Compute and store decisions for a watchlist
    Scan {
        /// Analysis inputs (JSON array)
        inputs: PathBuf,
    },

    /// Evaluate open decisions against the price feed
    Evaluate {
        /// Evaluate a single decision regardless of age
        #[arg(long)]
        id: Option<Uuid>,
    },

    /// Run a learning cycle over evaluated decisions
    Learn,

    /// Detect the market regime from the feed's benchmark closes
    Regime,

    /// Show the current factor weights
    Weights,

    /// Show the weight adaptation history
    History {
        /// Maximum number of entries
        #[arg(short = 'n', long, default_value = "20")]
        limit: i64,
    },

    /// List recent decisions
    Decisions {
        /// Only this ticker
        #[arg(short, long)]
        ticker: Option<String>,

        /// Maximum number of decisions
        #[arg(short = 'n', long, default_value = "20")]
        limit: i64,
    },

    /// Show what the learning engine has learned so far
    Summary,

    /// Performance report over evaluated decisions
    Report,

    /// Show the effective configuration
    Config,

    /// Start the periodic evaluate-and-learn loop
    Run {
        /// Tick interval in seconds
        #[arg(short, long, default_value = "3600")]
        interval: u64,

        /// Watchlist to scan every tick (JSON array of analysis inputs)
        #[arg(long)]
        scan: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = AppConfig::load(cli.config.as_deref()).await?;

    // Initialize database and engines
    let db = Database::new(&cli.database).await?;
    let state = db.load_or_init_learning_state().await?;
    let learning = Arc::new(LearningEngine::new(config.learning.clone(), state));
    let engine = Arc::new(DecisionEngine::new(config.engine.clone()));

    let feed_path = || {
        cli.feed
            .clone()
            .context("No price feed configured (use --feed or TRADESAGE_FEED)")
    };

    match cli.command {
        Commands::Analyze { input, save } => {
            let raw = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let input: AnalysisInput = serde_json::from_str(&raw).context("Failed to parse analysis input")?;

            let weights = learning.current_weights().await;
            let regime = learning.regime().await;
            let decision = engine.compute_decision(&input, &weights, regime)?;

            print_decision(&decision);
            if save {
                db.save_decision(&decision).await?;
                println!("\nSaved as {}", decision.id);
            }
        }

        Commands::Scan { inputs } => {
            let inputs = runner::load_inputs(&inputs).await?;
            info!(tickers = inputs.len(), "Scanning watchlist");

            let mut decisions = runner::scan_and_store(&db, &engine, &learning, inputs).await?;
            decisions.sort_by(|a, b| {
                b.composite_score
                    .partial_cmp(&a.composite_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            print_decision_table(&decisions);
        }

        Commands::Evaluate { id } => {
            let feed = JsonFeed::load(feed_path()?).await?;

            if let Some(id) = id {
                let decision = db
                    .get_decision(id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("Decision {} not found", id))?;
                let quote = feed
                    .quote(&decision.ticker)
                    .ok_or_else(|| anyhow::anyhow!("No quote for {}", decision.ticker))?;

                let evaluated = evaluate_decision(&decision, &quote);
                let updated = db.update_evaluation(&evaluated).await?;
                print_decision(&evaluated);
                if !updated {
                    println!("\nAlready closed, stored evaluation left unchanged.");
                }
                return Ok(());
            }

            let window = config.learning.window_days;
            let pass = runner::evaluate_open(&db, &feed, window, config.learning.max_evaluations_per_cycle).await?;

            println!("\n=== Evaluation ===");
            if let Some(as_of) = feed.as_of() {
                println!("Prices as of:   {}", as_of.format("%Y-%m-%d %H:%M UTC"));
            }
            println!("Checked:        {}", pass.checked);
            println!("Updated:        {}", pass.updated);
            println!("Closed:         {}", pass.closed);
            println!("Missing quote:  {}", pass.missing_quote);
        }

        Commands::Learn => {
            let outcome = runner::learn_from_store(&db, &learning).await?;

            println!("\n=== Learning Cycle ===");
            println!("Ingested:       {}", outcome.ingested);
            println!("HOLDs scored:   {}", outcome.holds_reviewed);
            println!("Adapted:        {}", if outcome.adapted { "Yes" } else { "No" });
            println!("Reason:         {}", outcome.reason);
            if let Some(weights) = &outcome.new_weights {
                println!("\nNew weights (v{}):", weights.version());
                print_weights(weights.weights().iter().map(|(f, w)| (f, *w)));
            }
            if !outcome.lessons.is_empty() {
                println!("\nLessons:");
                for lesson in &outcome.lessons {
                    println!("  - {}", lesson);
                }
            }
        }

        Commands::Regime => {
            let before = learning.regime().await;
            match &cli.feed {
                Some(path) => {
                    let feed = JsonFeed::load(path).await?;
                    match runner::refresh_regime(&db, &learning, &feed).await? {
                        Some(obs) => {
                            println!("\n=== Market Regime ===");
                            println!("Benchmark:      {}", feed.benchmark_symbol());
                            println!("Regime:         {} (was {})", obs.regime, before);
                            println!("Window return:  {:.2}%", obs.window_return_pct);
                            println!("Daily vol:      {:.2}%", obs.volatility_pct);
                        }
                        None => println!("Feed has no benchmark closes. Regime: {}", before),
                    }
                }
                None => println!("Current regime: {}", before),
            }
        }

        Commands::Weights => {
            let weights = learning.current_weights().await;
            println!("\n=== Factor Weights (v{}) ===", weights.version());
            println!("Published: {}\n", weights.published_at().format("%Y-%m-%d %H:%M UTC"));
            print_weights(weights.weights().iter().map(|(f, w)| (f, *w)));
        }

        Commands::History { limit } => {
            let history = db.get_weight_history(limit).await?;
            let versions = db.get_weight_version_count().await?;

            println!("\n=== Weight History ({} versions) ===\n", versions);
            println!(
                "{:>4} {:<17} {:>7} {:>7}  {}",
                "VER", "PUBLISHED", "HIT%", "SAMPLE", "REASON"
            );
            println!("{}", "-".repeat(80));
            for entry in history {
                println!(
                    "{:>4} {:<17} {:>6.1}% {:>7}  {}",
                    entry.version,
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.hit_rate * 100.0,
                    entry.sample_size,
                    truncate(&entry.reason, 40)
                );
            }
        }

        Commands::Decisions { ticker, limit } => {
            let counts = db.get_decision_counts().await?;
            println!(
                "\nDecisions: {} total, {} pending, {} open, {} closed",
                counts.total, counts.pending, counts.open, counts.closed
            );

            let decisions = db.get_recent_decisions(ticker.as_deref(), limit).await?;
            if decisions.is_empty() {
                println!("No decisions yet. Use 'tradesage scan <inputs>' to create some.");
                return Ok(());
            }
            print_decision_table(&decisions);
        }

        Commands::Summary => {
            println!("{}", learning.summary().await);
        }

        Commands::Report => {
            let evaluated = db.get_evaluated_decisions().await?;
            if evaluated.is_empty() {
                println!("No evaluated decisions yet. Run 'tradesage evaluate' first.");
                return Ok(());
            }
            println!("{}", MetricsCalculator::performance_report(&evaluated));
        }

        Commands::Run { interval, scan } => {
            let runner_config = RunnerConfig {
                interval_secs: interval,
                feed_path: feed_path()?,
                scan_path: scan,
            };

            println!("\n=== TradeSage Runner ===");
            println!("Interval:       {}s", interval);
            println!("Feed:           {}", runner_config.feed_path.display());
            if let Some(path) = &runner_config.scan_path {
                println!("Watchlist:      {}", path.display());
            }
            println!("\nPress Ctrl+C to stop.\n");

            let runner = Runner::new(runner_config, db, engine, Arc::clone(&learning));
            if let Err(e) = runner.run().await {
                tracing::error!(error = %e, "Runner error");
            }

            println!("\n{}", learning.summary().await);
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn print_decision(d: &Decision) {
    println!("\n=== {} ({}) ===", d.ticker, d.sector.as_deref().unwrap_or("Unknown"));
    println!("Action:         {}", d.action);
    println!("Composite:      {:.1}", d.composite_score);
    println!("Confidence:     {}%", d.confidence);
    println!("Entry:          {}", d.entry_price);
    println!("Target:         {}", d.target_price);
    println!("Stop loss:      {}", d.stop_loss);
    println!("Risk/reward:    {}", d.risk_reward_ratio);
    println!("Risk rating:    {}/10", d.risk_rating);
    println!("Horizon:        {}", d.time_horizon);
    println!("Regime:         {}", d.regime);
    println!("Weights:        v{}", d.weight_version);

    println!("\n--- Factors ---");
    for score in &d.scores {
        let missing = if d.missing_factors.contains(&score.factor) { " (missing)" } else { "" };
        println!("  {:<16} {:>5.1}{}", score.factor.label(), score.score, missing);
    }

    println!("\n--- Reasoning ---");
    for line in &d.reasoning {
        println!("  {}", line);
    }

    if let Some(eval) = d.evaluation() {
        println!("\n--- Evaluation ---");
        println!("Outcome:        {}", eval.outcome);
        println!("Current price:  {}", eval.current_price);
        println!("Range:          {} - {}", eval.low_since, eval.high_since);
        println!("P&L:            {}%", eval.pnl_pct);
        if eval.outcome.is_terminal() {
            println!("Realized P&L:   {}%", eval.realized_pnl_pct);
        }
    }
}

fn print_decision_table(decisions: &[Decision]) {
    println!(
        "\n{:<14} {:<12} {:>6} {:>5} {:>10} {:>10} {:>10} {:<13}",
        "TICKER", "ACTION", "SCORE", "CONF", "ENTRY", "TARGET", "STOP", "OUTCOME"
    );
    println!("{}", "-".repeat(86));

    for d in decisions {
        let outcome = d.outcome().map(|o| o.as_str()).unwrap_or("PENDING");
        println!(
            "{:<14} {:<12} {:>6.1} {:>4}% {:>10} {:>10} {:>10} {:<13}",
            truncate(&d.ticker, 14),
            d.action.as_str(),
            d.composite_score,
            d.confidence,
            d.entry_price,
            d.target_price,
            d.stop_loss,
            outcome
        );
    }
}

fn print_weights(weights: impl Iterator<Item = (Factor, f64)>) {
    for (factor, weight) in weights {
        let bar = "#".repeat((weight * 50.0).round() as usize);
        println!("  {:<16} {:>6.3}  {}", factor.label(), weight, bar);
    }
}

/// Truncate a string with ellipsis if too long.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
