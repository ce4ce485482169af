//! Analysis Worker - Analyzes a batch of games with pooled UCI engines.
//!
//! Reads a JSON array of game records, runs every game through the analysis
//! pipeline and writes one report per game (under `games/`) plus a batch
//! summary to the output directory.

mod sink;

use anyhow::Context;
use chess_analysis::{
    AnalysisConfig, AnalysisPipeline, BatchProgress, GameRecord, MoveSequence, ProgressObserver,
};
use clap::Parser;
use sink::JsonDirectorySink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Analysis Worker - Classifies every move of a batch of games.
#[derive(Parser, Debug)]
#[command(name = "analysis-worker")]
#[command(about = "Analyzes a JSON file of games with UCI engines")]
struct Args {
    /// Path to a TOML analysis configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON file holding an array of game records
    #[arg(long)]
    games: PathBuf,

    /// Directory reports are written to
    #[arg(long, default_value = "reports")]
    output: PathBuf,

    /// Engine executable, overriding the configuration
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Number of engine processes, overriding the configuration
    #[arg(long)]
    parallel: Option<usize>,

    /// Search depth per position, overriding the configuration
    #[arg(long)]
    depth: Option<u32>,

    /// Search time per position in milliseconds, overriding the configuration
    #[arg(long)]
    movetime: Option<u64>,
}

impl Args {
    fn analysis_config(&self) -> anyhow::Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => AnalysisConfig::default(),
        };
        if let Some(engine) = &self.engine {
            config.engine.path = engine.clone();
        }
        if let Some(parallel) = self.parallel {
            config.max_parallel_engines = parallel;
        }
        if self.depth.is_some() || self.movetime.is_some() {
            config.depth_limit = self.depth;
            config.time_limit_per_move_ms = self.movetime;
        }
        Ok(config)
    }
}

/// Logs every finished game.
struct LogProgress;

impl ProgressObserver for LogProgress {
    fn game_finished(&self, progress: &BatchProgress<'_>) {
        info!(
            game = progress.game_id,
            status = %progress.status,
            "[{}/{}] game finished",
            progress.completed,
            progress.total
        );
    }
}

/// Parses the games file; records that fail validation are skipped.
async fn load_games(path: &Path) -> anyhow::Result<Vec<MoveSequence>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read games from {}", path.display()))?;
    let records: Vec<GameRecord> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse games in {}", path.display()))?;

    let total = records.len();
    let games: Vec<MoveSequence> = records
        .into_iter()
        .filter_map(|record| match MoveSequence::from_record(record) {
            Ok(sequence) => Some(sequence),
            Err(e) => {
                warn!(error = %e, "skipping invalid game record");
                None
            }
        })
        .collect();
    info!(loaded = games.len(), skipped = total - games.len(), "games loaded");
    Ok(games)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();

    info!("Starting analysis-worker");
    let config = args.analysis_config()?;
    info!(
        engine = %config.engine.path.display(),
        engines = config.max_parallel_engines,
        limit = %config.limit_profile(),
        "Configuration loaded"
    );

    let games = load_games(&args.games).await?;
    let sink = Arc::new(
        JsonDirectorySink::create(&args.output)
            .await
            .with_context(|| format!("Failed to create {}", args.output.display()))?,
    );

    let pipeline = AnalysisPipeline::with_uci_engines(config)
        .await
        .context("Failed to start analysis engines")?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown signal received, cancelling analysis");
                    cancel.cancel();
                }
                Err(e) => error!(error = %e, "Failed to listen for ctrl+c"),
            }
        });
    }

    let batch = pipeline
        .scheduler()
        .with_sink(sink.clone())
        .with_observer(Arc::new(LogProgress))
        .run(games, &cancel)
        .await;

    let summary = sink.write_batch(&batch).await;
    let stats = pipeline.cache_stats();
    pipeline.shutdown().await;
    let summary = summary.context("Failed to write batch summary")?;

    info!(
        path = %summary.display(),
        games = batch.len(),
        sink_errors = batch.sink_errors.len(),
        cache_hits = stats.hits,
        cache_misses = stats.misses,
        "Analysis finished"
    );
    Ok(())
}
