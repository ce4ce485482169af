//! Entry point wiring configuration, engines, cache and analyzers together.

use crate::analyzer::GameAnalyzer;
use crate::batch::BatchScheduler;
use crate::cache::CacheStats;
use crate::config::{AnalysisConfig, ConfigError, LimitProfile};
use crate::engine::{EngineError, EngineFactory};
use crate::evaluation::Evaluation;
use crate::evaluator::PositionEvaluator;
use crate::pool::EnginePool;
use crate::process::UciEngineFactory;
use crate::report::{BatchReport, GameReport};
use crate::sequence::{MoveSequence, Position};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Errors that prevent a pipeline from starting.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// A running analysis pipeline.
///
/// Owns the engine pool and evaluation cache; both are shared by every game
/// analyzed through it, so positions seen in one game are free in the next.
pub struct AnalysisPipeline {
    config: AnalysisConfig,
    analyzer: Arc<GameAnalyzer>,
    pool: EnginePool,
}

impl AnalysisPipeline {
    /// Validates `config` and starts `max_parallel_engines` engines from
    /// `factory`.
    ///
    /// # Errors
    ///
    /// Configuration problems are reported before any engine is started.
    pub async fn launch(
        config: AnalysisConfig,
        factory: Arc<dyn EngineFactory>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let pool = EnginePool::new(factory, config.max_parallel_engines, &config.engine).await?;
        let evaluator = Arc::new(PositionEvaluator::new(pool.clone(), config.max_retries));
        let analyzer = Arc::new(GameAnalyzer::new(evaluator, &config));
        info!(
            engines = config.max_parallel_engines,
            limit = %config.limit_profile(),
            "analysis pipeline ready"
        );
        Ok(Self {
            config,
            analyzer,
            pool,
        })
    }

    /// Launches a pipeline backed by external UCI engine processes.
    pub async fn with_uci_engines(config: AnalysisConfig) -> Result<Self, PipelineError> {
        let factory = Arc::new(UciEngineFactory::new(config.engine.clone()));
        Self::launch(config, factory).await
    }

    pub async fn analyze_game(
        &self,
        sequence: &MoveSequence,
        cancel: &CancellationToken,
    ) -> GameReport {
        self.analyzer.analyze(sequence, cancel).await
    }

    /// Evaluation of a single position under the configured limits, from
    /// the side to move's perspective. Shares the cache with game analysis.
    pub async fn evaluate_position(&self, position: &Position) -> Result<Evaluation, EngineError> {
        self.evaluate_position_with(position, &self.config.limit_profile())
            .await
    }

    /// Like [`Self::evaluate_position`] with an explicit search limit.
    pub async fn evaluate_position_with(
        &self,
        position: &Position,
        limit: &LimitProfile,
    ) -> Result<Evaluation, EngineError> {
        self.analyzer.evaluator().evaluate(position, limit).await
    }

    /// A scheduler sharing this pipeline's engines, ready to be given a sink
    /// or a progress observer.
    pub fn scheduler(&self) -> BatchScheduler {
        BatchScheduler::new(Arc::clone(&self.analyzer), self.config.games_in_flight())
    }

    pub async fn analyze_batch(
        &self,
        games: Vec<MoveSequence>,
        cancel: &CancellationToken,
    ) -> BatchReport {
        self.scheduler().run(games, cancel).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.analyzer.evaluator().cache_stats()
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn pool(&self) -> &EnginePool {
        &self.pool
    }

    /// Stops every engine. Analyses still running fail with
    /// [`EngineError::PoolClosed`] or [`EngineError::Cancelled`].
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
        let stats = self.cache_stats();
        info!(
            hits = stats.hits,
            misses = stats.misses,
            coalesced = stats.coalesced,
            "analysis pipeline stopped"
        );
    }
}
