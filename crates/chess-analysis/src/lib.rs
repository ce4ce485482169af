//! Concurrent chess game analysis backed by pooled UCI engines.
//!
//! Given already-parsed games, this crate evaluates every position with a
//! bounded pool of engines, classifies each move by how much it lost
//! against the engine's best line, tags it with a game phase and summarizes
//! the game with per-player accuracy.
//!
//! # Overview
//!
//! - [`AnalysisPipeline`] - Validates configuration and owns the engines
//! - [`EnginePool`] - Fixed set of engines with crash recovery
//! - [`PositionEvaluator`] - Cached, retrying position evaluation
//! - [`MoveClassifier`] - Centipawn loss and [`MoveQuality`] buckets
//! - [`PhaseSegmenter`] - Opening / middlegame / endgame tagging
//! - [`GameAnalyzer`] - One game to one [`GameReport`]
//! - [`BatchScheduler`] - Many games to one [`BatchReport`]
//!
//! # Example
//!
//! ```ignore
//! use chess_analysis::{AnalysisConfig, AnalysisPipeline, GameRecord, MoveSequence};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = AnalysisConfig::load("analysis.toml")?;
//! let pipeline = AnalysisPipeline::with_uci_engines(config).await?;
//! let game = MoveSequence::from_record(record)?;
//! let report = pipeline.analyze_game(&game, &CancellationToken::new()).await;
//! println!("White accuracy: {:.1}%", report.white_stats.accuracy);
//! pipeline.shutdown().await;
//! ```

pub mod analyzer;
pub mod batch;
pub mod cache;
pub mod config;
pub mod engine;
pub mod evaluation;
pub mod evaluator;
pub mod phase;
pub mod pipeline;
pub mod pool;
pub mod process;
pub mod quality;
pub mod report;
pub mod sequence;

pub use analyzer::GameAnalyzer;
pub use batch::{BatchProgress, BatchScheduler, ProgressObserver, ReportSink, SinkError};
pub use cache::{CacheKey, CacheStats, EvaluationCache};
pub use config::{
    AnalysisConfig, ClassificationThresholds, ConfigError, EngineConfig, LimitProfile,
    PhaseThresholds,
};
pub use engine::{AnalysisEngine, EngineError, EngineFactory};
pub use evaluation::{Evaluation, Outlook, Score};
pub use evaluator::PositionEvaluator;
pub use phase::{Phase, PhaseSegmenter};
pub use pipeline::{AnalysisPipeline, PipelineError};
pub use pool::{EnginePool, PooledEngine};
pub use process::{UciEngineFactory, UciProcess};
pub use quality::{MoveAssessment, MoveClassifier, MoveQuality, PlayerStats, QualityCounts};
pub use report::{BatchReport, BlunderEntry, GameReport, GameStatus, PlayerSummary};
pub use sequence::{
    GameRecord, MoveSequence, PlayedMove, PlyRecord, Position, PositionError, SequenceError,
};
