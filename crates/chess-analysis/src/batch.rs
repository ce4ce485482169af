//! Concurrent analysis of many games.
//!
//! Every game runs as its own task. A semaphore bounds how many games are
//! in progress at once, while the engine pool bounds how many engine calls
//! run at once, so parallelism follows the pool size rather than the
//! number of games.

use crate::analyzer::GameAnalyzer;
use crate::report::{BatchReport, GameReport, GameStatus};
use crate::sequence::MoveSequence;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Errors raised while persisting a report.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode report: {0}")]
    Encode(String),

    #[error("Report rejected: {0}")]
    Rejected(String),
}

/// Destination for finished game reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn store(&self, game_id: &str, report: &GameReport) -> Result<(), SinkError>;
}

/// Snapshot passed to a [`ProgressObserver`] after each game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchProgress<'a> {
    pub completed: usize,
    pub total: usize,
    pub game_id: &'a str,
    pub status: GameStatus,
}

/// Receives a callback every time a game of the batch finishes.
pub trait ProgressObserver: Send + Sync {
    fn game_finished(&self, progress: &BatchProgress<'_>);
}

struct Finished {
    report: GameReport,
    sink_error: Option<String>,
}

/// Runs a [`GameAnalyzer`] over a batch of games.
pub struct BatchScheduler {
    analyzer: Arc<GameAnalyzer>,
    games_in_flight: usize,
    sink: Option<Arc<dyn ReportSink>>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl BatchScheduler {
    pub fn new(analyzer: Arc<GameAnalyzer>, games_in_flight: usize) -> Self {
        Self {
            analyzer,
            games_in_flight: games_in_flight.max(1),
            sink: None,
            observer: None,
        }
    }

    /// Hands every finished report to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn games_in_flight(&self) -> usize {
        self.games_in_flight
    }

    /// Analyzes `games` and collects their reports.
    ///
    /// The batch always runs to the end: failed games, panicking analysis
    /// tasks and sink failures are recorded in the returned report instead
    /// of aborting the other games. Once `cancel` fires, games still
    /// running stop at their next engine call and games not yet started
    /// are reported as failed.
    pub async fn run(&self, games: Vec<MoveSequence>, cancel: &CancellationToken) -> BatchReport {
        let total = games.len();
        info!(
            games = total,
            in_flight = self.games_in_flight,
            "starting batch"
        );

        let slots = Arc::new(Semaphore::new(self.games_in_flight));
        let mut tasks = JoinSet::new();
        for sequence in games {
            let analyzer = Arc::clone(&self.analyzer);
            let slots = Arc::clone(&slots);
            let sink = self.sink.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let report = {
                    let _slot = slots.acquire_owned().await.ok();
                    analyze_guarded(&analyzer, &sequence, &cancel).await
                };
                let sink_error = match sink {
                    Some(sink) => store(sink.as_ref(), &report).await,
                    None => None,
                };
                Finished { report, sink_error }
            });
        }

        let mut batch = BatchReport::default();
        let mut completed = 0;
        while let Some(joined) = tasks.join_next().await {
            let finished = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    // Only reachable if the runtime is shutting down.
                    error!(error = %e, "analysis task lost");
                    continue;
                }
            };
            completed += 1;
            let game_id = finished.report.game_id.clone();
            let status = finished.report.status;
            if let Some(reason) = finished.sink_error {
                batch.sink_errors.insert(game_id.clone(), reason);
            }
            if !batch.insert(finished.report) {
                error!(game = %game_id, "duplicate game id, keeping the latest report");
            }
            if let Some(observer) = &self.observer {
                observer.game_finished(&BatchProgress {
                    completed,
                    total,
                    game_id: &game_id,
                    status,
                });
            }
        }

        info!(
            games = batch.len(),
            complete = batch.count_status(GameStatus::Complete),
            incomplete = batch.count_status(GameStatus::Incomplete),
            failed = batch.count_status(GameStatus::Failed),
            sink_errors = batch.sink_errors.len(),
            "batch finished"
        );
        batch
    }
}

async fn analyze_guarded(
    analyzer: &GameAnalyzer,
    sequence: &MoveSequence,
    cancel: &CancellationToken,
) -> GameReport {
    match AssertUnwindSafe(analyzer.analyze(sequence, cancel))
        .catch_unwind()
        .await
    {
        Ok(report) => report,
        Err(payload) => {
            let reason = format!("analysis task panicked: {}", panic_message(&*payload));
            error!(game = sequence.id(), %reason, "game analysis failed");
            GameReport::failed(
                sequence.id(),
                sequence.white(),
                sequence.black(),
                sequence.len(),
                reason,
            )
        }
    }
}

async fn store(sink: &dyn ReportSink, report: &GameReport) -> Option<String> {
    match sink.store(&report.game_id, report).await {
        Ok(()) => None,
        Err(e) => {
            error!(game = %report.game_id, error = %e, "failed to store report");
            Some(e.to_string())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
