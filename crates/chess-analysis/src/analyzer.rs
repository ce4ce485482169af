//! Game analysis with move quality classification.
//!
//! This module provides the [`GameAnalyzer`], which walks a game in order,
//! evaluates every position and turns consecutive evaluations into move
//! assessments.

use crate::config::{AnalysisConfig, LimitProfile};
use crate::engine::EngineError;
use crate::evaluation::Evaluation;
use crate::evaluator::PositionEvaluator;
use crate::phase::PhaseSegmenter;
use crate::quality::{MoveAssessment, MoveClassifier};
use crate::report::GameReport;
use crate::sequence::{MoveSequence, Position};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Analyzes one game at a time; share it behind an `Arc` to analyze many.
pub struct GameAnalyzer {
    evaluator: Arc<PositionEvaluator>,
    classifier: MoveClassifier,
    segmenter: PhaseSegmenter,
    limit: LimitProfile,
}

impl GameAnalyzer {
    pub fn new(evaluator: Arc<PositionEvaluator>, config: &AnalysisConfig) -> Self {
        Self {
            evaluator,
            classifier: MoveClassifier::new(config.classification),
            segmenter: PhaseSegmenter::new(config.phase),
            limit: config.limit_profile(),
        }
    }

    pub fn evaluator(&self) -> &PositionEvaluator {
        &self.evaluator
    }

    /// Analyzes a complete game.
    ///
    /// Positions are evaluated in game order. If an evaluation fails for
    /// good, or `cancel` fires, analysis stops and the report keeps the
    /// moves assessed so far and is marked incomplete. The report never
    /// contains an assessment that was not backed by two real evaluations.
    pub async fn analyze(&self, sequence: &MoveSequence, cancel: &CancellationToken) -> GameReport {
        info!(game = sequence.id(), moves = sequence.len(), "analyzing game");
        let mut assessments = Vec::with_capacity(sequence.len());

        let mut before = match self.evaluate(sequence.initial_position(), cancel).await {
            Ok(evaluation) => evaluation,
            Err(e) => return self.stop(sequence, assessments, e),
        };

        for (played, position_before, position_after) in sequence.plies() {
            let after = match self.evaluate(position_after, cancel).await {
                Ok(evaluation) => evaluation,
                Err(e) => return self.stop(sequence, assessments, e),
            };
            let phase = self.segmenter.phase_of(position_before);
            let assessment = self.classifier.assess(played, &before, &after, phase);
            debug!(
                game = sequence.id(),
                ply = assessment.ply,
                uci = %assessment.uci,
                loss = assessment.centipawn_loss,
                quality = %assessment.quality,
                "move assessed"
            );
            assessments.push(assessment);
            before = after;
        }

        let report = GameReport::new(sequence, assessments, None);
        info!(
            game = sequence.id(),
            accuracy = report.accuracy,
            blunders = report.counts.blunder,
            "game analyzed"
        );
        report
    }

    async fn evaluate(
        &self,
        position: &Position,
        cancel: &CancellationToken,
    ) -> Result<Evaluation, EngineError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            result = self.evaluator.evaluate(position, &self.limit) => result,
        }
    }

    fn stop(
        &self,
        sequence: &MoveSequence,
        assessments: Vec<MoveAssessment>,
        error: EngineError,
    ) -> GameReport {
        warn!(
            game = sequence.id(),
            analyzed = assessments.len(),
            total = sequence.len(),
            error = %error,
            "game analysis stopped"
        );
        GameReport::new(sequence, assessments, Some(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{AnalysisEngine, EngineFactory};
    use crate::evaluation::Score;
    use crate::pool::EnginePool;
    use crate::quality::MoveQuality;
    use crate::report::GameStatus;
    use crate::sequence::{GameRecord, PlyRecord};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Answers from a fingerprint table; unknown positions crash the engine.
    struct TableEngine {
        table: Arc<HashMap<String, Score>>,
        healthy: bool,
    }

    #[async_trait]
    impl AnalysisEngine for TableEngine {
        fn name(&self) -> &str {
            "table"
        }

        async fn evaluate(
            &mut self,
            position: &Position,
            _limit: &LimitProfile,
        ) -> Result<Evaluation, EngineError> {
            match self.table.get(position.fingerprint()) {
                Some(score) => Ok(Evaluation {
                    score: *score,
                    best_move: Some("a2a3".to_string()),
                    depth: 10,
                    time_ms: 1,
                }),
                None => {
                    self.healthy = false;
                    Err(EngineError::Crashed("unknown position".to_string()))
                }
            }
        }

        fn is_healthy(&self) -> bool {
            self.healthy
        }

        async fn shutdown(self: Box<Self>, _grace: Duration) {}
    }

    struct TableFactory {
        table: Arc<HashMap<String, Score>>,
    }

    #[async_trait]
    impl EngineFactory for TableFactory {
        async fn spawn(
            &self,
            _slot: usize,
            _shutdown: CancellationToken,
        ) -> Result<Box<dyn AnalysisEngine>, EngineError> {
            Ok(Box::new(TableEngine {
                table: Arc::clone(&self.table),
                healthy: true,
            }))
        }
    }

    /// A game of `plies` knight shuffles with distinct positions.
    fn game(plies: usize) -> MoveSequence {
        let moves = (0..plies)
            .map(|i| PlyRecord {
                uci: if i % 2 == 0 { "g1f3" } else { "g8f6" }.to_string(),
                san: None,
                fen: format!(
                    "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR {} KQkq - {} {}",
                    if i % 2 == 0 { "b" } else { "w" },
                    i + 1,
                    i / 2 + 1 + i % 2
                ),
            })
            .collect();
        MoveSequence::from_record(GameRecord {
            id: "t1".to_string(),
            white: "w".to_string(),
            black: "b".to_string(),
            start_fen: None,
            moves,
        })
        .unwrap()
    }

    async fn analyzer(
        sequence: &MoveSequence,
        scores: &[Score],
        max_retries: u32,
    ) -> GameAnalyzer {
        let table: HashMap<String, Score> = sequence
            .positions()
            .iter()
            .zip(scores)
            .map(|(position, score)| (position.fingerprint().to_string(), *score))
            .collect();
        let factory = Arc::new(TableFactory {
            table: Arc::new(table),
        });
        let config = AnalysisConfig {
            max_retries,
            max_parallel_engines: 1,
            engine: EngineConfig {
                respawn_backoff_ms: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let pool = EnginePool::new(factory, 1, &config.engine).await.unwrap();
        let evaluator = Arc::new(PositionEvaluator::new(pool, config.max_retries));
        GameAnalyzer::new(evaluator, &config)
    }

    #[tokio::test]
    async fn assesses_every_move() {
        let sequence = game(4);
        let scores = [
            Score::Centipawns(20),
            Score::Centipawns(-15),
            Score::Centipawns(80),
            Score::Centipawns(-300),
            Score::Centipawns(310),
        ];
        let analyzer = analyzer(&sequence, &scores, 0).await;
        let report = analyzer.analyze(&sequence, &CancellationToken::new()).await;

        assert_eq!(report.status, GameStatus::Complete);
        assert_eq!(report.moves.len(), 4);
        let qualities: Vec<MoveQuality> = report.moves.iter().map(|m| m.quality).collect();
        assert_eq!(
            qualities,
            vec![
                MoveQuality::Best,
                MoveQuality::Inaccuracy,
                MoveQuality::Best,
                MoveQuality::Good,
            ]
        );
        assert_eq!(report.moves[1].centipawn_loss, 65);
        assert_eq!(report.moves[3].centipawn_loss, 10);
    }

    #[tokio::test]
    async fn failure_keeps_the_analyzed_prefix() {
        let sequence = game(4);
        // The fourth position is missing from the table.
        let scores = [
            Score::Centipawns(20),
            Score::Centipawns(-20),
            Score::Centipawns(20),
        ];
        let analyzer = analyzer(&sequence, &scores, 1).await;
        let report = analyzer.analyze(&sequence, &CancellationToken::new()).await;

        assert_eq!(report.status, GameStatus::Incomplete);
        assert!(report.incomplete);
        assert_eq!(report.moves.len(), 2);
        assert_eq!(report.last_analyzed_index, Some(1));
        assert!(report.error.unwrap().contains("unknown position"));
    }

    #[tokio::test]
    async fn cancellation_stops_analysis() {
        let sequence = game(2);
        let scores = [Score::Centipawns(0); 3];
        let analyzer = analyzer(&sequence, &scores, 0).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = analyzer.analyze(&sequence, &cancel).await;
        assert_eq!(report.status, GameStatus::Failed);
        assert_eq!(report.error.as_deref(), Some("analysis cancelled"));
        assert!(report.moves.is_empty());
    }
}
