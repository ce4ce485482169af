//! Position evaluation through the cache and the engine pool.

use crate::cache::{CacheKey, CacheStats, EvaluationCache};
use crate::config::LimitProfile;
use crate::engine::EngineError;
use crate::evaluation::Evaluation;
use crate::pool::EnginePool;
use crate::sequence::Position;
use tracing::{debug, warn};

/// Evaluates positions, reusing earlier results and retrying engine
/// failures on fresh engines.
pub struct PositionEvaluator {
    pool: EnginePool,
    cache: EvaluationCache,
    max_retries: u32,
}

impl PositionEvaluator {
    pub fn new(pool: EnginePool, max_retries: u32) -> Self {
        Self {
            pool,
            cache: EvaluationCache::new(),
            max_retries,
        }
    }

    /// Evaluation of `position` under `limit`, from the side to move's
    /// perspective.
    ///
    /// # Errors
    ///
    /// Returns the last engine error once retries are exhausted, or
    /// immediately for errors a fresh engine cannot fix.
    pub async fn evaluate(
        &self,
        position: &Position,
        limit: &LimitProfile,
    ) -> Result<Evaluation, EngineError> {
        let key = CacheKey {
            fingerprint: position.fingerprint().to_string(),
            limit: limit.clone(),
        };
        self.cache
            .get_or_compute(key, || self.compute(position, limit))
            .await
    }

    async fn compute(
        &self,
        position: &Position,
        limit: &LimitProfile,
    ) -> Result<Evaluation, EngineError> {
        let mut attempt = 0;
        loop {
            let mut engine = self.pool.acquire().await?;
            match engine.evaluate(position, limit).await {
                Ok(evaluation) => {
                    debug!(
                        slot = engine.slot(),
                        fingerprint = position.fingerprint(),
                        depth = evaluation.depth,
                        "position evaluated"
                    );
                    return Ok(evaluation);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        slot = engine.slot(),
                        attempt,
                        error = %e,
                        "engine call failed, retrying on another engine"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn cache(&self) -> &EvaluationCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn pool(&self) -> &EnginePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::{AnalysisEngine, EngineFactory};
    use crate::evaluation::Score;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Fails the first `failures` calls across all engines, then answers.
    struct FlakyEngine {
        failures: Arc<AtomicU32>,
        calls: Arc<AtomicU32>,
        healthy: bool,
        error: EngineError,
    }

    #[async_trait]
    impl AnalysisEngine for FlakyEngine {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn evaluate(
            &mut self,
            _position: &Position,
            _limit: &LimitProfile,
        ) -> Result<Evaluation, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                self.healthy = false;
                return Err(self.error.clone());
            }
            Ok(Evaluation {
                score: Score::Centipawns(25),
                best_move: Some("d2d4".to_string()),
                depth: 8,
                time_ms: 3,
            })
        }

        fn is_healthy(&self) -> bool {
            self.healthy
        }

        async fn shutdown(self: Box<Self>, _grace: Duration) {}
    }

    struct FlakyFactory {
        failures: Arc<AtomicU32>,
        calls: Arc<AtomicU32>,
        error: EngineError,
    }

    #[async_trait]
    impl EngineFactory for FlakyFactory {
        async fn spawn(
            &self,
            _slot: usize,
            _shutdown: CancellationToken,
        ) -> Result<Box<dyn AnalysisEngine>, EngineError> {
            Ok(Box::new(FlakyEngine {
                failures: Arc::clone(&self.failures),
                calls: Arc::clone(&self.calls),
                healthy: true,
                error: self.error.clone(),
            }))
        }
    }

    async fn evaluator(
        failures: u32,
        error: EngineError,
        max_retries: u32,
    ) -> (PositionEvaluator, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let factory = Arc::new(FlakyFactory {
            failures: Arc::new(AtomicU32::new(failures)),
            calls: Arc::clone(&calls),
            error,
        });
        let config = EngineConfig {
            respawn_backoff_ms: 1,
            ..Default::default()
        };
        let pool = EnginePool::new(factory, 2, &config).await.unwrap();
        (PositionEvaluator::new(pool, max_retries), calls)
    }

    fn limit() -> LimitProfile {
        LimitProfile {
            movetime_ms: Some(20),
            depth: None,
        }
    }

    #[tokio::test]
    async fn retries_a_crash_once() {
        let (evaluator, calls) =
            evaluator(1, EngineError::Crashed("eof".to_string()), 1).await;
        let eval = evaluator
            .evaluate(&Position::startpos(), &limit())
            .await
            .unwrap();
        assert_eq!(eval.score, Score::Centipawns(25));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let (evaluator, calls) =
            evaluator(5, EngineError::Timeout { budget_ms: 20 }, 1).await;
        let result = evaluator.evaluate(&Position::startpos(), &limit()).await;
        assert_eq!(result, Err(EngineError::Timeout { budget_ms: 20 }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(evaluator.cache_stats().entries, 0);
    }

    #[tokio::test]
    async fn non_retryable_errors_are_not_retried() {
        let (evaluator, calls) = evaluator(1, EngineError::Cancelled, 3).await;
        let result = evaluator.evaluate(&Position::startpos(), &limit()).await;
        assert_eq!(result, Err(EngineError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_positions_skip_the_pool() {
        let (evaluator, calls) = evaluator(0, EngineError::Cancelled, 0).await;
        let start = Position::startpos();
        let transposed = Position::from_fen(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 7",
        )
        .unwrap();

        evaluator.evaluate(&start, &limit()).await.unwrap();
        evaluator.evaluate(&transposed, &limit()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(evaluator.cache_stats().hits, 1);
        assert_eq!(evaluator.pool().idle_engines(), 2);
    }
}
