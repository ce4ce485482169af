//! The analysis engine capability.
//!
//! The pipeline only talks to engines through [`AnalysisEngine`], and only
//! creates them through an [`EngineFactory`]. [`crate::process::UciProcess`]
//! is the implementation backed by an external UCI binary; tests plug in
//! scripted engines.

use crate::config::LimitProfile;
use crate::evaluation::Evaluation;
use crate::sequence::Position;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that can occur when working with analysis engines.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine could not be started or did not complete the handshake.
    #[error("Engine unavailable: {0}")]
    Unavailable(String),
    /// The engine died, closed its pipes, or wrote malformed output.
    #[error("Engine crashed: {0}")]
    Crashed(String),
    /// The search did not finish within its budget plus the grace period.
    #[error("Engine timed out after {budget_ms}ms")]
    Timeout { budget_ms: u64 },
    /// The call was interrupted by cancellation or shutdown.
    #[error("analysis cancelled")]
    Cancelled,
    /// Every engine slot is gone, or the pool has been shut down.
    #[error("Engine pool closed")]
    PoolClosed,
}

impl EngineError {
    /// Whether the same request may succeed on a fresh engine.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Crashed(_) | EngineError::Timeout { .. })
    }
}

/// One engine instance that evaluates positions, one call at a time.
#[async_trait]
pub trait AnalysisEngine: Send {
    /// Identification reported by the engine.
    fn name(&self) -> &str;

    /// Evaluates a position under the given limit.
    ///
    /// The returned score is relative to the side to move. Errors leave the
    /// engine unhealthy unless they are [`EngineError::Cancelled`] before
    /// any command was sent.
    async fn evaluate(
        &mut self,
        position: &Position,
        limit: &LimitProfile,
    ) -> Result<Evaluation, EngineError>;

    /// False once the engine must not be used again.
    fn is_healthy(&self) -> bool;

    /// Stops the engine, waiting at most `grace` for a clean exit.
    async fn shutdown(self: Box<Self>, grace: Duration);
}

/// Creates engines for pool slots.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Starts the engine for `slot`. Engines should abandon in-flight work
    /// once `shutdown` is cancelled.
    async fn spawn(
        &self,
        slot: usize,
        shutdown: CancellationToken,
    ) -> Result<Box<dyn AnalysisEngine>, EngineError>;
}
