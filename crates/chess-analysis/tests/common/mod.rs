//! In-process engine double shared by the integration tests.
//!
//! Scores are looked up by position fingerprint and are given from the side
//! to move's point of view, exactly as a UCI engine reports them.

#![allow(dead_code)]

use async_trait::async_trait;
use chess_analysis::{
    AnalysisConfig, AnalysisEngine, EngineConfig, EngineError, EngineFactory, Evaluation,
    GameRecord, LimitProfile, MoveSequence, PlyRecord, Position, Score,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const PLACEMENT: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR";

/// What the scripted engines answer, plus counters the tests inspect.
#[derive(Default)]
pub struct Script {
    scores: Mutex<HashMap<String, Score>>,
    crash_on: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
    pub calls: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub spawned: AtomicUsize,
}

impl Script {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn score(&self, position: &Position, score: Score) {
        self.scores
            .lock()
            .unwrap()
            .insert(position.fingerprint().to_string(), score);
    }

    /// Every call on `position` kills the engine.
    pub fn crash_on(&self, position: &Position) {
        self.crash_on
            .lock()
            .unwrap()
            .insert(position.fingerprint().to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

struct ScriptedEngine {
    script: Arc<Script>,
    healthy: bool,
}

/// Decrements the active counter even when the call is dropped.
struct ActiveCall<'a>(&'a Script);

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AnalysisEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn evaluate(
        &mut self,
        position: &Position,
        _limit: &LimitProfile,
    ) -> Result<Evaluation, EngineError> {
        let script = Arc::clone(&self.script);
        script.calls.fetch_add(1, Ordering::SeqCst);
        let now = script.active.fetch_add(1, Ordering::SeqCst) + 1;
        script.max_active.fetch_max(now, Ordering::SeqCst);
        let _active = ActiveCall(&script);

        let delay = *script.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if script.crash_on.lock().unwrap().contains(position.fingerprint()) {
            self.healthy = false;
            return Err(EngineError::Crashed("engine process exited".to_string()));
        }
        let score = script
            .scores
            .lock()
            .unwrap()
            .get(position.fingerprint())
            .copied()
            .unwrap_or(Score::Centipawns(0));
        Ok(Evaluation {
            score,
            best_move: Some("e2e4".to_string()),
            depth: 12,
            time_ms: delay.as_millis() as u64,
        })
    }

    fn is_healthy(&self) -> bool {
        self.healthy
    }

    async fn shutdown(self: Box<Self>, _grace: Duration) {}
}

pub struct ScriptedFactory {
    pub script: Arc<Script>,
}

#[async_trait]
impl EngineFactory for ScriptedFactory {
    async fn spawn(
        &self,
        _slot: usize,
        _shutdown: CancellationToken,
    ) -> Result<Box<dyn AnalysisEngine>, EngineError> {
        self.script.spawned.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedEngine {
            script: Arc::clone(&self.script),
            healthy: true,
        }))
    }
}

/// Configuration for fast tests against the scripted engine.
pub fn config(engines: usize) -> AnalysisConfig {
    AnalysisConfig {
        max_parallel_engines: engines,
        engine: EngineConfig {
            grace_period_ms: 100,
            respawn_backoff_ms: 1,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// A game of `plies` moves whose positions are unique to `seed`.
///
/// The board never changes; the halfmove clock is what tells positions
/// apart, so games built with different seeds share no cache entries.
pub fn game(id: &str, seed: u32, plies: u32) -> MoveSequence {
    let base = seed * 1000;
    let moves = (0..plies)
        .map(|i| PlyRecord {
            uci: if i % 2 == 0 { "g1f3" } else { "g8f6" }.to_string(),
            san: None,
            fen: format!(
                "{PLACEMENT} {} - - {} {}",
                if i % 2 == 0 { "b" } else { "w" },
                base + i + 1,
                1 + (i + 1) / 2
            ),
        })
        .collect();
    MoveSequence::from_record(GameRecord {
        id: id.to_string(),
        white: format!("{id}-white"),
        black: format!("{id}-black"),
        start_fen: Some(format!("{PLACEMENT} w - - {base} 1")),
        moves,
    })
    .unwrap()
}

/// Scores every position of `sequence` from White's point of view.
pub fn score_from_white(script: &Script, sequence: &MoveSequence, white_cp: &[i32]) {
    for (position, cp) in sequence.positions().iter().zip(white_cp) {
        let score = match position.side_to_move() {
            chess_core::Color::White => *cp,
            chess_core::Color::Black => -cp,
        };
        script.score(position, Score::Centipawns(score));
    }
}
