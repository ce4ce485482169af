//! UCI engine subprocess handle.
//!
//! A [`UciProcess`] owns exactly one engine process and talks to it over
//! stdin/stdout. Calls are strictly sequential (`&mut self`); parallelism
//! comes from running several processes in an [`crate::pool::EnginePool`].

use crate::config::{EngineConfig, LimitProfile};
use crate::engine::{AnalysisEngine, EngineError, EngineFactory};
use crate::evaluation::Evaluation;
use crate::sequence::Position;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uci::{EngineInfo, EngineMessage, GuiCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    /// A search was started and has not been answered. An abandoned call
    /// leaves the process here for good.
    Busy,
    Broken,
}

/// Handle to one running UCI engine.
pub struct UciProcess {
    slot: usize,
    name: String,
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    state: State,
    grace: Duration,
    depth_budget: Duration,
    shutdown: CancellationToken,
}

impl UciProcess {
    /// Starts the engine and completes the `uci`/`isready` handshake.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unavailable`] if the binary cannot be started
    /// or the handshake fails or exceeds `handshake_timeout_ms`.
    pub async fn launch(
        config: &EngineConfig,
        slot: usize,
        shutdown: CancellationToken,
    ) -> Result<Self, EngineError> {
        let program = config.resolved_path();
        if program != config.path {
            debug!(slot, path = %program.display(), "engine found outside PATH");
        }
        let mut child = Command::new(&program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::Unavailable(format!(
                    "failed to start {}: {}",
                    program.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Unavailable("engine stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Unavailable("engine stdout not captured".to_string()))?;

        let mut process = Self {
            slot,
            name: String::new(),
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            state: State::Busy,
            grace: config.grace_period(),
            depth_budget: config.depth_budget(),
            shutdown,
        };

        match timeout(config.handshake_timeout(), process.handshake(&config.options)).await {
            Ok(Ok(())) => {
                process.state = State::Ready;
                info!(slot, engine = %process.name, "engine ready");
                Ok(process)
            }
            Ok(Err(e)) => {
                process.kill().await;
                Err(EngineError::Unavailable(format!("handshake failed: {}", e)))
            }
            Err(_) => {
                process.kill().await;
                Err(EngineError::Unavailable(format!(
                    "handshake timed out after {}ms",
                    config.handshake_timeout_ms
                )))
            }
        }
    }

    async fn handshake(&mut self, options: &BTreeMap<String, String>) -> Result<(), EngineError> {
        self.send(&GuiCommand::Uci).await?;
        loop {
            match self.next_message().await? {
                EngineMessage::Id {
                    name: Some(name), ..
                } => self.name = name,
                EngineMessage::UciOk => break,
                _ => {}
            }
        }
        if self.name.is_empty() {
            self.name = "Unknown Engine".to_string();
        }

        for (name, value) in options {
            self.send(&GuiCommand::SetOption {
                name: name.clone(),
                value: Some(value.clone()),
            })
            .await?;
        }

        self.send(&GuiCommand::IsReady).await?;
        self.wait_ready().await
    }

    async fn wait_ready(&mut self) -> Result<(), EngineError> {
        loop {
            if self.next_message().await? == EngineMessage::ReadyOk {
                return Ok(());
            }
        }
    }

    /// Sends a command to the engine.
    async fn send(&mut self, command: &GuiCommand) -> Result<(), EngineError> {
        let line = command.to_uci();
        debug!(slot = self.slot, %line, "engine <");
        self.stdin
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| EngineError::Crashed(format!("write failed: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| EngineError::Crashed(format!("flush failed: {}", e)))
    }

    /// Reads and parses the next line of engine output.
    async fn next_message(&mut self) -> Result<EngineMessage, EngineError> {
        let line = self
            .stdout
            .next_line()
            .await
            .map_err(|e| EngineError::Crashed(format!("read failed: {}", e)))?
            .ok_or_else(|| EngineError::Crashed("engine closed its output".to_string()))?;
        debug!(slot = self.slot, %line, "engine >");
        EngineMessage::parse(&line)
            .map_err(|e| EngineError::Crashed(format!("malformed output: {}", e)))
    }

    /// Runs one search to completion.
    async fn search(
        &mut self,
        position: &Position,
        limit: &LimitProfile,
    ) -> Result<Evaluation, EngineError> {
        let started = Instant::now();
        self.send(&GuiCommand::Position {
            fen: Some(position.fen().to_string()),
            moves: Vec::new(),
        })
        .await?;
        self.send(&GuiCommand::Go(limit.go_options())).await?;

        let mut latest: Option<EngineInfo> = None;
        loop {
            match self.next_message().await? {
                EngineMessage::Info(info)
                    if info.has_exact_score() && info.multipv.unwrap_or(1) == 1 =>
                {
                    latest = Some(info);
                }
                EngineMessage::BestMove { mv, .. } => {
                    let info = latest.ok_or_else(|| {
                        EngineError::Crashed("bestmove without a scored info line".to_string())
                    })?;
                    let score = info.score.ok_or_else(|| {
                        EngineError::Crashed("info line lost its score".to_string())
                    })?;
                    return Ok(Evaluation {
                        score: score.into(),
                        best_move: mv,
                        depth: info.depth.unwrap_or(0),
                        time_ms: info
                            .time
                            .unwrap_or_else(|| started.elapsed().as_millis() as u64),
                    });
                }
                _ => {}
            }
        }
    }

    /// Kills the process and reaps it.
    async fn kill(&mut self) {
        self.state = State::Broken;
        if let Err(e) = self.child.kill().await {
            debug!(slot = self.slot, error = %e, "engine kill failed");
        }
    }
}

#[async_trait]
impl AnalysisEngine for UciProcess {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(
        &mut self,
        position: &Position,
        limit: &LimitProfile,
    ) -> Result<Evaluation, EngineError> {
        if self.state != State::Ready {
            return Err(EngineError::Crashed(
                "engine was left in an unusable state".to_string(),
            ));
        }
        if self.shutdown.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        self.state = State::Busy;
        let budget = limit.budget(self.depth_budget) + self.grace;
        let shutdown = self.shutdown.clone();
        let outcome = tokio::select! {
            _ = shutdown.cancelled() => Err(EngineError::Cancelled),
            result = timeout(budget, self.search(position, limit)) => match result {
                Ok(result) => result,
                Err(_) => Err(EngineError::Timeout {
                    budget_ms: budget.as_millis() as u64,
                }),
            },
        };

        match outcome {
            Ok(evaluation) => {
                self.state = State::Ready;
                Ok(evaluation)
            }
            Err(e) => {
                warn!(slot = self.slot, fen = position.fen(), error = %e, "engine call failed");
                self.kill().await;
                Err(e)
            }
        }
    }

    fn is_healthy(&self) -> bool {
        self.state == State::Ready
    }

    async fn shutdown(mut self: Box<Self>, grace: Duration) {
        if self.state == State::Ready && self.send(&GuiCommand::Quit).await.is_ok() {
            match timeout(grace, self.child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(slot = self.slot, %status, "engine exited");
                    return;
                }
                Ok(Err(e)) => debug!(slot = self.slot, error = %e, "engine wait failed"),
                Err(_) => warn!(slot = self.slot, "engine ignored quit, killing"),
            }
        }
        self.kill().await;
    }
}

/// Launches [`UciProcess`] engines from an [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct UciEngineFactory {
    config: EngineConfig,
}

impl UciEngineFactory {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EngineFactory for UciEngineFactory {
    async fn spawn(
        &self,
        slot: usize,
        shutdown: CancellationToken,
    ) -> Result<Box<dyn AnalysisEngine>, EngineError> {
        let process = UciProcess::launch(&self.config, slot, shutdown).await?;
        Ok(Box::new(process))
    }
}
