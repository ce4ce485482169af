//! Analysis configuration.
//!
//! Everything the pipeline can be tuned with lives in [`AnalysisConfig`],
//! which is usually loaded from a TOML file. Every field has a default, so
//! an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// A value is out of range or inconsistent with another value.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Resource limit applied to a single engine search.
///
/// Evaluations are only comparable under the same limits, so the profile is
/// part of every cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LimitProfile {
    /// Fixed search time in milliseconds.
    pub movetime_ms: Option<u64>,
    /// Maximum search depth in plies.
    pub depth: Option<u32>,
}

impl LimitProfile {
    /// Wall-clock time the search is expected to take, before any grace
    /// period. Depth-only searches have no natural bound, so the caller
    /// supplies one.
    pub fn budget(&self, depth_budget: Duration) -> Duration {
        match self.movetime_ms {
            Some(ms) => Duration::from_millis(ms),
            None => depth_budget,
        }
    }

    /// The `go` options that express this limit.
    pub fn go_options(&self) -> uci::GoOptions {
        uci::GoOptions {
            movetime: self.movetime_ms,
            depth: self.depth,
        }
    }
}

impl std::fmt::Display for LimitProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.movetime_ms, self.depth) {
            (Some(ms), Some(d)) => write!(f, "movetime {}ms depth {}", ms, d),
            (Some(ms), None) => write!(f, "movetime {}ms", ms),
            (None, Some(d)) => write!(f, "depth {}", d),
            (None, None) => write!(f, "unbounded"),
        }
    }
}

/// Lower bounds (in centipawns of loss) of each classification bucket.
///
/// A move with loss below `good` is best; at or above `blunder` it is a
/// blunder. The buckets partition `[0, inf)` as long as the bounds are
/// strictly increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationThresholds {
    pub good: u32,
    pub inaccuracy: u32,
    pub mistake: u32,
    pub blunder: u32,
}

impl Default for ClassificationThresholds {
    fn default() -> Self {
        Self {
            good: 10,
            inaccuracy: 50,
            mistake: 100,
            blunder: 200,
        }
    }
}

impl ClassificationThresholds {
    fn validate(&self) -> Result<(), ConfigError> {
        let ordered = 0 < self.good
            && self.good < self.inaccuracy
            && self.inaccuracy < self.mistake
            && self.mistake < self.blunder;
        if ordered {
            Ok(())
        } else {
            Err(ConfigError::Invalid(format!(
                "classification thresholds must be positive and strictly increasing, got {}/{}/{}/{}",
                self.good, self.inaccuracy, self.mistake, self.blunder
            )))
        }
    }
}

/// Heuristics used to split a game into phases. Material is in pawn units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseThresholds {
    /// Last full move that can still count as opening.
    pub opening_max_move: u32,
    /// Most material either side may have lost while still in the opening.
    pub opening_max_material_loss: u32,
    /// Combined non-pawn material below which the game is an endgame.
    pub endgame_material: u32,
    /// Past this full move, a position without queens is an endgame.
    pub queenless_endgame_move: u32,
}

impl Default for PhaseThresholds {
    fn default() -> Self {
        Self {
            opening_max_move: 10,
            opening_max_material_loss: 3,
            endgame_material: 26,
            queenless_endgame_move: 40,
        }
    }
}

impl PhaseThresholds {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.queenless_endgame_move <= self.opening_max_move {
            return Err(ConfigError::Invalid(format!(
                "queenless_endgame_move ({}) must be after opening_max_move ({})",
                self.queenless_endgame_move, self.opening_max_move
            )));
        }
        Ok(())
    }
}

/// How to launch and supervise engine subprocesses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable. A bare name is looked up on `PATH`.
    pub path: PathBuf,
    /// Extra command-line arguments.
    pub args: Vec<String>,
    /// UCI options sent with `setoption` during the handshake.
    pub options: BTreeMap<String, String>,
    /// Time allowed for `uci`/`isready` to be acknowledged.
    pub handshake_timeout_ms: u64,
    /// Added to every search budget before a call is declared timed out,
    /// and allowed for a graceful `quit` on shutdown.
    pub grace_period_ms: u64,
    /// Budget assumed for searches limited only by depth.
    pub depth_budget_ms: u64,
    /// Replacement attempts for a crashed engine before its slot is given up.
    pub respawn_attempts: u32,
    /// Delay between replacement attempts.
    pub respawn_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("stockfish"),
            args: Vec::new(),
            options: BTreeMap::from([("Threads".to_string(), "1".to_string())]),
            handshake_timeout_ms: 10_000,
            grace_period_ms: 2_000,
            depth_budget_ms: 30_000,
            respawn_attempts: 3,
            respawn_backoff_ms: 500,
        }
    }
}

impl EngineConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn depth_budget(&self) -> Duration {
        Duration::from_millis(self.depth_budget_ms)
    }

    pub fn respawn_backoff(&self) -> Duration {
        Duration::from_millis(self.respawn_backoff_ms)
    }

    /// Executable to start.
    ///
    /// A bare name that is not on `PATH` is looked for in the usual install
    /// locations; anything else is returned as configured.
    pub fn resolved_path(&self) -> PathBuf {
        let fallbacks: Vec<PathBuf> = ENGINE_LOCATIONS.iter().map(PathBuf::from).collect();
        locate_engine(&self.path, std::env::var_os("PATH").as_deref(), &fallbacks)
            .unwrap_or_else(|| self.path.clone())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("engine path is empty".to_string()));
        }
        if self.handshake_timeout_ms == 0 || self.grace_period_ms == 0 || self.depth_budget_ms == 0
        {
            return Err(ConfigError::Invalid(
                "engine timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Directories searched for a bare engine name missing from `PATH`.
const ENGINE_LOCATIONS: &[&str] = &[
    "/usr/local/bin",
    "/usr/bin",
    "/usr/games",
    "/opt/homebrew/bin",
    "./engines",
    ".",
];

fn locate_engine(
    path: &Path,
    search_path: Option<&OsStr>,
    fallbacks: &[PathBuf],
) -> Option<PathBuf> {
    let mut components = path.components();
    let name = match (components.next(), components.next()) {
        (Some(std::path::Component::Normal(name)), None) => name,
        _ => return None,
    };
    let on_path = search_path
        .map(|dirs| std::env::split_paths(dirs).any(|dir| dir.join(name).is_file()))
        .unwrap_or(false);
    if on_path {
        return None;
    }
    fallbacks
        .iter()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Configuration for a whole analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Search time per position in milliseconds.
    pub time_limit_per_move_ms: Option<u64>,
    /// Search depth per position.
    pub depth_limit: Option<u32>,
    /// Centipawn-loss buckets.
    pub classification: ClassificationThresholds,
    /// Phase boundaries.
    pub phase: PhaseThresholds,
    /// Number of engine processes, which is also the maximum number of
    /// concurrent evaluations.
    pub max_parallel_engines: usize,
    /// Games analyzed at once. Defaults to twice the engine count.
    pub max_games_in_flight: Option<usize>,
    /// Retries of a single evaluation after an engine crash or timeout.
    pub max_retries: u32,
    /// Engine process settings.
    pub engine: EngineConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            time_limit_per_move_ms: None,
            depth_limit: Some(15),
            classification: ClassificationThresholds::default(),
            phase: PhaseThresholds::default(),
            max_parallel_engines: num_cpus::get().max(1),
            max_games_in_flight: None,
            max_retries: 1,
            engine: EngineConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Reads, parses and validates a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if the file cannot be read,
    /// [`ConfigError::ParseError`] if it is not valid TOML for this schema,
    /// or [`ConfigError::Invalid`] if a value is out of range.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// The search limit every position is evaluated under.
    pub fn limit_profile(&self) -> LimitProfile {
        LimitProfile {
            movetime_ms: self.time_limit_per_move_ms,
            depth: self.depth_limit,
        }
    }

    /// Games allowed in progress at once.
    pub fn games_in_flight(&self) -> usize {
        self.max_games_in_flight
            .unwrap_or(self.max_parallel_engines * 2)
            .max(1)
    }

    /// Checks every value before any engine is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (self.time_limit_per_move_ms, self.depth_limit) {
            (None, None) => {
                return Err(ConfigError::Invalid(
                    "at least one of time_limit_per_move_ms and depth_limit must be set"
                        .to_string(),
                ))
            }
            (Some(0), _) => {
                return Err(ConfigError::Invalid(
                    "time_limit_per_move_ms must be greater than zero".to_string(),
                ))
            }
            (_, Some(0)) => {
                return Err(ConfigError::Invalid(
                    "depth_limit must be greater than zero".to_string(),
                ))
            }
            _ => {}
        }
        if self.max_parallel_engines == 0 {
            return Err(ConfigError::Invalid(
                "max_parallel_engines must be at least 1".to_string(),
            ));
        }
        if self.max_games_in_flight == Some(0) {
            return Err(ConfigError::Invalid(
                "max_games_in_flight must be at least 1".to_string(),
            ));
        }
        self.classification.validate()?;
        self.phase.validate()?;
        self.engine.validate()
    }
}
