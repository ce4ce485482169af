//! Per-game and per-batch analysis reports.

use crate::quality::{accuracy, MoveAssessment, MoveQuality, PlayerStats, QualityCounts};
use crate::sequence::MoveSequence;
use chess_core::Color;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How far analysis of a game got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Every move was assessed.
    Complete,
    /// Analysis stopped partway; the assessed prefix is kept.
    Incomplete,
    /// Nothing could be assessed, or the analysis task itself failed.
    Failed,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GameStatus::Complete => "complete",
            GameStatus::Incomplete => "incomplete",
            GameStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A blunder or mistake, as listed in the severity rankings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlunderEntry {
    pub ply: usize,
    pub move_number: u32,
    pub color: Color,
    pub uci: String,
    pub centipawn_loss: u32,
}

/// Analysis result for one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameReport {
    pub game_id: String,
    pub white: String,
    pub black: String,
    /// Moves in the game, whether or not they were analyzed.
    pub total_moves: usize,
    /// Assessment of each analyzed move, in game order.
    pub moves: Vec<MoveAssessment>,
    /// Accuracy over all analyzed moves.
    pub accuracy: f64,
    pub average_centipawn_loss: f64,
    pub counts: QualityCounts,
    /// Blunders, most severe first; equal losses keep game order.
    pub blunders: Vec<BlunderEntry>,
    /// Mistakes, ranked like `blunders`.
    #[serde(default)]
    pub mistakes: Vec<BlunderEntry>,
    pub white_stats: PlayerStats,
    pub black_stats: PlayerStats,
    pub incomplete: bool,
    /// Ply index of the last assessed move.
    pub last_analyzed_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: GameStatus,
}

impl GameReport {
    /// Builds the report from the assessed prefix of a game. `failure` is
    /// the reason analysis stopped early, if it did.
    pub fn new(
        sequence: &MoveSequence,
        moves: Vec<MoveAssessment>,
        failure: Option<String>,
    ) -> Self {
        let overall = PlayerStats::from_assessments(&moves);
        let white_stats = PlayerStats::for_color(&moves, Color::White);
        let black_stats = PlayerStats::for_color(&moves, Color::Black);

        let blunders = ranked(&moves, MoveQuality::Blunder);
        let mistakes = ranked(&moves, MoveQuality::Mistake);

        let incomplete = failure.is_some();
        let status = match (&failure, moves.is_empty() && !sequence.is_empty()) {
            (None, _) => GameStatus::Complete,
            (Some(_), true) => GameStatus::Failed,
            (Some(_), false) => GameStatus::Incomplete,
        };

        Self {
            game_id: sequence.id().to_string(),
            white: sequence.white().to_string(),
            black: sequence.black().to_string(),
            total_moves: sequence.len(),
            last_analyzed_index: moves.last().map(|m| m.ply),
            accuracy: overall.accuracy,
            average_centipawn_loss: overall.average_centipawn_loss,
            counts: overall.counts,
            blunders,
            mistakes,
            white_stats,
            black_stats,
            moves,
            incomplete,
            error: failure,
            status,
        }
    }

    /// Report for a game whose analysis task died before producing anything.
    pub fn failed(
        game_id: &str,
        white: &str,
        black: &str,
        total_moves: usize,
        error: String,
    ) -> Self {
        Self {
            game_id: game_id.to_string(),
            white: white.to_string(),
            black: black.to_string(),
            total_moves,
            moves: Vec::new(),
            accuracy: accuracy(0.0),
            average_centipawn_loss: 0.0,
            counts: QualityCounts::default(),
            blunders: Vec::new(),
            mistakes: Vec::new(),
            white_stats: PlayerStats::from_assessments(std::iter::empty()),
            black_stats: PlayerStats::from_assessments(std::iter::empty()),
            incomplete: true,
            last_analyzed_index: None,
            error: Some(error),
            status: GameStatus::Failed,
        }
    }

    pub fn stats_for(&self, color: Color) -> &PlayerStats {
        match color {
            Color::White => &self.white_stats,
            Color::Black => &self.black_stats,
        }
    }
}

/// Cross-game statistics for one player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub games: u32,
    pub moves: u32,
    pub counts: QualityCounts,
    pub total_centipawn_loss: u64,
    pub average_centipawn_loss: f64,
    pub accuracy: f64,
}

impl PlayerSummary {
    fn absorb(&mut self, stats: &PlayerStats) {
        self.games += 1;
        self.moves += stats.moves;
        self.counts.merge(&stats.counts);
        self.total_centipawn_loss += stats.total_centipawn_loss;
        self.average_centipawn_loss = if self.moves == 0 {
            0.0
        } else {
            self.total_centipawn_loss as f64 / f64::from(self.moves)
        };
        self.accuracy = accuracy(self.average_centipawn_loss);
    }
}

/// Moves of the given quality, highest loss first.
fn ranked(moves: &[MoveAssessment], quality: MoveQuality) -> Vec<BlunderEntry> {
    let mut entries: Vec<BlunderEntry> = moves
        .iter()
        .filter(|m| m.quality == quality)
        .map(|m| BlunderEntry {
            ply: m.ply,
            move_number: m.move_number,
            color: m.color,
            uci: m.uci.clone(),
            centipawn_loss: m.centipawn_loss,
        })
        .collect();
    entries.sort_by(|a, b| {
        b.centipawn_loss
            .cmp(&a.centipawn_loss)
            .then(a.ply.cmp(&b.ply))
    });
    entries
}

/// Named players of a game with their statistics; unnamed sides are skipped.
fn players_of(report: &GameReport) -> impl Iterator<Item = (&str, &PlayerStats)> {
    Color::BOTH.into_iter().filter_map(move |color| {
        let name = match color {
            Color::White => report.white.as_str(),
            Color::Black => report.black.as_str(),
        };
        (!name.is_empty()).then(|| (name, report.stats_for(color)))
    })
}

/// Reports for a batch of games plus per-player aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub games: BTreeMap<String, GameReport>,
    pub players: BTreeMap<String, PlayerSummary>,
    /// Games whose report could not be persisted, with the reason.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sink_errors: BTreeMap<String, String>,
}

impl BatchReport {
    /// Adds a game report and folds it into the player aggregates.
    ///
    /// Returns false if a report with the same game id was already present.
    /// The newer report replaces it and the players of both are summarized
    /// again from the games that remain.
    pub fn insert(&mut self, report: GameReport) -> bool {
        let game_id = report.game_id.clone();
        if !self.games.contains_key(&game_id) {
            for (name, stats) in players_of(&report) {
                self.players.entry(name.to_string()).or_default().absorb(stats);
            }
            self.games.insert(game_id, report);
            return true;
        }

        let mut affected: Vec<String> = players_of(&report)
            .map(|(name, _)| name.to_string())
            .collect();
        if let Some(replaced) = self.games.insert(game_id, report) {
            affected.extend(players_of(&replaced).map(|(name, _)| name.to_string()));
        }
        affected.sort();
        affected.dedup();

        for name in affected {
            self.players.remove(&name);
            for game in self.games.values() {
                for (player, stats) in players_of(game) {
                    if player == name {
                        self.players.entry(name.clone()).or_default().absorb(stats);
                    }
                }
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    /// Number of games with the given status.
    pub fn count_status(&self, status: GameStatus) -> usize {
        self.games.values().filter(|g| g.status == status).count()
    }
}
