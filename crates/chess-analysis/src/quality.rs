//! Move quality classification and accuracy statistics.

use crate::config::ClassificationThresholds;
use crate::evaluation::{Evaluation, Outlook};
use crate::phase::Phase;
use crate::sequence::PlayedMove;
use chess_core::Color;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest loss a single move contributes to an average.
pub const MAX_AVERAGED_LOSS: u32 = 1_000;

/// Classification of move quality based on centipawn loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveQuality {
    /// The best move in the position, or indistinguishable from it
    Best,
    /// Good move (small centipawn loss)
    Good,
    /// Inaccuracy (noticeable centipawn loss)
    Inaccuracy,
    /// Mistake (significant centipawn loss)
    Mistake,
    /// Blunder (major centipawn loss)
    Blunder,
}

impl MoveQuality {
    pub const ALL: [MoveQuality; 5] = [
        MoveQuality::Best,
        MoveQuality::Good,
        MoveQuality::Inaccuracy,
        MoveQuality::Mistake,
        MoveQuality::Blunder,
    ];

    /// Bucket a centipawn loss.
    pub fn from_cp_loss(loss: u32, thresholds: &ClassificationThresholds) -> Self {
        if loss >= thresholds.blunder {
            MoveQuality::Blunder
        } else if loss >= thresholds.mistake {
            MoveQuality::Mistake
        } else if loss >= thresholds.inaccuracy {
            MoveQuality::Inaccuracy
        } else if loss >= thresholds.good {
            MoveQuality::Good
        } else {
            MoveQuality::Best
        }
    }
}

impl fmt::Display for MoveQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MoveQuality::Best => "best",
            MoveQuality::Good => "good",
            MoveQuality::Inaccuracy => "inaccuracy",
            MoveQuality::Mistake => "mistake",
            MoveQuality::Blunder => "blunder",
        };
        f.write_str(name)
    }
}

/// Centipawn loss between the best achievable and the realized outcome,
/// both seen by the player who moved, on the saturating scale.
pub fn centipawn_loss(best_case: Outlook, realized: Outlook) -> u32 {
    let loss = i64::from(best_case.value()) - i64::from(realized.value());
    u32::try_from(loss.max(0)).unwrap_or(u32::MAX)
}

/// Accuracy percentage for an average centipawn loss:
/// `100 * 2^(-acpl / 120)`.
pub fn accuracy(average_cp_loss: f64) -> f64 {
    if average_cp_loss.is_nan() || average_cp_loss <= 0.0 {
        return 100.0;
    }
    100.0 * (-average_cp_loss / 120.0).exp2()
}

/// Outcome of comparing two consecutive evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Judgement {
    pub best_case: Outlook,
    pub realized: Outlook,
    pub centipawn_loss: u32,
    pub quality: MoveQuality,
}

/// Quality assessment of one played move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveAssessment {
    pub ply: usize,
    pub move_number: u32,
    pub color: Color,
    /// The move that was played (in UCI notation)
    pub uci: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub san: Option<String>,
    /// The engine's choice in the position before the move
    pub best_move: Option<String>,
    /// Evaluation before the move, for the player who moved
    pub evaluation_before: Outlook,
    /// Evaluation after the move, for the player who moved
    pub evaluation_after: Outlook,
    pub centipawn_loss: u32,
    pub quality: MoveQuality,
    pub phase: Phase,
}

/// Turns pairs of evaluations into move classifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveClassifier {
    thresholds: ClassificationThresholds,
}

impl MoveClassifier {
    pub fn new(thresholds: ClassificationThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ClassificationThresholds {
        &self.thresholds
    }

    /// Compares the evaluation before a move (mover to move) with the
    /// evaluation after it (opponent to move).
    pub fn judge(&self, before: &Evaluation, after: &Evaluation) -> Judgement {
        let best_case = before.outlook();
        let realized = after.outlook().flip();
        let loss = centipawn_loss(best_case, realized);

        let quality = if best_case.is_winning_mate() && !realized.is_winning_mate() {
            MoveQuality::Blunder
        } else {
            MoveQuality::from_cp_loss(loss, &self.thresholds)
        };

        Judgement {
            best_case,
            realized,
            centipawn_loss: loss,
            quality,
        }
    }

    /// Full assessment of a played move.
    pub fn assess(
        &self,
        played: &PlayedMove,
        before: &Evaluation,
        after: &Evaluation,
        phase: Phase,
    ) -> MoveAssessment {
        let judgement = self.judge(before, after);
        MoveAssessment {
            ply: played.ply,
            move_number: played.move_number,
            color: played.color,
            uci: played.uci.clone(),
            san: played.san.clone(),
            best_move: before.best_move.clone(),
            evaluation_before: judgement.best_case,
            evaluation_after: judgement.realized,
            centipawn_loss: judgement.centipawn_loss,
            quality: judgement.quality,
            phase,
        }
    }
}

/// Number of moves in each quality bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityCounts {
    pub best: u32,
    pub good: u32,
    pub inaccuracy: u32,
    pub mistake: u32,
    pub blunder: u32,
}

impl QualityCounts {
    pub fn record(&mut self, quality: MoveQuality) {
        match quality {
            MoveQuality::Best => self.best += 1,
            MoveQuality::Good => self.good += 1,
            MoveQuality::Inaccuracy => self.inaccuracy += 1,
            MoveQuality::Mistake => self.mistake += 1,
            MoveQuality::Blunder => self.blunder += 1,
        }
    }

    pub fn get(&self, quality: MoveQuality) -> u32 {
        match quality {
            MoveQuality::Best => self.best,
            MoveQuality::Good => self.good,
            MoveQuality::Inaccuracy => self.inaccuracy,
            MoveQuality::Mistake => self.mistake,
            MoveQuality::Blunder => self.blunder,
        }
    }

    pub fn total(&self) -> u32 {
        self.best + self.good + self.inaccuracy + self.mistake + self.blunder
    }

    pub fn merge(&mut self, other: &QualityCounts) {
        self.best += other.best;
        self.good += other.good;
        self.inaccuracy += other.inaccuracy;
        self.mistake += other.mistake;
        self.blunder += other.blunder;
    }
}

/// Statistics for a player's performance in a game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    /// Total moves analyzed
    pub moves: u32,
    pub counts: QualityCounts,
    /// Sum of centipawn losses over all analyzed moves, each capped at
    /// [`MAX_AVERAGED_LOSS`]
    pub total_centipawn_loss: u64,
    /// Average centipawn loss
    pub average_centipawn_loss: f64,
    /// Accuracy percentage (0-100)
    pub accuracy: f64,
}

impl PlayerStats {
    /// Aggregates the given assessments.
    pub fn from_assessments<'a>(assessments: impl IntoIterator<Item = &'a MoveAssessment>) -> Self {
        let mut stats = PlayerStats::default();
        for assessment in assessments {
            stats.moves += 1;
            stats.counts.record(assessment.quality);
            stats.total_centipawn_loss += u64::from(assessment.centipawn_loss.min(MAX_AVERAGED_LOSS));
        }
        stats.finish();
        stats
    }

    /// Statistics for the moves of one color.
    pub fn for_color(assessments: &[MoveAssessment], color: Color) -> Self {
        Self::from_assessments(assessments.iter().filter(|a| a.color == color))
    }

    fn finish(&mut self) {
        self.average_centipawn_loss = if self.moves == 0 {
            0.0
        } else {
            self.total_centipawn_loss as f64 / f64::from(self.moves)
        };
        self.accuracy = accuracy(self.average_centipawn_loss);
    }
}
