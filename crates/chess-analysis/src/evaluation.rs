//! Chess position evaluation types.
//!
//! Engine scores are always relative to the side to move in the evaluated
//! position. [`Score::outlook`] turns a score into an [`Outlook`], and
//! [`Outlook::flip`] is the only place where a score changes perspective.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Value of delivering mate immediately on the saturating scale.
pub const MATE_VALUE: i32 = 10_000;

/// Centipawn scores are clamped to this magnitude before comparison, so any
/// mate outranks any finite score.
pub const CENTIPAWN_CAP: i32 = 5_000;

/// Longest mate distance that still maps above [`CENTIPAWN_CAP`].
const MAX_MATE_DISTANCE: u32 = (MATE_VALUE - CENTIPAWN_CAP - 1) as u32;

/// Raw engine score from the side to move's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    /// Centipawn evaluation (positive = side to move is better)
    Centipawns(i32),
    /// Mate in N moves (positive = side to move mates, negative = side to
    /// move gets mated, zero = side to move is already mated)
    Mate(i32),
}

impl Score {
    /// Interprets the score for the side to move.
    pub fn outlook(self) -> Outlook {
        match self {
            Score::Centipawns(cp) => Outlook::Centipawns(cp),
            Score::Mate(n) if n > 0 => Outlook::Mating(n.unsigned_abs()),
            Score::Mate(n) => Outlook::Mated(n.unsigned_abs()),
        }
    }

    /// Returns true for mate scores.
    pub fn is_mate(self) -> bool {
        matches!(self, Score::Mate(_))
    }
}

impl From<uci::Score> for Score {
    fn from(score: uci::Score) -> Self {
        match score {
            uci::Score::Cp(cp) => Score::Centipawns(cp),
            uci::Score::Mate(n) => Score::Mate(n),
        }
    }
}

/// What a score means for one particular player.
///
/// Ordered from worst to best: being mated sooner is worse than being mated
/// later, every finite score sits between the two mate families, and mating
/// sooner is better than mating later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outlook {
    /// Gets mated in N moves; `Mated(0)` means already checkmated.
    Mated(u32),
    /// Finite advantage in centipawns.
    Centipawns(i32),
    /// Delivers mate in N moves; `Mating(0)` means the opponent is already
    /// checkmated.
    Mating(u32),
}

impl Outlook {
    /// The same situation seen by the opponent.
    pub fn flip(self) -> Self {
        match self {
            Outlook::Mated(n) => Outlook::Mating(n),
            Outlook::Centipawns(cp) => Outlook::Centipawns(cp.saturating_neg()),
            Outlook::Mating(n) => Outlook::Mated(n),
        }
    }

    /// Position on the saturating scale: mate in `n` for is `10000 - n`,
    /// mate in `n` against is `-(10000 - n)`, centipawns are clamped to
    /// `±5000`.
    pub fn value(self) -> i32 {
        match self {
            Outlook::Mating(n) => MATE_VALUE - n.min(MAX_MATE_DISTANCE) as i32,
            Outlook::Mated(n) => -(MATE_VALUE - n.min(MAX_MATE_DISTANCE) as i32),
            Outlook::Centipawns(cp) => cp.clamp(-CENTIPAWN_CAP, CENTIPAWN_CAP),
        }
    }

    /// Returns true if this player has a forced mate.
    pub fn is_winning_mate(self) -> bool {
        matches!(self, Outlook::Mating(_))
    }

    fn rank(self) -> (u8, i64) {
        match self {
            Outlook::Mated(n) => (0, i64::from(n)),
            Outlook::Centipawns(cp) => (1, i64::from(cp)),
            Outlook::Mating(n) => (2, -i64::from(n)),
        }
    }
}

impl Ord for Outlook {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl PartialOrd for Outlook {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Outlook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outlook::Centipawns(cp) => write!(f, "{:+.2}", f64::from(*cp) / 100.0),
            Outlook::Mating(n) => write!(f, "#{}", n),
            Outlook::Mated(n) => write!(f, "#-{}", n),
        }
    }
}

/// Result of analyzing one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Score from the side to move's perspective.
    pub score: Score,
    /// Engine's preferred move, absent in terminal positions.
    pub best_move: Option<String>,
    /// Depth of the search that produced the score.
    pub depth: u32,
    /// Time the search actually took, in milliseconds.
    pub time_ms: u64,
}

impl Evaluation {
    /// The score interpreted for the side to move.
    pub fn outlook(&self) -> Outlook {
        self.score.outlook()
    }

    /// True when the engine reported no legal move.
    pub fn is_terminal(&self) -> bool {
        self.best_move.is_none()
    }
}
