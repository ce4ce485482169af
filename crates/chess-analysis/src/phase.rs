//! Game phase segmentation.

use crate::config::PhaseThresholds;
use crate::sequence::{MoveSequence, Position};
use chess_core::Color;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage of the game a move was played in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Opening,
    Middlegame,
    Endgame,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Opening => "opening",
            Phase::Middlegame => "middlegame",
            Phase::Endgame => "endgame",
        };
        f.write_str(name)
    }
}

/// Assigns phases from move number and material, without engine calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseSegmenter {
    thresholds: PhaseThresholds,
}

impl PhaseSegmenter {
    pub fn new(thresholds: PhaseThresholds) -> Self {
        Self { thresholds }
    }

    /// Phase of the position a player faced before moving.
    ///
    /// The opening test runs first, so an early position with little
    /// material is still an opening.
    pub fn phase_of(&self, position: &Position) -> Phase {
        let t = &self.thresholds;
        let material = position.material();
        let move_number = position.fullmove_number();

        let intact = Color::BOTH
            .iter()
            .all(|color| material.lost(*color) <= t.opening_max_material_loss);
        if move_number <= t.opening_max_move && intact {
            return Phase::Opening;
        }

        let thin_material = material.non_pawn_total() < t.endgame_material;
        let late_queenless = move_number > t.queenless_endgame_move && !material.has_queens();
        if thin_material || late_queenless {
            Phase::Endgame
        } else {
            Phase::Middlegame
        }
    }

    /// Phase of every move in the sequence.
    pub fn segment(&self, sequence: &MoveSequence) -> Vec<Phase> {
        sequence
            .plies()
            .map(|(_, before, _)| self.phase_of(before))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(fen: &str) -> Phase {
        PhaseSegmenter::default().phase_of(&Position::from_fen(fen).unwrap())
    }

    #[test]
    fn early_full_material_is_opening() {
        assert_eq!(
            phase("r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 5"),
            Phase::Opening
        );
    }

    #[test]
    fn late_kings_and_pawns_is_endgame() {
        assert_eq!(phase("8/5k2/4p3/3pP3/3P4/4K3/8/8 w - - 0 60"), Phase::Endgame);
    }

    #[test]
    fn early_gambit_leaves_opening() {
        // White is a knight and a pawn down on move 8.
        assert_eq!(
            phase("r1bqkb1r/pppp1ppp/2n2n2/8/2B1P3/8/PPP2PPP/RNBQK2R w KQkq - 0 8"),
            Phase::Middlegame
        );
    }

    #[test]
    fn opening_test_runs_first() {
        let segmenter = PhaseSegmenter::new(PhaseThresholds {
            endgame_material: 70,
            ..Default::default()
        });
        let start = Position::startpos();
        assert_eq!(segmenter.phase_of(&start), Phase::Opening);
    }

    #[test]
    fn queenless_late_game_is_endgame() {
        let fen = "r3kb1r/ppp2ppp/2n2n2/3p4/3P4/2N2N2/PPP2PPP/R3KB1R w KQkq - 0 41";
        assert_eq!(phase(fen), Phase::Endgame);

        let earlier = "r3kb1r/ppp2ppp/2n2n2/3p4/3P4/2N2N2/PPP2PPP/R3KB1R w KQkq - 0 25";
        assert_eq!(phase(earlier), Phase::Middlegame);
    }

    #[test]
    fn thin_material_is_endgame() {
        // Rook and bishop each: 16 non-pawn points in total.
        assert_eq!(
            phase("4k3/pp3r2/2b5/8/8/2B5/PP3R2/4K3 w - - 0 30"),
            Phase::Endgame
        );
    }

    #[test]
    fn segment_uses_position_before_each_move() {
        use crate::sequence::{GameRecord, PlyRecord};

        let sequence = MoveSequence::from_record(GameRecord {
            id: "g".to_string(),
            white: String::new(),
            black: String::new(),
            start_fen: None,
            moves: vec![PlyRecord {
                uci: "e2e4".to_string(),
                san: Some("e4".to_string()),
                fen: "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1".to_string(),
            }],
        })
        .unwrap();
        assert_eq!(PhaseSegmenter::default().segment(&sequence), vec![Phase::Opening]);
    }
}
