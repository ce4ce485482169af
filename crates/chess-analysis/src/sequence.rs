//! Games as immutable move sequences.
//!
//! A [`MoveSequence`] is built once from a [`GameRecord`] and only read
//! afterwards. It holds `n + 1` positions for `n` played moves: the starting
//! position followed by the position after each move.

use chess_core::{Color, FenError, FenParser, Material};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A FEN string that could not be turned into a [`Position`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid position '{fen}': {source}")]
pub struct PositionError {
    pub fen: String,
    #[source]
    pub source: FenError,
}

/// Reasons a game record cannot become a [`MoveSequence`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SequenceError {
    #[error("game '{game}': invalid start position: {source}")]
    InvalidStart {
        game: String,
        #[source]
        source: PositionError,
    },

    #[error("game '{game}', ply {ply}: {source}")]
    InvalidPosition {
        game: String,
        ply: usize,
        #[source]
        source: PositionError,
    },

    #[error("game '{game}', ply {ply}: '{notation}' is not a UCI move")]
    InvalidMove {
        game: String,
        ply: usize,
        notation: String,
    },

    #[error("game '{game}', ply {ply}: {expected} should be to move after the move, found {found}")]
    SideToMove {
        game: String,
        ply: usize,
        expected: Color,
        found: Color,
    },
}

/// A board state identified by its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    fen: String,
    fingerprint: String,
    side_to_move: Color,
    fullmove_number: u32,
    material: Material,
}

impl Position {
    /// Parses a position from FEN. Four-field (EPD style) input is accepted
    /// and normalized to six fields.
    pub fn from_fen(fen: &str) -> Result<Self, PositionError> {
        let parsed = FenParser::parse(fen).map_err(|source| PositionError {
            fen: fen.to_string(),
            source,
        })?;
        Ok(Self {
            fen: parsed.to_fen(),
            fingerprint: parsed.fingerprint(),
            side_to_move: parsed.active_color,
            fullmove_number: parsed.fullmove_number,
            material: parsed.material(),
        })
    }

    /// The standard starting position.
    pub fn startpos() -> Self {
        let parsed = FenParser::default();
        Self {
            fen: parsed.to_fen(),
            fingerprint: parsed.fingerprint(),
            side_to_move: parsed.active_color,
            fullmove_number: parsed.fullmove_number,
            material: parsed.material(),
        }
    }

    /// Full six-field FEN, as sent to engines.
    pub fn fen(&self) -> &str {
        &self.fen
    }

    /// Canonical identity of the position (the first five FEN fields).
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    pub fn fullmove_number(&self) -> u32 {
        self.fullmove_number
    }

    pub fn material(&self) -> &Material {
        &self.material
    }
}

/// One move of a game, as played.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedMove {
    /// Zero-based index of the move within the game.
    pub ply: usize,
    /// Full-move number of the position the move was played from.
    pub move_number: u32,
    /// Player who made the move.
    pub color: Color,
    /// Long algebraic notation (e.g. "e2e4", "e7e8q").
    pub uci: String,
    /// Standard algebraic notation, when the record carried it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub san: Option<String>,
}

/// A single ply in a [`GameRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlyRecord {
    /// The move in UCI notation.
    pub uci: String,
    /// The move in SAN, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub san: Option<String>,
    /// Position after the move.
    pub fen: String,
}

/// An already-parsed game as handed over by the ingestion side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: String,
    #[serde(default)]
    pub white: String,
    #[serde(default)]
    pub black: String,
    /// Starting position; the standard one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_fen: Option<String>,
    pub moves: Vec<PlyRecord>,
}

/// An immutable game: positions plus the moves connecting them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveSequence {
    id: String,
    white: String,
    black: String,
    positions: Vec<Position>,
    moves: Vec<PlayedMove>,
}

impl MoveSequence {
    /// Validates a record and builds the sequence.
    ///
    /// Every FEN must parse, every move must look like UCI notation, and the
    /// side to move must alternate. Move legality is the ingestion side's
    /// responsibility and is not re-checked here.
    pub fn from_record(record: GameRecord) -> Result<Self, SequenceError> {
        let GameRecord {
            id,
            white,
            black,
            start_fen,
            moves: plies,
        } = record;

        let start = match start_fen {
            Some(fen) => Position::from_fen(&fen).map_err(|source| SequenceError::InvalidStart {
                game: id.clone(),
                source,
            })?,
            None => Position::startpos(),
        };

        let mut positions = Vec::with_capacity(plies.len() + 1);
        let mut moves = Vec::with_capacity(plies.len());
        positions.push(start);

        for (ply, record) in plies.into_iter().enumerate() {
            if !is_uci_move(&record.uci) {
                return Err(SequenceError::InvalidMove {
                    game: id,
                    ply,
                    notation: record.uci,
                });
            }

            let after =
                Position::from_fen(&record.fen).map_err(|source| SequenceError::InvalidPosition {
                    game: id.clone(),
                    ply,
                    source,
                })?;

            let (mover, move_number) = match positions.last() {
                Some(before) => (before.side_to_move(), before.fullmove_number()),
                None => (Color::White, 1),
            };
            if after.side_to_move() != mover.opposite() {
                return Err(SequenceError::SideToMove {
                    game: id,
                    ply,
                    expected: mover.opposite(),
                    found: after.side_to_move(),
                });
            }

            moves.push(PlayedMove {
                ply,
                move_number,
                color: mover,
                uci: record.uci,
                san: record.san,
            });
            positions.push(after);
        }

        Ok(Self {
            id,
            white,
            black,
            positions,
            moves,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn white(&self) -> &str {
        &self.white
    }

    pub fn black(&self) -> &str {
        &self.black
    }

    /// Name of the player with the given color.
    pub fn player(&self, color: Color) -> &str {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    /// All positions, starting position first.
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn moves(&self) -> &[PlayedMove] {
        &self.moves
    }

    /// The position before the first move.
    pub fn initial_position(&self) -> &Position {
        // Construction always pushes the start position.
        &self.positions[0]
    }

    /// Each move with the positions before and after it.
    pub fn plies(&self) -> impl Iterator<Item = (&PlayedMove, &Position, &Position)> {
        self.moves
            .iter()
            .zip(self.positions.windows(2))
            .map(|(mv, pair)| (mv, &pair[0], &pair[1]))
    }

    /// Number of moves played.
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

impl TryFrom<GameRecord> for MoveSequence {
    type Error = SequenceError;

    fn try_from(record: GameRecord) -> Result<Self, Self::Error> {
        Self::from_record(record)
    }
}

fn is_uci_move(notation: &str) -> bool {
    let bytes = notation.as_bytes();
    let square =
        |file: u8, rank: u8| (b'a'..=b'h').contains(&file) && (b'1'..=b'8').contains(&rank);
    match bytes.len() {
        4 => square(bytes[0], bytes[1]) && square(bytes[2], bytes[3]),
        5 => {
            square(bytes[0], bytes[1])
                && square(bytes[2], bytes[3])
                && matches!(bytes[4], b'q' | b'r' | b'b' | b'n')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AFTER_E4: &str = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
    const AFTER_E5: &str = "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq e6 0 2";

    fn ply(uci: &str, fen: &str) -> PlyRecord {
        PlyRecord {
            uci: uci.to_string(),
            san: None,
            fen: fen.to_string(),
        }
    }

    fn record(moves: Vec<PlyRecord>) -> GameRecord {
        GameRecord {
            id: "g1".to_string(),
            white: "alice".to_string(),
            black: "bob".to_string(),
            start_fen: None,
            moves,
        }
    }

    #[test]
    fn builds_sequence_from_record() {
        let sequence =
            MoveSequence::from_record(record(vec![ply("e2e4", AFTER_E4), ply("e7e5", AFTER_E5)]))
                .unwrap();

        assert_eq!(sequence.len(), 2);
        assert_eq!(sequence.positions().len(), 3);
        assert_eq!(sequence.initial_position(), &Position::startpos());

        let moves = sequence.moves();
        assert_eq!(moves[0].color, Color::White);
        assert_eq!(moves[0].move_number, 1);
        assert_eq!(moves[1].color, Color::Black);
        assert_eq!(moves[1].move_number, 1);
        assert_eq!(moves[1].ply, 1);
        assert_eq!(sequence.player(Color::Black), "bob");
    }

    #[test]
    fn plies_pair_positions() {
        let sequence =
            MoveSequence::from_record(record(vec![ply("e2e4", AFTER_E4), ply("e7e5", AFTER_E5)]))
                .unwrap();
        let plies: Vec<_> = sequence.plies().collect();
        assert_eq!(plies.len(), 2);
        assert_eq!(plies[0].1.side_to_move(), Color::White);
        assert_eq!(plies[0].2.fen(), AFTER_E4);
        assert_eq!(plies[1].2.fullmove_number(), 2);
    }

    #[test]
    fn fingerprint_ignores_fullmove_number() {
        let a = Position::from_fen("8/8/4k3/8/8/4K3/8/8 w - - 4 30").unwrap();
        let b = Position::from_fen("8/8/4k3/8/8/4K3/8/8 w - - 4 61").unwrap();
        let c = Position::from_fen("8/8/4k3/8/8/4K3/8/8 w - - 5 30").unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn epd_style_fen_is_normalized() {
        let position = Position::from_fen("8/8/4k3/8/8/4K3/8/8 b - -").unwrap();
        assert_eq!(position.fen(), "8/8/4k3/8/8/4K3/8/8 b - - 0 1");
        assert_eq!(position.side_to_move(), Color::Black);
    }

    #[test]
    fn rejects_bad_fen() {
        let err = MoveSequence::from_record(record(vec![ply("e2e4", "not a fen")])).unwrap_err();
        assert!(matches!(err, SequenceError::InvalidPosition { ply: 0, .. }));
    }

    #[test]
    fn rejects_bad_start_fen() {
        let mut game = record(vec![]);
        game.start_fen = Some("8/8/8 w - - 0 1".to_string());
        let err = MoveSequence::from_record(game).unwrap_err();
        assert!(matches!(err, SequenceError::InvalidStart { .. }));
    }

    #[test]
    fn rejects_non_alternating_sides() {
        let err =
            MoveSequence::from_record(record(vec![ply("e2e4", AFTER_E4), ply("e7e5", AFTER_E4)]))
                .unwrap_err();
        assert_eq!(
            err,
            SequenceError::SideToMove {
                game: "g1".to_string(),
                ply: 1,
                expected: Color::White,
                found: Color::Black,
            }
        );
    }

    #[test]
    fn rejects_malformed_moves() {
        for notation in ["", "e2", "e2e9", "0000", "e7e8k", "Nf3"] {
            let err = MoveSequence::from_record(record(vec![ply(notation, AFTER_E4)])).unwrap_err();
            assert!(
                matches!(err, SequenceError::InvalidMove { .. }),
                "{} accepted",
                notation
            );
        }
        assert!(is_uci_move("e7e8q"));
    }

    #[test]
    fn empty_game_has_only_the_start() {
        let sequence = MoveSequence::from_record(record(vec![])).unwrap();
        assert!(sequence.is_empty());
        assert_eq!(sequence.positions().len(), 1);
        assert_eq!(sequence.plies().count(), 0);
    }

    #[test]
    fn record_deserializes_with_defaults() {
        let json = r#"{"id":"x","moves":[{"uci":"e2e4","fen":"rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"}]}"#;
        let game: GameRecord = serde_json::from_str(json).unwrap();
        assert_eq!(game.white, "");
        assert_eq!(game.start_fen, None);
        assert_eq!(game.moves[0].san, None);
        assert!(MoveSequence::try_from(game).is_ok());
    }
}
