//! FEN (Forsyth-Edwards Notation) parsing, serialization and fingerprints.

use crate::{Color, Material, Piece};
use thiserror::Error;

/// Errors that can occur when parsing FEN strings.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum FenError {
    #[error("invalid FEN: expected 4 to 6 parts, got {0}")]
    InvalidPartCount(usize),

    #[error("invalid piece placement: {0}")]
    InvalidPiecePlacement(String),

    #[error("invalid active color: expected 'w' or 'b', got '{0}'")]
    InvalidActiveColor(String),

    #[error("invalid castling rights: {0}")]
    InvalidCastlingRights(String),

    #[error("invalid en passant square: {0}")]
    InvalidEnPassantSquare(String),

    #[error("invalid halfmove clock: {0}")]
    InvalidHalfmoveClock(String),

    #[error("invalid fullmove number: {0}")]
    InvalidFullmoveNumber(String),
}

/// Parsed FEN data.
///
/// The halfmove clock and fullmove number may be omitted (EPD-style four
/// field records); they default to `0` and `1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenParser {
    /// Piece placement string (e.g., "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR")
    pub piece_placement: String,
    /// Side to move
    pub active_color: Color,
    /// Castling availability (e.g., "KQkq", "-")
    pub castling: String,
    /// En passant target square (e.g., "e3", "-")
    pub en_passant: String,
    /// Halfmove clock (for 50-move rule)
    pub halfmove_clock: u32,
    /// Fullmove number
    pub fullmove_number: u32,
}

impl FenParser {
    /// The standard starting position FEN.
    pub const STARTPOS: &'static str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    /// Parses a FEN string.
    pub fn parse(fen: &str) -> Result<Self, FenError> {
        let parts: Vec<&str> = fen.split_whitespace().collect();

        if !(4..=6).contains(&parts.len()) {
            return Err(FenError::InvalidPartCount(parts.len()));
        }

        let piece_placement = parts[0];
        Self::validate_piece_placement(piece_placement)?;

        let active_color = Color::from_fen_field(parts[1])
            .ok_or_else(|| FenError::InvalidActiveColor(parts[1].to_string()))?;

        let castling = parts[2];
        Self::validate_castling(castling)?;

        let en_passant = parts[3];
        Self::validate_en_passant(en_passant)?;

        let halfmove_clock = match parts.get(4) {
            Some(field) => field
                .parse::<u32>()
                .map_err(|_| FenError::InvalidHalfmoveClock(field.to_string()))?,
            None => 0,
        };

        let fullmove_number = match parts.get(5) {
            Some(field) => field
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| FenError::InvalidFullmoveNumber(field.to_string()))?,
            None => 1,
        };

        Ok(FenParser {
            piece_placement: piece_placement.to_string(),
            active_color,
            castling: castling.to_string(),
            en_passant: en_passant.to_string(),
            halfmove_clock,
            fullmove_number,
        })
    }

    fn validate_piece_placement(placement: &str) -> Result<(), FenError> {
        let ranks: Vec<&str> = placement.split('/').collect();
        if ranks.len() != 8 {
            return Err(FenError::InvalidPiecePlacement(format!(
                "expected 8 ranks, got {}",
                ranks.len()
            )));
        }

        for (i, rank) in ranks.iter().enumerate() {
            let mut squares = 0;
            for c in rank.chars() {
                if let Some(empty) = c.to_digit(10) {
                    squares += empty;
                } else if Piece::from_fen_char(c).is_some() {
                    squares += 1;
                } else {
                    return Err(FenError::InvalidPiecePlacement(format!(
                        "invalid character '{}' in rank {}",
                        c,
                        8 - i
                    )));
                }
            }
            if squares != 8 {
                return Err(FenError::InvalidPiecePlacement(format!(
                    "rank {} has {} squares, expected 8",
                    8 - i,
                    squares
                )));
            }
        }

        Ok(())
    }

    fn validate_castling(castling: &str) -> Result<(), FenError> {
        if castling == "-" {
            return Ok(());
        }

        for c in castling.chars() {
            if !"KQkq".contains(c) {
                return Err(FenError::InvalidCastlingRights(format!(
                    "invalid character '{}'",
                    c
                )));
            }
        }

        Ok(())
    }

    fn validate_en_passant(ep: &str) -> Result<(), FenError> {
        if ep == "-" {
            return Ok(());
        }

        let mut chars = ep.chars();
        let valid = match (chars.next(), chars.next(), chars.next()) {
            (Some(file), Some(rank), None) => {
                ('a'..='h').contains(&file) && (rank == '3' || rank == '6')
            }
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(FenError::InvalidEnPassantSquare(ep.to_string()))
        }
    }

    /// Converts the parsed FEN back to a full six-field FEN string.
    pub fn to_fen(&self) -> String {
        format!("{} {}", self.fingerprint(), self.fullmove_number)
    }

    /// Canonical identity of the position for evaluation purposes.
    ///
    /// Covers placement, side to move, castling, en passant and the halfmove
    /// clock. The fullmove number does not change what an engine sees, so it
    /// is left out: transpositions reached at different move numbers share a
    /// fingerprint.
    pub fn fingerprint(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.piece_placement,
            self.active_color.to_fen_char(),
            self.castling,
            self.en_passant,
            self.halfmove_clock
        )
    }

    /// Counts the material in the piece placement.
    pub fn material(&self) -> Material {
        Material::from_placement(&self.piece_placement)
    }
}

impl Default for FenParser {
    fn default() -> Self {
        FenParser {
            piece_placement: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR".to_string(),
            active_color: Color::White,
            castling: "KQkq".to_string(),
            en_passant: "-".to_string(),
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }
}
