//! Chess piece kinds and their material values.

use crate::Color;

/// The six types of chess pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Piece {
    Pawn = 0,
    Knight = 1,
    Bishop = 2,
    Rook = 3,
    Queen = 4,
    King = 5,
}

impl Piece {
    /// All piece types in order.
    pub const ALL: [Piece; 6] = [
        Piece::Pawn,
        Piece::Knight,
        Piece::Bishop,
        Piece::Rook,
        Piece::Queen,
        Piece::King,
    ];

    /// Returns the index of this piece type (0-5).
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Conventional material value in pawn units. The king has no material value.
    #[inline]
    pub const fn value(self) -> u32 {
        match self {
            Piece::Pawn => 1,
            Piece::Knight | Piece::Bishop => 3,
            Piece::Rook => 5,
            Piece::Queen => 9,
            Piece::King => 0,
        }
    }

    /// Parses a FEN character into a piece and color.
    pub const fn from_fen_char(c: char) -> Option<(Piece, Color)> {
        let color = if c.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        let piece = match c.to_ascii_lowercase() {
            'p' => Piece::Pawn,
            'n' => Piece::Knight,
            'b' => Piece::Bishop,
            'r' => Piece::Rook,
            'q' => Piece::Queen,
            'k' => Piece::King,
            _ => return None,
        };
        Some((piece, color))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn piece_from_fen() {
        assert_eq!(Piece::from_fen_char('Q'), Some((Piece::Queen, Color::White)));
        assert_eq!(Piece::from_fen_char('r'), Some((Piece::Rook, Color::Black)));
        assert_eq!(Piece::from_fen_char('n'), Some((Piece::Knight, Color::Black)));
        assert_eq!(Piece::from_fen_char('x'), None);
        assert_eq!(Piece::from_fen_char('/'), None);
    }

    #[test]
    fn material_values() {
        let army: u32 = [
            (Piece::Pawn, 8),
            (Piece::Knight, 2),
            (Piece::Bishop, 2),
            (Piece::Rook, 2),
            (Piece::Queen, 1),
            (Piece::King, 1),
        ]
        .iter()
        .map(|(piece, count)| piece.value() * count)
        .sum();
        assert_eq!(army, 39);
    }
}
