//! Material counting.

use crate::{Color, Piece};

/// Piece counts per side, read from a FEN piece placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Material {
    counts: [[u8; 6]; 2],
}

impl Material {
    /// Material value of a full army in pawn units.
    pub const STARTING_TOTAL: u32 = 39;

    /// Counts pieces in a piece-placement field. Unknown characters are ignored.
    pub fn from_placement(placement: &str) -> Self {
        let mut material = Material::default();
        for c in placement.chars() {
            if let Some((piece, color)) = Piece::from_fen_char(c) {
                let slot = &mut material.counts[color.index()][piece.index()];
                *slot = slot.saturating_add(1);
            }
        }
        material
    }

    /// Number of pieces of the given kind and color.
    #[inline]
    pub fn count(&self, color: Color, piece: Piece) -> u32 {
        u32::from(self.counts[color.index()][piece.index()])
    }

    /// Total material of one side in pawn units, pawns included.
    pub fn total(&self, color: Color) -> u32 {
        Piece::ALL
            .iter()
            .map(|piece| piece.value() * self.count(color, *piece))
            .sum()
    }

    /// Material of one side excluding pawns.
    pub fn non_pawn(&self, color: Color) -> u32 {
        self.total(color) - self.count(color, Piece::Pawn)
    }

    /// Non-pawn material of both sides combined.
    pub fn non_pawn_total(&self) -> u32 {
        self.non_pawn(Color::White) + self.non_pawn(Color::Black)
    }

    /// Material one side is missing relative to a full army. Promotions can
    /// push a side above the starting total; that counts as nothing lost.
    pub fn lost(&self, color: Color) -> u32 {
        Self::STARTING_TOTAL.saturating_sub(self.total(color))
    }

    /// True when at least one queen is still on the board.
    pub fn has_queens(&self) -> bool {
        self.count(Color::White, Piece::Queen) + self.count(Color::Black, Piece::Queen) > 0
    }
}
