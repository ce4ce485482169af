//! Core types for chess.
//!
//! This crate provides the board-level vocabulary shared by the analysis
//! pipeline:
//! - [`Piece`] and [`Color`] for piece representation
//! - [`FenParser`] for FEN parsing, serialization and canonical fingerprints
//! - [`Material`] for counting the material left on the board

mod color;
mod fen;
mod material;
mod piece;

pub use color::Color;
pub use fen::{FenError, FenParser};
pub use material::Material;
pub use piece::Piece;
