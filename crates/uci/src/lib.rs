//! UCI (Universal Chess Interface) protocol types for driving an engine.
//!
//! This crate covers the GUI side of the protocol: formatting the commands
//! sent to an engine subprocess and parsing the lines it writes back.
//!
//! # Commands sent to the engine
//!
//! - `uci` - Initialize engine, get id and options
//! - `setoption name <name> [value <value>]` - Configure the engine
//! - `isready` / `readyok` - Synchronization
//! - `position fen <fen> [moves <move>...]` - Set position
//! - `go [movetime <ms>] [depth <d>]` - Start search
//! - `quit` - Exit engine
//!
//! # Messages read from the engine
//!
//! - `id name <name>` / `id author <author>`
//! - `uciok`, `readyok`
//! - `info ...` with depth, score, nodes and principal variation
//! - `bestmove <move> [ponder <move>]`

mod command;
mod info;

pub use command::{GoOptions, GuiCommand};
pub use info::{Bound, EngineInfo, Score};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UciError {
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Messages sent from engine to GUI.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    /// Engine identification.
    Id {
        name: Option<String>,
        author: Option<String>,
    },
    /// UCI initialization complete.
    UciOk,
    /// Engine is ready.
    ReadyOk,
    /// Search information.
    Info(EngineInfo),
    /// Best move found. `None` when the engine answers `bestmove (none)`
    /// for a position without legal moves.
    BestMove {
        mv: Option<String>,
        ponder: Option<String>,
    },
    /// Anything else (`option` declarations, copyright banners, ...).
    Unknown(String),
}

impl EngineMessage {
    /// Parse one line of engine output.
    ///
    /// Unrecognized lines become [`EngineMessage::Unknown`]; only lines that
    /// claim to be a known message but are malformed produce an error.
    pub fn parse(line: &str) -> Result<Self, UciError> {
        let line = line.trim();
        let mut parts = line.split_whitespace();

        match parts.next().unwrap_or("") {
            "uciok" => Ok(EngineMessage::UciOk),
            "readyok" => Ok(EngineMessage::ReadyOk),
            "id" => {
                let rest = |prefix: &str| {
                    line.strip_prefix(prefix)
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                };
                match parts.next() {
                    Some("name") => Ok(EngineMessage::Id {
                        name: rest("id name"),
                        author: None,
                    }),
                    Some("author") => Ok(EngineMessage::Id {
                        name: None,
                        author: rest("id author"),
                    }),
                    _ => Ok(EngineMessage::Unknown(line.to_string())),
                }
            }
            "info" => EngineInfo::parse(line)
                .map(EngineMessage::Info)
                .ok_or_else(|| UciError::ParseError(line.to_string())),
            "bestmove" => {
                let mv = match parts.next() {
                    Some("(none)") | Some("0000") => None,
                    Some(mv) => Some(mv.to_string()),
                    None => {
                        return Err(UciError::ParseError(
                            "bestmove without a move".to_string(),
                        ))
                    }
                };
                let ponder = match (parts.next(), parts.next()) {
                    (Some("ponder"), Some(p)) => Some(p.to_string()),
                    _ => None,
                };
                Ok(EngineMessage::BestMove { mv, ponder })
            }
            _ => Ok(EngineMessage::Unknown(line.to_string())),
        }
    }
}
