//! UCI command formatting.

/// Commands sent from GUI to engine.
#[derive(Debug, Clone, PartialEq)]
pub enum GuiCommand {
    /// Initialize UCI mode.
    Uci,
    /// Check if engine is ready.
    IsReady,
    /// Set an engine option.
    SetOption { name: String, value: Option<String> },
    /// Set up position. `fen: None` means the standard starting position.
    Position {
        fen: Option<String>,
        moves: Vec<String>,
    },
    /// Start calculating.
    Go(GoOptions),
    /// Quit the engine.
    Quit,
}

/// Options for the `go` command.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GoOptions {
    /// Search for exactly this time in milliseconds.
    pub movetime: Option<u64>,
    /// Search to this depth.
    pub depth: Option<u32>,
}

impl GuiCommand {
    /// Format the command as a single protocol line (without newline).
    pub fn to_uci(&self) -> String {
        match self {
            GuiCommand::Uci => "uci".to_string(),
            GuiCommand::IsReady => "isready".to_string(),
            GuiCommand::SetOption { name, value } => match value {
                Some(v) => format!("setoption name {} value {}", name, v),
                None => format!("setoption name {}", name),
            },
            GuiCommand::Position { fen, moves } => {
                let mut line = match fen {
                    Some(f) => format!("position fen {}", f),
                    None => "position startpos".to_string(),
                };
                if !moves.is_empty() {
                    line.push_str(" moves ");
                    line.push_str(&moves.join(" "));
                }
                line
            }
            GuiCommand::Go(opts) => opts.to_uci(),
            GuiCommand::Quit => "quit".to_string(),
        }
    }
}

impl GoOptions {
    fn to_uci(&self) -> String {
        let mut parts = vec!["go".to_string()];
        if let Some(ms) = self.movetime {
            parts.push(format!("movetime {}", ms));
        }
        if let Some(d) = self.depth {
            parts.push(format!("depth {}", d));
        }
        parts.join(" ")
    }
}
