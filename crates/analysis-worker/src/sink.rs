//! JSON file output for analysis reports.
//!
//! Each game report is written to `<output>/games/<game id>.json`; the
//! batch summary goes to `<output>/batch.json`.

use async_trait::async_trait;
use chess_analysis::{BatchReport, GameReport, ReportSink, SinkError};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// File name used for the batch summary.
pub const BATCH_FILE: &str = "batch.json";

/// Subdirectory holding one file per game.
pub const GAMES_DIR: &str = "games";

/// Writes one pretty-printed JSON file per game into a directory.
pub struct JsonDirectorySink {
    dir: PathBuf,
}

impl JsonDirectorySink {
    /// Creates `dir` and its games subdirectory if needed.
    pub async fn create(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(dir.join(GAMES_DIR)).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the report file for `game_id`.
    ///
    /// Characters outside `[A-Za-z0-9._-]` are replaced so an id can never
    /// escape the output directory. An id that had to be changed gets a
    /// hash of the original appended, so distinct ids never share a file.
    pub fn report_path(&self, game_id: &str) -> PathBuf {
        let mut name: String = game_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if name.is_empty() || name.chars().all(|c| c == '.') {
            name = format!("game{name}");
        }
        if name != game_id {
            let mut hasher = DefaultHasher::new();
            game_id.hash(&mut hasher);
            name = format!("{name}-{:08x}", hasher.finish() as u32);
        }
        self.dir.join(GAMES_DIR).join(format!("{name}.json"))
    }

    /// Writes the batch summary and returns its path.
    pub async fn write_batch(&self, batch: &BatchReport) -> Result<PathBuf, SinkError> {
        let path = self.dir.join(BATCH_FILE);
        write_json(&path, batch).await?;
        Ok(path)
    }
}

#[async_trait]
impl ReportSink for JsonDirectorySink {
    async fn store(&self, game_id: &str, report: &GameReport) -> Result<(), SinkError> {
        let path = self.report_path(game_id);
        write_json(&path, report).await?;
        tracing::debug!(game = game_id, path = %path.display(), "report written");
        Ok(())
    }
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), SinkError> {
    let bytes =
        serde_json::to_vec_pretty(value).map_err(|e| SinkError::Encode(e.to_string()))?;
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_analysis::{GameRecord, GameStatus, MoveSequence};

    fn empty_report(id: &str) -> GameReport {
        let sequence = MoveSequence::from_record(GameRecord {
            id: id.to_string(),
            white: "alice".to_string(),
            black: "bob".to_string(),
            start_fen: None,
            moves: Vec::new(),
        })
        .unwrap();
        GameReport::new(&sequence, Vec::new(), None)
    }

    #[tokio::test]
    async fn test_store_writes_one_file_per_game() {
        let temp = tempfile::tempdir().unwrap();
        let sink = JsonDirectorySink::create(temp.path().join("reports"))
            .await
            .unwrap();

        sink.store("game-1", &empty_report("game-1")).await.unwrap();

        let path = sink.dir().join(GAMES_DIR).join("game-1.json");
        let decoded: GameReport =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(decoded.game_id, "game-1");
        assert_eq!(decoded.white, "alice");
        assert_eq!(decoded.status, GameStatus::Complete);
    }

    #[tokio::test]
    async fn test_ids_cannot_escape_the_directory() {
        let temp = tempfile::tempdir().unwrap();
        let sink = JsonDirectorySink::create(temp.path()).await.unwrap();
        let games = temp.path().join(GAMES_DIR);

        for id in ["../../etc/passwd", "..", "", "lichess:abc 12"] {
            let path = sink.report_path(id);
            assert_eq!(path.parent(), Some(games.as_path()), "{id:?}");
        }
        assert!(sink
            .report_path("..")
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("game..-"));
        assert_eq!(sink.report_path("lichess-abc_12"), games.join("lichess-abc_12.json"));
        assert!(sink
            .report_path("lichess:abc 12")
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("lichess_abc_12-"));
    }

    #[tokio::test]
    async fn test_distinct_ids_never_share_a_file() {
        let temp = tempfile::tempdir().unwrap();
        let sink = JsonDirectorySink::create(temp.path()).await.unwrap();

        assert_ne!(sink.report_path("a:b"), sink.report_path("a_b"));
        assert_ne!(sink.report_path("a:b"), sink.report_path("a b"));

        // A game called "batch" does not clobber the summary.
        sink.store("batch", &empty_report("batch")).await.unwrap();
        let path = sink.write_batch(&BatchReport::default()).await.unwrap();
        assert_ne!(sink.report_path("batch"), path);
        assert!(sink.report_path("batch").is_file());
    }

    #[tokio::test]
    async fn test_write_batch() {
        let temp = tempfile::tempdir().unwrap();
        let sink = JsonDirectorySink::create(temp.path()).await.unwrap();
        let mut batch = BatchReport::default();
        batch.insert(empty_report("a"));
        batch.insert(empty_report("b"));

        let path = sink.write_batch(&batch).await.unwrap();
        assert_eq!(path, temp.path().join(BATCH_FILE));
        let decoded: BatchReport =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded.players["alice"].games, 2);
    }

    #[tokio::test]
    async fn test_store_reports_io_errors() {
        let temp = tempfile::tempdir().unwrap();
        let sink = JsonDirectorySink::create(temp.path().join("gone")).await.unwrap();
        std::fs::remove_dir_all(sink.dir()).unwrap();

        let result = sink.store("x", &empty_report("x")).await;
        assert!(matches!(result, Err(SinkError::Io(_))));
    }
}
