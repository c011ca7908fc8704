use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::board::Board;
use crate::piece::{Cell, Color};

/// Append-only ASCII record of a game, one block per position. Purely
/// informational: write failures are logged and swallowed so a full disk
/// never costs a turn.
pub struct GameLog {
    file: File,
    path: PathBuf,
}

impl GameLog {
    /// Create `<dir>/<tag>_<unix-seconds>.txt`, creating the directory if
    /// needed.
    pub fn create(dir: &Path, tag: &str) -> std::io::Result<GameLog> {
        fs::create_dir_all(dir)?;
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let path = dir.join(format!("{tag}_{stamp}.txt"));
        let file = File::create(&path)?;
        Ok(GameLog { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, board: &Board) {
        if let Err(err) = self.file.write_all(render(board).as_bytes()) {
            warn!(path = %self.path.display(), "game log write failed: {err}");
        }
    }

    pub fn finish(&mut self, winner: Option<Color>) {
        let tag = match winner {
            Some(Color::White) => "W",
            Some(Color::Black) => "B",
            None => "D",
        };
        if let Err(err) = writeln!(self.file, "winner: {tag}") {
            warn!(path = %self.path.display(), "game log write failed: {err}");
        }
    }
}

/// One record block: the mover attribution and nine rows of glyphs. Every
/// empty cell collapses to the single `O` glyph, whatever its terrain.
fn render(board: &Board) -> String {
    let mover = match board.last_mover {
        Some(Color::White) => "W",
        Some(Color::Black) => "B",
        None => "I",
    };
    let mut out = format!("moved_by: {mover}\n");
    for row in board.cells.iter() {
        for cell in row {
            out.push(match cell {
                Cell::White => 'W',
                Cell::Black => 'B',
                Cell::King => 'K',
                Cell::Empty => 'O',
            });
        }
        out.push('\n');
    }
    out.push_str("-\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cells_collapse_to_one_glyph() {
        let rendered = render(&Board::empty());
        assert!(rendered.starts_with("moved_by: I\n"));
        let rows: Vec<&str> = rendered.lines().skip(1).take(9).collect();
        assert_eq!(rows.len(), 9);
        for row in rows {
            assert_eq!(row, "OOOOOOOOO", "terrain leaked into the record");
        }
        assert!(rendered.ends_with("-\n"));
    }

    #[test]
    fn pieces_and_mover_are_recorded() {
        let mut board = Board::new();
        board.last_mover = Some(Color::Black);
        let rendered = render(&board);
        assert!(rendered.starts_with("moved_by: B\n"));
        let rows: Vec<&str> = rendered.lines().skip(1).collect();
        assert_eq!(rows[0], "OOOBBBOOO");
        assert_eq!(rows[4], "BBWWKWWBB");
        assert_eq!(rows[2], "OOOOWOOOO");
    }
}
