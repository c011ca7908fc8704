use std::io::{Read, Write};
use std::net::TcpStream;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::board::Board;
use crate::engine::Agent;
use crate::gamelog::GameLog;
use crate::moves::Move;
use crate::piece::{Cell, Color, BOARD_SIZE};

/// Connection ports fixed by the match server, one per color.
pub const WHITE_PORT: u16 = 5800;
pub const BLACK_PORT: u16 = 5801;

/// No legitimate message comes close to this; anything larger means the
/// stream is out of sync.
const MAX_FRAME_LEN: i32 = 1 << 20;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("server i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed server message: {0}")]
    Protocol(String),
    #[error("illegal incoming position: {0}")]
    IllegalPosition(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Protocol(err.to_string())
    }
}

#[derive(Deserialize)]
struct ServerState {
    board: Vec<Vec<String>>,
    turn: String,
}

#[derive(Serialize)]
struct ServerMove {
    from: String,
    to: String,
    turn: String,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GameResult {
    WhiteWin,
    BlackWin,
    Draw,
}

impl GameResult {
    pub fn winner(&self) -> Option<Color> {
        match self {
            GameResult::WhiteWin => Some(Color::White),
            GameResult::BlackWin => Some(Color::Black),
            GameResult::Draw => None,
        }
    }
}

enum TurnState {
    ToMove(Color),
    Over(GameResult),
}

fn parse_turn(turn: &str) -> Result<TurnState, ClientError> {
    match turn {
        "WHITE" => Ok(TurnState::ToMove(Color::White)),
        "BLACK" => Ok(TurnState::ToMove(Color::Black)),
        "WHITEWIN" => Ok(TurnState::Over(GameResult::WhiteWin)),
        "BLACKWIN" => Ok(TurnState::Over(GameResult::BlackWin)),
        "DRAW" => Ok(TurnState::Over(GameResult::Draw)),
        other => Err(ClientError::Protocol(format!(
            "unknown turn value {other:?}"
        ))),
    }
}

/// Every message in both directions is a 4-byte big-endian length followed
/// by that many bytes of UTF-8 JSON (the name announcement is plain text).
fn read_frame<R: Read>(reader: &mut R) -> Result<String, ClientError> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes)?;
    let len = i32::from_be_bytes(len_bytes);
    if !(0..=MAX_FRAME_LEN).contains(&len) {
        return Err(ClientError::Protocol(format!(
            "frame length {len} out of range"
        )));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    String::from_utf8(payload)
        .map_err(|err| ClientError::Protocol(format!("frame is not UTF-8: {err}")))
}

fn write_frame<W: Write>(writer: &mut W, payload: &str) -> Result<(), ClientError> {
    writer.write_all(&(payload.len() as i32).to_be_bytes())?;
    writer.write_all(payload.as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Translate one server cell string. WHITE/BLACK/KING carry occupants;
/// EMPTY and THRONE are both vacant — terrain comes from coordinates alone,
/// never from the server.
fn convert_cell(value: &str) -> Result<Cell, ClientError> {
    match value {
        "WHITE" => Ok(Cell::White),
        "BLACK" => Ok(Cell::Black),
        "KING" => Ok(Cell::King),
        "EMPTY" | "THRONE" => Ok(Cell::Empty),
        other => Err(ClientError::Protocol(format!(
            "unknown cell value {other:?}"
        ))),
    }
}

pub fn convert_board(rows: &[Vec<String>], last_mover: Option<Color>) -> Result<Board, ClientError> {
    if rows.len() != BOARD_SIZE || rows.iter().any(|row| row.len() != BOARD_SIZE) {
        return Err(ClientError::Protocol("board is not 9x9".into()));
    }
    let mut board = Board::empty();
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            board.cells[r][c] = convert_cell(value)?;
        }
    }
    board.last_mover = last_mover;
    Ok(board)
}

/// A connected match-server session for one side.
pub struct Client {
    stream: TcpStream,
    color: Color,
    log: Option<GameLog>,
}

impl Client {
    /// Connect to the color's port and announce the player name.
    pub fn connect(
        host: &str,
        color: Color,
        name: &str,
        log: Option<GameLog>,
    ) -> Result<Client, ClientError> {
        let port = match color {
            Color::White => WHITE_PORT,
            Color::Black => BLACK_PORT,
        };
        info!(host, port, name, "connecting to match server");
        let stream = TcpStream::connect((host, port))?;
        let mut client = Client { stream, color, log };
        write_frame(&mut client.stream, name)?;
        Ok(client)
    }

    /// Run the game to completion: answer every state where it is our turn,
    /// ignore the rest, stop on the server's verdict.
    pub fn play(&mut self, agent: &mut Agent) -> Result<GameResult, ClientError> {
        let mut expected: Option<Board> = None;
        let mut first_state = true;
        loop {
            let raw = read_frame(&mut self.stream)?;
            let state: ServerState = serde_json::from_str(&raw)?;
            let to_move = match parse_turn(&state.turn)? {
                TurnState::Over(result) => {
                    if let Some(log) = &mut self.log {
                        log.finish(result.winner());
                    }
                    info!(?result, "game over");
                    return Ok(result);
                }
                TurnState::ToMove(color) => color,
            };

            let last_mover = if first_state {
                None
            } else {
                Some(to_move.opposite())
            };
            first_state = false;
            let board = convert_board(&state.board, last_mover)?;

            if to_move != self.color {
                // the state right after our own move must echo the position
                // we predicted locally
                if let Some(predicted) = expected.take() {
                    if predicted.cells != board.cells {
                        return Err(ClientError::IllegalPosition(
                            "server position diverged from our applied move".into(),
                        ));
                    }
                }
                debug!("opponent to move");
                continue;
            }

            expected = None;
            board.validate().map_err(ClientError::IllegalPosition)?;
            if let Some(log) = &mut self.log {
                log.append(&board);
            }
            match agent.choose_move(&board) {
                Some(m) => {
                    info!(from = %m.from_square(), to = %m.to_square(), "playing");
                    self.send_move(&m)?;
                    let next = board.apply_move(&m);
                    if let Some(log) = &mut self.log {
                        log.append(&next);
                    }
                    expected = Some(next);
                }
                None => {
                    // conceded: keep reading until the server announces it
                    info!("no legal moves left, awaiting the verdict");
                }
            }
        }
    }

    fn send_move(&mut self, m: &Move) -> Result<(), ClientError> {
        let turn = match self.color {
            Color::White => "W",
            Color::Black => "B",
        };
        let payload = serde_json::to_string(&ServerMove {
            from: m.from_square(),
            to: m.to_square(),
            turn: turn.to_string(),
        })?;
        write_frame(&mut self.stream, &payload)
    }
}
