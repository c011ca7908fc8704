use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;

use tablut::board::Board;
use tablut::engine::{Agent, EngineConfig};
use tablut::gamelog::GameLog;
use tablut::piece::Color;
use tablut::scorer::MaterialScorer;

const GAMES_PER_SIDE: usize = 2;
const MAX_PLIES: u32 = 150;
const RECORD_DIR: &str = "records";

/// Play one full game, agent on one side, uniformly random legal moves on
/// the other. Returns the winner, or None when the move cap is hit.
fn play_game(agent_side: Color, rng: &mut impl Rng, log: &mut GameLog) -> Option<Color> {
    let mut board = Board::new();
    let mut agent = Agent::new(agent_side, Box::new(MaterialScorer), EngineConfig::default());
    let mut side = Color::White;
    log.append(&board);

    for _ in 0..MAX_PLIES {
        let m = if side == agent_side {
            agent.choose_move(&board)
        } else {
            board.generate_moves(side).choose(rng).copied()
        };
        let Some(m) = m else {
            // the stuck side loses
            return Some(side.opposite());
        };
        board = board.apply_move(&m);
        log.append(&board);
        if let Some(winner) = board.winner_after(&m) {
            return Some(winner);
        }
        side = side.opposite();
    }
    None
}

fn main() {
    let mut rng = rand::thread_rng();
    println!("=== Tablut self-play: agent vs random ===");
    println!("Games per side: {GAMES_PER_SIDE}, move cap: {MAX_PLIES} plies\n");

    for agent_side in [Color::White, Color::Black] {
        let mut wins = 0;
        let mut losses = 0;
        let mut draws = 0;
        for game in 0..GAMES_PER_SIDE {
            let tag = format!("selfplay_{agent_side:?}_{game}").to_lowercase();
            let mut log = match GameLog::create(Path::new(RECORD_DIR), &tag) {
                Ok(log) => log,
                Err(err) => {
                    eprintln!("cannot create game record: {err}");
                    return;
                }
            };
            let winner = play_game(agent_side, &mut rng, &mut log);
            log.finish(winner);
            match winner {
                Some(w) if w == agent_side => wins += 1,
                Some(_) => losses += 1,
                None => draws += 1,
            }
            let outcome = match winner {
                Some(Color::White) => "white wins",
                Some(Color::Black) => "black wins",
                None => "draw (move cap)",
            };
            println!("  [agent as {agent_side:?}] game {}: {outcome}", game + 1);
        }
        println!("  totals as {agent_side:?}: {wins} wins, {losses} losses, {draws} draws\n");
    }
}
