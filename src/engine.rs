// =============================================================================
// Tablut decision engine
//
// Two cooperating move selectors. The scorer-greedy path ranks every legal
// successor with the injected positional scorer and takes the extreme
// (maximum for White, minimum for Black). The tree path grows a fixed-depth
// search tree that only looks at terminal indicators: a move that wins for
// the engine scores +1, one that loses scores -100, and interior values are
// the maximum over our own choices but the MEAN over opponent replies. The
// averaging opponent is deliberate — it rewards lines whose replies are
// broadly good instead of assuming perfect defence — and must not be
// replaced with strict minimax.
//
// The Agent arbitrates per turn: greedy during the opening warmup, greedy
// for Black while the King still sits on the castle, otherwise the tree's
// best child when the root value clears the configured threshold.
// =============================================================================

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::board::{orthogonally_adjacent, Board};
use crate::moves::Move;
use crate::piece::{Color, CASTLE};
use crate::scorer::Scorer;

// =============================================================================
// Configuration
// =============================================================================

/// Knobs of the decision policy. Defaults reproduce tournament play.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Search horizon in plies.
    pub depth: u32,
    /// Plies of pure scorer-greedy play before the tree is consulted.
    pub warmup_white: u32,
    pub warmup_black: u32,
    /// Minimum root value for the tree's move to be adopted.
    pub threshold_white: f64,
    pub threshold_black: f64,
    /// Per-move wall-clock budget. When a tree search eats more than half of
    /// it, later turns stay on the scorer-greedy path.
    pub time_budget: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            depth: 3,
            warmup_white: 4,
            warmup_black: 4,
            threshold_white: 0.0,
            threshold_black: 0.0,
            time_budget: None,
        }
    }
}

impl EngineConfig {
    fn warmup(&self, side: Color) -> u32 {
        match side {
            Color::White => self.warmup_white,
            Color::Black => self.warmup_black,
        }
    }

    fn threshold(&self, side: Color) -> f64 {
        match side {
            Color::White => self.threshold_white,
            Color::Black => self.threshold_black,
        }
    }
}

// =============================================================================
// Search tree
// =============================================================================

struct Node {
    board: Board,
    to_move: Color,
    depth: u32,
    score: f64,
    children: Vec<Node>,
    /// Move that produced this position; None at the root.
    leading_move: Option<Move>,
}

impl Node {
    fn expand(&mut self, horizon: u32) {
        let moves = ordered_moves(&self.board, self.to_move, self.depth, horizon);
        self.children = moves
            .into_iter()
            .map(|m| Node {
                board: self.board.apply_move(&m),
                to_move: self.to_move.opposite(),
                depth: self.depth + 1,
                score: 0.0,
                children: Vec::new(),
                leading_move: Some(m),
            })
            .collect();
    }
}

pub struct Tree {
    root: Node,
    engine_side: Color,
    horizon: u32,
    pub nodes_visited: u64,
}

impl Tree {
    pub fn new(board: Board, engine_side: Color, horizon: u32) -> Tree {
        Tree {
            root: Node {
                board,
                to_move: engine_side,
                depth: 0,
                score: 0.0,
                children: Vec::new(),
                leading_move: None,
            },
            engine_side,
            horizon,
            nodes_visited: 0,
        }
    }

    pub fn search(&mut self) {
        let side = self.engine_side;
        let horizon = self.horizon;
        Self::search_node(&mut self.root, side, horizon, &mut self.nodes_visited);
    }

    /// Depth-first expansion. Returns true when the node's leading move wins
    /// outright for the engine, which lets even-depth ancestors (our own
    /// choice points) stop scanning further siblings.
    fn search_node(node: &mut Node, engine_side: Color, horizon: u32, visited: &mut u64) -> bool {
        *visited += 1;

        let mut white_wins = false;
        let mut black_wins = false;
        if let Some(m) = node.leading_move {
            black_wins = node.board.king_captured(m.to);
            white_wins = node.board.king_escaped(m.to);
            let (won, lost) = match engine_side {
                Color::White => (white_wins, black_wins),
                Color::Black => (black_wins, white_wins),
            };
            if won {
                node.score = 1.0;
            } else if lost {
                node.score = -100.0;
            }
        }

        let engine_won = match engine_side {
            Color::White => white_wins,
            Color::Black => black_wins,
        };
        if white_wins || black_wins {
            if node.depth == 1 {
                node.score *= 5.0;
            }
            return engine_won;
        }

        if node.depth < horizon {
            node.expand(horizon);
            let at_own_choice = node.depth % 2 == 0;
            for i in 0..node.children.len() {
                let won = Self::search_node(&mut node.children[i], engine_side, horizon, visited);
                if won && at_own_choice {
                    break;
                }
            }
            if !node.children.is_empty() {
                node.score = if node.to_move == engine_side {
                    node.children
                        .iter()
                        .map(|c| c.score)
                        .fold(f64::NEG_INFINITY, f64::max)
                } else {
                    node.children.iter().map(|c| c.score).sum::<f64>()
                        / node.children.len() as f64
                };
            }
        }

        // a candidate of ours that leaves the opponent without a reply is a
        // forced stalemate win; amplify it
        if node.depth == 1 && node.children.is_empty() {
            node.score *= 5.0;
        }
        false
    }

    pub fn root_score(&self) -> f64 {
        self.root.score
    }

    /// Best root child by score, first generated on ties.
    pub fn best_move(&self) -> Option<Move> {
        let mut best: Option<&Node> = None;
        for child in &self.root.children {
            if best.map_or(true, |b| child.score > b.score) {
                best = Some(child);
            }
        }
        best.and_then(|n| n.leading_move)
    }
}

// =============================================================================
// Move ordering
// =============================================================================

/// Candidate moves for a node, most tactically relevant first.
///
/// White examines King moves before soldier moves; Black examines moves that
/// land beside the King first. On the last ply before the horizon only those
/// candidates are kept at all: the King for White, King-adjacent landings for
/// Black (possibly none).
fn ordered_moves(board: &Board, side: Color, depth: u32, horizon: u32) -> Vec<Move> {
    let last_ply = depth + 1 == horizon;
    let king = board.king_position();
    match side {
        Color::White => {
            if last_ply {
                return match king {
                    Some((r, c)) => board.moves_for_piece(r, c),
                    None => Vec::new(),
                };
            }
            let (mut king_moves, soldier_moves): (Vec<Move>, Vec<Move>) = board
                .generate_moves(side)
                .into_iter()
                .partition(|m| Some(m.from) == king);
            king_moves.extend(soldier_moves);
            king_moves
        }
        Color::Black => {
            let beside_king =
                |m: &Move| king.map_or(false, |k| orthogonally_adjacent(m.to, k));
            let moves = board.generate_moves(side);
            if last_ply {
                return moves.into_iter().filter(beside_king).collect();
            }
            let (mut near, far): (Vec<Move>, Vec<Move>) =
                moves.into_iter().partition(beside_king);
            near.extend(far);
            near
        }
    }
}

// =============================================================================
// Decision policy
// =============================================================================

pub struct Agent {
    side: Color,
    scorer: Box<dyn Scorer>,
    config: EngineConfig,
    plies_played: u32,
    tree_disabled: bool,
}

impl Agent {
    pub fn new(side: Color, scorer: Box<dyn Scorer>, config: EngineConfig) -> Agent {
        Agent {
            side,
            scorer,
            config,
            plies_played: 0,
            tree_disabled: false,
        }
    }

    pub fn side(&self) -> Color {
        self.side
    }

    /// Pick a move for the current position, or None when the side to move
    /// has no legal moves (a conceded terminal state, not an error).
    pub fn choose_move(&mut self, board: &Board) -> Option<Move> {
        self.plies_played += 1;
        let moves = board.generate_moves(self.side);
        if moves.is_empty() {
            return None;
        }

        if self.plies_played <= self.config.warmup(self.side) {
            return self.greedy(board, &moves);
        }
        // while the King holds the castle the tree buys Black nothing
        if self.side == Color::Black && board.king_position() == Some(CASTLE) {
            return self.greedy(board, &moves);
        }
        if self.tree_disabled {
            return self.greedy(board, &moves);
        }

        let started = Instant::now();
        let mut tree = Tree::new(board.clone(), self.side, self.config.depth);
        tree.search();
        let elapsed = started.elapsed();
        debug!(
            nodes = tree.nodes_visited,
            root_score = tree.root_score(),
            ?elapsed,
            "tree search finished"
        );
        if let Some(budget) = self.config.time_budget {
            if elapsed * 2 > budget {
                warn!(
                    ?elapsed,
                    ?budget,
                    "search consumed over half the move budget, staying greedy from now on"
                );
                self.tree_disabled = true;
            }
        }

        if tree.root_score() > self.config.threshold(self.side) {
            if let Some(m) = tree.best_move() {
                return Some(m);
            }
        }
        self.greedy(board, &moves)
    }

    /// Rank every successor with the scorer and take the extreme for our
    /// side; ties keep the first-generated move so play stays deterministic.
    fn greedy(&self, board: &Board, moves: &[Move]) -> Option<Move> {
        let mut best: Option<(Move, f64)> = None;
        for &m in moves {
            let value = self.scorer.score(&board.apply_move(&m));
            let better = match best {
                None => true,
                Some((_, held)) => match self.side {
                    Color::White => value > held,
                    Color::Black => value < held,
                },
            };
            if better {
                best = Some((m, value));
            }
        }
        best.map(|(m, _)| m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::Cell;
    use crate::scorer::MaterialScorer;

    fn agent(side: Color, config: EngineConfig) -> Agent {
        Agent::new(side, Box::new(MaterialScorer), config)
    }

    fn no_warmup() -> EngineConfig {
        EngineConfig {
            warmup_white: 0,
            warmup_black: 0,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn opening_tree_sees_no_decision() {
        let mut tree = Tree::new(Board::new(), Color::White, 3);
        tree.search();
        assert_eq!(tree.root_score(), 0.0, "game decided within 3 plies?");
        assert!(tree.best_move().is_some());
        assert!(tree.nodes_visited > 1);
    }

    #[test]
    fn greedy_opening_move_is_legal_and_preserves_material() {
        let board = Board::new();
        let mut player = agent(Color::White, EngineConfig::default());
        let chosen = player.choose_move(&board).expect("white has moves");
        assert!(board.generate_moves(Color::White).contains(&chosen));
        assert_eq!(MaterialScorer.score(&board.apply_move(&chosen)), -5.0);
    }

    #[test]
    fn tree_finds_the_waiting_escape() {
        // the King slides to the escape cell (2, 8) in one move
        let mut board = Board::empty();
        board.cells[2][4] = Cell::King;
        board.cells[1][4] = Cell::Black;
        board.cells[2][3] = Cell::Black;
        board.cells[3][4] = Cell::Black;
        let mut tree = Tree::new(board, Color::White, 3);
        tree.search();
        // a winning move one ply out carries the amplified terminal value
        assert_eq!(tree.root_score(), 5.0);
        assert_eq!(tree.best_move(), Some(Move::new((2, 4), (2, 8))));
    }

    #[test]
    fn tree_scores_a_doomed_king_at_zero_or_below() {
        // as above but with (2, 6) blocked: the only King move steps to
        // (2, 5), where black closes the sandwich next ply
        let mut board = Board::empty();
        board.cells[2][4] = Cell::King;
        board.cells[1][4] = Cell::Black;
        board.cells[2][3] = Cell::Black;
        board.cells[3][4] = Cell::Black;
        board.cells[2][6] = Cell::Black;
        let mut tree = Tree::new(board.clone(), Color::White, 3);
        tree.search();
        assert!(tree.root_score() <= 0.0, "root {}", tree.root_score());

        // the policy therefore falls back to scorer-greedy and still answers
        let mut player = agent(Color::White, no_warmup());
        let chosen = player.choose_move(&board).expect("white can still move");
        assert!(board.generate_moves(Color::White).contains(&chosen));
    }

    #[test]
    fn black_completing_the_castle_surround_wins_in_the_tree() {
        let mut board = Board::empty();
        board.cells[4][4] = Cell::King;
        board.cells[3][4] = Cell::Black;
        board.cells[5][4] = Cell::Black;
        board.cells[4][3] = Cell::Black;
        board.cells[0][5] = Cell::Black;
        let mut tree = Tree::new(board, Color::Black, 3);
        tree.search();
        assert_eq!(tree.root_score(), 5.0);
        assert_eq!(tree.best_move().map(|m| m.to), Some((4, 5)));
    }

    #[test]
    fn white_ordering_examines_king_moves_first() {
        let mut board = Board::empty();
        board.cells[6][6] = Cell::King;
        board.cells[2][4] = Cell::White;
        let moves = ordered_moves(&board, Color::White, 0, 3);
        let king_move_count = board.moves_for_piece(6, 6).len();
        assert!(king_move_count > 0);
        assert!(moves[..king_move_count].iter().all(|m| m.from == (6, 6)));
        assert!(moves[king_move_count..].iter().all(|m| m.from == (2, 4)));
    }

    #[test]
    fn white_last_ply_is_king_only() {
        let mut board = Board::empty();
        board.cells[6][6] = Cell::King;
        board.cells[2][4] = Cell::White;
        let moves = ordered_moves(&board, Color::White, 2, 3);
        assert!(!moves.is_empty());
        assert!(moves.iter().all(|m| m.from == (6, 6)));
    }

    #[test]
    fn black_ordering_prefers_landings_beside_the_king() {
        let mut board = Board::empty();
        board.cells[4][6] = Cell::King;
        board.cells[2][6] = Cell::Black;
        board.cells[8][8] = Cell::Black;
        let moves = ordered_moves(&board, Color::Black, 0, 3);
        let king = (4usize, 6usize);
        let near: Vec<bool> = moves
            .iter()
            .map(|m| orthogonally_adjacent(m.to, king))
            .collect();
        assert!(near[0], "first candidate does not land beside the king");
        // once the adjacent landings are exhausted none reappear later
        let first_far = near.iter().position(|n| !n).unwrap();
        assert!(near[first_far..].iter().all(|n| !n));
    }

    #[test]
    fn initial_position_has_no_black_landing_beside_the_king() {
        let board = Board::new();
        let generated = board.generate_moves(Color::Black);
        let ordered = ordered_moves(&board, Color::Black, 0, 3);
        // nothing to prioritize: the ordering is the generation order
        assert_eq!(ordered, generated);
        // and the last-ply restriction leaves black with no candidates
        assert!(ordered_moves(&board, Color::Black, 2, 3).is_empty());
    }

    #[test]
    fn warmup_plays_greedy_even_with_a_tree_win_available() {
        // the tree would march the King straight to the escape; during
        // warmup the material scorer cannot see it, so both paths must at
        // least produce a legal move and the counter must advance the agent
        // past the warmup window
        let mut board = Board::empty();
        board.cells[2][4] = Cell::King;
        board.cells[8][8] = Cell::Black;
        let mut player = agent(Color::White, EngineConfig::default());
        for _ in 0..4 {
            let m = player.choose_move(&board).expect("legal move");
            assert!(board.generate_moves(Color::White).contains(&m));
        }
        // past warmup the tree takes over and plays the winning escape
        let m = player.choose_move(&board).expect("legal move");
        assert!(
            board.apply_move(&m).king_escaped(m.to),
            "expected the escape, got {m:?}"
        );
    }

    #[test]
    fn black_stays_greedy_while_the_king_holds_the_castle() {
        let board = Board::new();
        let mut player = agent(Color::Black, no_warmup());
        // warmup is zero, but the King sits on the castle: greedy path
        let chosen = player.choose_move(&board).expect("black has moves");
        assert!(board.generate_moves(Color::Black).contains(&chosen));
    }

    #[test]
    fn agent_reports_no_move_when_stuck() {
        let mut board = Board::empty();
        board.cells[0][0] = Cell::Black;
        board.cells[0][1] = Cell::White;
        board.cells[1][0] = Cell::White;
        board.cells[7][7] = Cell::King;
        let mut player = agent(Color::Black, EngineConfig::default());
        assert_eq!(player.choose_move(&board), None);
    }

    #[test]
    fn nodes_without_replies_stay_neutral() {
        // one white candidate boxes in black's lone soldier entirely; its
        // node has no children and must keep a neutral score, not poison
        // the root (no King on the board so no line is terminal)
        let mut board = Board::empty();
        board.cells[0][0] = Cell::Black;
        board.cells[1][0] = Cell::White;
        board.cells[0][3] = Cell::White;
        let mut tree = Tree::new(board, Color::White, 3);
        tree.search();
        assert_eq!(tree.root_score(), 0.0);
    }
}
