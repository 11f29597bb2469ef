//! Per-match 3x3 tic-tac-toe board state.

use std::sync::Mutex;

use jeux_protocol::{FIRST_ROLE, NULL_ROLE, SECOND_ROLE};

use crate::error::GameError;

const BOARD_CELLS: usize = 9;

/// The eight winning lines, as board indices.
const WINNING_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// An immutable record of a single move: which role is moving, and into
/// which 0-indexed cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameMove {
    pub role: u8,
    pub cell: usize,
}

impl GameMove {
    /// Renders the move back to its wire form, `"<digit><-<X|O>"`, mirroring
    /// the source's `game_unparse_move` format.
    pub fn render(&self) -> String {
        format!("{}<-{}", self.cell + 1, role_to_char(self.role))
    }
}

#[derive(Debug)]
struct Inner {
    board: [u8; BOARD_CELLS],
    next_mover: u8,
    /// `None` while in progress; `Some(0)` for a draw; `Some(role)` for a win.
    winner: Option<u8>,
}

/// The state of one in-progress or finished match.
///
/// All mutation happens under the game's own lock; accessors that only
/// read the terminal snapshot (`is_over`, `winner`, `render`) also take the
/// lock since the board keeps mutating until termination.
#[derive(Debug)]
pub struct Game {
    inner: Mutex<Inner>,
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

impl Game {
    pub fn new() -> Self {
        Game {
            inner: Mutex::new(Inner {
                board: [0; BOARD_CELLS],
                next_mover: FIRST_ROLE,
                winner: None,
            }),
        }
    }

    /// Parses `str`'s first character as a 1-indexed cell selector ('1'..'9').
    /// `role` is recorded on the move but turn legality is checked by
    /// [`apply`](Self::apply), not here.
    pub fn parse_move(role: u8, s: &str) -> Result<GameMove, GameError> {
        if role != FIRST_ROLE && role != SECOND_ROLE {
            return Err(GameError::InvalidRole(role));
        }
        let digit = s.chars().next().ok_or(GameError::UnparseableMove)?;
        let n = digit.to_digit(10).ok_or(GameError::UnparseableMove)?;
        if !(1..=9).contains(&n) {
            return Err(GameError::UnparseableMove);
        }
        Ok(GameMove {
            role,
            cell: (n - 1) as usize,
        })
    }

    /// Applies `mv` to the board. Fails if the game is already over, the
    /// target cell is occupied, or `mv.role` is not the side to move.
    /// On success, flips `next_mover` and recomputes terminal status.
    pub fn apply(&self, mv: GameMove) -> Result<(), GameError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.winner.is_some() {
            return Err(GameError::AlreadyOver);
        }
        if mv.role != inner.next_mover {
            return Err(GameError::WrongTurn(inner.next_mover));
        }
        if inner.board[mv.cell] != 0 {
            return Err(GameError::CellOccupied(mv.cell));
        }
        inner.board[mv.cell] = mv.role;
        inner.winner = check_winner(&inner.board);
        inner.next_mover = other_role(inner.next_mover);
        Ok(())
    }

    /// Resigns the game on behalf of `role`. Fails if the game is already
    /// over; otherwise the opposing role is recorded as the winner.
    pub fn resign(&self, role: u8) -> Result<(), GameError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.winner.is_some() {
            return Err(GameError::AlreadyOver);
        }
        inner.winner = Some(other_role(role));
        Ok(())
    }

    pub fn is_over(&self) -> bool {
        self.inner.lock().unwrap().winner.is_some()
    }

    /// `None` while in progress, `Some(0)` for a draw, `Some(role)` for a win.
    pub fn winner(&self) -> Option<u8> {
        self.inner.lock().unwrap().winner
    }

    /// Renders a 40-byte human-readable grid ending in `"<X|O> to move\n"`.
    pub fn render(&self) -> String {
        let inner = self.inner.lock().unwrap();
        render_board(&inner.board, inner.next_mover)
    }
}

fn other_role(role: u8) -> u8 {
    if role == FIRST_ROLE {
        SECOND_ROLE
    } else {
        FIRST_ROLE
    }
}

fn role_to_char(role: u8) -> char {
    match role {
        FIRST_ROLE => 'X',
        SECOND_ROLE => 'O',
        NULL_ROLE => ' ',
        _ => '?',
    }
}

/// Checks the 8 winning lines, then falls back to a draw if the board is
/// full. Returns `None` while the game is still in progress.
fn check_winner(board: &[u8; BOARD_CELLS]) -> Option<u8> {
    for line in WINNING_LINES {
        let [a, b, c] = line;
        if board[a] != 0 && board[a] == board[b] && board[b] == board[c] {
            return Some(board[a]);
        }
    }
    if board.iter().all(|&cell| cell != 0) {
        return Some(NULL_ROLE);
    }
    None
}

fn render_board(board: &[u8; BOARD_CELLS], next_mover: u8) -> String {
    let mut s = String::with_capacity(40);
    for row in 0..3 {
        let base = row * 3;
        for col in 0..3 {
            s.push(role_to_char(board[base + col]));
            if col < 2 {
                s.push('|');
            }
        }
        s.push('\n');
        if row < 2 {
            s.push_str("-----\n");
        }
    }
    s.push(role_to_char(next_mover));
    s.push_str(" to move\n");
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_game_has_first_role_to_move_and_no_winner() {
        let g = Game::new();
        assert!(!g.is_over());
        assert_eq!(g.winner(), None);
    }

    #[test]
    fn test_apply_out_of_turn_move_is_rejected() {
        let g = Game::new();
        let mv = GameMove { role: SECOND_ROLE, cell: 0 };
        assert!(matches!(g.apply(mv), Err(GameError::WrongTurn(FIRST_ROLE))));
    }

    #[test]
    fn test_apply_to_occupied_cell_is_rejected() {
        let g = Game::new();
        g.apply(GameMove { role: FIRST_ROLE, cell: 4 }).unwrap();
        let err = g.apply(GameMove { role: SECOND_ROLE, cell: 4 }).unwrap_err();
        assert!(matches!(err, GameError::CellOccupied(4)));
    }

    #[test]
    fn test_top_row_win_detected_for_first_role() {
        let g = Game::new();
        // X: 0, 1, 2 ; O: 3, 4
        g.apply(GameMove { role: FIRST_ROLE, cell: 0 }).unwrap();
        g.apply(GameMove { role: SECOND_ROLE, cell: 3 }).unwrap();
        g.apply(GameMove { role: FIRST_ROLE, cell: 1 }).unwrap();
        g.apply(GameMove { role: SECOND_ROLE, cell: 4 }).unwrap();
        g.apply(GameMove { role: FIRST_ROLE, cell: 2 }).unwrap();
        assert!(g.is_over());
        assert_eq!(g.winner(), Some(FIRST_ROLE));
    }

    #[test]
    fn test_diagonal_win_detected() {
        let g = Game::new();
        g.apply(GameMove { role: FIRST_ROLE, cell: 0 }).unwrap();
        g.apply(GameMove { role: SECOND_ROLE, cell: 1 }).unwrap();
        g.apply(GameMove { role: FIRST_ROLE, cell: 4 }).unwrap();
        g.apply(GameMove { role: SECOND_ROLE, cell: 2 }).unwrap();
        g.apply(GameMove { role: FIRST_ROLE, cell: 8 }).unwrap();
        assert_eq!(g.winner(), Some(FIRST_ROLE));
    }

    #[test]
    fn test_full_board_no_winner_is_a_draw() {
        let g = Game::new();
        // X O X / X O O / O X X -> no line, board full
        let moves = [
            (FIRST_ROLE, 0),
            (SECOND_ROLE, 1),
            (FIRST_ROLE, 2),
            (SECOND_ROLE, 4),
            (FIRST_ROLE, 3),
            (SECOND_ROLE, 5),
            (FIRST_ROLE, 7),
            (SECOND_ROLE, 6),
            (FIRST_ROLE, 8),
        ];
        for (role, cell) in moves {
            g.apply(GameMove { role, cell }).unwrap();
        }
        assert!(g.is_over());
        assert_eq!(g.winner(), Some(NULL_ROLE));
    }

    #[test]
    fn test_apply_after_game_over_is_rejected() {
        let g = Game::new();
        g.resign(FIRST_ROLE).unwrap();
        let err = g.apply(GameMove { role: SECOND_ROLE, cell: 0 }).unwrap_err();
        assert!(matches!(err, GameError::AlreadyOver));
    }

    #[test]
    fn test_resign_awards_win_to_opponent() {
        let g = Game::new();
        g.resign(FIRST_ROLE).unwrap();
        assert_eq!(g.winner(), Some(SECOND_ROLE));
    }

    #[test]
    fn test_parse_move_reads_first_digit_only() {
        let mv = Game::parse_move(FIRST_ROLE, "5extra").unwrap();
        assert_eq!(mv.cell, 4);
    }

    #[test]
    fn test_parse_move_rejects_non_digit() {
        assert!(Game::parse_move(FIRST_ROLE, "x").is_err());
    }

    #[test]
    fn test_parse_move_rejects_zero() {
        assert!(Game::parse_move(FIRST_ROLE, "0").is_err());
    }

    #[test]
    fn test_render_is_40_bytes_and_ends_with_to_move() {
        let g = Game::new();
        let rendered = g.render();
        assert_eq!(rendered.len(), 40);
        assert!(rendered.ends_with("X to move\n"));
    }

    #[test]
    fn test_move_roundtrip_first_char_matches() {
        let mv = Game::parse_move(FIRST_ROLE, "5").unwrap();
        let rendered = mv.render();
        assert_eq!(rendered.chars().next(), Some('5'));
    }
}
