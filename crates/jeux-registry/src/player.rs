//! A single named player and its Elo rating.

use std::sync::Mutex;

/// Rating assigned to a player the first time their name is seen.
pub const INITIAL_RATING: i32 = 1500;

/// K-factor for the Elo update in [`post_result`].
const K_FACTOR: f64 = 32.0;

/// A player known to the server, keyed by username.
///
/// The username is immutable for the player's lifetime; only `rating`
/// mutates, and only under the player's own lock, per the lock hierarchy.
#[derive(Debug)]
pub struct Player {
    username: String,
    rating: Mutex<i32>,
}

impl Player {
    pub fn new(username: impl Into<String>) -> Self {
        Player {
            username: username.into(),
            rating: Mutex::new(INITIAL_RATING),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn rating(&self) -> i32 {
        *self.rating.lock().unwrap()
    }

    fn set_rating(&self, value: i32) {
        *self.rating.lock().unwrap() = value;
    }
}

/// The outcome of a finished game, from `player1`'s perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    Player1Won,
    Player2Won,
    Draw,
}

/// Posts the result of a game between two players, updating both ratings
/// with the Elo formula (K=32). Ratings are truncated towards zero, same
/// as integer truncation of a C `(int)` cast.
///
/// Locks `player1` then `player2`; callers must not hold either player's
/// lock beforehand, and must always acquire in the order the two
/// session-level callers observe them (see the invitation/session lock
/// discipline) to avoid a lock-order inversion when both players resign
/// or move at once.
pub fn post_result(player1: &Player, player2: &Player, result: GameResult) {
    let (s1, s2) = match result {
        GameResult::Player1Won => (1.0, 0.0),
        GameResult::Player2Won => (0.0, 1.0),
        GameResult::Draw => (0.5, 0.5),
    };

    let r1 = player1.rating() as f64;
    let r2 = player2.rating() as f64;

    let e1 = 1.0 / (1.0 + 10f64.powf((r2 - r1) / 400.0));
    let e2 = 1.0 / (1.0 + 10f64.powf((r1 - r2) / 400.0));

    let new_r1 = player1.rating() + (K_FACTOR * (s1 - e1)) as i32;
    let new_r2 = player2.rating() + (K_FACTOR * (s2 - e2)) as i32;

    tracing::debug!(
        player1 = player1.username(),
        player2 = player2.username(),
        ?result,
        "posting game result"
    );

    player1.set_rating(new_r1);
    player2.set_rating(new_r2);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_player_has_initial_rating() {
        let p = Player::new("alice");
        assert_eq!(p.rating(), INITIAL_RATING);
        assert_eq!(p.username(), "alice");
    }

    #[test]
    fn test_post_result_equal_ratings_win_loss_is_symmetric() {
        let a = Player::new("a");
        let b = Player::new("b");
        post_result(&a, &b, GameResult::Player1Won);
        assert_eq!(a.rating(), 1516);
        assert_eq!(b.rating(), 1484);
    }

    #[test]
    fn test_post_result_draw_between_equals_is_a_near_noop() {
        let a = Player::new("a");
        let b = Player::new("b");
        post_result(&a, &b, GameResult::Draw);
        assert_eq!(a.rating(), INITIAL_RATING);
        assert_eq!(b.rating(), INITIAL_RATING);
    }

    #[test]
    fn test_post_result_delta_sums_to_zero_within_truncation() {
        let a = Player::new("a");
        let b = Player::new("b");
        let before = (a.rating(), b.rating());
        post_result(&a, &b, GameResult::Player2Won);
        let delta1 = a.rating() - before.0;
        let delta2 = b.rating() - before.1;
        assert!((delta1 + delta2).abs() <= 1);
    }
}
