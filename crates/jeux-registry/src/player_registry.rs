//! Mapping from username to [`Player`], created on first sighting of a name
//! and retained for the server's lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::player::Player;

/// Registry of all players ever seen by this server process.
///
/// The registry retains one strong `Arc<Player>` per entry for as long as
/// the server runs; callers additionally hold their own `Arc` clone. There
/// is no eviction — per the data model, a player's lifetime runs from its
/// first `register` to server shutdown.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: Mutex<HashMap<String, Arc<Player>>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        PlayerRegistry {
            players: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the existing player registered under `name`, or creates and
    /// registers a new one at the initial rating. The critical section
    /// covers the full lookup-or-create so two concurrent registrations of
    /// the same new name can never create two distinct players.
    pub async fn register(&self, name: &str) -> Arc<Player> {
        let mut players = self.players.lock().await;
        if let Some(existing) = players.get(name) {
            tracing::debug!(name, "player already registered");
            return Arc::clone(existing);
        }
        tracing::debug!(name, "registering new player");
        let player = Arc::new(Player::new(name));
        players.insert(name.to_string(), Arc::clone(&player));
        player
    }

    /// Number of distinct players ever registered.
    pub async fn len(&self) -> usize {
        self.players.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_new_name_creates_player_at_initial_rating() {
        let reg = PlayerRegistry::new();
        let p = reg.register("alice").await;
        assert_eq!(p.username(), "alice");
        assert_eq!(p.rating(), crate::player::INITIAL_RATING);
    }

    #[tokio::test]
    async fn test_register_same_name_twice_returns_same_player() {
        let reg = PlayerRegistry::new();
        let p1 = reg.register("alice").await;
        let p2 = reg.register("alice").await;
        assert!(Arc::ptr_eq(&p1, &p2));
        assert_eq!(reg.len().await, 1);
    }

    #[tokio::test]
    async fn test_register_is_case_sensitive() {
        let reg = PlayerRegistry::new();
        let lower = reg.register("alice").await;
        let upper = reg.register("Alice").await;
        assert!(!Arc::ptr_eq(&lower, &upper));
        assert_eq!(reg.len().await, 2);
    }
}
