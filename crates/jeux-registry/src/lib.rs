//! The player registry: usernames mapped to long-lived, rated [`Player`]s.

pub mod player;
pub mod player_registry;

pub use player::{post_result, GameResult, Player, INITIAL_RATING};
pub use player_registry::PlayerRegistry;
