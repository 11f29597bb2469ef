//! The 3x3 tic-tac-toe board: move application, win/draw detection,
//! resignation, and textual rendering.
//!
//! Invitation state (which links two sessions around a `Game`) lives in
//! `jeux-session`, one layer up, since a session and the invitations that
//! reference it have cyclic ownership that is easiest to manage within a
//! single crate.

pub mod error;
pub mod game;

pub use error::GameError;
pub use game::{Game, GameMove};
