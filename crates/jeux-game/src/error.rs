//! Errors for the game and invitation state machines.

#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("the game has already terminated")]
    AlreadyOver,

    #[error("cell {0} is already occupied")]
    CellOccupied(usize),

    #[error("it is not role {0}'s turn to move")]
    WrongTurn(u8),

    #[error("move string could not be parsed")]
    UnparseableMove,

    #[error("role {0} is not a valid playing role")]
    InvalidRole(u8),
}
