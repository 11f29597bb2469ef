//! Errors for session and invitation operations.
//!
//! Every variant here maps to a `NACK` at the dispatcher (§7's "semantic
//! request failure" category) except [`SessionError::Io`], which the
//! dispatcher treats as connection loss.

use jeux_game::GameError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session is already logged in")]
    AlreadyLoggedIn,

    #[error("session is not logged in")]
    NotLoggedIn,

    #[error("another session is already logged in as this player")]
    PlayerAlreadyConnected,

    #[error("invitation id {0} does not exist in this session's list")]
    NoSuchInvitation(u8),

    #[error("this session is not the source of invitation {0}")]
    NotSource(u8),

    #[error("this session is not the target of invitation {0}")]
    NotTarget(u8),

    #[error("this session is neither source nor target of invitation {0}")]
    NotParticipant(u8),

    #[error("the peer session for invitation {0} is no longer connected")]
    PeerGone(u8),

    #[error("invitation is not in the expected state for this operation")]
    WrongInvitationState,

    #[error("invitation {0} has no game in progress")]
    NoGameInProgress(u8),

    #[error("a session cannot invite itself")]
    SelfInvite,

    #[error("no session is logged in as player {0:?}")]
    UnknownPeer(String),

    #[error("session registry is full")]
    RegistryFull,

    #[error("payload is not valid UTF-8")]
    InvalidUtf8Payload,

    #[error("packet type is not a valid request from a client")]
    UnexpectedRequestType,

    #[error(transparent)]
    Game(#[from] GameError),

    #[error("I/O error on session send: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] jeux_protocol::ProtocolError),
}
