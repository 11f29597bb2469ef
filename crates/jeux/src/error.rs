//! Unified error type for the `jeux` binary.

use jeux_protocol::ProtocolError;
use jeux_session::SessionError;

/// Top-level error that wraps the sub-crates' errors so `main` has a
/// single type to report. `#[from]` lets `?` convert automatically.
#[derive(Debug, thiserror::Error)]
pub enum JeuxError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
