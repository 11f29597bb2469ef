//! Session and invitation state machines layered over the wire protocol
//! and the shared game/player model.

mod error;
mod invitation;
mod session;
mod session_registry;

pub use error::SessionError;
pub use invitation::{Invitation, InvitationState};
pub use session::{apply_move, complementary_role, GameEnded, Session};
pub use session_registry::{SessionRegistry, MAX_SESSIONS};
