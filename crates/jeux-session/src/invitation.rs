//! Two-session link object carrying a pending or in-play game.

use std::sync::{Arc, Mutex, Weak};

use jeux_game::Game;
use jeux_registry::Player;

use crate::error::SessionError;
use crate::session::Session;

/// An invitation's position in its three-state lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationState {
    Open,
    Accepted,
    Closed,
}

struct Inner {
    state: InvitationState,
    game: Option<Game>,
    /// The (source, target) players, captured at [`Invitation::accept`]
    /// time so a rating update can still name both participants even if a
    /// session has since logged out. A session's login identity is
    /// transient; once a game exists, who played it is not.
    players: Option<(Arc<Player>, Arc<Player>)>,
}

/// Links exactly two sessions — source and target — plus the role each
/// will play. Referenced from both endpoints' invitation lists under
/// independent local ids.
///
/// Source and target are held as [`Weak`] references rather than strong
/// ones: a [`Session`] owns strong `Arc<Invitation>` entries in its list,
/// so a strong back-reference here would form an uncollectable cycle. The
/// invitation is only ever dereferenced while at least one endpoint
/// session is still alive and holding it, so the upgrade can only fail
/// during the narrow window where a peer is mid-teardown, which callers
/// treat the same as "peer already gone."
pub struct Invitation {
    source: Weak<Session>,
    target: Weak<Session>,
    source_role: u8,
    target_role: u8,
    inner: Mutex<Inner>,
}

impl Invitation {
    pub fn new(source: &Arc<Session>, target: &Arc<Session>, source_role: u8, target_role: u8) -> Self {
        Invitation {
            source: Arc::downgrade(source),
            target: Arc::downgrade(target),
            source_role,
            target_role,
            inner: Mutex::new(Inner {
                state: InvitationState::Open,
                game: None,
                players: None,
            }),
        }
    }

    pub fn source(&self) -> Option<Arc<Session>> {
        self.source.upgrade()
    }

    pub fn target(&self) -> Option<Arc<Session>> {
        self.target.upgrade()
    }

    pub fn source_role(&self) -> u8 {
        self.source_role
    }

    pub fn target_role(&self) -> u8 {
        self.target_role
    }

    pub fn state(&self) -> InvitationState {
        self.inner.lock().unwrap().state
    }

    pub fn has_game(&self) -> bool {
        self.inner.lock().unwrap().game.is_some()
    }

    pub fn is_source(&self, session: &Arc<Session>) -> bool {
        self.source.upgrade().is_some_and(|s| Arc::ptr_eq(&s, session))
    }

    pub fn is_target(&self, session: &Arc<Session>) -> bool {
        self.target.upgrade().is_some_and(|s| Arc::ptr_eq(&s, session))
    }

    /// Runs `f` with access to the in-progress (or just-terminated) game,
    /// if any.
    pub fn with_game<T>(&self, f: impl FnOnce(&Game) -> T) -> Option<T> {
        let inner = self.inner.lock().unwrap();
        inner.game.as_ref().map(f)
    }

    /// The two players who were participating when the game started,
    /// ordered `(source_player, target_player)`. `None` before acceptance.
    pub fn players(&self) -> Option<(Arc<Player>, Arc<Player>)> {
        self.inner.lock().unwrap().players.clone()
    }

    /// Transitions OPEN -> ACCEPTED, creating the game and recording the
    /// two participating players. Fails unless the invitation was OPEN.
    pub fn accept(&self, source_player: Arc<Player>, target_player: Arc<Player>) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != InvitationState::Open {
            return Err(SessionError::WrongInvitationState);
        }
        inner.state = InvitationState::Accepted;
        inner.game = Some(Game::new());
        inner.players = Some((source_player, target_player));
        Ok(())
    }

    /// Transitions to CLOSED. If a game is in progress, `role` (which must
    /// not be the null role) resigns it first. Fails unless the invitation
    /// was OPEN or ACCEPTED.
    pub fn close(&self, resigning_role: Option<u8>) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != InvitationState::Open && inner.state != InvitationState::Accepted {
            return Err(SessionError::WrongInvitationState);
        }
        if let Some(game) = &inner.game {
            let role = resigning_role.ok_or(SessionError::WrongInvitationState)?;
            game.resign(role)?;
        } else if resigning_role.is_some() {
            return Err(SessionError::WrongInvitationState);
        }
        inner.state = InvitationState::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jeux_protocol::{FIRST_ROLE, SECOND_ROLE};

    fn dummy_session(id: u64) -> Arc<Session> {
        Session::new_for_test(id)
    }

    #[test]
    fn test_new_invitation_is_open_with_no_game() {
        let source = dummy_session(1);
        let target = dummy_session(2);
        let inv = Invitation::new(&source, &target, FIRST_ROLE, SECOND_ROLE);
        assert_eq!(inv.state(), InvitationState::Open);
        assert!(!inv.has_game());
        assert!(inv.is_source(&source));
        assert!(inv.is_target(&target));
        assert!(!inv.is_source(&target));
    }

    #[test]
    fn test_accept_transitions_to_accepted_and_creates_game() {
        let source = dummy_session(1);
        let target = dummy_session(2);
        let inv = Invitation::new(&source, &target, FIRST_ROLE, SECOND_ROLE);
        let p1 = Arc::new(Player::new("alice"));
        let p2 = Arc::new(Player::new("bob"));
        inv.accept(p1, p2).unwrap();
        assert_eq!(inv.state(), InvitationState::Accepted);
        assert!(inv.has_game());
        assert!(inv.players().is_some());
    }

    #[test]
    fn test_double_accept_fails() {
        let source = dummy_session(1);
        let target = dummy_session(2);
        let inv = Invitation::new(&source, &target, FIRST_ROLE, SECOND_ROLE);
        let p1 = Arc::new(Player::new("alice"));
        let p2 = Arc::new(Player::new("bob"));
        inv.accept(Arc::clone(&p1), Arc::clone(&p2)).unwrap();
        assert!(inv.accept(p1, p2).is_err());
    }

    #[test]
    fn test_close_without_game_requires_no_role() {
        let source = dummy_session(1);
        let target = dummy_session(2);
        let inv = Invitation::new(&source, &target, FIRST_ROLE, SECOND_ROLE);
        assert!(inv.close(Some(FIRST_ROLE)).is_err());
        assert!(inv.close(None).is_ok());
        assert_eq!(inv.state(), InvitationState::Closed);
    }

    #[test]
    fn test_close_with_game_requires_role_and_resigns_it() {
        let source = dummy_session(1);
        let target = dummy_session(2);
        let inv = Invitation::new(&source, &target, FIRST_ROLE, SECOND_ROLE);
        let p1 = Arc::new(Player::new("alice"));
        let p2 = Arc::new(Player::new("bob"));
        inv.accept(p1, p2).unwrap();
        assert!(inv.close(None).is_err());
        inv.close(Some(FIRST_ROLE)).unwrap();
        assert_eq!(inv.state(), InvitationState::Closed);
        assert_eq!(inv.with_game(|g| g.winner()), Some(Some(SECOND_ROLE)));
    }
}
