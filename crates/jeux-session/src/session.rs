//! One session per live TCP connection: login identity, invitation list,
//! and serialized outbound writes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use jeux_game::{Game, GameMove};
use jeux_protocol::{codec, PacketHeader, PacketType, ProtocolError, FIRST_ROLE, NULL_ROLE};
use jeux_registry::{post_result, GameResult, Player};
use tokio::io::AsyncWrite;
use tokio::sync::{Mutex as AsyncMutex, Notify};

use crate::error::SessionError;
use crate::invitation::{Invitation, InvitationState};

/// A chunk size for growing the sparse invitation list, mirroring the
/// source's array-doubling-by-tens strategy.
const INVITATION_LIST_CHUNK: usize = 10;

struct Inner {
    player: Option<Arc<Player>>,
    invitations: Vec<Option<Arc<Invitation>>>,
}

/// Server-side state for one connected client.
///
/// The socket handle is fixed for the session's life; everything else —
/// login identity and invitation list — mutates under `inner`'s lock.
/// Outbound writes go through `write_half`, itself guarded separately so
/// that a notification from another session's dispatcher can interleave
/// cleanly with this session's own acks without needing the state lock.
///
/// The write half is held as a boxed trait object rather than a concrete
/// `tokio::net::tcp::OwnedWriteHalf` so that sessions used in tests (no
/// real socket) and sessions serving a live connection share one type.
pub struct Session {
    id: u64,
    write_half: AsyncMutex<Box<dyn AsyncWrite + Unpin + Send>>,
    /// Global network write lock, shared by every session in the process,
    /// serializing all outbound bytes server-wide (the leaf lock in the
    /// hierarchy).
    network_lock: Arc<AsyncMutex<()>>,
    inner: std::sync::Mutex<Inner>,
    shutdown: Notify,
    shutting_down: AtomicBool,
}

impl Session {
    pub fn new(
        id: u64,
        write_half: impl AsyncWrite + Unpin + Send + 'static,
        network_lock: Arc<AsyncMutex<()>>,
    ) -> Arc<Self> {
        Arc::new(Session {
            id,
            write_half: AsyncMutex::new(Box::new(write_half)),
            network_lock,
            inner: std::sync::Mutex::new(Inner {
                player: None,
                invitations: Vec::new(),
            }),
            shutdown: Notify::new(),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// A session with no real socket, for unit tests that only exercise
    /// invitation/login bookkeeping.
    #[cfg(test)]
    pub fn new_for_test(id: u64) -> Arc<Self> {
        Session::new(id, tokio::io::sink(), Arc::new(AsyncMutex::new(())))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Marks this session for shutdown and wakes its dispatch loop, which
    /// is expected to be waiting in [`shutdown_requested`](Self::shutdown_requested).
    /// Replaces the source's raw `shutdown(fd, SHUT_RD)` call: rather than
    /// forcing a blocking read to observe EOF, the loop selects on this
    /// signal directly.
    pub fn request_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Resolves once [`request_shutdown`](Self::request_shutdown) has been
    /// called. Checks the flag before waiting so a shutdown requested
    /// before this call was made is not missed.
    pub async fn shutdown_requested(&self) {
        if self.is_shutting_down() {
            return;
        }
        let notified = self.shutdown.notified();
        if self.is_shutting_down() {
            return;
        }
        notified.await;
    }

    pub fn player(&self) -> Option<Arc<Player>> {
        self.inner.lock().unwrap().player.clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.inner.lock().unwrap().player.is_some()
    }

    /// Sends a fully-formed packet to this session's peer, under the
    /// global network lock. Best-effort: if the peer's socket has already
    /// failed, the error is returned for the caller to log and ignore —
    /// sending a notification to a session that is mid-teardown must never
    /// itself fail the caller's own request.
    pub async fn send(&self, packet_type: PacketType, id: u8, role: u8, payload: Option<&[u8]>) -> Result<(), SessionError> {
        let len = payload.map(|p| p.len()).unwrap_or(0);
        let size = u16::try_from(len).map_err(|_| ProtocolError::PayloadTooLarge(len))?;
        let header = PacketHeader::new(packet_type, id, role, size);
        let _net = self.network_lock.lock().await;
        let mut write_half = self.write_half.lock().await;
        codec::send_packet(&mut *write_half, &header, payload).await?;
        Ok(())
    }

    pub async fn send_ack(&self, id: u8, payload: Option<&[u8]>) -> Result<(), SessionError> {
        self.send(PacketType::Ack, id, 0, payload).await
    }

    pub async fn send_nack(&self) -> Result<(), SessionError> {
        self.send(PacketType::Nack, 0, 0, None).await
    }

    // ---- login/logout -----------------------------------------------

    /// Logs this session in as `player`. Fails if already logged in. The
    /// "only one session per username" invariant is enforced by the
    /// session registry, which must check before calling this.
    pub fn login(&self, player: Arc<Player>) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.player.is_some() {
            return Err(SessionError::AlreadyLoggedIn);
        }
        inner.player = Some(player);
        Ok(())
    }

    /// Snapshots this session's non-empty invitation slots for `logout` to
    /// process outside the state lock (the cleanup itself calls back into
    /// other sessions and cannot run while holding `inner`'s lock).
    fn invitation_snapshot(&self) -> Vec<(u8, Arc<Invitation>)> {
        self.inner
            .lock()
            .unwrap()
            .invitations
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.clone().map(|inv| (i as u8, inv)))
            .collect()
    }

    /// Logs out: releases the player reference, then walks this session's
    /// invitation list closing each one — revoke if this session is the
    /// source, decline if target, falling back to a resignation if either
    /// fails because the invitation had already progressed to ACCEPTED.
    /// Leaves the list empty. Best-effort towards peers: a notification
    /// that fails to send (peer already gone) does not abort the logout.
    ///
    /// Rating updates on a resignation triggered here still succeed even
    /// though `player` is cleared above `Invitation` records the two
    /// playing `Player`s at accept time, independent of either session's
    /// current login state.
    pub async fn logout(self: &Arc<Self>) -> Result<(), SessionError> {
        {
            let mut inner = self.inner.lock().unwrap();
            if inner.player.is_none() {
                return Err(SessionError::NotLoggedIn);
            }
            inner.player = None;
        }
        for (id, inv) in self.invitation_snapshot() {
            let outcome = if inv.is_source(self) {
                self.revoke_invitation(id).await
            } else {
                self.decline_invitation(id).await
            };
            if outcome.is_err() && inv.state() == InvitationState::Accepted {
                let _ = self.resign_game(id).await;
            }
        }
        Ok(())
    }

    // ---- invitation list ---------------------------------------------

    /// Appends `inv` at the lowest free index, growing by chunks if full.
    pub fn add_invitation(&self, inv: Arc<Invitation>) -> u8 {
        let mut inner = self.inner.lock().unwrap();
        if let Some(idx) = inner.invitations.iter().position(|s| s.is_none()) {
            inner.invitations[idx] = Some(inv);
            return idx as u8;
        }
        let start = inner.invitations.len();
        inner
            .invitations
            .resize_with(start + INVITATION_LIST_CHUNK, || None);
        inner.invitations[start] = Some(inv);
        start as u8
    }

    /// Clears the first slot holding `inv` (by pointer identity), if any.
    pub fn remove_invitation(&self, inv: &Arc<Invitation>) -> Option<u8> {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner
            .invitations
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|i| Arc::ptr_eq(i, inv)))?;
        inner.invitations[idx] = None;
        Some(idx as u8)
    }

    pub fn get_invitation(&self, id: u8) -> Option<Arc<Invitation>> {
        self.inner
            .lock()
            .unwrap()
            .invitations
            .get(id as usize)
            .and_then(|slot| slot.clone())
    }

    /// Finds the local id under which `inv` is stored, without removing it.
    pub fn find_invitation_id(&self, inv: &Arc<Invitation>) -> Option<u8> {
        self.inner
            .lock()
            .unwrap()
            .invitations
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|i| Arc::ptr_eq(i, inv)))
            .map(|idx| idx as u8)
    }

    /// Renders the table of all logged-in players via the caller-supplied
    /// list, formatted `"name\trating\n"` per line.
    pub fn render_users_table(players: &[Arc<Player>]) -> String {
        let mut s = String::new();
        for p in players {
            s.push_str(p.username());
            s.push('\t');
            s.push_str(&p.rating().to_string());
            s.push('\n');
        }
        s
    }

    // ---- invitation lifecycle -----------------------------------------

    /// Creates a new invitation from this (source) session to `target`,
    /// inserts it into both sides' lists, and notifies the target.
    /// Unwinds both insertions if the notification fails to send.
    pub async fn make_invitation(
        self: &Arc<Self>,
        target: &Arc<Session>,
        source_role: u8,
        target_role: u8,
    ) -> Result<u8, SessionError> {
        if Arc::ptr_eq(self, target) {
            return Err(SessionError::SelfInvite);
        }
        let source_player = self.player().ok_or(SessionError::NotLoggedIn)?;

        let inv = Arc::new(Invitation::new(self, target, source_role, target_role));
        let src_id = self.add_invitation(Arc::clone(&inv));
        let tgt_id = target.add_invitation(Arc::clone(&inv));

        if let Err(e) = target
            .send(
                PacketType::Invited,
                tgt_id,
                target_role,
                Some(source_player.username().as_bytes()),
            )
            .await
        {
            self.remove_invitation(&inv);
            target.remove_invitation(&inv);
            return Err(e);
        }

        Ok(src_id)
    }

    /// Revokes invitation `id`, for which this session must be the source
    /// and the invitation must still be OPEN. Notifies the target.
    pub async fn revoke_invitation(self: &Arc<Self>, id: u8) -> Result<(), SessionError> {
        let inv = self.get_invitation(id).ok_or(SessionError::NoSuchInvitation(id))?;
        if !inv.is_source(self) {
            return Err(SessionError::NotSource(id));
        }
        if inv.state() != InvitationState::Open {
            return Err(SessionError::WrongInvitationState);
        }
        let target = inv.target().ok_or(SessionError::PeerGone(id))?;

        inv.close(None)?;
        self.remove_invitation(&inv);
        let target_id = target
            .remove_invitation(&inv)
            .ok_or(SessionError::NoSuchInvitation(id))?;

        let _ = target.send(PacketType::Revoked, target_id, 0, None).await;
        Ok(())
    }

    /// Declines invitation `id`, for which this session must be the target
    /// and the invitation must still be OPEN. Notifies the source.
    pub async fn decline_invitation(self: &Arc<Self>, id: u8) -> Result<(), SessionError> {
        let inv = self.get_invitation(id).ok_or(SessionError::NoSuchInvitation(id))?;
        if !inv.is_target(self) {
            return Err(SessionError::NotTarget(id));
        }
        if inv.state() != InvitationState::Open {
            return Err(SessionError::WrongInvitationState);
        }
        let source = inv.source().ok_or(SessionError::PeerGone(id))?;

        inv.close(None)?;
        self.remove_invitation(&inv);
        let source_id = source
            .remove_invitation(&inv)
            .ok_or(SessionError::NoSuchInvitation(id))?;

        let _ = source.send(PacketType::Declined, source_id, 0, None).await;
        Ok(())
    }

    /// Accepts invitation `id`, for which this session must be the target.
    /// Creates the game and notifies the source. Returns the rendered
    /// initial board when *this* (accepting) session needs it in its own
    /// `ACK` — i.e. when the source plays second.
    pub async fn accept_invitation(self: &Arc<Self>, id: u8) -> Result<Option<String>, SessionError> {
        let inv = self.get_invitation(id).ok_or(SessionError::NoSuchInvitation(id))?;
        if !inv.is_target(self) {
            return Err(SessionError::NotTarget(id));
        }
        if inv.state() != InvitationState::Open {
            return Err(SessionError::WrongInvitationState);
        }
        let source = inv.source().ok_or(SessionError::PeerGone(id))?;
        let source_id = source
            .find_invitation_id(&inv)
            .ok_or(SessionError::WrongInvitationState)?;

        let source_player = source.player().ok_or(SessionError::NotLoggedIn)?;
        let target_player = self.player().ok_or(SessionError::NotLoggedIn)?;
        inv.accept(source_player, target_player)?;

        let board = inv
            .with_game(|g| g.render())
            .ok_or(SessionError::WrongInvitationState)?;

        if inv.source_role() == FIRST_ROLE {
            source
                .send(PacketType::Accepted, source_id, 0, Some(board.as_bytes()))
                .await?;
            Ok(None)
        } else {
            source.send(PacketType::Accepted, source_id, 0, None).await?;
            Ok(Some(board))
        }
    }

    /// Parses and applies `move_str` to the game behind invitation `id` on
    /// this session's behalf. Notifies the peer of the new board, and if
    /// the move ended the game, runs the shared end-of-game protocol.
    pub async fn make_move(self: &Arc<Self>, id: u8, move_str: &str) -> Result<(), SessionError> {
        let inv = self.get_invitation(id).ok_or(SessionError::NoSuchInvitation(id))?;
        if inv.state() != InvitationState::Accepted {
            return Err(SessionError::NoGameInProgress(id));
        }
        let my_role = self.role_in(&inv, id)?;
        let peer = self.peer_in(&inv, id)?;
        let peer_id = peer
            .find_invitation_id(&inv)
            .ok_or(SessionError::NoSuchInvitation(id))?;

        let ended = apply_move(&inv, my_role, move_str)?;

        let board = inv
            .with_game(|g| g.render())
            .ok_or(SessionError::NoGameInProgress(id))?;
        peer.send(PacketType::Moved, peer_id, 0, Some(board.as_bytes())).await?;

        if let Some(GameEnded { winner }) = ended {
            self.finish_game(&inv, id, peer_id, &peer, winner).await?;
        }
        Ok(())
    }

    /// Resigns the game behind invitation `id` on this session's behalf.
    /// The peer always receives both `RESIGNED` and `ENDED`, since a
    /// resignation unconditionally terminates the game.
    pub async fn resign_game(self: &Arc<Self>, id: u8) -> Result<(), SessionError> {
        let inv = self.get_invitation(id).ok_or(SessionError::NoSuchInvitation(id))?;
        if inv.state() != InvitationState::Accepted {
            return Err(SessionError::NoGameInProgress(id));
        }
        let my_role = self.role_in(&inv, id)?;
        let peer = self.peer_in(&inv, id)?;
        let peer_id = peer
            .find_invitation_id(&inv)
            .ok_or(SessionError::NoSuchInvitation(id))?;

        inv.close(Some(my_role))?;
        peer.send(PacketType::Resigned, peer_id, 0, None).await?;

        let winner = inv
            .with_game(|g| g.winner())
            .flatten()
            .ok_or(SessionError::NoGameInProgress(id))?;
        self.finish_game(&inv, id, peer_id, &peer, winner).await
    }

    /// Shared tail of `make_move`/`resign_game` once a game has just
    /// terminated: notifies both sides with `ENDED`, removes the
    /// invitation from both lists, and posts the Elo update.
    async fn finish_game(
        self: &Arc<Self>,
        inv: &Arc<Invitation>,
        my_id: u8,
        peer_id: u8,
        peer: &Arc<Session>,
        winner: u8,
    ) -> Result<(), SessionError> {
        self.send(PacketType::Ended, my_id, winner, None).await?;
        peer.send(PacketType::Ended, peer_id, winner, None).await?;

        self.remove_invitation(inv);
        peer.remove_invitation(inv);

        if let Some((source_player, target_player)) = inv.players() {
            let result = if winner == NULL_ROLE {
                GameResult::Draw
            } else if winner == inv.source_role() {
                GameResult::Player1Won
            } else {
                GameResult::Player2Won
            };
            post_result(&source_player, &target_player, result);
        }
        Ok(())
    }

    /// The role this session plays in `inv`, given it is a participant.
    fn role_in(self: &Arc<Self>, inv: &Invitation, id: u8) -> Result<u8, SessionError> {
        if inv.is_source(self) {
            Ok(inv.source_role())
        } else if inv.is_target(self) {
            Ok(inv.target_role())
        } else {
            Err(SessionError::NotParticipant(id))
        }
    }

    /// The other session participating in `inv`.
    fn peer_in(self: &Arc<Self>, inv: &Invitation, id: u8) -> Result<Arc<Session>, SessionError> {
        if inv.is_source(self) {
            inv.target().ok_or(SessionError::PeerGone(id))
        } else if inv.is_target(self) {
            inv.source().ok_or(SessionError::PeerGone(id))
        } else {
            Err(SessionError::NotParticipant(id))
        }
    }
}

/// Role the target of a new invitation will play, given the role the
/// inviter requested for themself via the wire's `role` field (the
/// inviter's packet carries the *target's* role; the source's role is
/// the complementary one).
pub fn complementary_role(requested_target_role: u8) -> u8 {
    if requested_target_role == FIRST_ROLE {
        jeux_protocol::SECOND_ROLE
    } else {
        FIRST_ROLE
    }
}

/// The outcome of a move that ended the game it was applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameEnded {
    pub winner: u8,
}

/// Parses and applies a move to the game behind `inv` on behalf of
/// `moving_role`. Returns `Some(GameEnded)` if this move terminated the
/// game.
pub fn apply_move(inv: &Invitation, moving_role: u8, move_str: &str) -> Result<Option<GameEnded>, SessionError> {
    if inv.state() != InvitationState::Accepted {
        return Err(SessionError::WrongInvitationState);
    }
    let mv: GameMove = Game::parse_move(moving_role, move_str)?;
    inv.with_game(|game| -> Result<Option<GameEnded>, SessionError> {
        game.apply(mv)?;
        Ok(game.winner().map(|winner| GameEnded { winner }))
    })
    .ok_or(SessionError::WrongInvitationState)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use jeux_protocol::SECOND_ROLE;

    #[test]
    fn test_login_then_login_again_fails() {
        let s = Session::new_for_test(1);
        s.login(Arc::new(Player::new("alice"))).unwrap();
        assert!(s.login(Arc::new(Player::new("alice"))).is_err());
    }

    #[test]
    fn test_add_and_remove_invitation_reuses_lowest_free_slot() {
        let s = Session::new_for_test(1);
        let target = Session::new_for_test(2);
        let inv_a = Arc::new(Invitation::new(&s, &target, FIRST_ROLE, SECOND_ROLE));
        let inv_b = Arc::new(Invitation::new(&s, &target, FIRST_ROLE, SECOND_ROLE));
        let id_a = s.add_invitation(Arc::clone(&inv_a));
        let id_b = s.add_invitation(Arc::clone(&inv_b));
        assert_eq!(id_a, 0);
        assert_eq!(id_b, 1);
        assert_eq!(s.remove_invitation(&inv_a), Some(0));
        let inv_c = Arc::new(Invitation::new(&s, &target, FIRST_ROLE, SECOND_ROLE));
        assert_eq!(s.add_invitation(inv_c), 0);
    }

    #[test]
    fn test_complementary_role_flips_first_and_second() {
        assert_eq!(complementary_role(FIRST_ROLE), SECOND_ROLE);
        assert_eq!(complementary_role(SECOND_ROLE), FIRST_ROLE);
    }

    #[tokio::test]
    async fn test_make_invitation_rejects_self_invite() {
        let s = Session::new_for_test(1);
        s.login(Arc::new(Player::new("alice"))).unwrap();
        let err = s.make_invitation(&s, FIRST_ROLE, SECOND_ROLE).await.unwrap_err();
        assert!(matches!(err, SessionError::SelfInvite));
    }

    #[tokio::test]
    async fn test_full_invite_accept_move_to_win_updates_ratings() {
        let a = Session::new_for_test(1);
        let b = Session::new_for_test(2);
        a.login(Arc::new(Player::new("alice"))).unwrap();
        b.login(Arc::new(Player::new("bob"))).unwrap();

        // alice invites bob to play second -> alice is first mover.
        let a_id = a.make_invitation(&b, FIRST_ROLE, SECOND_ROLE).await.unwrap();
        let b_id = b.find_invitation_id(&b.get_invitation(0).unwrap()).unwrap();

        let initial = b.accept_invitation(b_id).await.unwrap();
        assert!(initial.is_none(), "source plays first, so board went via ACCEPTED");

        // X: 0,1,2 ; O: 3,4
        a.make_move(a_id, "1").await.unwrap();
        b.make_move(b_id, "4").await.unwrap();
        a.make_move(a_id, "2").await.unwrap();
        b.make_move(b_id, "5").await.unwrap();
        a.make_move(a_id, "3").await.unwrap();

        assert_eq!(a.player().unwrap().rating(), 1516);
        assert_eq!(b.player().unwrap().rating(), 1484);
        assert!(a.get_invitation(a_id).is_none());
        assert!(b.get_invitation(b_id).is_none());
    }

    #[tokio::test]
    async fn test_accept_when_source_plays_second_hands_board_to_acceptor() {
        let a = Session::new_for_test(1);
        let b = Session::new_for_test(2);
        a.login(Arc::new(Player::new("alice"))).unwrap();
        b.login(Arc::new(Player::new("bob"))).unwrap();

        // alice invites bob to play first -> alice plays second.
        a.make_invitation(&b, SECOND_ROLE, FIRST_ROLE).await.unwrap();
        let b_id = b.find_invitation_id(&b.get_invitation(0).unwrap()).unwrap();

        let initial = b.accept_invitation(b_id).await.unwrap();
        assert!(initial.is_some());
    }

    #[tokio::test]
    async fn test_revoke_before_accept_notifies_target() {
        let a = Session::new_for_test(1);
        let b = Session::new_for_test(2);
        a.login(Arc::new(Player::new("alice"))).unwrap();
        b.login(Arc::new(Player::new("bob"))).unwrap();

        let a_id = a.make_invitation(&b, FIRST_ROLE, SECOND_ROLE).await.unwrap();
        a.revoke_invitation(a_id).await.unwrap();
        assert!(a.get_invitation(a_id).is_none());
        assert_eq!(b.inner.lock().unwrap().invitations.iter().flatten().count(), 0);
    }

    #[tokio::test]
    async fn test_resign_mid_game_awards_opponent_and_removes_invitation() {
        let a = Session::new_for_test(1);
        let b = Session::new_for_test(2);
        a.login(Arc::new(Player::new("alice"))).unwrap();
        b.login(Arc::new(Player::new("bob"))).unwrap();

        let a_id = a.make_invitation(&b, FIRST_ROLE, SECOND_ROLE).await.unwrap();
        let b_id = b.find_invitation_id(&b.get_invitation(0).unwrap()).unwrap();
        b.accept_invitation(b_id).await.unwrap();

        a.resign_game(a_id).await.unwrap();
        assert!(b.player().unwrap().rating() > 1500);
        assert!(a.get_invitation(a_id).is_none());
        assert!(b.get_invitation(b_id).is_none());
    }

    #[tokio::test]
    async fn test_logout_revokes_open_invitations_and_resigns_games() {
        let a = Session::new_for_test(1);
        let b = Session::new_for_test(2);
        a.login(Arc::new(Player::new("alice"))).unwrap();
        b.login(Arc::new(Player::new("bob"))).unwrap();

        let a_id = a.make_invitation(&b, FIRST_ROLE, SECOND_ROLE).await.unwrap();
        let b_id = b.find_invitation_id(&b.get_invitation(0).unwrap()).unwrap();
        b.accept_invitation(b_id).await.unwrap();

        a.logout().await.unwrap();

        assert!(!a.is_logged_in());
        assert!(b.player().unwrap().rating() > 1500);
    }
}
