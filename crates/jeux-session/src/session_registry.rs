//! Table of all currently connected sessions.
//!
//! Bounded like the source's fixed `MAX_CLIENTS` array, but teardown no
//! longer spins on a shared counter: [`SessionRegistry::wait_for_empty`]
//! parks on a [`tokio::sync::Notify`] that every `unregister` fires, so a
//! shutdown thread blocks cooperatively instead of busy-polling.

use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use jeux_registry::Player;

use crate::error::SessionError;
use crate::session::Session;

/// Upper bound on simultaneously connected sessions, mirroring the
/// source's `MAX_CLIENTS`.
pub const MAX_SESSIONS: usize = 1024;

struct Inner {
    slots: Vec<Option<Arc<Session>>>,
    count: usize,
}

/// Registry of live sessions, keyed by slot rather than address so a
/// session can be looked up, enumerated, or shut down without knowing
/// its id in advance.
pub struct SessionRegistry {
    inner: Mutex<Inner>,
    empty: Notify,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry {
            inner: Mutex::new(Inner {
                slots: (0..MAX_SESSIONS).map(|_| None).collect(),
                count: 0,
            }),
            empty: Notify::new(),
        }
    }

    /// Inserts `session` into the first free slot. Fails if the registry
    /// is at capacity.
    pub async fn register(&self, session: Arc<Session>) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        let idx = inner
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(SessionError::RegistryFull)?;
        inner.slots[idx] = Some(session);
        inner.count += 1;
        Ok(())
    }

    /// Removes `session` from the registry. Wakes any waiter in
    /// [`wait_for_empty`](Self::wait_for_empty) if this was the last one.
    pub async fn unregister(&self, session: &Arc<Session>) {
        let mut inner = self.inner.lock().await;
        if let Some(slot) = inner
            .slots
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, session)))
        {
            *slot = None;
            inner.count -= 1;
            if inner.count == 0 {
                self.empty.notify_waiters();
            }
        }
    }

    /// Logs `session` in as `player`, enforcing "at most one logged-in
    /// session per username" atomically under the registry lock.
    ///
    /// This is why login goes through the registry rather than calling
    /// `Session::login` directly: the single-session-per-username check
    /// and the login itself must be one critical section, or two
    /// dispatchers racing the same new username could both win. Lock
    /// order matches the hierarchy: registry lock (1) acquired before the
    /// session's own lock (3), inside `Session::login`.
    pub async fn login(&self, session: &Arc<Session>, player: Arc<Player>) -> Result<(), SessionError> {
        let inner = self.inner.lock().await;
        let name = player.username().to_string();
        let already_connected = inner.slots.iter().flatten().any(|s| {
            !Arc::ptr_eq(s, session) && s.player().is_some_and(|p| p.username() == name)
        });
        if already_connected {
            return Err(SessionError::PlayerAlreadyConnected);
        }
        session.login(player)
    }

    /// Finds the session currently logged in as `username`, if any.
    pub async fn lookup(&self, username: &str) -> Option<Arc<Session>> {
        let inner = self.inner.lock().await;
        inner.slots.iter().flatten().find(|s| {
            s.player()
                .is_some_and(|p| p.username() == username)
        }).cloned()
    }

    /// Snapshots every logged-in player currently registered.
    pub async fn all_players(&self) -> Vec<Arc<Player>> {
        let inner = self.inner.lock().await;
        inner.slots.iter().flatten().filter_map(|s| s.player()).collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Closes the write half of every registered session's socket,
    /// forcing its read loop to observe EOF and unwind on its own. Unlike
    /// the source's raw `shutdown(fd, SHUT_RD)`, sessions are not
    /// unregistered here — each owning dispatcher task unregisters itself
    /// once it notices the close.
    pub async fn shutdown_all(&self) {
        let inner = self.inner.lock().await;
        for session in inner.slots.iter().flatten() {
            session.request_shutdown();
        }
    }

    /// Blocks until the registry has no registered sessions.
    pub async fn wait_for_empty(&self) {
        loop {
            if self.is_empty().await {
                return;
            }
            let notified = self.empty.notified();
            if self.is_empty().await {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registry_starts_empty() {
        let reg = SessionRegistry::new();
        assert_eq!(reg.len().await, 0);
        assert!(reg.is_empty().await);
    }

    #[tokio::test]
    async fn test_wait_for_empty_returns_immediately_when_already_empty() {
        let reg = SessionRegistry::new();
        reg.wait_for_empty().await;
    }

    #[tokio::test]
    async fn test_lookup_returns_none_for_unknown_username() {
        let reg = SessionRegistry::new();
        assert!(reg.lookup("nobody").await.is_none());
    }

    #[tokio::test]
    async fn test_login_rejects_second_session_with_same_username() {
        let reg = SessionRegistry::new();
        let a = Session::new_for_test(1);
        let b = Session::new_for_test(2);
        reg.register(Arc::clone(&a)).await.unwrap();
        reg.register(Arc::clone(&b)).await.unwrap();

        reg.login(&a, Arc::new(Player::new("alice"))).await.unwrap();
        let err = reg
            .login(&b, Arc::new(Player::new("alice")))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::PlayerAlreadyConnected));
        assert_eq!(reg.lookup("alice").await.map(|s| s.id()), Some(a.id()));
    }
}
