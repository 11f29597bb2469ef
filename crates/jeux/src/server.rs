//! Listener accept loop, per-connection registration, and graceful
//! SIGHUP-triggered shutdown.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use jeux_registry::PlayerRegistry;
use jeux_session::{Session, SessionRegistry};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex as AsyncMutex;

use crate::dispatch;
use crate::error::JeuxError;

/// State shared by every connection's dispatch task.
pub struct AppState {
    pub sessions: SessionRegistry,
    pub players: PlayerRegistry,
    /// The process-wide network write lock (leaf of the lock hierarchy),
    /// shared by every `Session` so outbound writes across the whole
    /// server are strictly serialized.
    network_lock: Arc<AsyncMutex<()>>,
    next_session_id: AtomicU64,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        Arc::new(AppState {
            sessions: SessionRegistry::new(),
            players: PlayerRegistry::new(),
            network_lock: Arc::new(AsyncMutex::new(())),
            next_session_id: AtomicU64::new(0),
        })
    }

    fn next_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Runs the accept loop until `SIGHUP` is received, then drains.
///
/// On shutdown: every registered session is asked to stop (its dispatch
/// loop observes this the next time it would otherwise block on a read),
/// then this function waits for the registry to empty out before
/// returning, mirroring the source's `creg_shutdown_all` +
/// `creg_wait_for_empty` teardown sequence.
pub async fn run(listener: TcpListener, state: Arc<AppState>) -> Result<(), JeuxError> {
    let mut sighup = signal(SignalKind::hangup())?;
    tracing::info!(addr = %listener.local_addr()?, "jeux server listening");

    loop {
        tokio::select! {
            biased;
            _ = sighup.recv() => {
                tracing::info!("SIGHUP received, shutting down gracefully");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => spawn_connection(stream, addr, Arc::clone(&state)),
                Err(e) => tracing::error!(error = %e, "accept failed"),
            },
        }
    }

    state.sessions.shutdown_all().await;
    state.sessions.wait_for_empty().await;
    tracing::info!("jeux server terminated");
    Ok(())
}

/// Registers a newly-accepted connection and spawns its dispatch task.
/// Connections rejected for a full registry are closed without a reply,
/// per the "resource exhaustion" error category — there is no session
/// yet to send a NACK through.
fn spawn_connection(stream: TcpStream, addr: SocketAddr, state: Arc<AppState>) {
    let _ = stream.set_nodelay(true);
    let (read_half, write_half) = stream.into_split();
    let id = state.next_session_id();
    let session = Session::new(id, write_half, Arc::clone(&state.network_lock));

    tokio::spawn(async move {
        if let Err(e) = state.sessions.register(Arc::clone(&session)).await {
            tracing::warn!(%addr, session_id = id, error = %e, "rejecting connection, registry full");
            return;
        }
        tracing::debug!(%addr, session_id = id, "accepted connection");

        if let Err(e) = dispatch::run_dispatch_loop(Arc::clone(&session), read_half, Arc::clone(&state)).await {
            tracing::debug!(%addr, session_id = id, error = %e, "connection ended with error");
        }
        state.sessions.unregister(&session).await;
    });
}
