//! Per-connection dispatch: parses inbound packets, routes them to
//! `Session` operations, and replies with `ACK`/`NACK`.
//!
//! One dispatch loop runs per accepted connection, on its own Tokio task.
//! Asynchronous notifications to peer sessions (`INVITED`, `MOVED`, ...)
//! are sent by the `Session` operations themselves, on whichever
//! dispatcher's task happens to be running them — see `jeux-session`.

use std::sync::Arc;

use jeux_protocol::{codec, Packet, PacketType};
use jeux_session::{complementary_role, Session, SessionError};
use tokio::io::AsyncRead;

use crate::error::JeuxError;
use crate::server::AppState;

/// Services one connection: repeatedly receives a packet and routes it,
/// until EOF, a fatal I/O error, or the session is asked to shut down.
/// Runs `logout` on the way out if the session ever logged in.
pub async fn run_dispatch_loop<R>(
    session: Arc<Session>,
    mut reader: R,
    state: Arc<AppState>,
) -> Result<(), JeuxError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let packet = tokio::select! {
            biased;
            _ = session.shutdown_requested() => break,
            received = codec::recv_packet(&mut reader) => match received {
                Ok(packet) => packet,
                Err(_) => break,
            },
        };

        if let Err(err) = route(&session, &state, packet).await {
            if is_connection_fatal(&err) {
                tracing::debug!(session_id = session.id(), error = %err, "fatal error, dropping connection");
                break;
            }
            tracing::debug!(session_id = session.id(), error = %err, "request failed, sending NACK");
            if session.send_nack().await.is_err() {
                break;
            }
        }
    }

    if session.is_logged_in() {
        if let Err(e) = session.logout().await {
            tracing::debug!(session_id = session.id(), error = %e, "logout on teardown failed");
        }
    }
    Ok(())
}

/// Dispatches one already-decoded packet. `Ok` means a response (ACK, or
/// an ACK folded into a peer notification sequence) was already sent;
/// `Err` tells the caller to send a NACK, unless the error is fatal.
async fn route(session: &Arc<Session>, state: &Arc<AppState>, packet: Packet) -> Result<(), SessionError> {
    let Packet { header, payload } = packet;

    if header.packet_type == PacketType::Login {
        return handle_login(session, state, &payload).await;
    }

    if !session.is_logged_in() {
        return Err(SessionError::NotLoggedIn);
    }

    match header.packet_type {
        PacketType::Users => handle_users(session, state).await,
        PacketType::Invite => handle_invite(session, state, header.role, &payload).await,
        PacketType::Revoke => {
            session.revoke_invitation(header.id).await?;
            session.send_ack(0, None).await
        }
        PacketType::Decline => {
            session.decline_invitation(header.id).await?;
            session.send_ack(0, None).await
        }
        PacketType::Accept => handle_accept(session, header.id).await,
        PacketType::Move => handle_move(session, header.id, &payload).await,
        PacketType::Resign => {
            session.resign_game(header.id).await?;
            session.send_ack(0, None).await
        }
        PacketType::Login => unreachable!("handled above"),
        _ => Err(SessionError::UnexpectedRequestType),
    }
}

async fn handle_login(session: &Arc<Session>, state: &Arc<AppState>, payload: &[u8]) -> Result<(), SessionError> {
    if session.is_logged_in() {
        return Err(SessionError::AlreadyLoggedIn);
    }
    let name = std::str::from_utf8(payload).map_err(|_| SessionError::InvalidUtf8Payload)?;
    let player = state.players.register(name).await;
    state.sessions.login(session, player).await?;
    session.send_ack(0, None).await
}

async fn handle_users(session: &Arc<Session>, state: &Arc<AppState>) -> Result<(), SessionError> {
    let players = state.sessions.all_players().await;
    let table = Session::render_users_table(&players);
    session.send_ack(0, Some(table.as_bytes())).await
}

async fn handle_invite(
    session: &Arc<Session>,
    state: &Arc<AppState>,
    requested_target_role: u8,
    payload: &[u8],
) -> Result<(), SessionError> {
    let name = std::str::from_utf8(payload).map_err(|_| SessionError::InvalidUtf8Payload)?;
    let target = state
        .sessions
        .lookup(name)
        .await
        .ok_or_else(|| SessionError::UnknownPeer(name.to_string()))?;
    let source_role = complementary_role(requested_target_role);

    let src_id = session
        .make_invitation(&target, source_role, requested_target_role)
        .await?;
    session.send(PacketType::Ack, src_id, 0, None).await
}

async fn handle_accept(session: &Arc<Session>, id: u8) -> Result<(), SessionError> {
    let initial_board = session.accept_invitation(id).await?;
    session
        .send(PacketType::Ack, id, 0, initial_board.as_deref().map(str::as_bytes))
        .await
}

async fn handle_move(session: &Arc<Session>, id: u8, payload: &[u8]) -> Result<(), SessionError> {
    let move_str = String::from_utf8_lossy(payload);
    session.make_move(id, &move_str).await?;
    session.send_ack(0, None).await
}

/// Distinguishes a semantic request failure (NACK, connection stays
/// open) from an I/O-level fault (connection is lost and must be torn
/// down), per §7's error taxonomy.
fn is_connection_fatal(err: &SessionError) -> bool {
    matches!(err, SessionError::Io(_) | SessionError::Protocol(_))
}
