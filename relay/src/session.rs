//! Per-connection lifecycle.
//!
//! Each accepted WebSocket runs through one call to [`run`]:
//! handshake → drain backlog → register-and-replay → read loop → teardown.
//! The backlog is drained before registration and queued onto the
//! connection inside the registry's critical section, so no concurrently
//! routed message can be delivered ahead of it. Teardown always
//! unregisters, whatever path the read loop exits through: the registry
//! entry is released by a guard's `Drop`, not by a code path that an early
//! return could skip.

use crate::error::{SessionError, SessionResult};
use crate::registry::ConnectionHandle;
use crate::server::Relay;
use axum::extract::ws::{Message as WsFrame, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use relay_types::{Message, UserId};
use serde::Deserialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Drive one connection from handshake to teardown.
pub async fn run(relay: Arc<Relay>, socket: WebSocket) {
    relay
        .metrics()
        .connections_total
        .fetch_add(1, Ordering::Relaxed);

    let (sink, mut stream) = socket.split();

    // Handshaking: exactly one initial frame identifies the connecting user.
    // Failure here is terminal — no registration has happened, nothing to
    // undo, nothing lost.
    let timeout_secs = relay.config().limits.handshake_timeout_secs;
    let handshake = tokio::time::timeout(
        Duration::from_secs(timeout_secs),
        read_handshake(&mut stream),
    )
    .await;
    let user_id = match handshake {
        Ok(Ok(user_id)) => user_id,
        Ok(Err(e)) => {
            relay
                .metrics()
                .handshake_failures
                .fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, "closing connection before registration");
            return;
        }
        Err(_) => {
            relay
                .metrics()
                .handshake_failures
                .fetch_add(1, Ordering::Relaxed);
            tracing::warn!(timeout_secs, "no handshake within timeout; closing connection");
            return;
        }
    };

    tracing::info!(user = %user_id, "session established");

    let (conn, outbound_rx) = ConnectionHandle::channel();

    // The writer task owns the sink and is the only code that touches it;
    // everything outbound goes through the connection handle's queue.
    let _writer = tokio::spawn(write_outbound(user_id.clone(), sink, outbound_rx));

    // Drain before registering: a message routed while the drain runs still
    // finds no registry entry and goes to the offline queue for the next
    // reconnect, so nothing can jump ahead of the backlog.
    let backlog = drain_backlog(&relay, &user_id).await;
    let backlog_len = backlog.len();
    let replayed = relay
        .registry()
        .register_with_backlog(user_id.clone(), conn.clone(), backlog);
    if replayed > 0 {
        relay
            .metrics()
            .replayed_total
            .fetch_add(replayed as u64, Ordering::Relaxed);
        tracing::info!(user = %user_id, count = replayed, "replayed offline backlog");
    }
    if replayed < backlog_len {
        tracing::warn!(
            user = %user_id,
            dropped = backlog_len - replayed,
            "connection closed mid-replay; remaining backlog dropped"
        );
    }
    let _registration = RegistrationGuard {
        relay: relay.clone(),
        user_id: user_id.clone(),
        conn,
    };

    match read_loop(&relay, &mut stream).await {
        Ok(()) => tracing::debug!(user = %user_id, "peer disconnected"),
        Err(e) => tracing::warn!(user = %user_id, error = %e, "closing connection"),
    }

    // Falling out of scope drops the guard (unregistering) and our handle;
    // once the dispatcher holds no transient clone the outbound queue
    // closes, and the detached writer flushes what was queued and exits.
}

/// Removes the registry entry when the session ends.
///
/// Unregistration is identity-checked, so if this session was already
/// replaced by a newer connection for the same user, the replacement's
/// entry is left alone.
struct RegistrationGuard {
    relay: Arc<Relay>,
    user_id: UserId,
    conn: ConnectionHandle,
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if self.relay.registry().unregister(&self.user_id, &self.conn) {
            tracing::info!(user = %self.user_id, "session closed");
        } else {
            tracing::debug!(user = %self.user_id, "session closed (already replaced)");
        }
    }
}

/// The handshake frame: the wire message shape with only `senderID` read.
///
/// `recipientID` and `encryptedContent` are unused at handshake time and may
/// be empty or absent.
#[derive(Debug, Deserialize)]
struct Hello {
    #[serde(rename = "senderID")]
    sender_id: UserId,
}

fn parse_handshake(text: &str) -> SessionResult<UserId> {
    serde_json::from_str::<Hello>(text)
        .map(|hello| hello.sender_id)
        .map_err(|e| SessionError::Handshake {
            reason: e.to_string(),
        })
}

async fn read_handshake(stream: &mut SplitStream<WebSocket>) -> SessionResult<UserId> {
    loop {
        let frame = stream
            .next()
            .await
            .ok_or_else(|| SessionError::Handshake {
                reason: "connection closed before handshake".to_string(),
            })?
            .map_err(|e| SessionError::Handshake {
                reason: e.to_string(),
            })?;

        match frame {
            WsFrame::Text(text) => return parse_handshake(&text),
            WsFrame::Ping(_) | WsFrame::Pong(_) => continue,
            WsFrame::Binary(_) => {
                return Err(SessionError::Handshake {
                    reason: "binary frame before handshake".to_string(),
                })
            }
            WsFrame::Close(_) => {
                return Err(SessionError::Handshake {
                    reason: "peer closed before handshake".to_string(),
                })
            }
        }
    }
}

/// Drain the user's offline backlog, oldest first.
///
/// Best-effort: a drain failure logs and the session continues with no
/// replay; the queue stays intact for a future attempt.
async fn drain_backlog(relay: &Relay, user_id: &UserId) -> Vec<Message> {
    match relay.store().drain(user_id).await {
        Ok(backlog) => backlog,
        Err(e) => {
            relay
                .metrics()
                .store_failures
                .fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                user = %user_id,
                error = %e,
                "offline drain failed; no replay this session"
            );
            Vec::new()
        }
    }
}

/// Read inbound frames and hand each message to the dispatcher, in read
/// order, until the transport ends.
///
/// Returns `Ok` on a graceful close or peer disconnect; any read failure or
/// malformed frame ends the loop with the corresponding error. Messages
/// already handed to the dispatcher are unaffected either way.
async fn read_loop(relay: &Relay, stream: &mut SplitStream<WebSocket>) -> SessionResult<()> {
    while let Some(frame) = stream.next().await {
        let frame = frame.map_err(|e| SessionError::Read(e.to_string()))?;

        match frame {
            WsFrame::Text(text) => {
                let message = Message::from_json(&text)?;
                relay.dispatch(message).await?;
            }
            WsFrame::Binary(_) => {
                return Err(SessionError::Read("unexpected binary frame".to_string()))
            }
            WsFrame::Close(_) => return Ok(()),
            WsFrame::Ping(_) | WsFrame::Pong(_) => {}
        }
    }
    Ok(())
}

/// Forward queued outbound messages onto the socket until the queue closes
/// or a write fails.
async fn write_outbound(
    user_id: UserId,
    mut sink: SplitSink<WebSocket, WsFrame>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = rx.recv().await {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(user = %user_id, error = %e, "failed to encode outbound message; dropped");
                continue;
            }
        };
        if let Err(e) = sink.send(WsFrame::Text(text)).await {
            tracing::warn!(user = %user_id, error = %e, "outbound write failed; writer stopping");
            break;
        }
    }
    // Best-effort close frame; the peer may already be gone.
    let _ = sink.close().await;
}
