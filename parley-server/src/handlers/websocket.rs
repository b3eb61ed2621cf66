//! WebSocket upgrade and connection handling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use parley_core::core_presence::ConnectionHandle;
use parley_core::events::{ClientFrame, ServerEvent};
use parley_core::{Handshake, RelayHub, Session};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// GET /socket?userID=..&name=..
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(handshake): Query<Handshake>,
    headers: HeaderMap,
) -> Response {
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    if !state.config.origin_allowed(origin) {
        warn!(origin = ?origin, "websocket origin refused");
        return ApiError::new(StatusCode::FORBIDDEN, "origin not allowed").into_response();
    }

    // Reserve the slot before upgrading; a failed upgrade drops it with the callback
    let max = state.config.server.max_connections;
    let Some(slot) = ConnectionSlot::reserve(&state.ws_connections, max) else {
        return ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("too many WebSocket connections (max {})", max),
        )
        .into_response();
    };

    ws.on_upgrade(move |socket| ws_connection(socket, state, handshake, slot))
        .into_response()
}

/// One unit of the live connection count, released on drop
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn reserve(count: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        let previous = count.fetch_add(1, Ordering::AcqRel);
        if previous >= max {
            count.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        Some(Self(count.clone()))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

async fn ws_connection(
    mut socket: WebSocket,
    state: Arc<AppState>,
    handshake: Handshake,
    _slot: ConnectionSlot,
) {
    let mut shutdown = state.shutdown.subscribe();
    let (handle, mut outbound) = ConnectionHandle::new();
    let connection = handle.id();
    let session = state.hub.connect(handshake, handle).await;

    match &session {
        Some(session) => info!(user_id = %session.user_id(), %connection, "websocket connected"),
        None => debug!(%connection, "websocket connected without identity"),
    }

    loop {
        tokio::select! {
            // Forward hub events to the client
            Some(event) = outbound.recv() => {
                if send_event(&mut socket, &event).await.is_err() {
                    break; // client disconnected
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        let Some(session) = session.as_ref() else {
                            debug!(%connection, "event from anonymous connection ignored");
                            continue;
                        };
                        if let Some(reply) = dispatch(&state.hub, session, &text).await {
                            if send_event(&mut socket, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = socket.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(%connection, error = %e, "websocket receive failed");
                        break;
                    }
                    _ => {} // binary and pong frames carry no events
                }
            }
            _ = shutdown.recv() => {
                let _ = socket.send(WsMessage::Close(None)).await;
                break;
            }
        }
    }

    if let Some(session) = session {
        let user_id = session.user_id().clone();
        if state.hub.disconnect(session).await {
            info!(user_id = %user_id, %connection, "websocket disconnected");
        } else {
            debug!(user_id = %user_id, %connection, "stale connection closed");
        }
    }
}

/// Decode and handle one inbound text frame, returning the ack to send back
async fn dispatch(hub: &RelayHub, session: &Session, text: &str) -> Option<ServerEvent> {
    let frame = match ClientFrame::decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(user_id = %session.user_id(), error = %e, "undecodable frame dropped");
            return None;
        }
    };

    hub.handle(session, frame).await.map(ServerEvent::Ack)
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), axum::Error> {
    match event.to_json() {
        Ok(json) => socket.send(WsMessage::Text(json)).await,
        Err(e) => {
            warn!(event = event.name(), error = %e, "failed to encode event");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_reservation_respects_cap() {
        let count = Arc::new(AtomicUsize::new(0));
        let first = ConnectionSlot::reserve(&count, 2).unwrap();
        let _second = ConnectionSlot::reserve(&count, 2).unwrap();

        assert!(ConnectionSlot::reserve(&count, 2).is_none());
        assert_eq!(count.load(Ordering::Acquire), 2);

        drop(first);
        assert_eq!(count.load(Ordering::Acquire), 1);
        assert!(ConnectionSlot::reserve(&count, 2).is_some());
        assert_eq!(count.load(Ordering::Acquire), 1);
    }

    #[test]
    fn test_concurrent_reservations_never_overshoot() {
        let count = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let count = count.clone();
                std::thread::spawn(move || ConnectionSlot::reserve(&count, 4))
            })
            .collect();

        let slots: Vec<_> = handles.into_iter().filter_map(|h| h.join().unwrap()).collect();
        assert_eq!(slots.len(), 4);
        assert_eq!(count.load(Ordering::Acquire), 4);

        drop(slots);
        assert_eq!(count.load(Ordering::Acquire), 0);
    }
}
