//! WebSocket endpoint: one reader loop and one writer task per connection.

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use socialbook_shared::{ConnectionId, UserId};

use super::events::{CallRequest, CallSignal, ClientEvent, JoinRequest, ServerEvent};
use crate::auth::authenticate;
use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (connection, rx) = state.registry.register().await;
    let (sink, mut stream) = socket.split();
    let writer = tokio::spawn(write_events(connection, sink, rx));

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => handle_frame(&state, connection, text.as_str()).await,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(connection = %connection, error = %e, "WebSocket read failed");
                break;
            }
        }
    }

    state.presence.disconnect(connection).await;
    writer.abort();
    debug!(connection = %connection, "WebSocket closed");
}

async fn write_events(
    connection: ConnectionId,
    mut sink: futures::stream::SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<ServerEvent>,
) {
    while let Some(event) = rx.recv().await {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                warn!(connection = %connection, event = event.name(), error = %e, "Failed to encode event");
                continue;
            }
        };
        if sink.send(WsMessage::Text(json.into())).await.is_err() {
            break;
        }
    }
}

/// Parse and dispatch one text frame. Garbage is logged and ignored.
pub async fn handle_frame(state: &AppState, connection: ConnectionId, text: &str) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => dispatch(state, connection, event).await,
        Err(e) => debug!(connection = %connection, error = %e, "Ignoring malformed frame"),
    }
}

pub async fn dispatch(state: &AppState, connection: ConnectionId, event: ClientEvent) {
    match event {
        ClientEvent::Join(request) => join(state, connection, request).await,
        ClientEvent::Typing(request) => {
            if let Some(from) = bound_user(state, connection, "typing", request.from).await {
                state.events.to_user(request.to, ServerEvent::Typing { from }).await;
            }
        }
        ClientEvent::StopTyping(request) => {
            if let Some(from) = bound_user(state, connection, "stopTyping", request.from).await {
                state.events.to_user(request.to, ServerEvent::StopTyping { from }).await;
            }
        }
        ClientEvent::JoinGroup(group) => {
            state.registry.subscribe_group(connection, group).await;
        }
        ClientEvent::LeaveGroup(group) => {
            state.registry.unsubscribe_group(connection, group).await;
        }
        ClientEvent::StartCall(call) => relay_call(state, connection, call, ServerEvent::IncomingCall).await,
        ClientEvent::AcceptCall(call) => relay_call(state, connection, call, ServerEvent::CallAccepted).await,
        ClientEvent::EndCall(call) => relay_call(state, connection, call, ServerEvent::CallEnded).await,
    }
}

async fn join(state: &AppState, connection: ConnectionId, request: JoinRequest) {
    let verified = match authenticate(state, &request.token).await {
        Ok(user) if user.id == request.user_id => user.id,
        Ok(user) => {
            warn!(
                connection = %connection,
                claimed = %request.user_id,
                verified = %user.id,
                "Join rejected: identity mismatch"
            );
            reject(state, connection, "Token does not match userId").await;
            return;
        }
        Err(e) => {
            info!(connection = %connection, claimed = %request.user_id, error = %e, "Join rejected");
            reject(state, connection, &e.to_string()).await;
            return;
        }
    };

    state.presence.join(connection, verified).await;
}

async fn reject(state: &AppState, connection: ConnectionId, message: &str) {
    state
        .events
        .to_connection(connection, ServerEvent::error(message))
        .await;
}

/// The sender identity of a relayed event is always the connection's bound
/// user; a `from` claimed in the payload is only logged.
async fn bound_user(
    state: &AppState,
    connection: ConnectionId,
    event: &str,
    claimed: Option<UserId>,
) -> Option<UserId> {
    let user = state.registry.user_of(connection).await;
    match (user, claimed) {
        (None, _) => debug!(connection = %connection, event, "Dropping event from unjoined connection"),
        (Some(bound), Some(claimed)) if bound != claimed => {
            debug!(connection = %connection, event, bound = %bound, claimed = %claimed, "Ignoring claimed sender");
        }
        _ => {}
    }
    user
}

async fn relay_call(
    state: &AppState,
    connection: ConnectionId,
    call: CallRequest,
    wrap: fn(CallSignal) -> ServerEvent,
) {
    let Some(from) = bound_user(state, connection, "call", call.from).await else {
        return;
    };
    let signal = CallSignal {
        from,
        to: call.to,
        kind: call.kind,
        signal: call.signal,
    };
    state.events.to_user(call.to, wrap(signal)).await;
}
