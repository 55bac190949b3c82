//! WebSocket upgrade handler and per-session message pump

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{MatchHandle, PlayerInput};
use crate::util::codes::sanitize_code;
use crate::util::rate_limit::SessionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler. Sessions are anonymous: a fresh id per socket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4();
    info!(session_id = %session_id, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        session_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(session_id = %session_id, error = %e, "Failed to send welcome");
        return;
    }

    // The first meaningful message must be a join; everything else before it
    // is dropped
    let join = loop {
        match ws_stream.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMsg>(&text) {
                Ok(msg @ ClientMsg::Join { .. }) => break msg,
                Ok(other) => {
                    debug!(session_id = %session_id, msg = ?other, "Message before join dropped");
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Failed to parse client message");
                }
            },
            Some(Ok(Message::Close(_))) | None => {
                info!(session_id = %session_id, "Closed before joining");
                return;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                error!(session_id = %session_id, error = %e, "WebSocket error before join");
                return;
            }
        }
    };

    let Some(handle) = resolve_match(&state, &join) else {
        let _ = send_msg(
            &mut ws_sink,
            &ServerMsg::Error {
                session_id: Some(session_id),
                code: "room-not-found".to_string(),
                message: "No match with that code".to_string(),
            },
        )
        .await;
        return;
    };

    // Subscribe before forwarding the join so this session observes its own
    // player-joined and room-code events
    let event_rx = handle.event_tx.subscribe();
    let input_tx = handle.input_tx.clone();

    let join_input = PlayerInput {
        session_id,
        msg: join,
        received_at: unix_millis(),
    };
    if input_tx.send(join_input).await.is_err() {
        debug!(session_id = %session_id, "Match closed during join");
        return;
    }

    run_session(session_id, ws_sink, ws_stream, input_tx.clone(), event_rx).await;

    // Signal the match whether the client left cleanly or the transport died
    let _ = input_tx
        .send(PlayerInput {
            session_id,
            msg: ClientMsg::Leave,
            received_at: unix_millis(),
        })
        .await;

    info!(session_id = %session_id, "WebSocket connection closed");
}

/// Map join options onto a match: explicit code first, then a public slot,
/// otherwise a fresh match. Returns None only for a bad private code.
fn resolve_match(state: &AppState, join: &ClientMsg) -> Option<MatchHandle> {
    let ClientMsg::Join {
        is_public,
        code,
        map,
        ..
    } = join
    else {
        return None;
    };
    let map = map.clone().unwrap_or_else(|| "stadium".to_string());

    if let Some(raw) = code {
        let code = sanitize_code(raw)?;
        if let Some(handle) = state.registry.resolve_code(&code) {
            return Some(handle);
        }
        if !*is_public {
            // friend-invite flow: first joiner creates the room under the
            // requested code
            return Some(state.registry.create_match(Some(code), false, map));
        }
        return None;
    }

    if *is_public {
        if let Some(handle) = state.registry.find_public() {
            return Some(handle);
        }
        return Some(state.registry.create_match(None, true, map));
    }

    Some(state.registry.create_match(None, false, map))
}

/// Pump messages both ways until the socket closes
async fn run_session(
    session_id: Uuid,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    input_tx: mpsc::Sender<PlayerInput>,
    mut event_rx: broadcast::Receiver<ServerMsg>,
) {
    let rate_limiter = SessionRateLimiter::new();

    // Writer task: match events and snapshots -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(msg) => {
                    // the match broadcasts on one channel; replies addressed
                    // to another session are not ours to deliver
                    if msg.target_session().is_some_and(|target| target != session_id) {
                        continue;
                    }
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(session_id = %session_id, error = %e, "WebSocket send failed");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // a slow client misses snapshots but is not disconnected
                    warn!(session_id = %session_id, lagged = n, "Client lagged, skipping messages");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(session_id = %session_id, "Event channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> match task
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let msg = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "Failed to parse client message");
                        continue;
                    }
                };

                let allowed = match &msg {
                    ClientMsg::Input { .. } => rate_limiter.check_input(),
                    ClientMsg::Chat { .. } => rate_limiter.check_chat(),
                    _ => true,
                };
                if !allowed {
                    debug!(session_id = %session_id, "Rate limited message dropped");
                    continue;
                }

                let leaving = matches!(msg, ClientMsg::Leave);
                let input = PlayerInput {
                    session_id,
                    msg,
                    received_at: unix_millis(),
                };
                if input_tx.send(input).await.is_err() {
                    debug!(session_id = %session_id, "Input channel closed");
                    break;
                }
                if leaving {
                    break;
                }
            }
            Ok(Message::Binary(_)) => {
                debug!(session_id = %session_id, "Binary message ignored");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
