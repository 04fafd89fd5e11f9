//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::directory::{new_connection_id, MatchDirectory};
use crate::game::{MatchInput, MoveInput};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, PlayerId, ServerMsg};

/// Outbound messages buffered per connection
const OUTBOUND_BUFFER: usize = 512;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let player_id = new_connection_id();
    info!(player_id = %player_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        player_id,
        server_time: unix_millis(),
    };
    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(player_id = %player_id, error = %e, "Failed to send welcome");
        return;
    }

    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_BUFFER);
    state.directory.register_connection(player_id, out_tx);

    run_session(player_id, &state.directory, ws_sink, ws_stream, out_rx).await;

    // Cleanup on disconnect
    state.directory.disconnect(player_id);

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    player_id: PlayerId,
    directory: &Arc<MatchDirectory>,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut out_rx: mpsc::Receiver<ServerMsg>,
) {
    let rate_limiter = PlayerRateLimiter::new();

    // Spawn writer task: outbound queue -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(player_id = %player_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> directory
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %player_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => handle_client_msg(player_id, directory, client_msg),
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Dispatch one parsed message. Session requests are acknowledged, in-match
/// intents are fire-and-forget.
fn handle_client_msg(player_id: PlayerId, directory: &Arc<MatchDirectory>, msg: ClientMsg) {
    let request = msg.name();

    let session_result = match msg {
        ClientMsg::CreateSession {
            room_id,
            target_size,
        } => Some(directory.create_session(player_id, room_id, target_size)),
        ClientMsg::JoinSession { room_id } => Some(directory.join_session(player_id, &room_id)),
        ClientMsg::LeaveSession => Some(directory.leave_session(player_id)),
        ClientMsg::StartMatch { room_id } => Some(directory.start_match(player_id, &room_id)),
        ClientMsg::Move {
            room_id,
            player_id: claimed,
            press_time,
            movement,
            ts,
        } => {
            let input = MatchInput::Move {
                player_id: claimed,
                input: MoveInput {
                    press_time,
                    movement,
                    ts,
                },
            };
            directory.route(player_id, &room_id, input);
            None
        }
        ClientMsg::UseItem {
            room_id,
            player_id: claimed,
        } => {
            directory.route(player_id, &room_id, MatchInput::UseItem { player_id: claimed });
            None
        }
        ClientMsg::Shoot {
            room_id,
            player_id: claimed,
            target_x,
            target_y,
        } => {
            let input = MatchInput::Shoot {
                player_id: claimed,
                target_x,
                target_y,
            };
            directory.route(player_id, &room_id, input);
            None
        }
        ClientMsg::Ping { t } => {
            directory.send_to(&player_id, ServerMsg::Pong { t });
            None
        }
    };

    if let Some(result) = session_result {
        if let Err(e) = &result {
            debug!(player_id = %player_id, request, error = %e, "Session request rejected");
        }
        let ack = ServerMsg::Ack {
            request: request.to_string(),
            ok: result.is_ok(),
        };
        directory.send_to(&player_id, ack);
    }
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
