//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{future, SinkExt, StreamExt};
use tracing::{debug, info};

use crate::app::AppState;
use crate::ws::session::{Session, TransportError};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sink, ws_stream) = socket.split();

    // Text frames only; axum answers pings itself
    let stream = ws_stream.filter_map(|frame| {
        future::ready(match frame {
            Ok(Message::Text(text)) => Some(Ok(text)),
            // The stream ends right after a close frame
            Ok(Message::Close(_)) => {
                debug!("Client initiated close");
                None
            }
            Ok(Message::Binary(_)) => {
                debug!("Received binary message, ignoring");
                None
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
            Err(e) => Some(Err(TransportError::WebSocket(e))),
        })
    });

    let sink = ws_sink.with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text))));

    let session = Session::new(state.matchmaking.clone(), stream, sink);
    let session_id = session.handle().id;
    info!(session_id = %session_id, "New WebSocket connection");

    // Errors are logged by the session itself
    let _ = session.run().await;

    info!(session_id = %session_id, "WebSocket connection closed");
}
