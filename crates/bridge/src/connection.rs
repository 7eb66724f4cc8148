//! App WebSocket connection
//!
//! Pumps frames between one app client socket and the session actor.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::session::SessionHandle;

/// Serve one app client until either side goes away
pub async fn handle_app_socket(socket: WebSocket, session: SessionHandle) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let Some(conn_id) = session.attach(outbound_tx).await else {
        reject(socket).await;
        return;
    };

    let (ws_write, ws_read) = socket.split();

    tokio::select! {
        _ = forward_requests(outbound_rx, ws_write) => {
            debug!("[OWL - Bridge] request channel closed");
        }
        _ = forward_responses(conn_id, ws_read, &session) => {
            debug!("[OWL - Bridge] app socket closed");
        }
    }

    session.detach(conn_id);
}

async fn reject(mut socket: WebSocket) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: "another app client is already attached".into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!("[OWL - Bridge] failed to send close frame: {}", e);
    }
}

async fn forward_requests(
    mut outbound: mpsc::UnboundedReceiver<String>,
    mut ws_write: SplitSink<WebSocket, Message>,
) {
    while let Some(text) = outbound.recv().await {
        trace!("[OWL - Bridge] -> app: {} bytes", text.len());
        if let Err(e) = ws_write.send(Message::Text(text)).await {
            warn!("[OWL - Bridge] failed to send to app: {}", e);
            return;
        }
    }

    let _ = ws_write.close().await;
}

async fn forward_responses(
    conn_id: u64,
    mut ws_read: SplitStream<WebSocket>,
    session: &SessionHandle,
) {
    while let Some(msg) = ws_read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                trace!("[OWL - Bridge] <- app: {} bytes", text.len());
                session.on_message(conn_id, text);
            }
            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => session.on_message(conn_id, text),
                Err(_) => warn!("[OWL - Bridge] dropping non UTF-8 binary frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(e) => {
                warn!("[OWL - Bridge] app socket error: {}", e);
                break;
            }
        }
    }
}
