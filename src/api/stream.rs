//! Live effective-snapshot stream
//!
//! Sends the current view on connect, then a fresh view after every store
//! revision. Ends when the client leaves or the console shuts down.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{auth::AuthBearer, controller::AppState, controller::Console};

pub async fn stream(
    ws: WebSocketUpgrade,
    State(st): State<AppState>,
    AuthBearer: AuthBearer,
) -> Response {
    let console = st.console.clone();
    ws.on_upgrade(move |socket| push_views(socket, console))
}

async fn push_views(mut socket: WebSocket, console: Arc<Console>) {
    let cancel = console.cancellation();
    let mut revisions = console.store.subscribe();
    debug!("snapshot stream opened");

    'outer: loop {
        revisions.borrow_and_update();
        let text = match serde_json::to_string(&console.effective()) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "failed to encode effective view");
                break;
            }
        };
        if socket.send(Message::Text(text)).await.is_err() {
            break;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = socket.send(Message::Close(None)).await;
                    break 'outer;
                }
                changed = revisions.changed() => {
                    if changed.is_err() {
                        break 'outer;
                    }
                    continue 'outer;
                }
                incoming = socket.recv() => match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break 'outer,
                    Some(Ok(_)) => {}
                },
            }
        }
    }
    debug!("snapshot stream closed");
}
