use std::{net::SocketAddr, sync::Arc};

use {
    axum::extract::ws::{Message as WsMessage, WebSocket},
    futures::{SinkExt, StreamExt},
    tokio::sync::mpsc,
    tracing::{debug, warn},
};

use crate::relay::ChatRelay;

/// Drive one WebSocket connection until either side closes it.
///
/// Outbound frames go through an unbounded channel to a dedicated write loop,
/// so a broadcast never waits on this socket. Every inbound text frame is
/// handled on its own task, so frames from one connection are not processed in
/// arrival order: two quick sends may be stored in either order, and a send may
/// land before an earlier identify. Clients order messages by id.
pub async fn handle_connection(socket: WebSocket, relay: Arc<ChatRelay>, remote_addr: SocketAddr) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();

    let conn_id = relay.connect(client_tx, Some(remote_addr)).await;

    let write_conn_id = conn_id.clone();
    let write_handle = tokio::spawn(async move {
        while let Some(frame) = client_rx.recv().await {
            if let Err(e) = ws_tx.send(WsMessage::Text(frame.into())).await {
                debug!(conn_id = %write_conn_id, error = %e, "write loop stopped");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    while let Some(msg) = ws_rx.next().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text.as_str().to_owned(),
            Ok(WsMessage::Close(_)) => break,
            Ok(WsMessage::Binary(_)) => {
                relay.stats().record_malformed();
                debug!(conn_id = %conn_id, "ignoring binary frame");
                continue;
            },
            Ok(_) => continue,
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "websocket read error");
                break;
            },
        };

        let relay = Arc::clone(&relay);
        let frame_conn_id = conn_id.clone();
        tokio::spawn(async move {
            relay.handle_frame(&frame_conn_id, &text).await;
        });
    }

    // Dropping the registry entry drops the last sender, which ends the write
    // loop once queued frames are flushed.
    relay.disconnect(&conn_id).await;
    if let Err(e) = write_handle.await {
        debug!(conn_id = %conn_id, error = %e, "write loop join failed");
    }
}
