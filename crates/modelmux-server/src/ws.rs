//! Dashboard WebSocket transport.

use crate::context::CoreContext;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use modelmux_metrics::HubReply;
use std::sync::Arc;

pub async fn ws_handler(
    State(ctx): State<Arc<CoreContext>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| socket_loop(ctx, socket))
}

async fn socket_loop(ctx: Arc<CoreContext>, socket: WebSocket) {
    let (id, mut outbound) = match ctx.hub.register() {
        Ok(registered) => registered,
        Err(error) => {
            tracing::warn!(error = %error, "websocket refused");
            let mut socket = socket;
            let _ = socket
                .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                    code: 1013, // try again later
                    reason: "connection limit reached".into(),
                })))
                .await;
            return;
        }
    };
    ctx.metrics.set_active_connections(ctx.hub.count());

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                match frame {
                    Some(frame) => {
                        if sink.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    // Sender dropped: swept as stale or shutting down.
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match ctx.hub.handle_message(&id, &text) {
                            HubReply::Send(reply) => {
                                if sink.send(Message::Text(reply)).await.is_err() {
                                    break;
                                }
                            }
                            HubReply::Comprehensive => {
                                let snapshot = ctx.metrics.comprehensive().to_string();
                                if sink.send(Message::Text(snapshot)).await.is_err() {
                                    break;
                                }
                            }
                            HubReply::None => {}
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        ctx.hub.touch(&id);
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => ctx.hub.touch(&id),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(Message::Binary(_))) => {}
                }
            }
        }
    }

    ctx.hub.unregister(&id);
    ctx.metrics.set_active_connections(ctx.hub.count());
}
