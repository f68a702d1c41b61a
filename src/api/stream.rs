//! Live log stream over a WebSocket (GET /logs/stream)
//!
//! A tenant caller receives its own tenant's logs; an administrative caller
//! with no tenant receives every tenant's. Each committed log arrives as one
//! JSON text frame.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::HeaderMap,
    response::Response,
};
use futures::{Sink, SinkExt, StreamExt};
use tracing::{debug, warn};

use super::{error::ApiError, state::AppState, utils::identity};
use crate::messaging::{GLOBAL_CHANNEL, Subscription, tenant_channel};

pub async fn stream_logs(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let caller = identity(&headers)?;
    let channel = if caller.tenant_id.is_empty() {
        GLOBAL_CHANNEL.to_string()
    } else {
        tenant_channel(&caller.tenant_id)
    };

    // Subscribe before the upgrade completes so no log committed after the
    // handshake is missed.
    let subscription = state.feed.subscribe(channel.clone());
    debug!(%channel, user_id = %caller.user_id, "Live stream opened");

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, subscription, channel)))
}

async fn handle_socket(socket: WebSocket, subscription: Subscription, channel: String) {
    let (sink, mut incoming) = socket.split();
    let forward = forward_events(sink, subscription);
    tokio::pin!(forward);

    loop {
        tokio::select! {
            _ = &mut forward => break,
            frame = incoming.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Client frames carry nothing; pings are answered by axum.
                Some(Ok(_)) => {}
            },
        }
    }

    debug!(%channel, "Live stream closed");
}

/// Send every event on `subscription` to `sink` until either side goes away.
pub(crate) async fn forward_events<S>(mut sink: S, mut subscription: Subscription)
where
    S: Sink<Message> + Unpin,
{
    while let Some(event) = subscription.next().await {
        let text = match serde_json::to_string(&event.log) {
            Ok(text) => text,
            Err(error) => {
                warn!(log_id = %event.log.id, %error, "Skipping unserializable log");
                continue;
            }
        };
        if sink.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
}
