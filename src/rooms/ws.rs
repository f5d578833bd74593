use std::time::Duration;

use axum::{
    debug_handler,
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::{
    sync::mpsc,
    time::{self, Instant},
};
use tracing::info;
use uuid::Uuid;

use crate::{
    connection::{self, MAX_FRAME_BYTES},
    hub::Outbound,
    SharedBroker,
};

const PING_INTERVAL: Duration = Duration::from_secs(25);
/// A peer silent for this long is treated as gone.
const PING_TIMEOUT: Duration = Duration::from_secs(60);

#[debug_handler(state = crate::AppState)]
pub async fn room_ws(
    State(broker): State<SharedBroker>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.max_message_size(MAX_FRAME_BYTES)
        .max_frame_size(MAX_FRAME_BYTES)
        .on_upgrade(move |stream| serve_socket(stream, broker))
}

async fn serve_socket(stream: WebSocket, broker: SharedBroker) {
    let conn = Uuid::now_v7();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let (mut sender, mut receiver) = stream.split();

    connection::connect(&mut *broker.lock().await, conn, tx);

    let mut forward_task = tokio::spawn(async move {
        let mut heartbeat = time::interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
        loop {
            let message = tokio::select! {
                frame = rx.recv() => match frame {
                    Some(frame) => Message::Text(frame.to_json().to_string().into()),
                    None => break,
                },
                _ = heartbeat.tick() => Message::Ping(Default::default()),
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let deadline = time::sleep(PING_TIMEOUT);
    tokio::pin!(deadline);

    let reason = loop {
        tokio::select! {
            msg = receiver.next() => {
                deadline.as_mut().reset(Instant::now() + PING_TIMEOUT);
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(frame) = connection::parse_frame(conn, text.as_str()) {
                            connection::handle_event(&mut *broker.lock().await, conn, frame);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break "client disconnect",
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        info!(%conn, %err, "socket error");
                        break "transport error";
                    }
                }
            }
            _ = &mut deadline => break "ping timeout",
            _ = &mut forward_task => break "transport close",
        }
    };

    connection::disconnect(&mut *broker.lock().await, conn, reason);
    forward_task.abort();
}
