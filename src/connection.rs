use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    hub::Outlet,
    now_iso8601,
    rooms::{msg, room},
    Broker, BrokerError, BrokerResult, GetField,
};

/// One frame from a client: `{event, data, ack?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Inbound {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub ack: Option<u64>,
}

/// Largest inbound text frame the broker accepts, in bytes.
pub const MAX_FRAME_BYTES: usize = 1_000_000;

/// Decodes one text frame. Oversized or malformed frames are logged and
/// dropped; the client gets no reply for them.
pub fn parse_frame(conn: Uuid, text: &str) -> Option<Inbound> {
    if text.len() > MAX_FRAME_BYTES {
        warn!(%conn, len = text.len(), "dropping oversized frame");
        return None;
    }
    match serde_json::from_str(text) {
        Ok(frame) => Some(frame),
        Err(err) => {
            warn!(%conn, %err, "dropping malformed frame");
            None
        }
    }
}

pub enum Reply {
    Ack(BrokerResult<Value>),
    Silent,
}

pub type Handler = fn(&mut Broker, Uuid, &Value) -> Reply;

pub fn handler_for(event: &str) -> Option<Handler> {
    let handler: Handler = match event {
        "register" => register,
        "join_room" => join_room,
        "leave_room" => leave_room,
        "get_room_users" => get_room_users,
        "get_rooms" => get_rooms,
        "send_message" => send_message,
        "private_message" => private_message,
        "typing" => typing,
        "stop_typing" => stop_typing,
        "get_message_history" => get_message_history,
        "ping" => ping,
        _ => return None,
    };
    Some(handler)
}

pub fn connect(broker: &mut Broker, conn: Uuid, outlet: Outlet) {
    broker.hub.attach(conn, outlet);
    broker.hub.emit(
        conn,
        "connected",
        json!({
            "socketId": conn,
            "message": "Successfully connected to server",
            "timestamp": now_iso8601(),
        }),
    );
    info!(%conn, "new connection");
}

/// Runs one inbound frame. A frame with an ack id gets exactly one ack back,
/// unless its event never acknowledges.
pub fn handle_event(broker: &mut Broker, conn: Uuid, frame: Inbound) {
    let reply = match handler_for(&frame.event) {
        Some(handler) => handler(broker, conn, &frame.data),
        None => {
            warn!(%conn, event = %frame.event, "unknown event");
            Reply::Ack(Err(BrokerError::validation(format!("Unknown event: {}", frame.event))))
        }
    };

    let Reply::Ack(result) = reply else {
        return;
    };
    let data = match result {
        Ok(data) => data,
        Err(err) => {
            debug!(%conn, event = %frame.event, kind = err.kind(), %err, "event rejected");
            err.to_payload()
        }
    };
    if let Some(ack) = frame.ack {
        broker.hub.ack(conn, ack, data);
    }
}

pub fn disconnect(broker: &mut Broker, conn: Uuid, reason: &str) {
    info!(%conn, reason, "socket disconnected");
    broker.hub.detach(conn);

    let Some(user) = broker.sessions.deregister(conn) else {
        return;
    };
    for room_name in &user.rooms {
        let notice = broker
            .history
            .create_system_message(&format!("{} left the room", user.username), room_name);
        broker.history.append(room_name, notice.clone());
        room::announce_departure(broker, &user.username, room_name, &notice);
    }

    broker.hub.broadcast(
        "user_disconnected",
        json!({
            "username": user.username,
            "userCount": broker.sessions.user_count(),
            "timestamp": now_iso8601(),
        }),
    );
    info!(username = %user.username, "user disconnected and cleaned up");
}

fn register(broker: &mut Broker, conn: Uuid, data: &Value) -> Reply {
    Reply::Ack(data.get_str_field("username").and_then(|username| {
        let user = broker.sessions.register(conn, &username)?;
        info!(%conn, %username, "user registered");

        broker.hub.broadcast(
            "user_connected",
            json!({
                "username": user.username,
                "userCount": broker.sessions.user_count(),
                "timestamp": now_iso8601(),
            }),
        );
        Ok(json!({ "success": true, "user": user.profile() }))
    }))
}

fn join_room(broker: &mut Broker, conn: Uuid, data: &Value) -> Reply {
    Reply::Ack(
        data.get_str_field("roomName")
            .and_then(|name| room::join_room(broker, conn, &name)),
    )
}

fn leave_room(broker: &mut Broker, conn: Uuid, data: &Value) -> Reply {
    Reply::Ack(
        data.get_str_field("roomName")
            .and_then(|name| room::leave_room(broker, conn, &name)),
    )
}

fn get_room_users(broker: &mut Broker, conn: Uuid, data: &Value) -> Reply {
    Reply::Ack(
        data.get_str_field("roomName")
            .and_then(|name| room::get_room_users(broker, conn, &name)),
    )
}

fn get_rooms(broker: &mut Broker, _conn: Uuid, _data: &Value) -> Reply {
    Reply::Ack(Ok(room::get_rooms(broker)))
}

fn send_message(broker: &mut Broker, conn: Uuid, data: &Value) -> Reply {
    Reply::Ack(data.get_str_field("roomName").and_then(|name| {
        let content = data.get_str_field("content")?;
        msg::send_message(broker, conn, &name, &content)
    }))
}

fn private_message(broker: &mut Broker, conn: Uuid, data: &Value) -> Reply {
    Reply::Ack(data.get_str_field("targetUsername").and_then(|target| {
        let content = data.get_str_field("content")?;
        msg::private_message(broker, conn, &target, &content)
    }))
}

fn typing(broker: &mut Broker, conn: Uuid, data: &Value) -> Reply {
    if let Ok(name) = data.get_str_field("roomName") {
        msg::typing(broker, conn, &name);
    }
    Reply::Silent
}

fn stop_typing(broker: &mut Broker, conn: Uuid, data: &Value) -> Reply {
    if let Ok(name) = data.get_str_field("roomName") {
        msg::stop_typing(broker, conn, &name);
    }
    Reply::Silent
}

fn get_message_history(broker: &mut Broker, conn: Uuid, data: &Value) -> Reply {
    Reply::Ack(data.get_str_field("roomName").and_then(|name| {
        let limit = data
            .get_opt_u64_field("limit")?
            .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX));
        msg::get_message_history(broker, conn, &name, limit)
    }))
}

fn ping(_broker: &mut Broker, _conn: Uuid, _data: &Value) -> Reply {
    Reply::Ack(Ok(json!({ "pong": true, "timestamp": now_iso8601() })))
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::hub::Outbound;

    fn open(broker: &mut Broker) -> (Uuid, mpsc::UnboundedReceiver<Outbound>) {
        let conn = Uuid::now_v7();
        let (tx, rx) = mpsc::unbounded_channel();
        connect(broker, conn, tx);
        (conn, rx)
    }

    fn send(broker: &mut Broker, conn: Uuid, event: &str, data: Value, ack: Option<u64>) {
        handle_event(broker, conn, Inbound { event: event.to_owned(), data, ack });
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(frame);
        }
        out
    }

    fn acks(frames: &[Outbound]) -> Vec<(u64, Value)> {
        frames
            .iter()
            .filter_map(|frame| match frame {
                Outbound::Ack { ack, data } => Some((*ack, data.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn welcome_carries_the_connection_id() {
        let mut broker = Broker::new();
        let (conn, mut rx) = open(&mut broker);

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event(), "connected");
        assert_eq!(frames[0].data()["socketId"], conn.to_string());
    }

    #[test]
    fn every_acked_event_gets_exactly_one_reply() {
        let mut broker = Broker::new();
        let (conn, mut rx) = open(&mut broker);
        drain(&mut rx);

        send(&mut broker, conn, "register", json!({ "username": "alice" }), Some(1));
        send(&mut broker, conn, "register", json!({ "username": "alice" }), Some(2));
        send(&mut broker, conn, "join_room", json!({}), Some(3));
        send(&mut broker, conn, "ping", Value::Null, Some(4));
        send(&mut broker, conn, "dance", Value::Null, Some(5));
        send(&mut broker, conn, "get_rooms", Value::Null, Some(6));

        let acks = acks(&drain(&mut rx));
        assert_eq!(acks.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(acks[0].1["success"], true);
        assert_eq!(acks[0].1["user"]["username"], "alice");
        assert!(acks[0].1.get("error").is_none());
        assert!(acks[1].1["error"].is_string());
        assert!(acks[1].1.get("success").is_none());
        assert_eq!(acks[2].1, json!({ "error": "roomName is required" }));
        assert_eq!(acks[3].1["pong"], true);
        assert_eq!(acks[4].1, json!({ "error": "Unknown event: dance" }));
        assert_eq!(acks[5].1, json!({ "rooms": [] }));
    }

    #[test]
    fn events_without_ack_id_are_still_handled() {
        let mut broker = Broker::new();
        let (conn, mut rx) = open(&mut broker);

        send(&mut broker, conn, "register", json!({ "username": "alice" }), None);
        send(&mut broker, conn, "join_room", json!({ "roomName": "general" }), None);

        assert!(acks(&drain(&mut rx)).is_empty());
        assert_eq!(broker.sessions.members_of("general").len(), 1);
    }

    #[test]
    fn typing_is_never_acked() {
        let mut broker = Broker::new();
        let (conn, mut rx) = open(&mut broker);
        send(&mut broker, conn, "register", json!({ "username": "alice" }), None);
        drain(&mut rx);

        send(&mut broker, conn, "typing", json!({ "roomName": "general" }), Some(9));
        send(&mut broker, conn, "stop_typing", Value::Null, Some(10));

        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn registration_is_announced_to_everyone() {
        let mut broker = Broker::new();
        let (alice, mut rx_alice) = open(&mut broker);
        let (_bob, mut rx_bob) = open(&mut broker);
        drain(&mut rx_alice);
        drain(&mut rx_bob);

        send(&mut broker, alice, "register", json!({ "username": "alice" }), None);

        for rx in [&mut rx_alice, &mut rx_bob] {
            let frames = drain(rx);
            assert_eq!(frames[0].event(), "user_connected");
            assert_eq!(frames[0].data()["userCount"], 1);
        }
    }

    #[test]
    fn disconnect_cleans_every_room_and_announces_once() {
        let mut broker = Broker::new();
        let (alice, _rx_alice) = open(&mut broker);
        let (bob, mut rx_bob) = open(&mut broker);
        let (carol, mut rx_carol) = open(&mut broker);
        for (conn, name) in [(alice, "alice"), (bob, "bob"), (carol, "carol")] {
            send(&mut broker, conn, "register", json!({ "username": name }), None);
        }
        send(&mut broker, alice, "join_room", json!({ "roomName": "a" }), None);
        send(&mut broker, alice, "join_room", json!({ "roomName": "b" }), None);
        send(&mut broker, bob, "join_room", json!({ "roomName": "a" }), None);
        send(&mut broker, carol, "join_room", json!({ "roomName": "b" }), None);
        drain(&mut rx_bob);
        drain(&mut rx_carol);

        disconnect(&mut broker, alice, "client disconnect");

        for (rx, room) in [(&mut rx_bob, "a"), (&mut rx_carol, "b")] {
            let frames = drain(rx);
            let events: Vec<_> = frames.iter().map(Outbound::event).collect();
            assert_eq!(events, vec!["user_left", "room_users", "user_disconnected"]);
            assert_eq!(frames[0].data()["room"], room);
            assert_eq!(frames[1].data()["users"].as_array().unwrap().len(), 1);
            assert_eq!(frames[2].data()["userCount"], 2);
        }
        assert!(broker.sessions.members_of("a").iter().all(|u| u.username != "alice"));
        assert!(broker.sessions.members_of("b").iter().all(|u| u.username != "alice"));
        assert_eq!(broker.hub.connection_count(), 2);

        disconnect(&mut broker, alice, "client disconnect");
        assert!(drain(&mut rx_bob).is_empty());
    }

    #[test]
    fn unregistered_disconnect_is_silent() {
        let mut broker = Broker::new();
        let (ghost, _rx) = open(&mut broker);
        let (_other, mut rx_other) = open(&mut broker);
        drain(&mut rx_other);

        disconnect(&mut broker, ghost, "transport close");

        assert!(drain(&mut rx_other).is_empty());
        assert_eq!(broker.hub.connection_count(), 1);
    }

    #[test]
    fn history_limit_is_read_from_the_payload() {
        let mut broker = Broker::new();
        let (conn, mut rx) = open(&mut broker);
        send(&mut broker, conn, "register", json!({ "username": "alice" }), None);
        send(&mut broker, conn, "join_room", json!({ "roomName": "general" }), None);
        for content in ["one", "two", "three"] {
            send(&mut broker, conn, "send_message", json!({ "roomName": "general", "content": content }), None);
        }
        drain(&mut rx);

        send(&mut broker, conn, "get_message_history", json!({ "roomName": "general", "limit": 2 }), Some(1));
        send(&mut broker, conn, "get_message_history", json!({ "roomName": "general", "limit": "x" }), Some(2));

        let acks = acks(&drain(&mut rx));
        let contents: Vec<_> = acks[0].1["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["content"].as_str().unwrap())
            .collect();
        assert_eq!(contents, vec!["two", "three"]);
        assert!(acks[1].1["error"].is_string());
    }

    #[test]
    fn huge_history_limit_saturates() {
        let mut broker = Broker::new();
        let (conn, mut rx) = open(&mut broker);
        send(&mut broker, conn, "register", json!({ "username": "alice" }), None);
        send(&mut broker, conn, "join_room", json!({ "roomName": "general" }), None);
        drain(&mut rx);

        send(&mut broker, conn, "get_message_history", json!({ "roomName": "general", "limit": u64::MAX }), Some(1));

        let acks = acks(&drain(&mut rx));
        assert_eq!(acks[0].1["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn message_handlers_report_the_first_missing_field() {
        let mut broker = Broker::new();
        let (conn, mut rx) = open(&mut broker);
        send(&mut broker, conn, "register", json!({ "username": "alice" }), None);
        drain(&mut rx);

        send(&mut broker, conn, "send_message", json!({ "content": "hi" }), Some(1));
        send(&mut broker, conn, "send_message", json!({ "roomName": "general" }), Some(2));
        send(&mut broker, conn, "private_message", json!({ "content": "hi" }), Some(3));

        let acks = acks(&drain(&mut rx));
        assert_eq!(acks[0].1, json!({ "error": "roomName is required" }));
        assert_eq!(acks[1].1, json!({ "error": "content is required" }));
        assert_eq!(acks[2].1, json!({ "error": "targetUsername is required" }));
    }

    #[test]
    fn parse_frame_drops_garbage_and_oversized_frames() {
        let conn = Uuid::now_v7();

        let frame = parse_frame(conn, r#"{"event":"ping","ack":3}"#).unwrap();
        assert_eq!(frame.event, "ping");
        assert_eq!(frame.ack, Some(3));
        assert_eq!(frame.data, Value::Null);

        assert!(parse_frame(conn, "not json").is_none());
        assert!(parse_frame(conn, r#"{"data":{}}"#).is_none());
        assert!(parse_frame(conn, r#"{"event":"ping","ack":-1}"#).is_none());

        let content = "x".repeat(MAX_FRAME_BYTES);
        let oversized = json!({ "event": "send_message", "data": { "roomName": "general", "content": content } });
        assert!(parse_frame(conn, &oversized.to_string()).is_none());
    }
}
