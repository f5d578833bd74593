use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    history::{MessageKind, MessageStore, DEFAULT_HISTORY_LIMIT},
    session::User,
    Broker, BrokerError, BrokerResult,
};

fn sender(broker: &Broker, conn: Uuid) -> BrokerResult<User> {
    broker
        .sessions
        .lookup_by_id(conn)
        .ok_or_else(BrokerError::not_registered)
}

fn require_content(content: &str) -> BrokerResult<()> {
    if content.trim().is_empty() {
        return Err(BrokerError::validation("Message content is required"));
    }
    Ok(())
}

pub fn send_message(broker: &mut Broker, conn: Uuid, room: &str, content: &str) -> BrokerResult<Value> {
    let user = sender(broker, conn)?;
    require_content(content)?;
    if room.trim().is_empty() {
        return Err(BrokerError::validation("Room name is required"));
    }
    if !user.rooms.contains(room) {
        return Err(BrokerError::NotMember("You are not a member of this room".to_owned()));
    }

    let message = broker
        .history
        .create_message(&user.username, content, Some(room), MessageKind::Room);
    broker.history.append(room, message.clone());

    let wire = MessageStore::format(&message);
    broker.hub.to_room(room, "new_message", json!(wire));
    info!(username = %user.username, room, id = %message.id, "room message");

    Ok(json!({ "success": true, "message": wire }))
}

/// Direct messages are delivered to whoever holds the name right now and are
/// never stored.
pub fn private_message(
    broker: &mut Broker,
    conn: Uuid,
    target: &str,
    content: &str,
) -> BrokerResult<Value> {
    let user = sender(broker, conn)?;
    require_content(content)?;
    let recipient = broker
        .sessions
        .lookup_by_name(target)
        .ok_or_else(|| BrokerError::NotFound(format!("User {target} not found")))?;

    let message = broker
        .history
        .create_message(&user.username, content, None, MessageKind::Private);
    broker
        .hub
        .emit(recipient.socket_id, "new_message", json!(MessageStore::format(&message)));
    info!(from = %user.username, to = %recipient.username, "private message");

    Ok(json!({ "success": true }))
}

pub fn typing(broker: &Broker, conn: Uuid, room: &str) {
    relay_typing(broker, conn, room, "typing");
}

pub fn stop_typing(broker: &Broker, conn: Uuid, room: &str) {
    relay_typing(broker, conn, room, "stop_typing");
}

fn relay_typing(broker: &Broker, conn: Uuid, room: &str, event: &'static str) {
    let Some(user) = broker.sessions.lookup_by_id(conn) else {
        return;
    };
    if !user.rooms.contains(room) {
        debug!(username = %user.username, room, event, "ignoring typing outside room");
        return;
    }
    broker.hub.to_room_except(
        room,
        conn,
        event,
        json!({ "username": user.username, "room": room }),
    );
}

/// History is readable by any registered connection, member or not.
pub fn get_message_history(
    broker: &Broker,
    conn: Uuid,
    room: &str,
    limit: Option<usize>,
) -> BrokerResult<Value> {
    sender(broker, conn)?;
    if room.trim().is_empty() {
        return Err(BrokerError::validation("Room name is required"));
    }

    let messages: Vec<_> = broker
        .history
        .history(room, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .iter()
        .map(MessageStore::format)
        .collect();

    Ok(json!({ "messages": messages }))
}
