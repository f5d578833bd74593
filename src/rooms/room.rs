use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::{
    history::{Message, MessageStore},
    now_iso8601,
    session::{Member, SessionRegistry},
    Broker, BrokerError, BrokerResult,
};

pub(crate) fn member_list(sessions: &SessionRegistry, room: &str) -> Vec<Member> {
    sessions.members_of(room).iter().map(|user| user.member()).collect()
}

fn require_room_name(room: &str) -> BrokerResult<()> {
    if room.trim().is_empty() {
        return Err(BrokerError::validation("Room name is required"));
    }
    Ok(())
}

pub fn join_room(broker: &mut Broker, conn: Uuid, room: &str) -> BrokerResult<Value> {
    let user = broker
        .sessions
        .lookup_by_id(conn)
        .ok_or_else(BrokerError::not_registered)?;
    require_room_name(room)?;

    let rejoin = user.rooms.contains(room);
    if !broker.sessions.join_room(conn, room) {
        return Err(BrokerError::not_registered());
    }
    broker.hub.subscribe(conn, room);

    let users = member_list(&broker.sessions, room);
    if !rejoin {
        let notice = broker
            .history
            .create_system_message(&format!("{} joined the room", user.username), room);
        broker.history.append(room, notice.clone());

        broker.hub.to_room(
            room,
            "user_joined",
            json!({
                "username": user.username,
                "room": room,
                "message": MessageStore::format(&notice),
                "timestamp": now_iso8601(),
            }),
        );
        broker
            .hub
            .to_room(room, "room_users", json!({ "room": room, "users": users }));
        info!(username = %user.username, room, members = users.len(), "joined room");
    }

    Ok(json!({ "success": true, "room": room, "users": users }))
}

pub fn leave_room(broker: &mut Broker, conn: Uuid, room: &str) -> BrokerResult<Value> {
    let user = broker
        .sessions
        .lookup_by_id(conn)
        .ok_or_else(BrokerError::not_registered)?;
    require_room_name(room)?;
    if !user.rooms.contains(room) {
        return Err(BrokerError::NotMember("You are not a member of this room".to_owned()));
    }

    broker.hub.unsubscribe(conn, room);
    broker.sessions.leave_room(conn, room);

    let notice = broker
        .history
        .create_system_message(&format!("{} left the room", user.username), room);
    broker.history.append(room, notice.clone());
    announce_departure(broker, &user.username, room, &notice);
    info!(username = %user.username, room, "left room");

    Ok(json!({ "success": true }))
}

/// Tells whoever is still in `room` that `username` is gone. The leaver must
/// already be unsubscribed.
pub(crate) fn announce_departure(broker: &Broker, username: &str, room: &str, notice: &Message) {
    broker.hub.to_room(
        room,
        "user_left",
        json!({
            "username": username,
            "room": room,
            "message": MessageStore::format(notice),
            "timestamp": now_iso8601(),
        }),
    );
    broker.hub.to_room(
        room,
        "room_users",
        json!({ "room": room, "users": member_list(&broker.sessions, room) }),
    );
}

pub fn get_room_users(broker: &Broker, _conn: Uuid, room: &str) -> BrokerResult<Value> {
    let users = member_list(&broker.sessions, room);
    if users.is_empty() {
        return Err(BrokerError::NotFound("Room not found".to_owned()));
    }
    Ok(json!({ "room": room, "users": users }))
}

pub fn get_rooms(broker: &Broker) -> Value {
    json!({ "rooms": broker.sessions.all_room_names() })
}
