use std::collections::{HashMap, VecDeque};

use rand::Rng;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::debug;

use crate::iso8601;

pub const MAX_MESSAGES_PER_ROOM: usize = 100;
pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const DEFAULT_RECENT_LIMIT: usize = 20;
pub const SYSTEM_SENDER: &str = "System";

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Room,
    Private,
    System,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub username: String,
    pub content: String,
    pub room: Option<String>,
    pub kind: MessageKind,
    pub timestamp: OffsetDateTime,
}

/// A message as clients see it. The room is implied by where it was delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireMessage {
    pub id: String,
    pub username: String,
    pub content: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

fn message_id(at: OffsetDateTime) -> String {
    let millis = at.unix_timestamp_nanos() / 1_000_000;
    let mut rng = rand::rng();
    let suffix: String = (0..9)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect();

    format!("msg_{millis}_{suffix}")
}

/// Bounded per-room history.
///
/// History is keyed by room name but lives apart from room membership: a room
/// that empties out and disappears from the session registry keeps its history.
#[derive(Debug, Default)]
pub struct MessageStore {
    rooms: HashMap<String, VecDeque<Message>>,
    // insertion order of `rooms`
    order: Vec<String>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_message(
        &self,
        username: &str,
        content: &str,
        room: Option<&str>,
        kind: MessageKind,
    ) -> Message {
        let timestamp = OffsetDateTime::now_utc();
        Message {
            id: message_id(timestamp),
            username: username.to_owned(),
            content: content.to_owned(),
            room: room.map(str::to_owned),
            kind,
            timestamp,
        }
    }

    pub fn create_system_message(&self, content: &str, room: &str) -> Message {
        self.create_message(SYSTEM_SENDER, content, Some(room), MessageKind::System)
    }

    pub fn append(&mut self, room: &str, message: Message) {
        if !self.rooms.contains_key(room) {
            self.order.push(room.to_owned());
        }
        let messages = self.rooms.entry(room.to_owned()).or_default();

        messages.push_back(message);
        while messages.len() > MAX_MESSAGES_PER_ROOM {
            messages.pop_front();
        }
        debug!(room, "message saved");
    }

    pub fn history(&self, room: &str, limit: usize) -> Vec<Message> {
        let Some(messages) = self.rooms.get(room) else {
            return Vec::new();
        };
        let skip = messages.len().saturating_sub(limit);
        messages.iter().skip(skip).cloned().collect()
    }

    pub fn recent(&self, limit: usize) -> Vec<Message> {
        let mut all: Vec<Message> = self.in_order().flatten().cloned().collect();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        all.truncate(limit);
        all
    }

    pub fn search(&self, query: &str, room: Option<&str>) -> Vec<Message> {
        let query = query.to_lowercase();
        let matches = |message: &&Message| message.content.to_lowercase().contains(&query);

        match room {
            Some(room) => self
                .rooms
                .get(room)
                .map(|messages| messages.iter().filter(matches).cloned().collect())
                .unwrap_or_default(),
            None => self.in_order().flatten().filter(matches).cloned().collect(),
        }
    }

    pub fn clear(&mut self, room: &str) {
        self.rooms.remove(room);
        self.order.retain(|name| name != room);
        debug!(room, "message history cleared");
    }

    pub fn clear_all(&mut self) {
        self.rooms.clear();
        self.order.clear();
        debug!("all message history cleared");
    }

    pub fn total_count(&self) -> usize {
        self.rooms.values().map(VecDeque::len).sum()
    }

    pub fn count_for(&self, room: &str) -> usize {
        self.rooms.get(room).map_or(0, VecDeque::len)
    }

    pub fn format(message: &Message) -> WireMessage {
        WireMessage {
            id: message.id.clone(),
            username: message.username.clone(),
            content: message.content.clone(),
            timestamp: iso8601(message.timestamp),
            kind: message.kind,
        }
    }

    fn in_order(&self) -> impl Iterator<Item = &VecDeque<Message>> {
        self.order.iter().filter_map(|name| self.rooms.get(name))
    }
}
