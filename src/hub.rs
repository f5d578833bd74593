use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

/// A frame on its way out to one connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event { event: &'static str, data: Value },
    Ack { ack: u64, data: Value },
}

impl Outbound {
    pub fn event(&self) -> &'static str {
        match self {
            Outbound::Event { event, .. } => *event,
            Outbound::Ack { .. } => "ack",
        }
    }

    pub fn data(&self) -> &Value {
        match self {
            Outbound::Event { data, .. } | Outbound::Ack { data, .. } => data,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Outbound::Event { event, data } => json!({ "event": event, "data": data }),
            Outbound::Ack { ack, data } => json!({ "event": "ack", "ack": ack, "data": data }),
        }
    }
}

pub type Outlet = mpsc::UnboundedSender<Outbound>;

/// Delivery side of the broker: one outlet per live connection, plus the
/// per-room channels connections subscribe to.
///
/// Sends are fire-and-forget. A connection whose receiver is gone just misses
/// the frame.
#[derive(Debug, Default)]
pub struct Hub {
    outlets: HashMap<Uuid, Outlet>,
    channels: HashMap<String, HashSet<Uuid>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, conn: Uuid, outlet: Outlet) {
        self.outlets.insert(conn, outlet);
    }

    pub fn detach(&mut self, conn: Uuid) {
        self.outlets.remove(&conn);
        self.channels.retain(|_, subscribers| {
            subscribers.remove(&conn);
            !subscribers.is_empty()
        });
    }

    pub fn subscribe(&mut self, conn: Uuid, room: &str) {
        self.channels.entry(room.to_owned()).or_default().insert(conn);
    }

    pub fn unsubscribe(&mut self, conn: Uuid, room: &str) {
        if let Some(subscribers) = self.channels.get_mut(room) {
            subscribers.remove(&conn);
            if subscribers.is_empty() {
                self.channels.remove(room);
            }
        }
    }

    pub fn emit(&self, conn: Uuid, event: &'static str, data: Value) {
        self.send(conn, Outbound::Event { event, data });
    }

    pub fn ack(&self, conn: Uuid, ack: u64, data: Value) {
        self.send(conn, Outbound::Ack { ack, data });
    }

    pub fn to_room(&self, room: &str, event: &'static str, data: Value) {
        self.fan_out(room, None, event, data);
    }

    pub fn to_room_except(&self, room: &str, except: Uuid, event: &'static str, data: Value) {
        self.fan_out(room, Some(except), event, data);
    }

    pub fn broadcast(&self, event: &'static str, data: Value) {
        for outlet in self.outlets.values() {
            let _ = outlet.send(Outbound::Event { event, data: data.clone() });
        }
    }

    pub fn connection_count(&self) -> usize {
        self.outlets.len()
    }

    pub fn subscriber_count(&self, room: &str) -> usize {
        self.channels.get(room).map_or(0, HashSet::len)
    }

    fn fan_out(&self, room: &str, except: Option<Uuid>, event: &'static str, data: Value) {
        let Some(subscribers) = self.channels.get(room) else {
            return;
        };
        for conn in subscribers.iter().filter(|conn| Some(**conn) != except) {
            self.send(*conn, Outbound::Event { event, data: data.clone() });
        }
    }

    fn send(&self, conn: Uuid, frame: Outbound) {
        if let Some(outlet) = self.outlets.get(&conn) {
            let _ = outlet.send(frame);
        }
    }
}
