use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{iso8601, BrokerError, BrokerResult};

pub const MAX_USERNAME_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub socket_id: Uuid,
    pub username: String,
    pub joined_at: OffsetDateTime,
    pub rooms: BTreeSet<String>,
}

/// What a room member looks like on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub socket_id: Uuid,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub socket_id: Uuid,
    pub username: String,
    pub joined_at: String,
}

impl User {
    pub fn member(&self) -> Member {
        Member {
            socket_id: self.socket_id,
            username: self.username.clone(),
        }
    }

    pub fn profile(&self) -> Profile {
        Profile {
            socket_id: self.socket_id,
            username: self.username.clone(),
            joined_at: iso8601(self.joined_at),
        }
    }
}

/// Who is connected under which name, and which rooms they sit in.
///
/// Rooms only exist while they have members. Member lists keep join order.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    users: HashMap<Uuid, User>,
    rooms: BTreeMap<String, Vec<Uuid>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, socket_id: Uuid, username: &str) -> BrokerResult<User> {
        if username.trim().is_empty() {
            return Err(BrokerError::validation("Username is required"));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(BrokerError::validation(format!(
                "Username must be {MAX_USERNAME_LEN} characters or less"
            )));
        }
        if let Some(existing) = self.users.get(&socket_id) {
            return Err(BrokerError::Conflict(format!(
                "Already registered as {}",
                existing.username
            )));
        }
        if self.lookup_by_name(username).is_some() {
            return Err(BrokerError::Conflict("Username is already taken".to_owned()));
        }

        let user = User {
            socket_id,
            username: username.to_owned(),
            joined_at: OffsetDateTime::now_utc(),
            rooms: BTreeSet::new(),
        };
        self.users.insert(socket_id, user.clone());
        debug!(%socket_id, username, "user added");

        Ok(user)
    }

    pub fn deregister(&mut self, socket_id: Uuid) -> Option<User> {
        let user = self.users.get(&socket_id)?.clone();
        for room in &user.rooms {
            self.leave_room(socket_id, room);
        }
        self.users.remove(&socket_id);
        debug!(%socket_id, username = %user.username, "user removed");

        Some(user)
    }

    pub fn lookup_by_id(&self, socket_id: Uuid) -> Option<User> {
        self.users.get(&socket_id).cloned()
    }

    pub fn lookup_by_name(&self, username: &str) -> Option<User> {
        self.users
            .values()
            .find(|user| user.username == username)
            .cloned()
    }

    pub fn join_room(&mut self, socket_id: Uuid, room: &str) -> bool {
        let Some(user) = self.users.get_mut(&socket_id) else {
            warn!(%socket_id, room, "cannot join room: user not found");
            return false;
        };

        user.rooms.insert(room.to_owned());
        let members = self.rooms.entry(room.to_owned()).or_default();
        if !members.contains(&socket_id) {
            members.push(socket_id);
        }
        debug!(username = %user.username, room, "joined room");

        true
    }

    pub fn leave_room(&mut self, socket_id: Uuid, room: &str) -> bool {
        let Some(user) = self.users.get_mut(&socket_id) else {
            return false;
        };

        user.rooms.remove(room);
        if let Some(members) = self.rooms.get_mut(room) {
            members.retain(|id| *id != socket_id);
            if members.is_empty() {
                self.rooms.remove(room);
                debug!(room, "room is empty and has been deleted");
            }
        }
        debug!(username = %user.username, room, "left room");

        true
    }

    pub fn members_of(&self, room: &str) -> Vec<User> {
        let Some(members) = self.rooms.get(room) else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|id| self.users.get(id))
            .cloned()
            .collect()
    }

    pub fn rooms_of(&self, socket_id: Uuid) -> BTreeSet<String> {
        self.users
            .get(&socket_id)
            .map(|user| user.rooms.clone())
            .unwrap_or_default()
    }

    pub fn all_room_names(&self) -> Vec<String> {
        self.rooms.keys().cloned().collect()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
