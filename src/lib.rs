pub mod appresult;
pub mod config;
pub mod connection;
pub mod error;
pub mod history;
pub mod hub;
pub mod rooms;
pub mod session;
pub mod status;

use std::{sync::Arc, time::Instant};

use axum::extract::FromRef;
use serde_json::Value;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tokio::sync::Mutex;

pub use appresult::{AppError, AppResult};
pub use error::{BrokerError, BrokerResult};

use history::MessageStore;
use hub::Hub;
use session::SessionRegistry;

/// Everything the broker knows. Each inbound event is handled with this
/// locked, so a handler's reads, writes and broadcasts happen as one step.
#[derive(Debug, Default)]
pub struct Broker {
    pub sessions: SessionRegistry,
    pub history: MessageStore,
    pub hub: Hub,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }
}

pub type SharedBroker = Arc<Mutex<Broker>>;

#[derive(Clone, Copy, Debug)]
pub struct StartedAt(pub Instant);

#[derive(Clone, FromRef)]
pub struct AppState {
    pub broker: SharedBroker,
    pub started_at: StartedAt,
}

impl AppState {
    pub fn new(broker: Broker) -> Self {
        Self {
            broker: Arc::new(Mutex::new(broker)),
            started_at: StartedAt(Instant::now()),
        }
    }
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> BrokerResult<String>;
    fn get_opt_u64_field(&self, field: &str) -> BrokerResult<Option<u64>>;
}

impl GetField for Value {
    fn get_str_field(&self, field: &str) -> BrokerResult<String> {
        Ok(
            self.get(field)
            .ok_or(BrokerError::validation(format!("{field} is required")))?
            .as_str()
            .ok_or(BrokerError::validation(format!("{field} must be a string")))?
            .to_owned()
        )
    }

    fn get_opt_u64_field(&self, field: &str) -> BrokerResult<Option<u64>> {
        match self.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .map(Some)
                .ok_or(BrokerError::validation(format!("{field} must be a non-negative integer"))),
        }
    }
}

pub fn iso8601(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_default()
}

pub fn now_iso8601() -> String {
    iso8601(OffsetDateTime::now_utc())
}
