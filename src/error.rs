use serde_json::{json, Value};
use thiserror::Error;

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Failures a client can cause. Each one ends up as `{error: message}` in the
/// acknowledgement, never as a dropped connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    NotMember(String),
}

impl BrokerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_registered() -> Self {
        Self::Validation("User not registered".to_owned())
    }

    pub fn kind(&self) -> &'static str {
        use BrokerError::*;
        match self {
            Validation(_) => "validation",
            Conflict(_) => "conflict",
            NotFound(_) => "not_found",
            NotMember(_) => "not_member",
        }
    }

    pub fn to_payload(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}
