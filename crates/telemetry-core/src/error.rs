use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage unavailable: {slot}: {source}")]
    Storage {
        slot: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Clock skew: notification at {observed} precedes latest sample at {latest}")]
    ClockSkew {
        observed: DateTime<Utc>,
        latest: DateTime<Utc>,
    },

    #[error("Session closed: {0}")]
    SessionClosed(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TelemetryError {
    pub fn storage(slot: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            slot: slot.into(),
            source,
        }
    }

    /// Whether the failure came from the storage collaborator.
    ///
    /// Callers use this to decide whether retrying the whole session-end
    /// operation makes sense.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
