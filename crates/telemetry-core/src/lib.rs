pub mod clock;
pub mod config;
pub mod error;
pub mod storage;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{Result, TelemetryError};
pub use storage::{Codec, FileSlot, JsonCodec, MemorySlot, StorageSlot};
pub use types::{
    ChatRecord, ChatThread, MembershipSnapshot, PresenceInterval, ServerAggregateHistory,
    SessionAnalyticsSnapshot, SessionSummary, UserCountSample, UserId,
};
