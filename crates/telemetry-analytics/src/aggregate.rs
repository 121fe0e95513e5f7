//! Durable cross-session history.
//!
//! The whole history is read, extended by one summary, and written back on
//! every session end. The slot lock is held across that read-modify-write so
//! concurrent session ends cannot lose updates.

use std::sync::{Mutex, PoisonError};
use telemetry_core::error::Result;
use telemetry_core::storage::{Codec, JsonCodec, StorageSlot};
use telemetry_core::types::{ServerAggregateHistory, SessionSummary};
use tracing::{debug, info};

pub struct ServerAggregateStore<S: StorageSlot, C: Codec = JsonCodec> {
    slot: Mutex<S>,
    codec: C,
}

impl<S: StorageSlot> ServerAggregateStore<S> {
    pub fn new(slot: S) -> Self {
        Self::with_codec(slot, JsonCodec)
    }
}

impl<S: StorageSlot, C: Codec> ServerAggregateStore<S, C> {
    pub fn with_codec(slot: S, codec: C) -> Self {
        Self {
            slot: Mutex::new(slot),
            codec,
        }
    }

    /// Read the persisted history. A slot that was never written yields an
    /// empty history.
    pub fn load_history(&self) -> Result<ServerAggregateHistory> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        self.load_from(&slot)
    }

    /// Count the session and append its summary. No I/O.
    pub fn append_session_summary(history: &mut ServerAggregateHistory, summary: SessionSummary) {
        history.push_summary(summary);
    }

    /// Overwrite the persisted history with `history`.
    pub fn persist(&self, history: &ServerAggregateHistory) -> Result<()> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        self.persist_to(&slot, history)
    }

    /// Load, append, persist as one serialized step. Returns the history as
    /// written. On failure nothing is persisted and the error is returned.
    pub fn record_session_end(&self, summary: SessionSummary) -> Result<ServerAggregateHistory> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let mut history = self.load_from(&slot)?;
        Self::append_session_summary(&mut history, summary);
        self.persist_to(&slot, &history)?;
        info!(
            session_count = history.session_count,
            user_count = summary.user_count,
            chat_count = summary.chat_count,
            score = summary.score,
            "session recorded in aggregate history"
        );
        Ok(history)
    }

    fn load_from(&self, slot: &S) -> Result<ServerAggregateHistory> {
        match slot.read()? {
            Some(bytes) => self.codec.decode(&bytes),
            None => {
                debug!(slot = slot.name(), "no aggregate history yet; starting empty");
                Ok(ServerAggregateHistory::default())
            }
        }
    }

    fn persist_to(&self, slot: &S, history: &ServerAggregateHistory) -> Result<()> {
        let bytes = self.codec.encode(history)?;
        slot.write(&bytes)
    }
}
