use crate::actor::{self, SessionHandle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use telemetry_analytics::{ServerAggregateStore, SessionAnalyticsTracker};
use telemetry_core::config::AppConfig;
use telemetry_core::error::{Result, TelemetryError};
use telemetry_core::storage::{Codec, FileSlot, JsonCodec, StorageSlot};
use telemetry_core::types::{ServerAggregateHistory, SessionAnalyticsSnapshot, SessionSummary};
use telemetry_core::Clock;
use uuid::Uuid;

/// Outcome of a successfully ended session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub name: String,
    pub snapshot: SessionAnalyticsSnapshot,
    pub summary: SessionSummary,
    /// Aggregate history as persisted after this session.
    pub history: ServerAggregateHistory,
}

/// Per-session analytics as written to the sessions directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedSession {
    pub session_id: String,
    pub name: String,
    pub ended_at: DateTime<Utc>,
    pub summary: SessionSummary,
    pub analytics: SessionAnalyticsSnapshot,
}

/// Shared service state: configuration, the aggregate store, and the
/// per-session archive location.
pub struct TelemetryService<S: StorageSlot + 'static = FileSlot> {
    config: AppConfig,
    store: Arc<ServerAggregateStore<S>>,
    archive_dir: Option<PathBuf>,
}

impl<S: StorageSlot + 'static> Clone for TelemetryService<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            archive_dir: self.archive_dir.clone(),
        }
    }
}

impl TelemetryService<FileSlot> {
    /// File-backed service rooted at the configured data directory.
    pub fn from_config(config: AppConfig) -> Self {
        let slot = FileSlot::new(config.storage.history_path());
        Self::with_slot(config, slot)
    }
}

impl<S: StorageSlot + 'static> TelemetryService<S> {
    /// Service whose aggregate history lives in `slot`. Session archives
    /// still go to the configured sessions directory when enabled.
    pub fn with_slot(config: AppConfig, slot: S) -> Self {
        let archive_dir = config
            .storage
            .archive_sessions
            .then(|| config.storage.resolved_sessions_dir());
        Self {
            config,
            store: Arc::new(ServerAggregateStore::new(slot)),
            archive_dir,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Spawn an actor that owns a fresh tracker for a new session.
    pub fn start_session<C: Clock + 'static>(
        &self,
        name: impl Into<String>,
        clock: C,
    ) -> SessionHandle {
        let session_id = Uuid::new_v4().to_string();
        let tracker = SessionAnalyticsTracker::from_config(clock, &self.config.analytics);
        actor::spawn(
            self.clone(),
            session_id,
            name.into(),
            tracker,
            self.config.service.channel_capacity,
        )
    }

    /// Current aggregate history.
    pub async fn history(&self) -> Result<ServerAggregateHistory> {
        let store = Arc::clone(&self.store);
        run_blocking(move || store.load_history()).await
    }

    pub(crate) async fn record_session_end(
        &self,
        summary: SessionSummary,
    ) -> Result<ServerAggregateHistory> {
        let store = Arc::clone(&self.store);
        run_blocking(move || store.record_session_end(summary)).await
    }

    /// Write the session's analytics under `<sessions_dir>/<session_id>.json`.
    /// Rewriting the same session overwrites its previous archive.
    pub(crate) async fn archive_session(&self, archived: ArchivedSession) -> Result<()> {
        let Some(dir) = self.archive_dir.clone() else {
            return Ok(());
        };
        run_blocking(move || {
            let slot = FileSlot::new(dir.join(format!("{}.json", archived.session_id)));
            let bytes = JsonCodec.encode(&archived)?;
            slot.write(&bytes)
        })
        .await
    }

    /// Load a previously archived session, if present.
    pub async fn load_archived(&self, session_id: &str) -> Result<Option<ArchivedSession>> {
        let Some(dir) = self.archive_dir.clone() else {
            return Ok(None);
        };
        let path = dir.join(format!("{}.json", session_id));
        run_blocking(move || match FileSlot::new(path).read()? {
            Some(bytes) => Ok(Some(JsonCodec.decode(&bytes)?)),
            None => Ok(None),
        })
        .await
    }
}

/// Run storage I/O off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TelemetryError::Other(anyhow::Error::new(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_core::storage::MemorySlot;
    use telemetry_core::types::UserId;

    fn config_in(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.storage.data_dir = Some(dir.to_path_buf());
        config
    }

    #[tokio::test]
    async fn test_history_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let service = TelemetryService::from_config(config_in(dir.path()));
        let history = service.history().await.unwrap();
        assert_eq!(history.session_count, 0);
    }

    #[tokio::test]
    async fn test_archive_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let service = TelemetryService::with_slot(config_in(dir.path()), MemorySlot::new());

        let mut analytics = SessionAnalyticsSnapshot::default();
        analytics.chat_counts.insert(UserId(4), 9);
        service
            .archive_session(ArchivedSession {
                session_id: "abc".into(),
                name: "retro".into(),
                ended_at: Utc::now(),
                summary: SessionSummary::new(1, 9),
                analytics,
            })
            .await
            .unwrap();

        assert!(dir.path().join("sessions").join("abc.json").exists());
        let loaded = service.load_archived("abc").await.unwrap().unwrap();
        assert_eq!(loaded.name, "retro");
        assert_eq!(loaded.analytics.chat_counts.get(&UserId(4)), Some(&9));
        assert!(service.load_archived("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_archive_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.storage.archive_sessions = false;
        let service = TelemetryService::with_slot(config, MemorySlot::new());

        service
            .archive_session(ArchivedSession {
                session_id: "abc".into(),
                name: "n".into(),
                ended_at: Utc::now(),
                summary: SessionSummary::new(0, 0),
                analytics: SessionAnalyticsSnapshot::default(),
            })
            .await
            .unwrap();
        assert!(!dir.path().join("sessions").exists());
    }
}
