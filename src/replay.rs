//! Replay of recorded session event logs.
//!
//! A log is a JSON document:
//!
//! ```json
//! { "name": "standup",
//!   "events": [
//!     { "kind": "membership", "at": "2024-05-01T09:00:00Z", "users": [1, 2] },
//!     { "kind": "end", "at": "2024-05-01T09:45:00Z", "threads": [ ... ] } ] }
//! ```
//!
//! Events are fed to a session actor in order, with a manual clock set to
//! each event's timestamp.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;
use telemetry_analytics::ReportGenerator;
use telemetry_core::storage::StorageSlot;
use telemetry_core::types::{ChatThread, MembershipSnapshot, UserId};
use telemetry_core::{ManualClock, TelemetryError};
use telemetry_service::{SessionReport, TelemetryService};

#[derive(Debug, Deserialize)]
pub struct ReplayLog {
    #[serde(default = "default_name")]
    pub name: String,
    pub events: Vec<ReplayEvent>,
}

fn default_name() -> String {
    "replay".into()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayEvent {
    Membership {
        at: DateTime<Utc>,
        #[serde(default)]
        users: Vec<UserId>,
    },
    End {
        at: DateTime<Utc>,
        #[serde(default)]
        threads: Vec<ChatThread>,
    },
}

impl ReplayEvent {
    fn at(&self) -> DateTime<Utc> {
        match self {
            Self::Membership { at, .. } | Self::End { at, .. } => *at,
        }
    }
}

/// Replay `log` through a new session. The log must end with an `end` event.
pub async fn replay<S: StorageSlot + 'static>(
    service: &TelemetryService<S>,
    log: ReplayLog,
) -> Result<SessionReport> {
    let Some(first) = log.events.first() else {
        bail!("event log is empty");
    };
    let clock = ManualClock::new(first.at());
    let session = service.start_session(log.name, clock.clone());

    for event in log.events {
        clock.set(event.at());
        match event {
            ReplayEvent::Membership { users, .. } => {
                match session
                    .notify_membership(MembershipSnapshot::new(users))
                    .await
                {
                    Ok(insincere) => {
                        tracing::debug!(insincere = insincere.len(), "membership replayed");
                    }
                    // Already logged by the session; keep going.
                    Err(TelemetryError::ClockSkew { .. }) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            ReplayEvent::End { threads, .. } => {
                return Ok(session.end_session(threads).await?);
            }
        }
    }

    bail!("event log has no end event")
}

/// Load a log from disk, replay it, and print the session report.
pub async fn run<S: StorageSlot + 'static>(
    service: &TelemetryService<S>,
    path: &Path,
    json: bool,
) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading event log {}", path.display()))?;
    let log: ReplayLog = serde_json::from_str(&contents)
        .with_context(|| format!("parsing event log {}", path.display()))?;

    let report = replay(service, log).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!(
            "{}",
            ReportGenerator::session_report(&report.name, &report.snapshot, Some(&report.summary))
        );
        println!("Recorded as session #{}.", report.history.session_count);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry_core::config::AppConfig;
    use telemetry_core::storage::MemorySlot;

    const LOG: &str = r#"{
        "name": "standup",
        "events": [
            { "kind": "membership", "at": "2024-05-01T09:00:00Z", "users": [1] },
            { "kind": "membership", "at": "2024-05-01T09:01:00Z", "users": [1, 2] },
            { "kind": "membership", "at": "2024-05-01T09:10:00Z", "users": [2] },
            { "kind": "membership", "at": "2024-05-01T09:05:00Z", "users": [] },
            { "kind": "end", "at": "2024-05-01T10:00:00Z", "threads": [
                { "thread_id": 1, "messages": [
                    { "id": "m1", "sender": 1, "sent_at": "2024-05-01T09:02:00Z" },
                    { "id": "m2", "sender": 2, "sent_at": "2024-05-01T09:03:00Z" },
                    { "id": "m3", "sender": 2, "sent_at": "2024-05-01T09:04:00Z" }
                ] }
            ] }
        ]
    }"#;

    fn service() -> TelemetryService<MemorySlot> {
        let mut config = AppConfig::default();
        config.storage.archive_sessions = false;
        TelemetryService::with_slot(config, MemorySlot::new())
    }

    #[tokio::test]
    async fn test_replay_log() {
        let log: ReplayLog = serde_json::from_str(LOG).unwrap();
        let report = replay(&service(), log).await.unwrap();

        assert_eq!(report.name, "standup");
        // The out-of-order event is dropped.
        assert_eq!(report.snapshot.user_count_samples.len(), 3);
        assert!(report.snapshot.insincere_members.contains(&UserId(1)));
        assert_eq!(report.summary.user_count, 2);
        assert_eq!(report.summary.chat_count, 3);
        assert_eq!(report.history.session_count, 1);
    }

    #[tokio::test]
    async fn test_replay_requires_end_event() {
        let log: ReplayLog = serde_json::from_str(
            r#"{ "events": [ { "kind": "membership", "at": "2024-05-01T09:00:00Z", "users": [1] } ] }"#,
        )
        .unwrap();
        let err = replay(&service(), log).await.unwrap_err();
        assert!(err.to_string().contains("no end event"));
    }

    #[tokio::test]
    async fn test_replay_rejects_empty_log() {
        let log: ReplayLog = serde_json::from_str(r#"{ "events": [] }"#).unwrap();
        assert!(replay(&service(), log).await.is_err());
    }
}
