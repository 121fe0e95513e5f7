use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Opaque participant identifier. Equality is by id, never by display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// The participant set of a session at the moment a change was observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipSnapshot {
    pub users: BTreeSet<UserId>,
}

impl MembershipSnapshot {
    pub fn new<I, U>(users: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<UserId>,
    {
        Self {
            users: users.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.users.contains(user)
    }
}

/// A single chat message. Only the sender matters to analytics, so a
/// serialized record may omit its id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    #[serde(default = "new_record_id")]
    pub id: String,
    pub sender: UserId,
    #[serde(default = "Utc::now")]
    pub sent_at: DateTime<Utc>,
}

fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

impl ChatRecord {
    pub fn new(sender: impl Into<UserId>) -> Self {
        Self {
            id: new_record_id(),
            sender: sender.into(),
            sent_at: Utc::now(),
        }
    }
}

/// Messages belonging to one chat thread.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatThread {
    pub thread_id: u64,
    #[serde(default)]
    pub messages: Vec<ChatRecord>,
}

impl ChatThread {
    pub fn new(thread_id: u64, messages: Vec<ChatRecord>) -> Self {
        Self {
            thread_id,
            messages,
        }
    }
}

/// First-seen / first-absent pair for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceInterval {
    pub entered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exited_at: Option<DateTime<Utc>>,
}

impl PresenceInterval {
    pub fn entered(at: DateTime<Utc>) -> Self {
        Self {
            entered_at: at,
            exited_at: None,
        }
    }

    /// Elapsed presence, if the user has been observed leaving.
    pub fn duration(&self) -> Option<Duration> {
        self.exited_at.map(|exit| exit - self.entered_at)
    }
}

/// Number of users present at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCountSample {
    pub at: DateTime<Utc>,
    pub count: usize,
}

/// Exported per-session analytics. A fresh value is built on every request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAnalyticsSnapshot {
    /// Messages sent per user across all threads.
    pub chat_counts: BTreeMap<UserId, u64>,
    /// User count over time, ascending by timestamp.
    pub user_count_samples: Vec<UserCountSample>,
    /// Users who left before the insincerity threshold elapsed.
    pub insincere_members: BTreeSet<UserId>,
}

/// Condensed record of one finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub user_count: u64,
    pub chat_count: u64,
    pub score: u64,
}

impl SessionSummary {
    pub fn new(user_count: u64, chat_count: u64) -> Self {
        Self {
            user_count,
            chat_count,
            score: user_count.saturating_mul(chat_count),
        }
    }
}

/// Durable cross-session statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAggregateHistory {
    pub session_count: u64,
    #[serde(default)]
    pub summaries: Vec<SessionSummary>,
}

impl ServerAggregateHistory {
    /// Count one more finished session and append its summary.
    pub fn push_summary(&mut self, summary: SessionSummary) {
        self.session_count += 1;
        self.summaries.push(summary);
    }

    pub fn total_users(&self) -> u64 {
        self.summaries.iter().map(|s| s.user_count).sum()
    }

    pub fn total_chats(&self) -> u64 {
        self.summaries.iter().map(|s| s.chat_count).sum()
    }

    pub fn average_score(&self) -> Option<f64> {
        if self.summaries.is_empty() {
            return None;
        }
        let total: u64 = self.summaries.iter().map(|s| s.score).sum();
        Some(total as f64 / self.summaries.len() as f64)
    }

    /// Highest-scoring session as (index, summary). Earliest wins ties.
    pub fn best_session(&self) -> Option<(usize, &SessionSummary)> {
        self.summaries
            .iter()
            .enumerate()
            .fold(None, |best, (i, s)| match best {
                Some((_, b)) if b.score >= s.score => best,
                _ => Some((i, s)),
            })
    }
}
