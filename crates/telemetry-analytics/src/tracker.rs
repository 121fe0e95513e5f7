//! Live per-session analytics.
//!
//! Tracks the user-count timeline and per-user presence intervals as
//! membership notifications arrive, and derives engagement counts and the
//! insincere-member set on demand.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use telemetry_core::config::AnalyticsConfig;
use telemetry_core::error::{Result, TelemetryError};
use telemetry_core::types::{
    ChatThread, MembershipSnapshot, PresenceInterval, SessionAnalyticsSnapshot, SessionSummary,
    UserCountSample, UserId,
};
use telemetry_core::{Clock, SystemClock};
use tracing::{debug, warn};

/// Analytics state for one session.
///
/// Not meant for concurrent mutation; callers put it behind a single writer.
pub struct SessionAnalyticsTracker<C: Clock = SystemClock> {
    clock: C,
    /// Presence shorter than this marks a user as insincere.
    insincere_threshold: Duration,
    /// User count after each membership change, ascending by time.
    samples: Vec<UserCountSample>,
    /// First-seen / first-absent times. One interval per user; rejoining does
    /// not open a second one.
    presence: BTreeMap<UserId, PresenceInterval>,
    /// Messages per sender, rebuilt from the full chat history.
    chat_counts: BTreeMap<UserId, u64>,
}

impl<C: Clock> SessionAnalyticsTracker<C> {
    pub fn new(clock: C, insincere_threshold_mins: u32) -> Self {
        Self {
            clock,
            insincere_threshold: Duration::minutes(i64::from(insincere_threshold_mins)),
            samples: Vec::new(),
            presence: BTreeMap::new(),
            chat_counts: BTreeMap::new(),
        }
    }

    pub fn from_config(clock: C, config: &AnalyticsConfig) -> Self {
        Self::new(clock, config.insincere_threshold_mins)
    }

    /// Entry point for the membership source: record a sample, update
    /// presence intervals, and return the freshly derived insincere set.
    ///
    /// A notification stamped before the latest sample is discarded whole and
    /// reported as [`TelemetryError::ClockSkew`]; state is left untouched.
    pub fn on_membership_changed(
        &mut self,
        snapshot: &MembershipSnapshot,
    ) -> Result<BTreeSet<UserId>> {
        let now = self.clock.now();
        self.check_order(now)?;
        self.push_sample(snapshot, now);
        self.update_presence_at(snapshot, now);
        debug!(
            users = snapshot.len(),
            tracked = self.presence.len(),
            "membership changed"
        );
        Ok(self.derive_insincere_members())
    }

    /// Append `(now, |users|)` to the user-count timeline.
    pub fn record_membership_sample(&mut self, snapshot: &MembershipSnapshot) -> Result<()> {
        let now = self.clock.now();
        self.check_order(now)?;
        self.push_sample(snapshot, now);
        Ok(())
    }

    /// Stamp enter times for newly seen users and exit times for tracked users
    /// missing from `snapshot`.
    pub fn update_presence_intervals(&mut self, snapshot: &MembershipSnapshot) {
        let now = self.clock.now();
        self.update_presence_at(snapshot, now);
    }

    /// Users whose recorded presence is strictly shorter than the threshold.
    /// Users without an exit time never qualify.
    pub fn derive_insincere_members(&self) -> BTreeSet<UserId> {
        self.presence
            .iter()
            .filter_map(|(user, interval)| {
                interval
                    .duration()
                    .filter(|elapsed| *elapsed < self.insincere_threshold)
                    .map(|_| *user)
            })
            .collect()
    }

    /// Rebuild per-sender message counts from the complete chat history.
    ///
    /// Replaces the previous tally, so calling it again with the same history
    /// yields the same counts.
    pub fn tally_engagement(&mut self, chat_history: &[ChatThread]) -> &BTreeMap<UserId, u64> {
        let mut counts: BTreeMap<UserId, u64> = BTreeMap::new();
        for thread in chat_history {
            for message in &thread.messages {
                *counts.entry(message.sender).or_insert(0) += 1;
            }
        }
        self.chat_counts = counts;
        &self.chat_counts
    }

    /// Build an immutable analytics view of the session so far.
    pub fn export_snapshot(&mut self, chat_history: &[ChatThread]) -> SessionAnalyticsSnapshot {
        self.tally_engagement(chat_history);
        SessionAnalyticsSnapshot {
            chat_counts: self.chat_counts.clone(),
            user_count_samples: self.samples.clone(),
            insincere_members: self.derive_insincere_members(),
        }
    }

    /// Condense the session into a summary: distinct senders, total messages,
    /// and their product. An empty history gives all zeroes.
    pub fn finalize_session(&mut self, chat_history: &[ChatThread]) -> SessionSummary {
        let counts = self.tally_engagement(chat_history);
        let user_count = counts.len() as u64;
        let chat_count: u64 = counts.values().sum();
        SessionSummary::new(user_count, chat_count)
    }

    /// Current time on this session's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn samples(&self) -> &[UserCountSample] {
        &self.samples
    }

    pub fn engagement(&self) -> &BTreeMap<UserId, u64> {
        &self.chat_counts
    }

    pub fn presence_interval(&self, user: &UserId) -> Option<&PresenceInterval> {
        self.presence.get(user)
    }

    /// Presence so far: exit minus enter for users who left, now minus enter
    /// for users still present.
    pub fn presence_duration(&self, user: &UserId) -> Option<Duration> {
        self.presence.get(user).map(|interval| {
            interval
                .duration()
                .unwrap_or_else(|| self.clock.now() - interval.entered_at)
        })
    }

    /// Number of users ever seen in this session.
    pub fn tracked_users(&self) -> usize {
        self.presence.len()
    }

    fn check_order(&self, now: DateTime<Utc>) -> Result<()> {
        match self.samples.last() {
            Some(last) if now < last.at => {
                warn!(
                    observed = %now,
                    latest = %last.at,
                    "discarding out-of-order membership notification"
                );
                Err(TelemetryError::ClockSkew {
                    observed: now,
                    latest: last.at,
                })
            }
            _ => Ok(()),
        }
    }

    fn push_sample(&mut self, snapshot: &MembershipSnapshot, at: DateTime<Utc>) {
        self.samples.push(UserCountSample {
            at,
            count: snapshot.len(),
        });
    }

    fn update_presence_at(&mut self, snapshot: &MembershipSnapshot, at: DateTime<Utc>) {
        for user in &snapshot.users {
            self.presence
                .entry(*user)
                .or_insert_with(|| PresenceInterval::entered(at));
        }

        for (user, interval) in self.presence.iter_mut() {
            if snapshot.contains(user) || interval.exited_at.is_some() {
                continue;
            }
            if at < interval.entered_at {
                warn!(
                    user = %user,
                    entered_at = %interval.entered_at,
                    observed = %at,
                    "exit observed before enter; ignoring"
                );
                continue;
            }
            interval.exited_at = Some(at);
        }
    }
}

impl Default for SessionAnalyticsTracker<SystemClock> {
    fn default() -> Self {
        Self::from_config(SystemClock, &AnalyticsConfig::default())
    }
}
