//! Per-session actor.
//!
//! The actor task is the only owner of its session's tracker. Commands are
//! applied in mailbox order, which is the order the membership source
//! delivered them.

use crate::state::{ArchivedSession, SessionReport, TelemetryService};
use std::collections::BTreeSet;
use telemetry_analytics::SessionAnalyticsTracker;
use telemetry_core::error::{Result, TelemetryError};
use telemetry_core::storage::StorageSlot;
use telemetry_core::types::{ChatThread, MembershipSnapshot, SessionAnalyticsSnapshot, UserId};
use telemetry_core::Clock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

enum SessionCommand {
    Membership {
        snapshot: MembershipSnapshot,
        reply: oneshot::Sender<Result<BTreeSet<UserId>>>,
    },
    Analytics {
        chat_history: Vec<ChatThread>,
        reply: oneshot::Sender<SessionAnalyticsSnapshot>,
    },
    End {
        chat_history: Vec<ChatThread>,
        reply: oneshot::Sender<Result<SessionReport>>,
    },
}

/// Handle to a live session. Clones address the same actor.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: String,
    name: String,
    sender: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver a membership change. Returns the insincere set derived after
    /// applying it.
    pub async fn notify_membership(
        &self,
        snapshot: MembershipSnapshot,
    ) -> Result<BTreeSet<UserId>> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Membership { snapshot, reply }).await?;
        rx.await.map_err(|_| self.closed())?
    }

    /// Fresh analytics for the session so far.
    pub async fn analytics(
        &self,
        chat_history: Vec<ChatThread>,
    ) -> Result<SessionAnalyticsSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Analytics {
            chat_history,
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.closed())
    }

    /// End the session: archive its analytics and fold its summary into the
    /// aggregate history.
    ///
    /// On success the actor stops. On failure it keeps its state so the
    /// whole call can be retried.
    pub async fn end_session(&self, chat_history: Vec<ChatThread>) -> Result<SessionReport> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::End {
            chat_history,
            reply,
        })
        .await?;
        rx.await.map_err(|_| self.closed())?
    }

    /// Whether the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.sender.send(command).await.map_err(|_| self.closed())
    }

    fn closed(&self) -> TelemetryError {
        TelemetryError::SessionClosed(self.session_id.clone())
    }
}

pub(crate) fn spawn<S, C>(
    service: TelemetryService<S>,
    session_id: String,
    name: String,
    tracker: SessionAnalyticsTracker<C>,
    capacity: usize,
) -> SessionHandle
where
    S: StorageSlot + 'static,
    C: Clock + 'static,
{
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let actor = SessionActor {
        service,
        session_id: session_id.clone(),
        name: name.clone(),
        tracker,
        receiver,
    };
    tokio::spawn(actor.run());
    info!(session_id = %session_id, name = %name, "session started");
    SessionHandle {
        session_id,
        name,
        sender,
    }
}

struct SessionActor<S: StorageSlot + 'static, C: Clock> {
    service: TelemetryService<S>,
    session_id: String,
    name: String,
    tracker: SessionAnalyticsTracker<C>,
    receiver: mpsc::Receiver<SessionCommand>,
}

impl<S: StorageSlot + 'static, C: Clock> SessionActor<S, C> {
    async fn run(mut self) {
        while let Some(command) = self.receiver.recv().await {
            match command {
                SessionCommand::Membership { snapshot, reply } => {
                    let result = self.tracker.on_membership_changed(&snapshot);
                    if let Err(e) = &result {
                        warn!(session_id = %self.session_id, error = %e, "membership change rejected");
                    }
                    let _ = reply.send(result);
                }
                SessionCommand::Analytics {
                    chat_history,
                    reply,
                } => {
                    let _ = reply.send(self.tracker.export_snapshot(&chat_history));
                }
                SessionCommand::End {
                    chat_history,
                    reply,
                } => {
                    let result = self.end(&chat_history).await;
                    let done = result.is_ok();
                    if let Err(e) = &result {
                        warn!(session_id = %self.session_id, error = %e, "session end failed; state kept");
                    }
                    let _ = reply.send(result);
                    if done {
                        break;
                    }
                }
            }
        }
        debug!(session_id = %self.session_id, "session actor stopped");
    }

    async fn end(&mut self, chat_history: &[ChatThread]) -> Result<SessionReport> {
        let snapshot = self.tracker.export_snapshot(chat_history);
        let summary = self.tracker.finalize_session(chat_history);

        self.service
            .archive_session(ArchivedSession {
                session_id: self.session_id.clone(),
                name: self.name.clone(),
                ended_at: self.tracker.now(),
                summary,
                analytics: snapshot.clone(),
            })
            .await?;
        let history = self.service.record_session_end(summary).await?;

        info!(
            session_id = %self.session_id,
            insincere = snapshot.insincere_members.len(),
            score = summary.score,
            "session ended"
        );
        Ok(SessionReport {
            session_id: self.session_id.clone(),
            name: self.name.clone(),
            snapshot,
            summary,
            history,
        })
    }
}
