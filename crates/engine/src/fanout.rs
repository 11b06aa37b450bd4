//! Realtime Fanout: per-user session registry and `task-updates` broadcast.
//!
//! Each live WebSocket owns a bounded outbound channel. Delivery uses
//! `try_send`, so one stalled client can never block the handler or the
//! other sessions; a full buffer closes that session as slow and the client
//! is expected to reconnect and re-fetch.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tasklane_common::{EventEnvelope, SessionId, UserId};
use tasklane_messaging::{EventHandler, Outcome};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Result of one fanout pass for a single event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub closed_slow: usize,
    pub closed_gone: usize,
}

/// In-process registry of live sessions keyed by user, session id secondary.
/// Registration and removal are O(1); fanout reads one user's bucket.
pub struct SessionRegistry {
    sessions: DashMap<UserId, HashMap<SessionId, mpsc::Sender<String>>>,
    buffer: usize,
}

impl SessionRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            buffer,
        }
    }

    /// Register a session and hand back the receiving end its writer task
    /// drains. Dropping the registry entry closes the channel, which the
    /// writer observes as end-of-stream.
    pub fn register(&self, user_id: UserId, session_id: SessionId) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.sessions.entry(user_id).or_default().insert(session_id, tx);
        info!(user_id = %user_id, session_id = %session_id, "Session registered");
        rx
    }

    pub fn deregister(&self, user_id: UserId, session_id: SessionId) {
        if let Some(mut bucket) = self.sessions.get_mut(&user_id) {
            bucket.remove(&session_id);
            let empty = bucket.is_empty();
            drop(bucket);
            if empty {
                self.sessions.remove_if(&user_id, |_, bucket| bucket.is_empty());
            }
        }
        debug!(user_id = %user_id, session_id = %session_id, "Session deregistered");
    }

    pub fn session_count(&self, user_id: UserId) -> usize {
        self.sessions
            .get(&user_id)
            .map(|bucket| bucket.len())
            .unwrap_or(0)
    }

    pub fn total_sessions(&self) -> usize {
        self.sessions.iter().map(|bucket| bucket.len()).sum()
    }

    /// Write one already-serialized frame to every session of `user_id`.
    /// Sessions whose buffer is full are closed as slow; sessions whose
    /// reader went away are pruned.
    pub fn deliver(&self, user_id: UserId, frame: &str) -> FanoutReport {
        let mut report = FanoutReport::default();
        let Some(mut bucket) = self.sessions.get_mut(&user_id) else {
            return report;
        };

        let mut to_close: Vec<(SessionId, bool)> = Vec::new();
        for (session_id, tx) in bucket.iter() {
            match tx.try_send(frame.to_string()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        user_id = %user_id,
                        session_id = %session_id,
                        "Outbound buffer full; closing slow session"
                    );
                    to_close.push((*session_id, true));
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    to_close.push((*session_id, false));
                }
            }
        }

        for (session_id, slow) in to_close {
            bucket.remove(&session_id);
            if slow {
                report.closed_slow += 1;
            } else {
                report.closed_gone += 1;
            }
        }
        report
    }
}

/// Consumes `task-updates` and pushes each delta to the owning user's live
/// sessions. The frame is serialized once per event, not per session.
pub struct FanoutHandler {
    registry: Arc<SessionRegistry>,
}

impl FanoutHandler {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait::async_trait]
impl EventHandler for FanoutHandler {
    #[instrument(skip(self, envelope), fields(event_id = %envelope.event_id, user_id = %envelope.user_id))]
    async fn handle(&self, envelope: EventEnvelope) -> Outcome {
        let frame = match serde_json::to_string(&envelope) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Unserializable envelope; dropping");
                return Outcome::Drop;
            }
        };

        let report = self.registry.deliver(envelope.user_id, &frame);
        debug!(
            delivered = report.delivered,
            closed_slow = report.closed_slow,
            "Delta fanned out"
        );
        Outcome::Success
    }
}
