//! Process-local change-notification pub/sub, keyed by session id.
//!
//! Published after a transaction commits, never before, and delivered in
//! commit order per session. Subscribers that lag behind the broadcast
//! channel's capacity will observe a gap (`RecvError::Lagged`); at that
//! point they are expected to reconcile via a fresh snapshot, matching the
//! at-least-once, idempotent-by-snapshot delivery contract this store
//! promises to its consumers.

use mandrake_core::{SessionHistory, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// The kind of mutation that produced a [`SessionChangeEvent`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A new Session, Round, or Turn was created.
    Created,
    /// An existing row was updated.
    Updated,
    /// The session was deleted.
    Deleted,
}

/// A notification published after a committed mutation to a Session,
/// Round, or Turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionChangeEvent {
    /// What kind of mutation occurred.
    pub kind: ChangeKind,
    /// The session the mutation belongs to.
    pub session_id: SessionId,
    /// The session's full history as of the commit, if still present
    /// (absent for `Deleted`).
    pub snapshot: Option<SessionHistory>,
}

/// Registry of per-session broadcast channels.
pub struct ChangeBus {
    channels: Mutex<HashMap<SessionId, broadcast::Sender<SessionChangeEvent>>>,
}

impl ChangeBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to change events for one session. Creates the underlying
    /// channel on first subscription; the sender is retained internally so
    /// events published before any subscriber exists are simply dropped
    /// (there is no replay buffer), matching the at-least-once-from-here
    /// contract.
    pub fn subscribe(&self, session_id: &SessionId) -> broadcast::Receiver<SessionChangeEvent> {
        let mut channels = self.channels.lock().expect("change bus mutex poisoned");
        channels
            .entry(session_id.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish an event for a session. A no-op (besides bookkeeping) if
    /// nobody is subscribed.
    pub fn publish(&self, event: SessionChangeEvent) {
        let channels = self.channels.lock().expect("change bus mutex poisoned");
        if let Some(sender) = channels.get(&event.session_id) {
            // Err means no receivers are currently attached; that's fine,
            // the contract only promises delivery to existing subscribers.
            let _ = sender.send(event);
        }
    }

    /// Drop the channel for a session, e.g. after the session is deleted.
    pub fn remove(&self, session_id: &SessionId) {
        self.channels
            .lock()
            .expect("change bus mutex poisoned")
            .remove(session_id);
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}
