//! Review channel registry — one addressable bidirectional channel per
//! reviewing party, with a FIFO queue of pending response waiters.
//!
//! The registry is the only shared mutable structure across requests. All
//! mutation goes through one async mutex, so a disconnect can never race
//! an in-flight resolve.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ReviewError;
use crate::review::protocol::{ReviewReply, ServerMessage};

/// Identifies one physical connection. `disconnect` with a stale token is
/// a no-op, so a replaced socket's teardown cannot remove its successor.
pub type ConnectionToken = Uuid;

/// One registered waiter. The oneshot sender enforces single resolution;
/// dropping it cancels the waiter.
struct PendingWaiter {
    id: Uuid,
    tx: oneshot::Sender<ReviewReply>,
}

struct ChannelEntry {
    token: ConnectionToken,
    transport: mpsc::UnboundedSender<ServerMessage>,
    pending: VecDeque<PendingWaiter>,
}

/// Party-keyed registry of review channels.
pub struct ReviewRegistry {
    connect_poll_interval: Duration,
    channels: Mutex<HashMap<String, ChannelEntry>>,
}

impl ReviewRegistry {
    pub fn new(connect_poll_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            connect_poll_interval,
            channels: Mutex::new(HashMap::new()),
        })
    }

    /// Install a transport for `party`, replacing any stale one. Pending
    /// waiters survive a replacement; only disconnect cancels them.
    pub async fn connect(
        &self,
        party: &str,
        transport: mpsc::UnboundedSender<ServerMessage>,
    ) -> ConnectionToken {
        let token = Uuid::new_v4();
        let mut channels = self.channels.lock().await;
        let pending = match channels.remove(party) {
            Some(existing) => {
                // Dropping the old transport closes the stale socket pump.
                info!(party, "Replacing existing review channel");
                existing.pending
            }
            None => VecDeque::new(),
        };
        channels.insert(
            party.to_string(),
            ChannelEntry {
                token,
                transport,
                pending,
            },
        );
        info!(party, %token, "Review channel connected");
        token
    }

    /// Remove the channel and cancel every outstanding waiter for `party`.
    /// Ignored when `token` no longer identifies the installed channel.
    pub async fn disconnect(&self, party: &str, token: ConnectionToken) {
        let mut channels = self.channels.lock().await;
        match channels.get(party) {
            Some(entry) if entry.token == token => {
                // Dropping the entry drops all waiter senders, which
                // resolves each receiver as cancelled.
                let cancelled = entry.pending.len();
                channels.remove(party);
                info!(party, cancelled, "Review channel disconnected");
            }
            Some(_) => {
                debug!(party, %token, "Ignoring disconnect from replaced channel");
            }
            None => {}
        }
    }

    pub async fn is_connected(&self, party: &str) -> bool {
        self.channels.lock().await.contains_key(party)
    }

    /// Number of unresolved waiters queued for `party`.
    pub async fn pending_count(&self, party: &str) -> usize {
        self.channels
            .lock()
            .await
            .get(party)
            .map(|e| e.pending.len())
            .unwrap_or(0)
    }

    /// Deliver `message` on the party's channel, fire-and-forget. A dead
    /// transport is treated as a disconnect (stale channel removed, waiters
    /// cancelled) rather than an error to the caller.
    ///
    /// Returns whether the message was handed to a live transport.
    pub async fn send(&self, party: &str, message: ServerMessage) -> bool {
        let mut channels = self.channels.lock().await;
        let Some(entry) = channels.get(party) else {
            debug!(party, "Send dropped - no channel");
            return false;
        };
        if entry.transport.send(message).is_err() {
            warn!(party, "Transport dead, removing stale review channel");
            channels.remove(party);
            return false;
        }
        true
    }

    /// Poll for a channel to appear, up to `max_wait`. Tolerates the race
    /// where the party's socket opens shortly after the workflow starts.
    pub async fn await_channel(&self, party: &str, max_wait: Duration) -> Result<(), ReviewError> {
        let deadline = Instant::now() + max_wait;
        loop {
            if self.is_connected(party).await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ReviewError::ChannelUnavailable {
                    party: party.to_string(),
                    waited: max_wait,
                });
            }
            tokio::time::sleep(self.connect_poll_interval).await;
        }
    }

    /// Append a waiter to the party's FIFO queue. Requires a live channel.
    pub async fn register_waiter(
        &self,
        party: &str,
    ) -> Result<(Uuid, oneshot::Receiver<ReviewReply>), ReviewError> {
        let mut channels = self.channels.lock().await;
        let entry = channels
            .get_mut(party)
            .ok_or_else(|| ReviewError::NotConnected {
                party: party.to_string(),
            })?;
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        entry.pending.push_back(PendingWaiter { id, tx });
        debug!(party, waiter = %id, queued = entry.pending.len(), "Review waiter registered");
        Ok((id, rx))
    }

    /// Drop a specific waiter (after its caller timed out).
    pub async fn remove_waiter(&self, party: &str, id: Uuid) {
        let mut channels = self.channels.lock().await;
        if let Some(entry) = channels.get_mut(party) {
            entry.pending.retain(|w| w.id != id);
        }
    }

    /// Resolve the oldest live waiter for `party` with `reply`.
    ///
    /// A stray or duplicate response with nothing pending is logged and
    /// dropped. Returns whether a waiter was resolved.
    pub async fn resolve_next(&self, party: &str, reply: ReviewReply) -> bool {
        let mut channels = self.channels.lock().await;
        let Some(entry) = channels.get_mut(party) else {
            warn!(party, "Draft response with no channel - dropped");
            return false;
        };
        while let Some(waiter) = entry.pending.pop_front() {
            // A waiter whose receiver is gone (timed out between unlock and
            // removal) just falls through to the next in line.
            if waiter.tx.send(reply.clone()).is_ok() {
                debug!(party, waiter = %waiter.id, "Review waiter resolved");
                return true;
            }
        }
        warn!(party, "Draft response with no pending review - dropped");
        false
    }
}
