//! Review coordinator — publishes a draft bundle to a party and blocks the
//! calling workflow until a response, a timeout, or channel teardown.
//!
//! Per review request the state machine is
//! `PUBLISHED -> (RESPONDED | TIMED_OUT | CANCELLED)`, terminal in all
//! three cases. Responses resolve waiters in FIFO order per party.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::ReviewError;
use crate::model::DraftBundle;
use crate::review::protocol::{ReviewReply, ServerMessage};
use crate::review::registry::ReviewRegistry;

/// Terminal state of one review request.
#[derive(Debug, Clone)]
pub enum ReviewOutcome {
    /// The party answered within the budget.
    Responded(ReviewReply),
    /// No answer within the review timeout.
    TimedOut,
    /// The party's channel was torn down while we waited.
    Cancelled,
}

/// Coordinates synchronous human-review handoffs over the registry.
pub struct ReviewCoordinator {
    registry: Arc<ReviewRegistry>,
    /// Budget for the party's channel to appear before giving up.
    connect_wait: Duration,
}

impl ReviewCoordinator {
    pub fn new(registry: Arc<ReviewRegistry>, connect_wait: Duration) -> Self {
        Self {
            registry,
            connect_wait,
        }
    }

    pub fn registry(&self) -> &Arc<ReviewRegistry> {
        &self.registry
    }

    /// Publish `bundle` on the party's channel and wait up to
    /// `review_timeout` for the matching response.
    ///
    /// Fails with [`ReviewError::ChannelUnavailable`] when no channel
    /// appears within the connection-wait budget; the caller is expected
    /// to fall back to the first draft.
    pub async fn request_review(
        &self,
        party: &str,
        bundle: DraftBundle,
        review_timeout: Duration,
    ) -> Result<ReviewOutcome, ReviewError> {
        self.registry.await_channel(party, self.connect_wait).await?;

        // Register before publishing so a fast response cannot arrive with
        // nothing queued.
        let (waiter_id, rx) = self.registry.register_waiter(party).await?;

        if !self
            .registry
            .send(party, ServerMessage::DraftReview { data: bundle })
            .await
        {
            // Send failure removed the channel and cancelled our waiter.
            return Ok(ReviewOutcome::Cancelled);
        }
        info!(party, waiter = %waiter_id, "Draft bundle published, waiting for review");

        match timeout(review_timeout, rx).await {
            Ok(Ok(reply)) => {
                debug!(party, waiter = %waiter_id, "Review response received");
                Ok(ReviewOutcome::Responded(reply))
            }
            Ok(Err(_)) => {
                info!(party, waiter = %waiter_id, "Review cancelled by channel teardown");
                Ok(ReviewOutcome::Cancelled)
            }
            Err(_) => {
                warn!(party, waiter = %waiter_id, ?review_timeout, "Review timed out");
                self.registry.remove_waiter(party, waiter_id).await;
                Ok(ReviewOutcome::TimedOut)
            }
        }
    }

    /// Route an incoming `draft_response` to the oldest pending review for
    /// `party`. Stray responses are logged and dropped.
    pub async fn resolve_review(&self, party: &str, reply: ReviewReply) -> bool {
        self.registry.resolve_next(party, reply).await
    }
}
