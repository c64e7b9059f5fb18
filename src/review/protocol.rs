//! Review channel wire protocol — message-typed JSON in both directions.

use serde::{Deserialize, Serialize};

use crate::model::DraftBundle;

/// A reviewer's answer to a draft-review request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewReply {
    /// Chosen (possibly edited) reply body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Reviewer declined to pick; the caller falls back to the first draft.
    #[serde(default)]
    pub is_skip: bool,
}

/// Server → party messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A draft bundle awaiting review.
    DraftReview { data: DraftBundle },
    /// Keepalive reply.
    Pong,
    /// Liveness probe sent right after connect.
    ConnectionTest,
    /// Answer to a client `status` request.
    StatusResponse { data: StatusData },
    /// Reply to malformed or unrecognized client messages.
    Error { data: ErrorData },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusData {
    pub user_id: String,
    pub connected: bool,
    pub pending_reviews: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorData {
    pub message: String,
}

/// Party → server messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// The reviewer's verdict on the oldest outstanding review.
    DraftResponse {
        #[serde(default)]
        data: ReviewReply,
    },
    /// Keepalive.
    Ping,
    /// Ack for the server's connection test; ignored.
    ConnectionTestResponse,
    /// Request for connection status.
    Status,
}
