//! Domain model — inbound messages, classification, retrieval hits,
//! draft bundles, and the append-only request outcome record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized inbound email, as delivered by the mailbox watcher.
///
/// Immutable once received; the pipeline only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Watcher-assigned message id. Minted by the pipeline when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub sender: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    /// Base64-encoded image attachments, passed through to the classifier.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
    /// Optional category hint from the watcher (advisory only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories_hint: Option<Vec<String>>,
}

impl InboundMessage {
    pub fn new(
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            sender: sender.into(),
            subject: subject.into(),
            body: body.into(),
            attachments: Vec::new(),
            categories_hint: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// Output of the classifier collaborator. Produced once per request,
/// immutable afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Matched categories, deduplicated. Order carries no meaning.
    pub categories: Vec<String>,
    /// Categories the classifier minted for this message.
    #[serde(default)]
    pub new_categories: Vec<String>,
    /// Documentation search query; `None` or blank means docs lookup is skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    pub from: String,
    pub subject: String,
    pub body: String,
}

impl ClassificationResult {
    /// Existing plus newly minted categories, in that order.
    pub fn combined_categories(&self) -> Vec<String> {
        let mut combined = self.categories.clone();
        combined.extend(self.new_categories.iter().cloned());
        combined
    }

    /// Whether the classifier asked for a documentation lookup.
    pub fn requires_docs(&self) -> bool {
        self.search_query
            .as_deref()
            .is_some_and(|q| !q.trim().is_empty())
    }
}

/// One ranked knowledge chunk after filtering and reranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub text: String,
    /// Reranker relevance in [0, 1].
    pub relevance_score: f32,
    /// Opaque chunk metadata from the index (ticket response, sender, subject...).
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// The unit shown to a reviewer and handed to the outcome recorder.
///
/// `drafts` holds one or two candidates; once a final choice is made the
/// sequence is replaced, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftBundle {
    pub from: String,
    pub subject: String,
    pub body: String,
    pub drafts: Vec<String>,
}

impl DraftBundle {
    /// Replace the candidate drafts with the single chosen body.
    pub fn with_final_draft(mut self, body: impl Into<String>) -> Self {
        self.drafts = vec![body.into()];
        self
    }

    /// First candidate, used as the fallback whenever review is unavailable.
    pub fn first_draft(&self) -> &str {
        self.drafts.first().map(String::as_str).unwrap_or_default()
    }
}

/// What the caller gets back: a usable body, always.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftReply {
    pub body: String,
    pub is_skip: bool,
}

/// A (classification, final body) pair stored for future retrieval reuse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseTemplate {
    pub subject: String,
    pub from: String,
    pub query: String,
    pub response: String,
    pub categories: Vec<String>,
}

/// Score + metadata snapshot of one retrieval hit, kept in the outcome log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitSummary {
    pub relevance_score: f32,
    pub metadata: serde_json::Value,
}

impl From<&RetrievalHit> for HitSummary {
    fn from(hit: &RetrievalHit) -> Self {
        Self {
            relevance_score: hit.relevance_score,
            metadata: hit.metadata.clone(),
        }
    }
}

/// Write-once record of a processed request. Append-only; exactly one is
/// recorded per inbound message regardless of the branch taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub request_id: String,
    pub from: String,
    pub subject: String,
    pub body: String,
    /// Combined existing + newly minted categories.
    pub categories: Vec<String>,
    pub has_new_categories: bool,
    pub has_attachments: bool,
    /// Whether the classifier asked for a documentation lookup.
    pub required_docs: bool,
    pub draft_response: String,
    pub processing_time_secs: f64,
    pub user_id: String,
    pub multiple_drafts_generated: bool,
    pub user_reviewed: bool,
    pub docs_count: usize,
    pub dataset_count: usize,
    /// Top-5 hit summaries per index.
    pub docs_results: Vec<HitSummary>,
    pub dataset_results: Vec<HitSummary>,
    pub total_docs_retrieved: usize,
    /// Retrieval calls that degraded to empty results, for observability.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retrieval_errors: Vec<String>,
    pub created_at: DateTime<Utc>,
}
