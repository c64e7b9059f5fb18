//! Configuration types.

use std::time::Duration;

/// Triage engine configuration.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Service name for identification.
    pub name: String,
    /// Hard budget for a human review round-trip.
    pub review_timeout: Duration,
    /// How long to wait for a review channel to appear before falling back.
    pub connect_wait: Duration,
    /// Poll interval while waiting for a review channel to connect.
    pub connect_poll_interval: Duration,
    /// Minimum vector-search score a chunk must exceed to be reranked.
    pub relevance_threshold: f32,
    /// Candidates fetched from the vector index per query.
    pub search_top_k: usize,
    /// Hits kept after reranking.
    pub rerank_top_n: usize,
    /// Dataset hits must exceed this (strictly) for the single-draft path.
    pub single_draft_min_hits: usize,
    /// Vector index holding product documentation.
    pub docs_index: String,
    /// Vector index holding categorized historical tickets.
    pub dataset_index: String,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            name: "mail-triage".to_string(),
            review_timeout: Duration::from_secs(300), // 5 minutes
            connect_wait: Duration::from_secs(15),
            connect_poll_interval: Duration::from_millis(250),
            relevance_threshold: 0.2,
            search_top_k: 20,
            rerank_top_n: 5,
            single_draft_min_hits: 4,
            docs_index: "product-docs".to_string(),
            dataset_index: "ticket-dataset".to_string(),
        }
    }
}

impl TriageConfig {
    /// Apply environment overrides on top of the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(secs) = std::env::var("TRIAGE_REVIEW_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.review_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(secs) = std::env::var("TRIAGE_CONNECT_WAIT_SECS") {
            if let Ok(secs) = secs.parse() {
                config.connect_wait = Duration::from_secs(secs);
            }
        }
        if let Ok(index) = std::env::var("TRIAGE_DOCS_INDEX") {
            config.docs_index = index;
        }
        if let Ok(index) = std::env::var("TRIAGE_DATASET_INDEX") {
            config.dataset_index = index;
        }
        config
    }
}
