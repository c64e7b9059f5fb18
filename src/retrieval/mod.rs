//! Knowledge retrieval — vector search + rerank collaborators and the
//! two-way fan-out that feeds draft generation.

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join;
use tracing::{debug, warn};

use crate::config::TriageConfig;
use crate::error::RetrievalError;
use crate::model::RetrievalHit;

/// A raw chunk from the vector index, before filtering and reranking.
#[derive(Debug, Clone)]
pub struct SearchChunk {
    pub content: String,
    /// Similarity score from the index (not the reranker).
    pub score: f32,
    pub metadata: serde_json::Value,
}

/// One reranker verdict, referring back into the candidate list by index.
#[derive(Debug, Clone, Copy)]
pub struct RankedDoc {
    pub index: usize,
    pub relevance_score: f32,
}

/// Vector-index search collaborator.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        index: &str,
        top_k: usize,
        categories: Option<&[String]>,
    ) -> Result<Vec<SearchChunk>, RetrievalError>;
}

/// Reranking collaborator. Opaque to the core: candidates in, ordering out.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RankedDoc>, RetrievalError>;
}

/// Result of one fan-out: both hit lists plus any degraded calls.
#[derive(Debug, Default)]
pub struct RetrievalOutcome {
    pub docs: Vec<RetrievalHit>,
    pub dataset: Vec<RetrievalHit>,
    pub docs_error: Option<String>,
    pub dataset_error: Option<String>,
}

impl RetrievalOutcome {
    /// Degraded-call descriptions, for the outcome recorder.
    pub fn errors(&self) -> Vec<String> {
        self.docs_error
            .iter()
            .chain(self.dataset_error.iter())
            .cloned()
            .collect()
    }
}

/// Issues 0–2 retrieval calls concurrently based on data availability.
///
/// A skipped call contributes an empty hit list; a failed call degrades to
/// an empty hit list with the error captured for observability. Retrieval
/// never fails a request on its own.
pub struct RetrievalFanout {
    search: Arc<dyn VectorSearch>,
    reranker: Arc<dyn Reranker>,
    relevance_threshold: f32,
    top_k: usize,
    top_n: usize,
    docs_index: String,
    dataset_index: String,
}

impl RetrievalFanout {
    pub fn new(
        search: Arc<dyn VectorSearch>,
        reranker: Arc<dyn Reranker>,
        config: &TriageConfig,
    ) -> Self {
        Self {
            search,
            reranker,
            relevance_threshold: config.relevance_threshold,
            top_k: config.search_top_k,
            top_n: config.rerank_top_n,
            docs_index: config.docs_index.clone(),
            dataset_index: config.dataset_index.clone(),
        }
    }

    /// Fan out to the docs index (when a search query exists) and the
    /// dataset index (when categories exist), then fan in.
    pub async fn gather(
        &self,
        search_query: Option<&str>,
        dataset_query: &str,
        categories: &[String],
    ) -> RetrievalOutcome {
        let docs_query = search_query.map(str::trim).filter(|q| !q.is_empty());

        let docs_fut = async {
            match docs_query {
                Some(query) => Some(self.query_index(query, &self.docs_index, None).await),
                None => {
                    debug!("Skipping docs search - empty or missing search query");
                    None
                }
            }
        };
        let dataset_fut = async {
            if categories.is_empty() {
                debug!("Skipping dataset search - no categories");
                None
            } else {
                Some(
                    self.query_index(dataset_query, &self.dataset_index, Some(categories))
                        .await,
                )
            }
        };

        let (docs_result, dataset_result) = join(docs_fut, dataset_fut).await;

        let mut outcome = RetrievalOutcome::default();
        match docs_result {
            Some(Ok(hits)) => outcome.docs = hits,
            Some(Err(e)) => {
                warn!(index = %self.docs_index, error = %e, "Docs retrieval degraded to empty");
                outcome.docs_error = Some(e.to_string());
            }
            None => {}
        }
        match dataset_result {
            Some(Ok(hits)) => outcome.dataset = hits,
            Some(Err(e)) => {
                warn!(index = %self.dataset_index, error = %e, "Dataset retrieval degraded to empty");
                outcome.dataset_error = Some(e.to_string());
            }
            None => {}
        }
        outcome
    }

    /// Search one index, drop low-score chunks, rerank the rest.
    async fn query_index(
        &self,
        query: &str,
        index: &str,
        categories: Option<&[String]>,
    ) -> Result<Vec<RetrievalHit>, RetrievalError> {
        let chunks = self
            .search
            .search(query, index, self.top_k, categories)
            .await?;

        let kept: Vec<SearchChunk> = chunks
            .into_iter()
            .filter(|c| c.score > self.relevance_threshold)
            .collect();
        if kept.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = kept.iter().map(|c| c.content.clone()).collect();
        let ranked = self.reranker.rerank(query, &texts, self.top_n).await?;

        let hits = ranked
            .into_iter()
            .filter(|r| r.index < kept.len())
            .map(|r| RetrievalHit {
                text: kept[r.index].content.clone(),
                relevance_score: r.relevance_score,
                metadata: kept[r.index].metadata.clone(),
            })
            .collect();
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stub search that counts calls and returns canned chunks.
    struct StubSearch {
        calls: AtomicUsize,
        chunks: Vec<SearchChunk>,
        fail: bool,
    }

    impl StubSearch {
        fn returning(chunks: Vec<SearchChunk>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                chunks,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                chunks: vec![],
                fail: true,
            }
        }
    }

    #[async_trait]
    impl VectorSearch for StubSearch {
        async fn search(
            &self,
            _query: &str,
            index: &str,
            _top_k: usize,
            _categories: Option<&[String]>,
        ) -> Result<Vec<SearchChunk>, RetrievalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RetrievalError::SearchFailed {
                    index: index.to_string(),
                    reason: "backend down".into(),
                });
            }
            Ok(self.chunks.clone())
        }
    }

    /// Identity reranker: returns documents in order with descending scores.
    struct StubReranker;

    #[async_trait]
    impl Reranker for StubReranker {
        async fn rerank(
            &self,
            _query: &str,
            documents: &[String],
            top_n: usize,
        ) -> Result<Vec<RankedDoc>, RetrievalError> {
            Ok(documents
                .iter()
                .enumerate()
                .take(top_n)
                .map(|(index, _)| RankedDoc {
                    index,
                    relevance_score: 1.0 - index as f32 * 0.1,
                })
                .collect())
        }
    }

    fn chunk(content: &str, score: f32) -> SearchChunk {
        SearchChunk {
            content: content.into(),
            score,
            metadata: serde_json::json!({"source": content}),
        }
    }

    fn fanout(search: StubSearch) -> (Arc<StubSearch>, RetrievalFanout) {
        let search = Arc::new(search);
        let fanout = RetrievalFanout::new(
            Arc::clone(&search) as Arc<dyn VectorSearch>,
            Arc::new(StubReranker),
            &TriageConfig::default(),
        );
        (search, fanout)
    }

    #[tokio::test]
    async fn empty_inputs_issue_no_calls() {
        let (search, fanout) = fanout(StubSearch::returning(vec![chunk("a", 0.9)]));
        let outcome = fanout.gather(None, "Subject: x\ny", &[]).await;
        assert!(outcome.docs.is_empty());
        assert!(outcome.dataset.is_empty());
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
        assert!(outcome.errors().is_empty());
    }

    #[tokio::test]
    async fn blank_query_skips_docs_index() {
        let (search, fanout) = fanout(StubSearch::returning(vec![chunk("a", 0.9)]));
        let categories = vec!["billing".to_string()];
        let outcome = fanout.gather(Some("   "), "q", &categories).await;
        assert!(outcome.docs.is_empty());
        assert_eq!(outcome.dataset.len(), 1);
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn both_calls_run_when_inputs_present() {
        let (search, fanout) = fanout(StubSearch::returning(vec![chunk("a", 0.9)]));
        let categories = vec!["billing".to_string()];
        let outcome = fanout.gather(Some("pricing"), "q", &categories).await;
        assert_eq!(outcome.docs.len(), 1);
        assert_eq!(outcome.dataset.len(), 1);
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn low_score_chunks_never_reach_reranker() {
        let (_, fanout) = fanout(StubSearch::returning(vec![
            chunk("keep", 0.5),
            chunk("drop", 0.2), // at the threshold, not above it
            chunk("drop-too", 0.05),
        ]));
        let outcome = fanout.gather(Some("q"), "q", &[]).await;
        assert_eq!(outcome.docs.len(), 1);
        assert_eq!(outcome.docs[0].text, "keep");
        assert_eq!(outcome.docs[0].metadata["source"], "keep");
    }

    #[tokio::test]
    async fn failed_call_degrades_to_empty_with_error() {
        let (_, fanout) = fanout(StubSearch::failing());
        let categories = vec!["billing".to_string()];
        let outcome = fanout.gather(Some("q"), "q", &categories).await;
        assert!(outcome.docs.is_empty());
        assert!(outcome.dataset.is_empty());
        assert_eq!(outcome.errors().len(), 2);
    }

    #[tokio::test]
    async fn rerank_caps_hits_at_top_n() {
        let chunks: Vec<SearchChunk> = (0..10).map(|i| chunk(&format!("c{i}"), 0.9)).collect();
        let (_, fanout) = fanout(StubSearch::returning(chunks));
        let outcome = fanout.gather(Some("q"), "q", &[]).await;
        assert_eq!(outcome.docs.len(), 5);
    }
}
