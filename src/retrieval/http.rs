//! HTTP-backed retrieval collaborators — a vector-index query client and
//! a rerank API client.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;

use crate::error::RetrievalError;
use crate::retrieval::{RankedDoc, Reranker, SearchChunk, VectorSearch};

/// Vector-index HTTP client.
pub struct HttpVectorSearch {
    base_url: String,
    api_key: secrecy::SecretString,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: serde_json::Value,
}

impl HttpVectorSearch {
    pub fn new(base_url: impl Into<String>, api_key: secrecy::SecretString) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl VectorSearch for HttpVectorSearch {
    async fn search(
        &self,
        query: &str,
        index: &str,
        top_k: usize,
        categories: Option<&[String]>,
    ) -> Result<Vec<SearchChunk>, RetrievalError> {
        let mut body = json!({
            "query": query,
            "top_k": top_k,
            "hybrid": true,
            "alpha": 0.8,
        });
        if let Some(categories) = categories {
            body["filter"] = json!({"categories": {"$in": categories}});
        }

        let response = self
            .client
            .post(format!("{}/indexes/{index}/query", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrievalError::SearchFailed {
                index: index.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(RetrievalError::SearchFailed {
                index: index.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let parsed: QueryResponse =
            response
                .json()
                .await
                .map_err(|e| RetrievalError::InvalidResponse {
                    reason: e.to_string(),
                })?;

        Ok(parsed
            .matches
            .into_iter()
            .map(|m| SearchChunk {
                content: m.content,
                score: m.score,
                metadata: m.metadata,
            })
            .collect())
    }
}

/// Rerank API client.
pub struct HttpReranker {
    base_url: String,
    api_key: secrecy::SecretString,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    #[serde(default)]
    data: Vec<RerankEntry>,
}

#[derive(Debug, Deserialize)]
struct RerankEntry {
    index: usize,
    #[serde(default)]
    relevance_score: f32,
}

impl HttpReranker {
    pub fn new(
        base_url: impl Into<String>,
        api_key: secrecy::SecretString,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RankedDoc>, RetrievalError> {
        let body = json!({
            "model": self.model,
            "query": query,
            "documents": documents,
            "top_n": top_n,
        });

        let response = self
            .client
            .post(format!("{}/rerank", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrievalError::RerankFailed {
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(RetrievalError::RerankFailed {
                reason: format!("HTTP {}", response.status()),
            });
        }

        let parsed: RerankResponse =
            response
                .json()
                .await
                .map_err(|e| RetrievalError::InvalidResponse {
                    reason: e.to_string(),
                })?;

        Ok(parsed
            .data
            .into_iter()
            .map(|entry| RankedDoc {
                index: entry.index,
                relevance_score: entry.relevance_score,
            })
            .collect())
    }
}
