//! Persistence seams — the append-only outcome log and the response
//! template sink. Both are best-effort from the pipeline's point of view.

pub mod libsql_store;

pub use libsql_store::LibSqlStore;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::model::{RequestOutcome, ResponseTemplate};

/// Append-only log of request outcomes. No update or delete path.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    async fn record_outcome(&self, outcome: &RequestOutcome) -> Result<(), StorageError>;

    /// Most recent outcomes, newest first.
    async fn recent_outcomes(&self, limit: usize) -> Result<Vec<RequestOutcome>, StorageError>;
}

/// Sink for reusable (classification, final body) response templates.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn store_template(&self, template: &ResponseTemplate) -> Result<(), StorageError>;
}
