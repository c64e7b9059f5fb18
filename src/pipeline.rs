//! Orchestration pipeline — classify, retrieve, draft, review, persist.
//!
//! Per request: classification, retrieval fan-out, and draft generation
//! are the critical path and fail the request. The review handoff and
//! both persistence steps are recovered locally; the caller always gets
//! a usable draft body unless the critical path itself failed.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::classify::Classifier;
use crate::config::TriageConfig;
use crate::drafts::DraftStrategy;
use crate::error::Result;
use crate::model::{
    ClassificationResult, DraftBundle, DraftReply, HitSummary, InboundMessage, RequestOutcome,
    ResponseTemplate,
};
use crate::retrieval::{RetrievalFanout, RetrievalOutcome};
use crate::review::{ReviewCoordinator, ReviewOutcome};
use crate::store::{OutcomeStore, TemplateStore};

/// How many hit summaries per index are kept in the outcome record.
const OUTCOME_TOP_HITS: usize = 5;

/// The draft-generation engine. One instance serves all requests; there
/// is no shared per-request state.
pub struct DraftPipeline {
    classifier: Arc<dyn Classifier>,
    retrieval: Arc<RetrievalFanout>,
    strategy: Arc<DraftStrategy>,
    coordinator: Arc<ReviewCoordinator>,
    templates: Arc<dyn TemplateStore>,
    outcomes: Arc<dyn OutcomeStore>,
    config: TriageConfig,
}

impl DraftPipeline {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        retrieval: Arc<RetrievalFanout>,
        strategy: Arc<DraftStrategy>,
        coordinator: Arc<ReviewCoordinator>,
        templates: Arc<dyn TemplateStore>,
        outcomes: Arc<dyn OutcomeStore>,
        config: TriageConfig,
    ) -> Self {
        Self {
            classifier,
            retrieval,
            strategy,
            coordinator,
            templates,
            outcomes,
            config,
        }
    }

    /// Process one inbound message end to end and return the final draft.
    ///
    /// `user_id` addresses the reviewing party when a dual-draft review is
    /// needed. Exactly one outcome record is written per call, whichever
    /// branch is taken.
    pub async fn generate_draft(
        &self,
        message: &InboundMessage,
        user_id: &str,
    ) -> Result<DraftReply> {
        let start = Instant::now();
        let request_id = message
            .id
            .clone()
            .unwrap_or_else(|| format!("api_email_{}", Utc::now().timestamp()));
        info!(request_id, user_id, "Draft generation started");

        // Critical path: classify, retrieve, draft.
        let classification = self.classifier.classify(message).await?;

        let dataset_query = format!(
            "Subject: {}\n{}",
            classification.subject, classification.body
        );
        let retrieval = self
            .retrieval
            .gather(
                classification.search_query.as_deref(),
                &dataset_query,
                &classification.categories,
            )
            .await;
        debug!(
            request_id,
            docs = retrieval.docs.len(),
            dataset = retrieval.dataset.len(),
            "Retrieval complete"
        );

        let bundle = self
            .strategy
            .generate(
                &classification,
                &retrieval.docs,
                &retrieval.dataset,
                &message.attachments,
            )
            .await?;

        let multiple_drafts = bundle.drafts.len() > 1;
        let (final_body, reviewed, is_skip) = if multiple_drafts {
            self.run_review(&request_id, user_id, &bundle).await
        } else {
            debug!(request_id, "Single draft generated, no review needed");
            (bundle.first_draft().to_string(), false, false)
        };

        // Side channel: template storage and outcome logging never fail
        // the request.
        self.store_template(&classification, &final_body).await;
        self.record_outcome(
            &request_id,
            message,
            &classification,
            &retrieval,
            &final_body,
            start.elapsed().as_secs_f64(),
            user_id,
            multiple_drafts,
            reviewed,
        )
        .await;

        info!(
            request_id,
            reviewed,
            is_skip,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Draft generation finished"
        );
        Ok(DraftReply {
            body: final_body,
            is_skip,
        })
    }

    /// Hand a multi-draft bundle to the reviewing party.
    ///
    /// Every review failure mode (no channel, timeout, cancellation)
    /// resolves to the first draft with `reviewed=false`; the workflow
    /// never blocks past the review budget and never returns empty-handed.
    async fn run_review(
        &self,
        request_id: &str,
        user_id: &str,
        bundle: &DraftBundle,
    ) -> (String, bool, bool) {
        debug!(
            request_id,
            drafts = bundle.drafts.len(),
            "Multiple drafts generated, requesting review"
        );
        match self
            .coordinator
            .request_review(user_id, bundle.clone(), self.config.review_timeout)
            .await
        {
            Ok(ReviewOutcome::Responded(reply)) => {
                if reply.is_skip {
                    debug!(request_id, "Reviewer skipped, using first draft");
                    return (bundle.first_draft().to_string(), true, true);
                }
                // A response with no body gets the first-draft fallback too.
                let body = reply
                    .body
                    .filter(|b| !b.is_empty())
                    .unwrap_or_else(|| bundle.first_draft().to_string());
                (body, true, false)
            }
            Ok(ReviewOutcome::TimedOut) | Ok(ReviewOutcome::Cancelled) => {
                warn!(request_id, user_id, "Review did not complete, using first draft");
                (bundle.first_draft().to_string(), false, false)
            }
            Err(e) => {
                warn!(request_id, user_id, error = %e, "Review unavailable, using first draft");
                (bundle.first_draft().to_string(), false, false)
            }
        }
    }

    async fn store_template(&self, classification: &ClassificationResult, final_body: &str) {
        let template = ResponseTemplate {
            subject: classification.subject.clone(),
            from: classification.from.clone(),
            query: classification.body.clone(),
            response: final_body.to_string(),
            categories: classification.combined_categories(),
        };
        if let Err(e) = self.templates.store_template(&template).await {
            warn!(error = %e, "Failed to store response template");
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_outcome(
        &self,
        request_id: &str,
        message: &InboundMessage,
        classification: &ClassificationResult,
        retrieval: &RetrievalOutcome,
        final_body: &str,
        processing_time_secs: f64,
        user_id: &str,
        multiple_drafts: bool,
        reviewed: bool,
    ) {
        let outcome = RequestOutcome {
            request_id: request_id.to_string(),
            from: classification.from.clone(),
            subject: classification.subject.clone(),
            body: classification.body.clone(),
            categories: classification.combined_categories(),
            has_new_categories: !classification.new_categories.is_empty(),
            has_attachments: !message.attachments.is_empty(),
            required_docs: classification.requires_docs(),
            draft_response: final_body.to_string(),
            processing_time_secs,
            user_id: user_id.to_string(),
            multiple_drafts_generated: multiple_drafts,
            user_reviewed: reviewed,
            docs_count: retrieval.docs.len(),
            dataset_count: retrieval.dataset.len(),
            docs_results: retrieval
                .docs
                .iter()
                .take(OUTCOME_TOP_HITS)
                .map(HitSummary::from)
                .collect(),
            dataset_results: retrieval
                .dataset
                .iter()
                .take(OUTCOME_TOP_HITS)
                .map(HitSummary::from)
                .collect(),
            total_docs_retrieved: retrieval.docs.len() + retrieval.dataset.len(),
            retrieval_errors: retrieval.errors(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.outcomes.record_outcome(&outcome).await {
            error!(request_id, error = %e, "Failed to record request outcome");
        }
    }

    /// Recent outcome records, for the logs endpoint.
    pub async fn recent_outcomes(&self, limit: usize) -> Result<Vec<RequestOutcome>> {
        Ok(self.outcomes.recent_outcomes(limit).await?)
    }
}
