//! Draft generation — the writer collaborator seam, prompt assembly from
//! retrieved context, and the single-vs-dual draft strategy.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join;
use tracing::debug;

use crate::error::PipelineError;
use crate::llm::{CompletionRequest, LlmProvider};
use crate::model::{ClassificationResult, DraftBundle, RetrievalHit};

const DRAFT_SYSTEM_PROMPT: &str = "You are a customer-support agent drafting a reply email. \
Ground your answer in the provided documentation excerpts and reference tickets. \
Match the tone of the reference responses. Reply with the email body only.";

/// Draft writer collaborator seam.
#[async_trait]
pub trait DraftWriter: Send + Sync {
    /// Produce one reply-body candidate.
    async fn write_draft(
        &self,
        classification: &ClassificationResult,
        docs: &[RetrievalHit],
        dataset: &[RetrievalHit],
        attachments: &[String],
    ) -> Result<String, PipelineError>;
}

/// LLM-backed draft writer.
pub struct LlmDraftWriter {
    llm: Arc<dyn LlmProvider>,
}

impl LlmDraftWriter {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl DraftWriter for LlmDraftWriter {
    async fn write_draft(
        &self,
        classification: &ClassificationResult,
        docs: &[RetrievalHit],
        dataset: &[RetrievalHit],
        attachments: &[String],
    ) -> Result<String, PipelineError> {
        let request = CompletionRequest::new(
            DRAFT_SYSTEM_PROMPT,
            format_user_prompt(classification, docs, dataset),
        )
        .with_images(attachments.to_vec());
        Ok(self.llm.complete(request).await?)
    }
}

/// Assemble the writer prompt: docs excerpts, the email, reference tickets.
fn format_user_prompt(
    classification: &ClassificationResult,
    docs: &[RetrievalHit],
    dataset: &[RetrievalHit],
) -> String {
    let mut docs_section = String::from("DOCUMENTATION:\n");
    for hit in docs {
        docs_section.push_str(&hit.text);
        docs_section.push('\n');
    }

    let mut dataset_section = String::from("REFERENCE TICKETS:\n");
    for hit in dataset {
        let meta = &hit.metadata;
        dataset_section.push_str(&format!(
            "Query: {}\nResponse: {}\nFrom: {}\nSubject: {}\n",
            hit.text,
            meta["response"].as_str().unwrap_or_default(),
            meta["from"].as_str().unwrap_or_default(),
            meta["subject"].as_str().unwrap_or_default(),
        ));
    }

    format!(
        "{docs_section}\nEMAIL:\nFrom: {}\nSubject: {}\nBody: {}\n\n{dataset_section}",
        classification.from, classification.subject, classification.body
    )
}

/// How many drafts to generate for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftPlan {
    /// High-confidence, well-grounded case: one authoritative draft.
    Single,
    /// Weak grounding or ambiguous category: two independent candidates
    /// for a human reviewer to choose between.
    Dual,
}

/// Applies the draft-count policy and runs the generation calls.
pub struct DraftStrategy {
    writer: Arc<dyn DraftWriter>,
    single_draft_min_hits: usize,
}

impl DraftStrategy {
    pub fn new(writer: Arc<dyn DraftWriter>, single_draft_min_hits: usize) -> Self {
        Self {
            writer,
            single_draft_min_hits,
        }
    }

    /// Single draft only when categories exist and the dataset lookup
    /// returned strictly more hits than the threshold.
    pub fn decide(&self, categories: &[String], dataset_hits: usize) -> DraftPlan {
        if !categories.is_empty() && dataset_hits > self.single_draft_min_hits {
            DraftPlan::Single
        } else {
            DraftPlan::Dual
        }
    }

    /// Generate the draft bundle per [`decide`](Self::decide). Dual drafts
    /// run concurrently with identical inputs; either call failing fails
    /// the request.
    pub async fn generate(
        &self,
        classification: &ClassificationResult,
        docs: &[RetrievalHit],
        dataset: &[RetrievalHit],
        attachments: &[String],
    ) -> Result<DraftBundle, PipelineError> {
        let plan = self.decide(&classification.categories, dataset.len());
        debug!(?plan, dataset_hits = dataset.len(), "Draft plan selected");

        let drafts = match plan {
            DraftPlan::Single => {
                vec![
                    self.writer
                        .write_draft(classification, docs, dataset, attachments)
                        .await?,
                ]
            }
            DraftPlan::Dual => {
                let (a, b) = try_join(
                    self.writer
                        .write_draft(classification, docs, dataset, attachments),
                    self.writer
                        .write_draft(classification, docs, dataset, attachments),
                )
                .await?;
                vec![a, b]
            }
        };

        Ok(DraftBundle {
            from: classification.from.clone(),
            subject: classification.subject.clone(),
            body: classification.body.clone(),
            drafts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tokio::sync::Mutex;

    fn classification(categories: Vec<&str>) -> ClassificationResult {
        ClassificationResult {
            categories: categories.into_iter().map(String::from).collect(),
            new_categories: vec![],
            search_query: None,
            from: "alice@example.com".into(),
            subject: "Billing question".into(),
            body: "My invoice looks wrong".into(),
        }
    }

    fn hits(n: usize) -> Vec<RetrievalHit> {
        (0..n)
            .map(|i| RetrievalHit {
                text: format!("hit {i}"),
                relevance_score: 0.9,
                metadata: serde_json::json!({"response": "resp", "from": "x", "subject": "s"}),
            })
            .collect()
    }

    /// Writer that records call windows and sleeps to make overlap observable.
    struct TimingWriter {
        windows: Mutex<Vec<(Instant, Instant)>>,
    }

    #[async_trait]
    impl DraftWriter for TimingWriter {
        async fn write_draft(
            &self,
            _classification: &ClassificationResult,
            _docs: &[RetrievalHit],
            _dataset: &[RetrievalHit],
            _attachments: &[String],
        ) -> Result<String, PipelineError> {
            let start = Instant::now();
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.windows.lock().await.push((start, Instant::now()));
            Ok("draft".into())
        }
    }

    fn strategy(writer: Arc<dyn DraftWriter>) -> DraftStrategy {
        DraftStrategy::new(writer, 4)
    }

    #[test]
    fn decision_table() {
        let s = strategy(Arc::new(TimingWriter {
            windows: Mutex::new(vec![]),
        }));
        let billing = vec!["billing".to_string()];

        assert_eq!(s.decide(&billing, 5), DraftPlan::Single);
        assert_eq!(s.decide(&billing, 6), DraftPlan::Single);
        // Exactly the threshold is NOT enough: the policy is strictly-greater.
        assert_eq!(s.decide(&billing, 4), DraftPlan::Dual);
        assert_eq!(s.decide(&billing, 0), DraftPlan::Dual);
        assert_eq!(s.decide(&[], 10), DraftPlan::Dual);
        assert_eq!(s.decide(&[], 0), DraftPlan::Dual);
    }

    #[tokio::test]
    async fn single_plan_generates_one_draft() {
        let writer = Arc::new(TimingWriter {
            windows: Mutex::new(vec![]),
        });
        let s = strategy(writer.clone());
        let bundle = s
            .generate(&classification(vec!["billing"]), &[], &hits(6), &[])
            .await
            .unwrap();
        assert_eq!(bundle.drafts.len(), 1);
        assert_eq!(writer.windows.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn dual_plan_generates_two_concurrent_drafts() {
        let writer = Arc::new(TimingWriter {
            windows: Mutex::new(vec![]),
        });
        let s = strategy(writer.clone());
        let bundle = s
            .generate(&classification(vec![]), &[], &[], &[])
            .await
            .unwrap();
        assert_eq!(bundle.drafts.len(), 2);

        let windows = writer.windows.lock().await;
        assert_eq!(windows.len(), 2);
        // The two generation windows must overlap: each starts before the
        // other finishes.
        let (a, b) = (windows[0], windows[1]);
        assert!(a.0 < b.1 && b.0 < a.1, "draft calls did not overlap");
    }

    #[tokio::test]
    async fn failing_writer_fails_the_request() {
        struct FailingWriter;

        #[async_trait]
        impl DraftWriter for FailingWriter {
            async fn write_draft(
                &self,
                _c: &ClassificationResult,
                _d: &[RetrievalHit],
                _s: &[RetrievalHit],
                _a: &[String],
            ) -> Result<String, PipelineError> {
                Err(PipelineError::DraftGeneration("provider down".into()))
            }
        }

        let s = strategy(Arc::new(FailingWriter));
        let result = s.generate(&classification(vec![]), &[], &[], &[]).await;
        assert!(result.is_err());
    }

    #[test]
    fn user_prompt_includes_context_sections() {
        let prompt = format_user_prompt(&classification(vec!["billing"]), &hits(1), &hits(1));
        assert!(prompt.contains("DOCUMENTATION:"));
        assert!(prompt.contains("REFERENCE TICKETS:"));
        assert!(prompt.contains("From: alice@example.com"));
        assert!(prompt.contains("Response: resp"));
    }
}
