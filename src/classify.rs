//! Classification — maps an inbound email to category labels and an
//! optional documentation search query via a structured-JSON LLM call.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::PipelineError;
use crate::llm::{CompletionRequest, LlmProvider};
use crate::model::{ClassificationResult, InboundMessage};

/// Temperature for classification (deterministic-ish).
const CLASSIFY_TEMPERATURE: f32 = 0.1;

const CLASSIFY_SYSTEM_PROMPT: &str = r#"You are a customer-support email classifier.
Given an email, assign zero or more categories from the known list. If none fit,
you may mint new category names. Decide whether product documentation is needed
to answer; if so, produce a short search query.

Known categories:
{categories}

Respond with JSON only, in this exact shape:
{"categories": [...], "new_categories": [...], "search_query": "..." }
Use an empty string for search_query when no documentation lookup is needed."#;

/// Classifier collaborator seam.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        message: &InboundMessage,
    ) -> Result<ClassificationResult, PipelineError>;
}

/// Raw JSON shape the model is asked to emit.
#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    new_categories: Vec<String>,
    #[serde(default)]
    search_query: Option<String>,
}

/// LLM-backed classifier.
pub struct LlmClassifier {
    llm: Arc<dyn LlmProvider>,
    /// Seed category set shown to the model. Treated as opaque labels; the
    /// model may mint labels outside this list.
    known_categories: Vec<String>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>, known_categories: Vec<String>) -> Self {
        Self {
            llm,
            known_categories,
        }
    }

    fn system_prompt(&self) -> String {
        let listing = if self.known_categories.is_empty() {
            "(none yet)".to_string()
        } else {
            self.known_categories
                .iter()
                .map(|c| format!("- {c}"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        CLASSIFY_SYSTEM_PROMPT.replace("{categories}", &listing)
    }

    fn user_prompt(message: &InboundMessage) -> String {
        format!(
            "From: {}\nSubject: {}\nBody:\n{}",
            message.sender, message.subject, message.body
        )
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        message: &InboundMessage,
    ) -> Result<ClassificationResult, PipelineError> {
        let request = CompletionRequest::new(self.system_prompt(), Self::user_prompt(message))
            .with_temperature(CLASSIFY_TEMPERATURE)
            .with_images(message.attachments.clone());

        let response = self.llm.complete(request).await?;
        let raw = parse_classification(&response)
            .map_err(|e| PipelineError::Classification(format!("{e}: {response:.200}")))?;

        debug!(
            categories = ?raw.categories,
            new_categories = ?raw.new_categories,
            "Message classified"
        );

        Ok(ClassificationResult {
            categories: dedup(raw.categories),
            new_categories: dedup(raw.new_categories),
            search_query: raw.search_query.filter(|q| !q.trim().is_empty()),
            from: message.sender.clone(),
            subject: message.subject.clone(),
            body: message.body.clone(),
        })
    }
}

/// Parse the model's JSON, tolerating markdown code fences around it.
fn parse_classification(response: &str) -> Result<RawClassification, serde_json::Error> {
    let trimmed = response.trim();
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(stripped.trim())
}

/// Deduplicate labels preserving first-seen order.
fn dedup(labels: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    labels
        .into_iter()
        .filter(|label| seen.insert(label.clone()))
        .collect()
}
