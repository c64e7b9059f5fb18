use std::sync::Arc;

use anyhow::Context;

use mail_triage::classify::{Classifier, LlmClassifier};
use mail_triage::config::TriageConfig;
use mail_triage::drafts::{DraftStrategy, DraftWriter, LlmDraftWriter};
use mail_triage::llm::{LlmConfig, create_provider};
use mail_triage::pipeline::DraftPipeline;
use mail_triage::retrieval::http::{HttpReranker, HttpVectorSearch};
use mail_triage::retrieval::{Reranker, RetrievalFanout, VectorSearch};
use mail_triage::review::registry::ReviewRegistry;
use mail_triage::review::ReviewCoordinator;
use mail_triage::server::app_routes;
use mail_triage::store::{LibSqlStore, OutcomeStore, TemplateStore};

const DEFAULT_CATEGORIES: &str = "billing,account,technical,shipping,returns,general";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let llm_api_key = std::env::var("TRIAGE_LLM_API_KEY").unwrap_or_else(|_| {
        eprintln!("Error: TRIAGE_LLM_API_KEY not set");
        eprintln!("  export TRIAGE_LLM_API_KEY=sk-...");
        std::process::exit(1);
    });
    let llm_base_url = std::env::var("TRIAGE_LLM_BASE_URL")
        .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
    let llm_model = std::env::var("TRIAGE_LLM_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

    let search_base_url = std::env::var("TRIAGE_SEARCH_BASE_URL").unwrap_or_else(|_| {
        eprintln!("Error: TRIAGE_SEARCH_BASE_URL not set");
        std::process::exit(1);
    });
    let search_api_key = secrecy::SecretString::from(
        std::env::var("TRIAGE_SEARCH_API_KEY").unwrap_or_default(),
    );
    let rerank_base_url =
        std::env::var("TRIAGE_RERANK_BASE_URL").unwrap_or_else(|_| search_base_url.clone());
    let rerank_api_key = std::env::var("TRIAGE_RERANK_API_KEY")
        .map(secrecy::SecretString::from)
        .unwrap_or_else(|_| search_api_key.clone());
    let rerank_model = std::env::var("TRIAGE_RERANK_MODEL")
        .unwrap_or_else(|_| "rerank-english-v3.0".to_string());

    let port: u16 = std::env::var("TRIAGE_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    let categories: Vec<String> = std::env::var("TRIAGE_CATEGORIES")
        .unwrap_or_else(|_| DEFAULT_CATEGORIES.to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let config = TriageConfig::from_env();

    eprintln!("📬 Mail Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_model);
    eprintln!("   Review WS: ws://0.0.0.0:{}/ws/drafts", port);
    eprintln!("   Draft API: http://0.0.0.0:{}/api/drafts/generate", port);
    eprintln!("   Logs API: http://0.0.0.0:{}/api/logs", port);
    eprintln!("   Categories: {}", categories.join(", "));

    // ── LLM ─────────────────────────────────────────────────────────────
    let llm_config = LlmConfig {
        base_url: llm_base_url,
        api_key: secrecy::SecretString::from(llm_api_key),
        model: llm_model,
    };
    let llm = create_provider(&llm_config);

    // ── Database ────────────────────────────────────────────────────────
    let db_path =
        std::env::var("TRIAGE_DB_PATH").unwrap_or_else(|_| "./data/mail-triage.db".to_string());
    let store = Arc::new(
        LibSqlStore::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {}", db_path, e);
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}\n", db_path);

    // ── Pipeline ────────────────────────────────────────────────────────
    let search: Arc<dyn VectorSearch> =
        Arc::new(HttpVectorSearch::new(search_base_url, search_api_key));
    let reranker: Arc<dyn Reranker> =
        Arc::new(HttpReranker::new(rerank_base_url, rerank_api_key, rerank_model));
    let retrieval = Arc::new(RetrievalFanout::new(search, reranker, &config));

    let classifier: Arc<dyn Classifier> =
        Arc::new(LlmClassifier::new(llm.clone(), categories));
    let writer: Arc<dyn DraftWriter> = Arc::new(LlmDraftWriter::new(llm));
    let strategy = Arc::new(DraftStrategy::new(writer, config.single_draft_min_hits));

    let registry = ReviewRegistry::new(config.connect_poll_interval);
    let coordinator = Arc::new(ReviewCoordinator::new(registry, config.connect_wait));

    let pipeline = Arc::new(DraftPipeline::new(
        classifier,
        retrieval,
        strategy,
        Arc::clone(&coordinator),
        store.clone() as Arc<dyn TemplateStore>,
        store as Arc<dyn OutcomeStore>,
        config,
    ));

    // ── Server ──────────────────────────────────────────────────────────
    let app = app_routes(pipeline, coordinator);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    tracing::info!(port, "Mail triage server started");
    axum::serve(listener, app).await?;

    Ok(())
}
