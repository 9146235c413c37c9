mod analyzer;
mod config;
mod crawler;
mod errors;
mod interpreter;
mod llm_client;
mod parser;
mod pipeline;
mod store;
mod transport;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analyzer::{LlmAnalyzer, ResumeAnalyzer, RuleAnalyzer};
use crate::config::{AnalyzerKind, Config};
use crate::crawler::CrawlerClient;
use crate::interpreter::{HeuristicInterpreter, Vocabulary};
use crate::llm_client::LlmClient;
use crate::pipeline::Pipeline;
use crate::store::RunStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first — a ConfigError is the only fatal condition,
    // and it must fire before any candidate is touched.
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting screener v{}", env!("CARGO_PKG_VERSION"));

    let vocabulary = match &config.vocabulary_file {
        Some(path) => Vocabulary::from_path(path)?,
        None => Vocabulary::builtin(),
    };
    let interpreter = Arc::new(HeuristicInterpreter::new(vocabulary, config.page_size));

    let http = reqwest::Client::new();
    let source = Arc::new(CrawlerClient::new(
        http.clone(),
        config.crawler_url.clone(),
        config.retry.clone(),
        config.politeness_delay,
    ));

    let analyzer: Arc<dyn ResumeAnalyzer> = match config.analyzer {
        AnalyzerKind::Mock => Arc::new(RuleAnalyzer::new(config.thresholds)),
        AnalyzerKind::Llm => {
            let api_key = config
                .anthropic_api_key
                .clone()
                .context("ANTHROPIC_API_KEY validated at config load")?;
            let client = LlmClient::new(http, api_key, config.retry.clone());
            info!("LLM analyzer initialized (model: {})", llm_client::MODEL);
            Arc::new(LlmAnalyzer::new(client, config.thresholds))
        }
    };
    info!(mode = config.analyzer.label(), "analyzer selected");

    let store = Arc::new(RunStore::open(&config.store_path)?);
    info!(
        path = %store.path().display(),
        already_processed = store.seen_count(),
        "result store ready"
    );

    // Ctrl-C stops dispatch of new candidates; in-flight ones finish.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight candidates");
            let _ = cancel_tx.send(true);
        }
    });

    let pipeline = Pipeline::new(
        interpreter,
        source,
        analyzer,
        store,
        config.concurrency,
        config.analyzer.label().to_string(),
    );

    let summary = pipeline.run(&config.brief, cancel_rx).await?;

    info!(
        matched = summary.matched,
        conditional = summary.conditional,
        rejected = summary.rejected,
        failed = summary.failed,
        skipped = summary.skipped,
        "screening summary"
    );

    Ok(())
}
