//! RAGShield Engine
//!
//! Integrity-gated RAG middleware: scores every retrieved document on four
//! signals, quarantines failures, tracks blast radius, and serves the
//! HTTP/SSE analyst surface.

use clap::Parser;
use ragshield_engine::adapters::{Generator, OllamaClient, SqliteIndex};
use ragshield_engine::blast::BlastRadiusAnalyzer;
use ragshield_engine::config::EngineConfig;
use ragshield_engine::error::Error;
use ragshield_engine::events::EventBus;
use ragshield_engine::lineage::LineageStore;
use ragshield_engine::pipeline::{IntegrityPipeline, PipelineOptions};
use ragshield_engine::retrieval::RetrievalAdapter;
use ragshield_engine::scoring::{DriftScorer, RedFlagScorer, ScorerSet, TrustScorer};
use ragshield_engine::state::AppState;
use ragshield_engine::vault::QuarantineVault;
use ragshield_engine::{ingest, server};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// RAGShield Engine - integrity-gated retrieval middleware
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Working root for durable state (overrides RAGSHIELD_ROOT)
    #[arg(short, long, value_name = "PATH")]
    root: Option<PathBuf>,

    /// Host address to bind to
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Port to bind to
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Ollama base URL
    #[arg(long, value_name = "URL")]
    ollama_url: Option<String>,

    /// Generation model name
    #[arg(long, value_name = "MODEL")]
    model: Option<String>,

    /// Embedding model name
    #[arg(long, value_name = "MODEL")]
    embedding_model: Option<String>,

    /// Corpus directory to ingest at startup
    #[arg(long, value_name = "DIR")]
    corpus: Option<PathBuf>,

    /// Enable the unchecked demonstration query path
    #[arg(long)]
    enable_unsafe_queries: bool,

    /// Allow the destructive /api/demo/reset endpoint
    #[arg(long)]
    allow_demo_reset: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("ragshield_engine={log_level},ragshield_common={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        // Exit codes: 1 startup failure, 2 configuration error
        Err(e @ Error::Config(_)) => {
            error!("configuration error: {e}");
            ExitCode::from(2)
        }
        Err(e) => {
            error!("startup failure: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> ragshield_engine::Result<()> {
    info!("RAGShield Engine starting...");

    let working_root = ragshield_common::config::resolve_working_root(
        args.root.as_deref().and_then(|p| p.to_str()),
    )
    .map_err(|e| Error::Config(e.to_string()))?;
    std::fs::create_dir_all(&working_root)?;
    info!("Working root: {}", working_root.display());

    let mut config = EngineConfig::new(&working_root);
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(url) = args.ollama_url {
        config.ollama_base_url = url;
    }
    if let Some(model) = args.model {
        config.generation_model = model;
    }
    if let Some(model) = args.embedding_model {
        config.embedding_model = model;
    }
    config.enable_unsafe_queries = args.enable_unsafe_queries;
    config.allow_demo_reset = args.allow_demo_reset;
    config.corpus_dir = args.corpus;
    config.validate()?;

    // Construction order: bus, lineage, adapter, vault, scorers, pipeline,
    // HTTP surface; each dependency built once and injected
    let bus = EventBus::new(config.events_log_path())?;
    let lineage = Arc::new(LineageStore::new(config.lineage_log_path())?);

    let ollama = Arc::new(OllamaClient::new(
        &config.ollama_base_url,
        &config.generation_model,
        &config.embedding_model,
    )?);

    info!("Checking generation collaborator at {}...", config.ollama_base_url);
    if !ollama.healthy().await {
        return Err(Error::Generation(format!(
            "generation collaborator unreachable or model {} missing at {}",
            config.generation_model, config.ollama_base_url
        )));
    }

    let index = Arc::new(SqliteIndex::open(&config.index_dir()).await?);
    let adapter = Arc::new(RetrievalAdapter::new(
        ollama.clone(),
        index.clone(),
        config.over_fetch_factor,
    ));

    if let Some(corpus_dir) = &config.corpus_dir {
        info!("Ingesting corpus from {}...", corpus_dir.display());
        let summary = ingest::ingest_corpus(&adapter, corpus_dir).await?;
        info!("Ingested {} corpus documents", summary.total);
    }

    let vault = Arc::new(QuarantineVault::new(
        config.vault_dir(),
        adapter.clone(),
        bus.clone(),
    )?);

    // Golden baseline is embedded once at startup
    let drift = DriftScorer::load(index.as_ref()).await?;
    info!("Semantic-drift baseline: {} golden documents", drift.baseline_size());
    let scorers = Arc::new(ScorerSet::new(
        TrustScorer::new(config.trust_sources.clone()),
        RedFlagScorer::new(config.red_flags.clone()),
        drift,
        config.integrity_threshold,
        config.quarantine_votes,
    ));

    let pipeline = Arc::new(IntegrityPipeline::new(
        adapter.clone(),
        vault.clone(),
        scorers,
        ollama,
        lineage.clone(),
        bus.clone(),
        PipelineOptions {
            boost_factor: config.boost_factor,
            query_deadline: config.query_deadline,
        },
    ));

    let blast = Arc::new(BlastRadiusAnalyzer::new(lineage.clone(), bus.clone()));

    let bind_addr = config.bind_addr();
    let state = AppState::new(
        Arc::new(config),
        pipeline,
        vault,
        blast,
        adapter,
        lineage,
        bus,
    );

    info!("Starting HTTP server on {}...", bind_addr);
    server::start(&bind_addr, state).await
}
