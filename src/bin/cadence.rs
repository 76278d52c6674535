//! Cadence CLI: run a content batch from a JSON request file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use cadence::api::{BatchService, CreateBatchRequest};
use cadence::breaker::CircuitBreaker;
use cadence::collaborators::{HttpContentCalendar, HttpKnowledgeStore, WebhookNotifier};
use cadence::config::CadenceConfig;
use cadence::context::DigestSummarizer;
use cadence::executor::SequentialExecutor;
use cadence::generation::GenerationEngine;
use cadence::logging::init_logging;
use cadence::plan::PlanStore;
use cadence::provider::{HttpModelConnector, RubricClient};
use cadence::quality::QualityGate;
use cadence::session::SessionPool;
use cadence::stream::StreamCallDriver;

#[derive(Parser)]
#[command(name = "cadence", about = "Sequential batch orchestration for AI content production")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a batch request file and print the final report as JSON
    Run {
        /// Path to a JSON batch request
        #[arg(long)]
        batch: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = CadenceConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(level) = cli.log_level {
        cfg.logging.level = level;
    }
    init_logging(Some(&cfg.logging)).context("initializing logging")?;

    match cli.command {
        Commands::Run { batch } => run_batch(cfg, batch).await,
    }
}

async fn run_batch(cfg: CadenceConfig, batch_path: PathBuf) -> Result<()> {
    let raw = std::fs::read_to_string(&batch_path)
        .with_context(|| format!("reading batch request {:?}", batch_path))?;
    let request: CreateBatchRequest =
        serde_json::from_str(&raw).context("parsing batch request")?;

    let Some(model_url) = cfg.collaborators.model_url.clone() else {
        bail!("collaborators.model_url is required to run a batch");
    };
    let Some(rubric_url) = cfg.collaborators.rubric_url.clone() else {
        bail!("collaborators.rubric_url is required to run a batch");
    };

    let store = Arc::new(PlanStore::new(&cfg.context));
    let connector = Arc::new(HttpModelConnector::new(
        model_url,
        cfg.collaborators.model_api_key.clone(),
    )?);
    let pool = Arc::new(SessionPool::new(cfg.sessions.clone(), connector));
    let sweeper = SessionPool::spawn_ttl_sweeper(Arc::clone(&pool));
    let breaker = Arc::new(CircuitBreaker::new("generative-model", cfg.breaker.clone()));
    let driver = StreamCallDriver::new(cfg.stream.clone());
    let engine = Arc::new(GenerationEngine::new(Arc::clone(&pool), breaker, driver));

    let rubric = Arc::new(RubricClient::new(rubric_url)?);
    let gate = Arc::new(QualityGate::new(
        rubric.clone(),
        rubric,
        cfg.quality.clone(),
    ));

    let mut executor = SequentialExecutor::new(
        Arc::clone(&store),
        Arc::clone(&engine),
        gate,
        Arc::new(DigestSummarizer),
        cfg.executor.clone(),
        cfg.context.clone(),
        cfg.quality.clone(),
    );
    if let Some(url) = cfg.collaborators.calendar_url.clone() {
        executor = executor.with_calendar(Arc::new(HttpContentCalendar::new(url)?));
    }
    if let Some(url) = cfg.collaborators.knowledge_url.clone() {
        executor = executor.with_knowledge(Arc::new(HttpKnowledgeStore::new(url)?));
    }
    if let Some(url) = cfg.collaborators.notify_url.clone() {
        executor = executor.with_notifier(Arc::new(WebhookNotifier::new(url)?));
    }

    let service = BatchService::new(Arc::clone(&store), Arc::new(executor));

    let created = match service.create_batch(request) {
        Ok(created) => created,
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&err)?);
            bail!("batch request rejected: {}", err.error);
        }
    };
    info!(plan_id = %created.plan_id, total = created.total, "batch created");

    // Batch-level completion is independent of per-item success.
    let report = match service.run_batch(&created.plan_id).await {
        Ok(report) => report,
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&err)?);
            bail!("batch execution aborted: {}", err.error);
        }
    };

    sweeper.abort();
    engine.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
