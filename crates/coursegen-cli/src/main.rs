//! Driver binary: enqueues `DocumentUpload` jobs for a course's files,
//! runs the worker pool to drive the six stages to completion, polls
//! the course's FSM status, and prints a cost/quality report.
//!
//! Exit codes: 0 all lessons completed, 1 a fatal stage failure,
//! 2 timeout, 3 configuration error.

mod adapters;
mod config;
mod report;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use coursegen_lesson_graph::DefaultLinter;
use coursegen_llm::GatewayClient;
use coursegen_metrics::PgMetricsSink;
use coursegen_queue::{BackoffPolicy, EnqueueOptions, JobQueue, PgJobQueue};
use coursegen_rag::PgVectorStore;
use coursegen_store::PgStore;
use coursegen_types::{CourseStatus, JobPayload};
use coursegen_workers::{
    AnalysisWorker, DocumentProcessingWorker, DocumentUploadWorker, LessonContentWorker,
    PoolConfig, StageRegistry, StructureGenerationWorker, SummarizationWorker, WorkerPool,
};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;

use crate::adapters::{blocking_embedder, HttpChunkIndexer, HttpDocumentParser};
use crate::config::{Cli, Command, RunArgs};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::from(3);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let Command::Run(args) = cli.command;
    runtime.block_on(run(cli.config, args))
}

async fn run(cfg: config::AppConfig, args: RunArgs) -> ExitCode {
    let pool = match PgPoolOptions::new()
        .max_connections(16)
        .connect(&cfg.metadata_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("could not connect to METADATA_URL: {e}");
            return ExitCode::from(3);
        }
    };

    let queue_pool = if cfg.queue_url() == cfg.metadata_url.as_str() {
        pool.clone()
    } else {
        match PgPoolOptions::new().max_connections(8).connect(cfg.queue_url()).await {
            Ok(p) => p,
            Err(e) => {
                eprintln!("could not connect to QUEUE_URL: {e}");
                return ExitCode::from(3);
            }
        }
    };

    let vector_pool = if cfg.vector_url() == cfg.metadata_url.as_str() {
        pool.clone()
    } else {
        match PgPoolOptions::new().max_connections(8).connect(cfg.vector_url()).await {
            Ok(p) => p,
            Err(e) => {
                eprintln!("could not connect to VECTOR_URL: {e}");
                return ExitCode::from(3);
            }
        }
    };

    let store = Arc::new(PgStore::new(pool.clone()));
    let queue: Arc<dyn JobQueue> = Arc::new(
        PgJobQueue::new(queue_pool).with_backoff(BackoffPolicy::default()),
    );

    let gateway = Arc::new(
        GatewayClient::new(cfg.llm_base_url.clone(), cfg.llm_api_key.clone())
            .with_escalation_ladder(cfg.llm_escalation_ladder.clone())
            .with_token_cap(cfg.llm_token_cap)
            .with_pricing(cfg.model_pricing()),
    );
    let gateway_completions: Arc<dyn coursegen_workers::Completions> = gateway.clone();
    // One client per process, per the gateway's own doc comment. Leaking
    // a clone of the `Arc` (not the client itself) gives the `&'static`
    // reference `LessonContentWorker` needs without constructing a
    // second `reqwest::Client`.
    let gateway_leaked: &'static Arc<GatewayClient> = Box::leak(Box::new(gateway.clone()));
    let gateway_ref: &'static GatewayClient = gateway_leaked;

    let embed = blocking_embedder(cfg.document_parser_url.clone());
    let vector_store = PgVectorStore::new(vector_pool, embed);
    let vector_store: &'static PgVectorStore = Box::leak(Box::new(vector_store));

    let linter: &'static DefaultLinter = Box::leak(Box::new(DefaultLinter));

    let metrics = Arc::new(PgMetricsSink::new(pool.clone()));
    let parser: Arc<dyn coursegen_workers::DocumentParser> =
        Arc::new(HttpDocumentParser::new(cfg.document_parser_url.clone()));
    let indexer: Arc<dyn coursegen_workers::ChunkIndexer> =
        Arc::new(HttpChunkIndexer::new(cfg.chunk_indexer_url.clone()));

    let mut registry = StageRegistry::new();
    registry.register(
        coursegen_types::JobType::DocumentUpload,
        Arc::new(DocumentUploadWorker::new(store.clone(), queue.clone())),
    );
    registry.register(
        coursegen_types::JobType::DocumentProcessing,
        Arc::new(DocumentProcessingWorker::new(
            store.clone(),
            queue.clone(),
            parser,
            indexer,
        )),
    );
    registry.register(
        coursegen_types::JobType::Summarization,
        Arc::new(SummarizationWorker::new(store.clone(), queue.clone(), gateway_completions.clone())),
    );
    registry.register(
        coursegen_types::JobType::StructureAnalysis,
        Arc::new(AnalysisWorker::new(
            store.clone(),
            queue.clone(),
            gateway_completions.clone(),
            metrics.clone(),
        )),
    );
    registry.register(
        coursegen_types::JobType::StructureGeneration,
        Arc::new(StructureGenerationWorker::new(store.clone(), queue.clone(), gateway_completions.clone())),
    );
    registry.register(
        coursegen_types::JobType::LessonContent,
        Arc::new(LessonContentWorker::new(
            store.clone(),
            vector_store,
            gateway_ref,
            linter,
            coursegen_lesson_graph::GraphLimits {
                max_iterations: cfg.refinement_max_iterations,
                ..coursegen_lesson_graph::GraphLimits::default()
            },
            cfg.routing_config(),
            cfg.refinement_max_concurrent_patchers,
            cfg.refinement_adjacent_section_gap,
        )),
    );
    let registry = Arc::new(registry);

    for path in &args.files {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) => {
                eprintln!("could not read {}: {e}", path.display());
                return ExitCode::from(3);
            }
        };
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mime_type = guess_mime_type(path);
        if let Err(e) = queue
            .enqueue(
                JobPayload::DocumentUpload {
                    course_id: args.course_id,
                    organization_id: args.organization_id,
                    user_id: args.user_id,
                    filename,
                    mime_type,
                    size_bytes: metadata.len() as i64,
                    storage_path: path.to_string_lossy().into_owned(),
                },
                EnqueueOptions::default(),
            )
            .await
        {
            eprintln!("failed to enqueue {}: {e}", path.display());
            return ExitCode::from(1);
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pool_config = PoolConfig {
        concurrency: args.concurrency,
        ..PoolConfig::default()
    };
    let worker_pool = WorkerPool::new(queue.clone(), registry, pool_config);
    let pool_handle = tokio::spawn(async move { worker_pool.run(shutdown_rx).await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.timeout_secs);
    let poll_interval = Duration::from_secs(args.poll_interval_secs);
    let final_status = loop {
        if tokio::time::Instant::now() >= deadline {
            break None;
        }
        match store_status(&store, args.course_id).await {
            Ok(status) if status.is_terminal() => break Some(status),
            Ok(_) => tokio::time::sleep(poll_interval).await,
            Err(e) => {
                eprintln!("error polling course status: {e}");
                tokio::time::sleep(poll_interval).await;
            }
        }
    };

    let _ = shutdown_tx.send(true);
    let _ = pool_handle.await;

    let report = match report::build(&pool, args.course_id).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("failed to build report: {e}");
            return ExitCode::from(1);
        }
    };
    println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default());

    match final_status {
        Some(CourseStatus::Completed) => ExitCode::SUCCESS,
        Some(CourseStatus::Failed) => ExitCode::from(1),
        Some(_) => ExitCode::from(1),
        None => ExitCode::from(2),
    }
}

async fn store_status(
    store: &Arc<PgStore>,
    course_id: uuid::Uuid,
) -> Result<CourseStatus, coursegen_store::StoreError> {
    let course = store.get_course(course_id).await?;
    Ok(course.generation_status())
}

/// Small extension -> MIME mapper for locally supplied files; the
/// parsing collaborator only needs enough of a hint to route the
/// request, not a full type sniff.
fn guess_mime_type(path: &std::path::Path) -> String {
    match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
        Some(ext) if ext == "pdf" => "application/pdf",
        Some(ext) if ext == "md" || ext == "markdown" => "text/markdown",
        Some(ext) if ext == "txt" => "text/plain",
        Some(ext) if ext == "docx" => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some(ext) if ext == "html" || ext == "htm" => "text/html",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn guess_mime_type_known_extensions() {
        assert_eq!(guess_mime_type(Path::new("a.pdf")), "application/pdf");
        assert_eq!(guess_mime_type(Path::new("a.MD")), "text/markdown");
        assert_eq!(guess_mime_type(Path::new("a.markdown")), "text/markdown");
        assert_eq!(guess_mime_type(Path::new("a.txt")), "text/plain");
        assert_eq!(guess_mime_type(Path::new("a.htm")), "text/html");
    }

    #[test]
    fn guess_mime_type_unknown_or_missing_extension_falls_back() {
        assert_eq!(guess_mime_type(Path::new("a.weird")), "application/octet-stream");
        assert_eq!(guess_mime_type(Path::new("noext")), "application/octet-stream");
    }
}
