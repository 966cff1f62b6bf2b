//! kbase CLI - Command-line interface
//!
//! Usage:
//!   kbase ingest --title <t> --problem <p> --solution <s> [--machine <m>] [--type <t>] [--project <p>]
//!   kbase ingest --file records.json
//!   kbase query <question> [--top-k <n>] [--mode matches|top_match|synthesize]
//!   kbase init-index
//!
//! Uses the same configuration as the server (`KBASE_CONFIG` or environment)
//! and prints JSON to stdout.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use kbase_core::{AnswerMode, AppConfig, KbError, QueryRequest, RecordInput};
use kbase_rag::KnowledgeBase;
use serde_json::json;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "kbase")]
#[command(about = "Knowledge base ingest and query CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest records into the knowledge base
    Ingest(IngestArgs),
    /// Query the knowledge base
    Query {
        /// Question to ask
        question: String,

        /// Number of matches to retrieve
        #[arg(long)]
        top_k: Option<usize>,

        /// Answer mode: matches, top_match or synthesize
        #[arg(long)]
        mode: Option<AnswerMode>,
    },
    /// Create the vector index if needed and check its dimension
    InitIndex,
}

#[derive(Args)]
struct IngestArgs {
    /// JSON file holding an array of records
    #[arg(long, conflicts_with_all = ["id", "title", "problem", "solution", "machine", "record_type", "project"])]
    file: Option<PathBuf>,

    /// Record id (derived from the title when absent)
    #[arg(long)]
    id: Option<String>,

    #[arg(long, required_unless_present = "file")]
    title: Option<String>,

    #[arg(long, required_unless_present = "file")]
    problem: Option<String>,

    #[arg(long, required_unless_present = "file")]
    solution: Option<String>,

    #[arg(long)]
    machine: Option<String>,

    #[arg(long = "type")]
    record_type: Option<String>,

    #[arg(long)]
    project: Option<String>,
}

impl IngestArgs {
    fn into_records(self) -> anyhow::Result<Vec<RecordInput>> {
        match self.file {
            Some(path) => read_records(&path),
            None => Ok(vec![RecordInput {
                id: self.id,
                title: self.title,
                problem: self.problem,
                solution: self.solution,
                machine: self.machine,
                record_type: self.record_type,
                project: self.project,
            }]),
        }
    }
}

fn read_records(path: &Path) -> anyhow::Result<Vec<RecordInput>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of records", path.display()))
}

fn error_json(error: &KbError) -> serde_json::Value {
    json!({ "code": error.kind(), "message": error.to_string() })
}

async fn ingest(kb: &KnowledgeBase, records: Vec<RecordInput>) -> anyhow::Result<()> {
    let total = records.len();
    let mut failed = 0usize;

    for (index, record) in records.into_iter().enumerate() {
        match kb.ingest(record).await {
            Ok(outcome) => {
                println!("{}", json!({ "status": "success", "id": outcome.id, "vector_dim": outcome.vector_dim }));
            }
            Err(e) => {
                failed += 1;
                tracing::warn!(index, "Ingest failed: {e}");
                println!("{}", json!({ "status": "error", "index": index, "error": error_json(&e) }));
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} records failed");
    }
    Ok(())
}

async fn query(
    kb: &KnowledgeBase,
    question: String,
    top_k: Option<usize>,
    mode: Option<AnswerMode>,
) -> anyhow::Result<()> {
    let request =
        QueryRequest::new(question).with_top_k(top_k.unwrap_or_else(|| kb.default_top_k()));

    match kb.query(request, mode).await {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Err(failure) => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "status": "error",
                    "error": error_json(&failure.error),
                    "matches": failure.matches,
                }))?
            );
            Err(failure.into())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kbase=info,kbase_rag=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    let kb = KnowledgeBase::from_config(&config)
        .await
        .context("failed to initialize providers")?;

    match cli.command {
        Commands::Ingest(args) => ingest(&kb, args.into_records()?).await?,
        Commands::Query {
            question,
            top_k,
            mode,
        } => query(&kb, question, top_k, mode).await?,
        Commands::InitIndex => {
            kb.ensure_index().await?;
            println!("{}", json!({ "status": "ok", "index": config.index.name, "dimension": config.index.dimension }));
        }
    }

    Ok(())
}
