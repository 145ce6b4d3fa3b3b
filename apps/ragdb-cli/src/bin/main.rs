use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use ragdb_core::config::{Config, Settings};
use ragdb_core::data_processor::DataProcessor;
use ragdb_core::error::Error;
use ragdb_core::logging;
use ragdb_embed::get_default_embedder;
use ragdb_pipeline::{evaluate, EvalCase, IngestOptions, QueryOptions, RetrievalPipeline};

const INGEST_CONCURRENCY: usize = 4;

#[derive(Parser)]
#[command(name = "ragdb", about = "Chunk, embed and search local text collections", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Storage directory, overrides `storage.dir`
    #[arg(long, global = true, env = "RAGDB_STORE")]
    store: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest every .txt/.md file under a directory
    Ingest {
        data_dir: PathBuf,

        /// Only ingest the first N files
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Retrieve the chunks closest to a query
    Query {
        text: String,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Remove a document with its chunks and vectors
    Delete { document_id: String },

    /// Embed chunks left without vectors by an interrupted ingest
    Repair {
        /// Repair one document instead of all partial ones
        document_id: Option<String>,
    },

    /// List stored documents
    List,

    /// Show store counts and partial documents
    Status,

    /// Compute hit rate for a JSON file of `{ "query", "expected" }` cases
    Evaluate {
        cases: PathBuf,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
}

fn ingest_options(settings: &Settings) -> IngestOptions {
    IngestOptions { chunking: settings.chunking.clone(), deadline: settings.retrieval.deadline_ms.map(Duration::from_millis) }
}

fn progress_bar(total: u64) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    Ok(pb)
}

async fn ingest(pipeline: &RetrievalPipeline, settings: &Settings, data_dir: &Path, limit: Option<usize>) -> anyhow::Result<()> {
    println!("Ingesting from {}", data_dir.display());
    let processor = DataProcessor::new();
    let docs = match limit {
        Some(limit) => processor.process_directory_limited(data_dir, limit)?,
        None => processor.process_directory(data_dir)?,
    };
    let options = ingest_options(settings);
    let pb = progress_bar(docs.len() as u64)?;

    let outcomes: Vec<_> = stream::iter(docs)
        .map(|doc| {
            let options = &options;
            let pb = &pb;
            async move {
                let path = doc.metadata.get("path").cloned().unwrap_or_default();
                let outcome = pipeline.ingest(&doc.text, doc.metadata, options).await;
                pb.set_message(path.clone());
                pb.inc(1);
                (path, outcome)
            }
        })
        .buffer_unordered(INGEST_CONCURRENCY)
        .collect()
        .await;
    pb.finish_and_clear();

    let (mut ok, mut partial, mut skipped) = (0usize, 0usize, 0usize);
    for (path, outcome) in outcomes {
        match outcome {
            Ok(_) => ok += 1,
            Err(e @ (Error::IngestIncomplete { .. } | Error::DeadlineExceeded { .. })) => {
                warn!(path = %path, error = %e, "document stored without all vectors");
                partial += 1;
            }
            Err(e) => {
                warn!(path = %path, error = %e, "document skipped");
                skipped += 1;
            }
        }
    }
    println!("✅ Ingested {ok} documents ({partial} partial, {skipped} skipped)");
    if partial > 0 {
        println!("💡 Run `ragdb repair` to finish partial documents");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("info")?;
    let cli = Cli::parse();
    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    let settings = config.settings()?;
    let store = cli.store.clone().unwrap_or_else(|| settings.storage.resolved_dir());

    let embedder = get_default_embedder(&settings.embedding)?;
    let pipeline = RetrievalPipeline::open(&store, embedder)?.with_batch_size(settings.embedding.batch_size);

    match cli.command {
        Commands::Ingest { data_dir, limit } => {
            ingest(&pipeline, &settings, &data_dir, limit).await?;
            pipeline.save(&store)?;
        }
        Commands::Query { text, top_k } => {
            let k = top_k.unwrap_or(settings.retrieval.top_k);
            let options = QueryOptions { deadline: settings.retrieval.deadline_ms.map(Duration::from_millis) };
            let hits = pipeline.query(&text, k, &options).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                println!("🔍 Found {} results for: \"{}\"", hits.len(), text);
                for (i, hit) in hits.iter().enumerate() {
                    let title = hit.document_metadata.get("title").map(String::as_str).unwrap_or("-");
                    println!("\n  {}. score={:.4}  chunk={}  title={}", i + 1, hit.score, hit.chunk_id, title);
                    println!("     {}", hit.text);
                }
            }
        }
        Commands::Delete { document_id } => {
            let report = pipeline.delete(&document_id).await?;
            pipeline.save(&store)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("🗑️  Deleted {} ({} chunks, {} vectors)", report.document_id, report.chunks_removed, report.vectors_removed);
            }
        }
        Commands::Repair { document_id } => {
            let options = ingest_options(&settings);
            let result = match document_id {
                Some(id) => pipeline.repair(&id, &options).await,
                None => pipeline.repair_all(&options).await,
            };
            // Persist whatever was repaired before a failure.
            pipeline.save(&store)?;
            println!("🔧 Repaired {} chunks", result?);
        }
        Commands::List => {
            let docs = pipeline.corpus().list_documents();
            if cli.json {
                let rows: Vec<_> = docs
                    .iter()
                    .map(|d| serde_json::json!({ "id": d.id, "metadata": d.metadata, "ingested_at": d.ingested_at }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for d in docs {
                    let title = d.metadata.get("title").map(String::as_str).unwrap_or("-");
                    println!("{}  {}  {}", d.id, d.ingested_at.to_rfc3339(), title);
                }
            }
        }
        Commands::Status => {
            let status = pipeline.status();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("Store: {}", store.display());
                println!("Embedder: {}", status.embedder_id);
                println!("Search: {} (exact: {})", status.search_strategy, status.exact_search);
                println!("Documents: {}  Chunks: {}  Vectors: {}", status.documents, status.chunks, status.vectors);
                match status.dim {
                    Some(dim) => println!("Dimension: {dim}"),
                    None => println!("Dimension: -"),
                }
                if !status.partial_documents.is_empty() {
                    println!("⚠️  Partial documents: {}", status.partial_documents.join(", "));
                }
            }
        }
        Commands::Evaluate { cases, top_k } => {
            let raw = std::fs::read_to_string(&cases)?;
            let cases: Vec<EvalCase> = serde_json::from_str(&raw)?;
            let k = top_k.unwrap_or(settings.retrieval.top_k);
            let report = evaluate(&pipeline, &cases, k).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for outcome in &report.outcomes {
                    let mark = if outcome.hit { "✅" } else { "❌" };
                    println!("{mark} {}", outcome.query);
                }
                println!("\nHit rate @{k}: {}/{} = {:.3}", report.hits, report.cases, report.hit_rate);
            }
        }
    }
    Ok(())
}
