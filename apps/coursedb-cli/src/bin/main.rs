use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use coursedb_core::config::{Config, Settings};
use coursedb_core::logging;
use coursedb_core::traits::Embedder;
use coursedb_embed::get_default_embedder;
use coursedb_rag::prompt::{render, system_prompt};
use coursedb_rag::{IngestMode, IngestRequest, Ingestor, Retriever};
use coursedb_vector::{store, IndexHandle};

/// Course materials retrieval index
#[derive(Parser)]
#[command(
    name = "coursedb",
    version = env!("CARGO_PKG_VERSION"),
    about = "Build and query a vector index over course materials",
    long_about = "Loads course documents, chunks and embeds them into a persisted vector index, \
                  and retrieves the most relevant chunks for a question."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or update the index from a directory of documents
    Ingest {
        /// Directory with the course materials (overrides data.docs_dir)
        #[arg(long, value_name = "PATH")]
        docs_path: Option<PathBuf>,

        /// Where the index is stored (overrides data.index_dir)
        #[arg(long, value_name = "PATH")]
        index_path: Option<PathBuf>,

        /// Merge into the existing index instead of replacing it
        #[arg(long)]
        incremental: bool,
    },

    /// Retrieve the chunks most relevant to a question
    Query {
        #[arg(value_name = "QUESTION")]
        question: String,

        #[arg(long, value_name = "PATH")]
        index_path: Option<PathBuf>,

        /// Number of chunks to return (overrides retrieval.top_k)
        #[arg(short, long)]
        k: Option<usize>,

        /// Print the grounded prompt instead of the ranked chunks
        #[arg(long)]
        show_prompt: bool,
    },

    /// Describe the persisted index
    Status {
        #[arg(long, value_name = "PATH")]
        index_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Config::load()?.settings()?;
    logging::init(&settings.logging);

    match cli.command {
        Commands::Ingest { docs_path, index_path, incremental } => {
            let request = IngestRequest {
                docs_path: docs_path.unwrap_or_else(|| settings.data.docs_path()),
                index_path: index_path.unwrap_or_else(|| settings.data.index_path()),
                incremental,
            };
            ingest(&settings, &request).await
        }
        Commands::Query { question, index_path, k, show_prompt } => {
            let index_path = index_path.unwrap_or_else(|| settings.data.index_path());
            let k = k.unwrap_or(settings.retrieval.top_k);
            query(&settings, index_path, &question, k, show_prompt).await
        }
        Commands::Status { index_path } => {
            status(index_path.unwrap_or_else(|| settings.data.index_path())).await
        }
    }
}

fn embedder(settings: &Settings) -> anyhow::Result<Arc<dyn Embedder>> {
    Ok(Arc::from(get_default_embedder(&settings.embedding)?))
}

async fn ingest(settings: &Settings, request: &IngestRequest) -> anyhow::Result<()> {
    let ingestor = Ingestor::from_settings(settings, embedder(settings)?)?;
    let report = ingestor.ingest(request).await?;

    for failure in &report.file_failures {
        eprintln!("Skipped {}: {}", failure.path.display(), failure.reason);
    }
    for dropped in &report.dropped {
        eprintln!("Dropped chunk {}: {}", dropped.chunk_id, dropped.reason);
    }
    if report.mode == IngestMode::FreshAfterMissingIndex {
        eprintln!(
            "Warning: no index existed at {}; built a new one instead of merging",
            request.index_path.display()
        );
    }
    println!(
        "{:?}: {} documents, {} chunks ({} already indexed), {} embedded, {} dropped, \
         {} entries in {}",
        report.mode,
        report.documents,
        report.chunks,
        report.duplicates_skipped,
        report.embedded,
        report.dropped.len(),
        report.total_entries,
        request.index_path.display()
    );
    Ok(())
}

async fn query(
    settings: &Settings,
    index_path: PathBuf,
    question: &str,
    k: usize,
    show_prompt: bool,
) -> anyhow::Result<()> {
    let retriever = Retriever::new(embedder(settings)?, IndexHandle::new(index_path))
        .with_system_prompt(system_prompt(&settings.retrieval));
    if show_prompt {
        let (prompt, _) = retriever.prompt(question, k).await?;
        println!("{}", render(&prompt));
        return Ok(());
    }
    let retrieval = retriever.retrieve(question, k).await?;
    for (rank, chunk) in retrieval.chunks.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} (chunk {})",
            rank + 1,
            chunk.score,
            chunk.source,
            chunk.chunk_index
        );
        println!("{}\n", chunk.text.trim());
    }
    Ok(())
}

async fn status(index_path: PathBuf) -> anyhow::Result<()> {
    let index = store::load(&index_path).await?;
    let documents: BTreeSet<&str> =
        index.entries().iter().map(|e| e.metadata.doc_id.as_str()).collect();
    println!("Index:      {}", index_path.display());
    println!("Entries:    {}", index.len());
    println!("Documents:  {}", documents.len());
    println!("Dimension:  {}", index.dim());
    println!("Metric:     {}", index.metric());
    println!("Generation: {}", index.generation());
    println!("Embedder:   {}", index.embedder_id());
    Ok(())
}
