use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use rag_qa::config::Settings;
use rag_qa::indexer::build_chunks;
use rag_qa::indexer::chunker::Chunker;
use rag_qa::indexer::extractor::extract_text;
use rag_qa::indexer::walker::{walk_directory, DocumentFormat};
use rag_qa::rag::embeddings::{EmbeddingGenerator, EmbeddingProvider};
use rag_qa::rag::RetrievalEngine;

#[derive(Parser, Debug)]
#[command(name = "rag-indexer")]
#[command(about = "Manage the local document vector store")]
struct Args {
    /// Store directory (overrides VECTOR_STORE_PATH)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recursively index .pdf, .txt and .md files
    Index {
        #[arg(short, long)]
        dir: PathBuf,

        /// Maximum chunk size in bytes
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Overlap between chunks in bytes
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },
    /// Delete every stored chunk and the store files
    Reset,
    /// Show whether a store exists and how many chunks it holds
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let settings = Settings::from_env()?;
    let store_dir = args.store.unwrap_or_else(|| settings.vector_store_path.clone());

    println!("Initializing embedding model...");
    let embeddings: Arc<dyn EmbeddingProvider> = Arc::new(EmbeddingGenerator::new(
        &settings.embedding_model_dir,
        settings.embedding_dim,
    )?);
    let engine = RetrievalEngine::open(&store_dir, embeddings)?;

    match args.command {
        Command::Index {
            dir,
            chunk_size,
            chunk_overlap,
        } => {
            let chunker = Chunker::new(
                chunk_size.unwrap_or(settings.chunk_size),
                chunk_overlap.unwrap_or(settings.chunk_overlap),
            );
            index_directory(&engine, &dir, &chunker).await?;
        }
        Command::Reset => {
            engine.reset().await?;
            println!("Store at {} has been reset.", store_dir.display());
        }
        Command::Status => {
            let status = engine.status().await;
            println!("Store:     {}", store_dir.display());
            println!("Exists:    {}", status.exists);
            println!("Chunks:    {}", status.document_count);
        }
    }

    Ok(())
}

async fn index_directory(engine: &RetrievalEngine, dir: &Path, chunker: &Chunker) -> Result<()> {
    if !dir.exists() {
        anyhow::bail!("Directory does not exist: {}", dir.display());
    }

    println!("Scanning directory: {}", dir.display());
    let files = walk_directory(dir);
    println!("Found {} supported files", files.len());

    if files.is_empty() {
        println!("No supported files found. Exiting.");
        return Ok(());
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let mut success_count = 0usize;
    let mut total_chunks = 0usize;
    let mut failed_files: Vec<(PathBuf, String)> = Vec::new();

    for (path, format) in &files {
        pb.set_message(format!("{}", path.file_name().unwrap_or_default().to_string_lossy()));

        match index_file(engine, path, *format, chunker).await {
            Ok(chunk_count) => {
                success_count += 1;
                total_chunks += chunk_count;
            }
            Err(e) => {
                tracing::warn!("Failed to process {}: {:#}", path.display(), e);
                failed_files.push((path.clone(), format!("{:#}", e)));
            }
        }

        pb.inc(1);
    }

    pb.finish_with_message("done");

    println!("\nIndexing complete!");
    println!("  Files processed: {}/{}", success_count, files.len());
    println!("  Files failed:    {}", failed_files.len());
    println!("  Chunks added:    {}", total_chunks);
    println!("  Store total:     {}", engine.status().await.document_count);

    if !failed_files.is_empty() {
        println!("\nFailed files:");
        for (path, err) in &failed_files {
            println!("  {}: {}", path.display(), err);
        }
    }

    Ok(())
}

async fn index_file(
    engine: &RetrievalEngine,
    path: &Path,
    format: DocumentFormat,
    chunker: &Chunker,
) -> Result<usize> {
    let text = extract_text(path, format)?;
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let chunks = build_chunks(&text, &source, chunker);
    let count = chunks.len();
    engine.add_documents(chunks).await?;
    Ok(count)
}
