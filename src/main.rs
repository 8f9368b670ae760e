use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use log::{error, info};
use std::path::PathBuf;

use chunk_rag::chunking::{ChunkerConfig, SemanticChunker};
use chunk_rag::config::{EmbedderKind, RagConfig};
use chunk_rag::crew::{ResearchCrew, TaskGraphExecutor, TaskInputs};
use chunk_rag::database::{QdrantBackend, QdrantConfig};
use chunk_rag::embeddings::{EmbeddingProvider, HashEmbedder};
use chunk_rag::evaluation::{AnswerScorer, LlmJudge};
use chunk_rag::gemini::{GeminiClient, GeminiConfig};
use chunk_rag::ingest::process_documents;
use chunk_rag::rag::RetrievalEngine;
use chunk_rag::store::VectorIndex;

/// Semantic chunk store and retrieval over Qdrant
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Process documents in the specified directory
    #[arg(long, value_name = "DIR")]
    process: Option<PathBuf>,

    /// Force reprocessing of documents, ignoring the chunk snapshot
    #[arg(long, requires = "process")]
    force: bool,

    /// The query to answer
    #[arg(long)]
    query: Option<String>,

    /// Test retrieval only
    #[arg(long, requires = "query")]
    test: bool,

    /// Score the generated answer after the full pipeline
    #[arg(long, requires = "query", conflicts_with = "test")]
    evaluate: bool,

    /// Topic passed to the research crew
    #[arg(long, default_value = "AI RAG Systems")]
    topic: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    // Load configuration from environment
    let config = RagConfig::from_env().context("Invalid configuration")?;
    let qdrant = QdrantBackend::new(QdrantConfig::from_env())
        .context("Failed to initialize Qdrant client")?;

    match config.embedder {
        EmbedderKind::Hash => {
            let embedder = HashEmbedder::new(config.embedding_dimension);
            run(&args, &config, embedder, qdrant).await
        }
        EmbedderKind::Gemini => {
            let gemini = GeminiClient::new(GeminiConfig::from_env()?);
            run(&args, &config, gemini, qdrant).await
        }
    }
}

async fn run<E>(args: &Args, config: &RagConfig, embedder: E, qdrant: QdrantBackend) -> Result<()>
where
    E: EmbeddingProvider + Clone,
{
    info!(
        "Using embedder {} ({} dimensions)",
        embedder.model_id(),
        embedder.dimension()
    );

    let index = VectorIndex::open(embedder.clone(), qdrant, config.collection.as_str())
        .await
        .with_context(|| format!("Failed to open collection {}", config.collection))?;

    // Process documents if requested
    if let Some(dir) = &args.process {
        if !dir.is_dir() {
            error!("Directory not found: {}", dir.display());
            return Err(anyhow::anyhow!("Directory not found"));
        }

        let chunker = SemanticChunker::new(
            embedder,
            ChunkerConfig {
                min_characters: config.min_characters,
                max_characters: config.max_characters,
                similarity_threshold: config.similarity_threshold,
            },
        );
        let report = process_documents(&chunker, &index, dir, &config.snapshot_path, args.force)
            .await
            .context("Failed to process documents")?;

        for failure in &report.failures {
            println!("Skipped {}: {}", failure.path.display(), failure.error);
        }
        println!("Processed documents into {} chunks", report.chunks);
        return Ok(());
    }

    let Some(query) = args.query.as_deref() else {
        return Err(anyhow::anyhow!(
            "Nothing to do: pass --process DIR or --query QUERY"
        ));
    };

    let engine = RetrievalEngine::new(index).with_top_k(config.top_k);

    // Test retrieval if requested
    if args.test {
        let results = engine.get_relevant_chunks(query, 2).await?;

        println!("\nQuery: {}", query);
        if results.is_empty() {
            println!("No results found");
        } else {
            println!("Found {} results:", results.len());
            for (i, result) in results.iter().enumerate() {
                let preview: String = result.text.chars().take(100).collect();
                println!("Result {} (Score: {:.4}):", i + 1, result.score);
                println!("Text: {}...", preview);
            }
        }
        return Ok(());
    }

    let gemini = GeminiClient::new(
        GeminiConfig::from_env().context("Answer generation requires Gemini")?,
    );

    let retrieval_context = engine.retrieve_context(query).await?;
    println!("Retrieved context for query: '{}'", query);

    let crew = ResearchCrew::new(gemini.clone(), &config.report_path);
    let inputs = TaskInputs {
        topic: args.topic.clone(),
        query: query.to_string(),
        retrieval_context,
    };
    let response = crew.kickoff(&inputs).await.context("Error running crew")?;

    println!("\n--- Response ---");
    println!("{}", response);

    if args.evaluate {
        // Scoring problems are reported but never fail the run
        let contexts: Vec<String> = engine
            .get_relevant_chunks(query, engine.top_k())
            .await?
            .into_iter()
            .map(|result| result.text)
            .collect();
        let judge = LlmJudge::new(gemini, config.eval_threshold);

        match judge.evaluate(query, &contexts, &response).await {
            Ok(report) => {
                println!("\n--- Evaluation ---");
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Err(e) => error!("Error during evaluation: {:#}", e),
        }
    }

    Ok(())
}
