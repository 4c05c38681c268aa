mod server;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use docanswer_core::{
    AnswerPayload, Embedder, HashedNgramEmbedder, HttpEmbedder, HttpEmbedderConfig, Pipeline,
    PipelineConfig, SearchHit, SearchParams,
};
use docanswer_core::ChunkingConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub type DynEmbedder = Box<dyn Embedder + Send + Sync>;

#[derive(Parser, Debug, Clone)]
#[command(name = "docanswer", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Words per chunk
    #[arg(long, env = "DOCANSWER_CHUNK_SIZE", default_value = "300")]
    chunk_size: usize,

    /// Words shared by consecutive chunks
    #[arg(long, env = "DOCANSWER_CHUNK_OVERLAP", default_value = "50")]
    chunk_overlap: usize,

    /// Chunks retrieved per query
    #[arg(long, env = "DOCANSWER_TOP_K", default_value = "5")]
    top_k: usize,

    /// Minimum cosine similarity (exclusive) for a chunk to be retrieved
    #[arg(long, env = "DOCANSWER_THRESHOLD", default_value = "0.2")]
    threshold: f32,

    /// Composed answers allowed per minute
    #[arg(long, env = "DOCANSWER_RATE_LIMIT", default_value = "10")]
    rate_limit: u32,

    /// Cached searches kept per document
    #[arg(long, env = "DOCANSWER_SEARCH_CACHE", default_value = "50")]
    search_cache: usize,

    /// Cached answers kept per session
    #[arg(long, env = "DOCANSWER_RESPONSE_CACHE", default_value = "50")]
    response_cache: usize,

    /// OpenAI-compatible embeddings base URL; the local hashed embedder is used when unset
    #[arg(long, env = "EMBEDDING_ENDPOINT")]
    embedding_endpoint: Option<String>,

    /// Bearer token for the embeddings endpoint
    #[arg(long, env = "EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    /// Embedding model name sent to the endpoint
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "all-mpnet-base-v2")]
    embedding_model: String,

    /// Embedding width
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value = "384")]
    embedding_dimensions: usize,

    /// Embeddings request timeout in seconds
    #[arg(long, env = "EMBEDDING_TIMEOUT_SECS", default_value = "30")]
    embedding_timeout_secs: u64,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Ingest one TXT/PDF document and answer the given questions.
    Ask {
        /// Document to ingest.
        #[arg(long)]
        file: PathBuf,
        /// Question to answer; repeat for several.
        #[arg(long = "query", required = true)]
        queries: Vec<String>,
        /// Also print the ranked chunks behind each answer.
        #[arg(long, default_value_t = false)]
        show_hits: bool,
    },
    /// Serve /upload and /query over HTTP.
    Serve {
        /// Address to bind (host:port).
        #[arg(long, env = "DOCANSWER_BIND", default_value = "127.0.0.1:8000")]
        bind: String,
        /// Folder uploaded documents are copied into; emptied on shutdown.
        #[arg(long, env = "DOCANSWER_DATA_DIR", default_value = "data")]
        data_dir: PathBuf,
    },
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            chunking: ChunkingConfig {
                chunk_size: self.chunk_size,
                overlap: self.chunk_overlap,
            },
            search: SearchParams {
                k: self.top_k,
                threshold: self.threshold,
            },
            rate_limit: self.rate_limit,
            search_cache_capacity: self.search_cache,
            response_cache_capacity: self.response_cache,
            ..PipelineConfig::default()
        }
    }

    /// Must run off the async runtime: the HTTP embedder owns a blocking client.
    fn build_pipeline(&self) -> anyhow::Result<Pipeline<DynEmbedder>> {
        let embedder: DynEmbedder = match &self.embedding_endpoint {
            Some(endpoint) => Box::new(
                HttpEmbedder::new(HttpEmbedderConfig {
                    base_url: endpoint.clone(),
                    api_key: self.embedding_api_key.clone(),
                    model: self.embedding_model.clone(),
                    dimensions: self.embedding_dimensions,
                    timeout: Duration::from_secs(self.embedding_timeout_secs),
                })
                .context("invalid embedding endpoint configuration")?,
            ),
            None => Box::new(HashedNgramEmbedder {
                dimensions: self.embedding_dimensions,
            }),
        };
        Ok(Pipeline::new(embedder, self.pipeline_config()))
    }
}

#[derive(Serialize)]
struct AskOutput<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    hits: Option<Vec<SearchHit>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hits_error: Option<String>,
    answer: AnswerPayload,
}

fn ask_output<'a, E: Embedder>(
    pipeline: &Pipeline<E>,
    query: &'a str,
    show_hits: bool,
) -> AskOutput<'a> {
    let (hits, hits_error) = if show_hits {
        match pipeline.search(query) {
            Ok(hits) => (Some(hits), None),
            Err(error) => (None, Some(error.to_string())),
        }
    } else {
        (None, None)
    };
    AskOutput {
        query,
        hits,
        hits_error,
        answer: pipeline.answer_payload(query),
    }
}

fn run_ask(cli: &Cli, file: &Path, queries: &[String], show_hits: bool) -> anyhow::Result<()> {
    let mut pipeline = cli.build_pipeline()?;
    let report = pipeline
        .ingest_path(file)
        .with_context(|| format!("failed to ingest {}", file.display()))?;
    info!(
        source = %report.document.source_path,
        total_chunks = report.total_chunks,
        "document ready"
    );

    for query in queries {
        let output = ask_output(&pipeline, query, show_hits);
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "docanswer boot"
    );

    match cli.command.clone() {
        Command::Ask {
            file,
            queries,
            show_hits,
        } => {
            tokio::task::spawn_blocking(move || run_ask(&cli, &file, &queries, show_hits))
                .await
                .context("ask task panicked")??;
        }
        Command::Serve { bind, data_dir } => {
            let builder = cli.clone();
            let pipeline = tokio::task::spawn_blocking(move || builder.build_pipeline())
                .await
                .context("pipeline construction panicked")??;
            server::run(&bind, data_dir, pipeline).await?;
        }
    }

    Ok(())
}
