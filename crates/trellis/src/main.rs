use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use trellis::config;
use trellis::search::SearchOverrides;
use trellis_core::Store;

#[derive(Parser)]
#[command(
    name = "trellis",
    about = "Hybrid document retrieval: vector similarity fused with graph traversal and document hierarchy",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./trellis.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and vector index
    Init,

    /// Ingest a file or directory of text/markdown files
    Ingest {
        /// File or directory to ingest
        path: PathBuf,

        /// Origin tag stored on each document (defaults to the path)
        #[arg(long)]
        origin: Option<String>,

        /// Skip entity and relation extraction
        #[arg(long)]
        no_extract: bool,
    },

    /// Search indexed chunks
    Search {
        /// Query text
        query: String,

        /// Strategy: vector, contextual, multi_hop, or hybrid
        #[arg(long, default_value = "hybrid")]
        strategy: String,

        /// Maximum number of results
        #[arg(long)]
        top_k: Option<usize>,

        /// Minimum cosine similarity for vector hits
        #[arg(long)]
        threshold: Option<f64>,

        /// Graph expansion depth
        #[arg(long)]
        max_hops: Option<usize>,

        /// Restrict to these documents (internal id or ref_id; repeatable)
        #[arg(long = "doc")]
        documents: Vec<String>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Retrieve chunks mentioning an entity, with graph fan-out
    Entity {
        /// Entity name
        name: String,

        /// Entity type tag (person, topic, date, ...)
        #[arg(long, default_value = "topic")]
        entity_type: String,

        /// Maximum number of results
        #[arg(long)]
        top_k: Option<usize>,

        /// Graph fan-out depth
        #[arg(long)]
        max_hops: Option<usize>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Retrieve a stored record
    Get {
        #[command(subcommand)]
        record: GetRecord,
    },

    /// Show corpus statistics
    Stats {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Switch the vector index kind online (data is preserved)
    Reindex {
        /// Index kind: hnsw or ivfflat
        #[arg(long)]
        kind: String,
    },

    /// Recompute embeddings for a document in place
    Reembed {
        /// Document internal id or ref_id
        document: String,
    },
}

#[derive(Subcommand)]
enum GetRecord {
    /// A document with its chunks (by internal id or ref_id)
    Document {
        reference: String,
        #[arg(long)]
        json: bool,
    },
    /// A single chunk by id
    Chunk {
        id: i64,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    // Ctrl-C flips the token; every engine loop and storage call observes it.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Init => {
            let pool = trellis::db::connect(&cfg).await?;
            trellis::migrate::run_migrations(&pool, &cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            path,
            origin,
            no_extract,
        } => {
            trellis::ingest::run_ingest(&cfg, &cancel, &path, origin, no_extract).await?;
        }
        Commands::Search {
            query,
            strategy,
            top_k,
            threshold,
            max_hops,
            documents,
            json,
        } => {
            let overrides = SearchOverrides {
                top_k,
                threshold,
                max_hops,
                documents,
                json,
            };
            trellis::search::run_search(&cfg, &cancel, &query, &strategy, &overrides).await?;
        }
        Commands::Entity {
            name,
            entity_type,
            top_k,
            max_hops,
            json,
        } => {
            let overrides = SearchOverrides {
                top_k,
                max_hops,
                json,
                ..SearchOverrides::default()
            };
            trellis::search::run_entity_search(&cfg, &cancel, &name, &entity_type, &overrides)
                .await?;
        }
        Commands::Get { record } => match record {
            GetRecord::Document { reference, json } => {
                trellis::get::run_get_document(&cfg, &reference, json).await?;
            }
            GetRecord::Chunk { id, json } => {
                trellis::get::run_get_chunk(&cfg, id, json).await?;
            }
        },
        Commands::Stats { json } => {
            trellis::stats::run_stats(&cfg, json).await?;
        }
        Commands::Reindex { kind } => {
            let mut index = cfg.index.clone();
            match kind.as_str() {
                "hnsw" | "ivfflat" => index.kind = kind,
                other => anyhow::bail!("Unknown index kind: '{other}'. Must be hnsw or ivfflat."),
            }
            let pool = trellis::db::connect(&cfg).await?;
            trellis::migrate::reindex(&pool, &index).await?;
            println!("Vector index switched to {}.", index.kind);
        }
        Commands::Reembed { document } => {
            let pool = trellis::db::connect(&cfg).await?;
            let retriever = trellis::build_retriever(&cfg, pool, false)?;
            let store = retriever.store();
            let doc = match document.parse::<i64>() {
                Ok(id) => match store.get_document(id).await {
                    Ok(doc) => doc,
                    Err(_) => store.get_document_by_ref(&document).await?,
                },
                Err(_) => store.get_document_by_ref(&document).await?,
            };
            let updated = retriever.reembed_document(doc.id, &cancel).await?;
            println!("Re-embedded {updated} chunks of document {}.", doc.id);
        }
    }

    Ok(())
}
