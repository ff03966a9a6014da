use clap::{Parser, Subcommand};
use handbook_rag::Result;
use handbook_rag::commands::{
    init_config, run_ask, run_reindex, run_search, run_sync, serve, show_config,
};
use handbook_rag::store::SyncCollection;

#[derive(Parser)]
#[command(name = "handbook-rag")]
#[command(about = "Bilingual handbook search and question answering over a vector index")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
    /// Rebuild the vector namespace from the handbook database
    Reindex {
        /// Clear the namespace before indexing
        #[arg(long)]
        reset: bool,
    },
    /// Sync individual documents into the vector index
    Sync {
        /// Collection to sync: "qas" or "sections"
        collection: String,
        /// Document ids to sync
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Search published Q&As
    Search {
        /// Search query
        query: String,
        /// Language: "vi" or "en"
        #[arg(long)]
        lang: Option<String>,
        /// Maximum number of results
        #[arg(long, default_value_t = 8)]
        limit: usize,
    },
    /// Ask a question and get a grounded answer
    Ask {
        /// The question
        query: String,
        /// Language: "vi" or "en"
        #[arg(long)]
        lang: Option<String>,
    },
    /// Start the HTTP API server
    Serve {
        /// Bind address, e.g. 127.0.0.1:8787
        #[arg(long)]
        bind: Option<String>,
    },
}

fn parse_collection(value: &str) -> Result<SyncCollection> {
    match value {
        "qas" => Ok(SyncCollection::Qas),
        "sections" => Ok(SyncCollection::Sections),
        other => Err(anyhow::anyhow!("unknown collection: {other} (expected \"qas\" or \"sections\")").into()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { init } => {
            if init {
                init_config()?;
            } else {
                show_config()?;
            }
        }
        Commands::Reindex { reset } => {
            run_reindex(reset).await?;
        }
        Commands::Sync { collection, ids } => {
            run_sync(parse_collection(&collection)?, ids).await?;
        }
        Commands::Search { query, lang, limit } => {
            run_search(query, lang, limit).await?;
        }
        Commands::Ask { query, lang } => {
            run_ask(query, lang).await?;
        }
        Commands::Serve { bind } => {
            serve(bind).await?;
        }
    }

    Ok(())
}
