//! `docsearch` - upload documents, index them and search by meaning.
//!
//! ```bash
//! docsearch init
//! docsearch upload manuals/ notes.txt --description "barn manuals"
//! docsearch search "how do I prime the well pump" -n 3
//! docsearch status --json
//! ```

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docsearch_core::config::Config;

#[derive(Parser)]
#[command(name = "docsearch", version, about = "Semantic search over uploaded documents")]
struct Cli {
    /// Directory holding `config.toml`; relative store paths resolve against it
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the vector collection and metadata store
    Init,
    /// Register files (or every .txt/.pdf under a directory) and index them
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Description stored with every uploaded document
        #[arg(short, long, default_value = "")]
        description: String,
        /// Register only; index later with `docsearch index`
        #[arg(long)]
        no_index: bool,
    },
    /// Index documents by id, or every document not yet indexed
    Index {
        ids: Vec<String>,
        #[arg(long, conflicts_with = "ids")]
        all: bool,
    },
    /// Find the passages most relevant to a query
    Search {
        query: String,
        /// Maximum number of results
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Indexing status of one document or all of them
    Status {
        id: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List stored documents, newest first
    List {
        #[arg(long)]
        json: bool,
    },
    /// Remove a document and its indexed passages
    Delete { id: String },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = Config::load_from(&cli.root)?.settings()?;
    let services = docsearch_pipeline::Services::open(settings, &cli.root).await?;

    match cli.command {
        Command::Init => commands::init(&services).await,
        Command::Upload { paths, description, no_index } => {
            commands::upload(&services, &paths, &description, !no_index).await
        }
        Command::Index { ids, all } => commands::index(&services, ids, all).await,
        Command::Search { query, limit, json } => commands::search(&services, &query, limit, json).await,
        Command::Status { id, json } => commands::status(&services, id.as_deref(), json).await,
        Command::List { json } => commands::list(&services, json).await,
        Command::Delete { id } => commands::delete(&services, &id).await,
    }
}
