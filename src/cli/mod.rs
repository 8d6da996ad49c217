//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "hyrank",
    version,
    author = "neur0map",
    about = "Hybrid lexical + semantic retrieval and ranking",
    long_about = "hyrank ranks catalog items against a query by combining BM25+ keyword scores, \
                  embedding similarity over a bounded candidate set and reciprocal rank fusion, \
                  and keeps embeddings in a small persistent vector store."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/hyrank/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rank a corpus file against a query with hybrid scoring
    Search {
        /// Corpus file (JSON array or JSON Lines)
        corpus: PathBuf,

        /// Search query text
        query: String,

        /// Weight profile (balanced, keyword, semantic, consensus or a configured one)
        #[arg(short, long, conflicts_with = "adaptive")]
        profile: Option<String>,

        /// Pick the weight profile from the query length
        #[arg(short, long)]
        adaptive: bool,

        /// Maximum number of results to return
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Embed a corpus file and append it to a vector store collection
    Index {
        /// Corpus file (JSON array or JSON Lines)
        corpus: PathBuf,

        /// Target collection (defaults to the catalog collection)
        #[arg(long, conflicts_with = "session")]
        collection: Option<String>,

        /// Index into the ephemeral collection of this session token
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Nearest-neighbour query against a stored collection
    Query {
        /// Query text
        text: String,

        /// Collection to query (defaults to the catalog collection)
        #[arg(long)]
        collection: Option<String>,

        /// Number of neighbours to return
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Manage vector store collections
    Collections {
        #[command(subcommand)]
        action: CollectionsAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CollectionsAction {
    /// List collections
    List,

    /// Show document count, creation time and size of a collection
    Stats {
        /// Collection name
        name: String,
    },

    /// Delete a collection and everything in it
    Delete {
        /// Collection name
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
