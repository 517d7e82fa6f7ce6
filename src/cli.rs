use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use chainfile::sizing::SizingPolicy;

#[derive(Parser)]
#[command(name = "chainfile")]
#[command(about = "Store and fetch large files on a record size capped ledger")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload a file, resuming any earlier attempt
    Put {
        file: PathBuf,

        /// Mime type, guessed from the extension otherwise
        #[arg(long)]
        mime: Option<String>,

        /// Exact chunk size in bytes
        #[arg(long, conflicts_with = "policy")]
        chunk_size: Option<usize>,

        #[arg(long, value_enum, default_value_t = Policy::Content)]
        policy: Policy,

        /// zstd the file before chunking
        #[arg(long)]
        compress: bool,
    },

    /// Reconstruct a file from its manifest id
    Get {
        id: String,

        #[arg(short, long)]
        output: PathBuf,

        /// Skip chunk digest checks
        #[arg(long)]
        no_verify: bool,
    },

    /// List upload sessions, newest first
    Sessions,

    /// Resume the session of a file
    Resume { file: PathBuf },

    /// Pause a session by file hash
    Pause { hash: String },

    /// Forget a session by file hash
    Forget { hash: String },

    /// Reconstruction cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    Stats,
    Clear,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Policy {
    /// By content type
    Content,
    /// By file size
    Dynamic,
}

impl Policy {
    pub fn sizing(self, chunk_size: Option<usize>) -> SizingPolicy {
        match (chunk_size, self) {
            (Some(size), _) => SizingPolicy::Fixed(size),
            (None, Policy::Content) => SizingPolicy::ByContentType,
            (None, Policy::Dynamic) => SizingPolicy::Dynamic,
        }
    }
}
