use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Content-addressed block store.
#[derive(Debug, Parser)]
#[command(name = "casket", version, about)]
pub struct Cli {
    /// Data directory for the local store.
    #[arg(long, global = true, default_value = "./casket-data")]
    pub data_dir: PathBuf,

    /// Keep the block index in a persistent journal instead of memory.
    #[arg(long, global = true)]
    pub wal: bool,

    /// Address a remote peer instead of the local store.
    #[arg(long, global = true)]
    pub remote: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the local store to peers.
    Serve {
        /// Listen address.
        #[arg(long, default_value = "127.0.0.1:4090")]
        listen: String,
    },
    /// Store a file and print its root id.
    Put {
        file: PathBuf,
        /// Shard size in bytes (default 1 MiB).
        #[arg(long)]
        block_size: Option<u64>,
    },
    /// Read a stored file to stdout or a path.
    Get {
        /// Hex root id.
        id: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Remove a block by id.
    Rm { id: String },
    /// Check whether a block exists.
    Exists { id: String },
    /// Print store statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },
}
