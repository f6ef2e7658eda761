//! CLI parse: clap types for `cvc`. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// cvc - local working copies of Conservator datasets
#[derive(Parser, Debug)]
#[command(name = "cvc")]
#[command(about = "Clone, edit, commit and push Conservator datasets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Working copy directory
    #[arg(long, short = 'p', default_value = ".")]
    pub path: PathBuf,

    /// Configuration file (replaces the layered config lookup)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Conservator URL
    #[arg(long)]
    pub url: Option<String>,

    /// API key
    #[arg(long)]
    pub api_key: Option<String>,

    /// Hashing and upload threads
    #[arg(long)]
    pub workers: Option<usize>,

    /// Debug logging to stderr
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Clone a dataset by id or exact name
    Clone {
        /// Dataset id or name
        identifier: String,
        /// Destination directory (defaults to <path>/<identifier>)
        dest: Option<PathBuf>,
        /// Commit to check out after cloning
        #[arg(long)]
        checkout: Option<String>,
    },
    /// Check out a commit, rewriting the working tree
    Checkout {
        /// Full hash or unique prefix
        commit: String,
        /// Discard staged changes without asking
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Fast-forward to the remote HEAD
    Pull,
    /// Push local commits
    Push {
        /// Wait for the remote to process the pushed commit
        #[arg(long)]
        wait: bool,
        /// Seconds to wait with --wait
        #[arg(long, default_value = "600")]
        timeout: u64,
    },
    /// Stage every change in the working tree
    Add,
    /// Commit staged changes
    Commit {
        /// Commit message
        #[arg(long, short = 'm')]
        message: String,
    },
    /// Stage local JPEG images for upload as new frames
    Stage {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Upload staged images and add them as frames
    Upload,
    /// List images staged for upload
    Staged,
    /// Check working tree files against the index
    Validate {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show staged and unstaged changes
    Status {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Show commit history
    Log {
        /// Number of commits to show
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },
    /// Search remote objects
    Search {
        /// Entity type, e.g. datasets, videos, collections
        entity: String,
        /// Search text (empty matches everything)
        #[arg(default_value = "")]
        text: String,
        /// Fields to show (comma separated)
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
        /// Print only the number of matches
        #[arg(long)]
        count: bool,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print one remote object as JSON
    Get {
        /// Entity type, e.g. datasets, videos, frames
        entity: String,
        /// Id or exact name
        identifier: String,
        /// Fields to fetch (comma separated)
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
        /// Fetch every field
        #[arg(long)]
        all: bool,
    },
    /// Show or edit configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the resolved configuration (API key masked)
    Show,
    /// Print the user config file path
    Path,
    /// Prompt for credentials and save them to the user config file
    Set,
}
