use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "archivist")]
#[command(about = "Track files across volumes by content, find duplicates and archive", long_about = None)]
pub struct Cli {
    /// Database file; overrides `database_path` from the configuration
    #[arg(long, global = true)]
    pub database: Option<String>,

    /// Emit report events as JSON lines instead of colored text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List known volumes
    Volumes {
        /// Include volumes that are excluded from scanning
        #[arg(long)]
        show_disabled: bool,
    },
    /// Enable or disable scanning of a volume
    SetScan {
        volume: i64,
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Reconcile the index with attached volumes
    Scan {
        /// Only scan this volume id
        #[arg(long)]
        volume: Option<i64>,
    },
    /// List indexed files grouped by content
    List {
        #[arg(long)]
        volume: Option<i64>,
        /// Only count and show instances on the selected volume
        #[arg(long, requires = "volume")]
        selected_volume_only: bool,
        #[arg(long)]
        min_instance_count: Option<usize>,
        #[arg(long)]
        max_instance_count: Option<usize>,
    },
    /// Find files whose name contains a string
    Search {
        #[arg(short = 'f', long)]
        file_name: String,
    },
    /// Content stored more than once on the same volume
    Multi {
        #[arg(long)]
        volume: i64,
        /// Only groups with an instance below this directory
        #[arg(long)]
        subdir: Option<String>,
        /// Interactively pick the copy to keep and delete the others
        #[arg(short = 'd', long)]
        delete: bool,
    },
    /// Content found on one volume only
    Exclusive {
        #[arg(long)]
        volume: i64,
    },
    /// Manage archives and archive files
    #[command(subcommand)]
    Archive(ArchiveCommands),
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Subcommand)]
pub enum ArchiveCommands {
    /// Create an empty archive
    New,
    /// Add a destination directory on an attached volume
    AddPath { archive: i64, path: PathBuf },
    /// Add a filename pattern with a date window
    AddPattern(AddPatternArgs),
    /// Print archives with destinations and patterns
    List,
    /// Route a file, or every file below a directory, into its archive
    Scan { path: PathBuf },
}

#[derive(Debug, Args)]
pub struct AddPatternArgs {
    pub archive: i64,
    /// Filename pattern with exactly one `*`
    pub pattern: String,
    /// First day of the window, YYYYMMDD (UTC)
    #[arg(long)]
    pub begin: String,
    /// Day after the window, YYYYMMDD (UTC)
    #[arg(long)]
    pub end: String,
}
