use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "disktrend", about = "Track disk usage over time", version)]
pub struct Cli {
    /// Config file (default: $DISKTREND_CONFIG, then ./disktrend.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan all configured mount points, or just one
    Scan {
        #[arg(long)]
        mount: Option<PathBuf>,
    },
    /// Latest snapshot with its largest directories and growth
    Status,
    /// List snapshots, newest first
    Snapshots {
        #[arg(long)]
        mount: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show a directory and its children
    Browse {
        path: Option<String>,
        #[arg(long)]
        snapshot: Option<i64>,
    },
    /// Size history of a path
    History {
        path: String,
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Fastest-growing paths between the two latest snapshots
    Growth {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        mount: Option<String>,
        /// Also list paths that disappeared
        #[arg(long)]
        removed: bool,
        /// Skip directories shallower than this (1 hides the mount root)
        #[arg(long, default_value_t = 0)]
        min_depth: u32,
    },
    /// Errors recorded during a snapshot
    Errors {
        snapshot: i64,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// Delete snapshots older than the retention window
    Prune {
        /// Override retention.days
        #[arg(long)]
        days: Option<u32>,
    },
}
