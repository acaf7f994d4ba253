use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "repodiff",
    about = "Incrementally cached working-tree status for git repositories",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML file with cache settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the debounce window in milliseconds
    #[arg(long, global = true)]
    pub debounce_ms: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the status of a repository once
    Status(StatusArgs),
    /// Keep a cached status up to date and print every change
    Watch(WatchArgs),
}

#[derive(Args)]
pub struct StatusArgs {
    /// Any path inside the work tree
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(Args)]
pub struct WatchArgs {
    /// Any path inside the work tree
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub exit_after: Option<u64>,
}
