use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "mutstack",
    about = "mutstack: reversible mutations on JSON documents",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Engine configuration (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply a mutation to a document
    Apply(ApplyArgs),
    /// Revert one recorded mutation
    Revert(RevertArgs),
    /// Show the mutation stack of a document
    History(HistoryArgs),
    /// Revert every recorded mutation, newest first
    RevertAll(RevertAllArgs),
}

#[derive(Args)]
pub struct ApplyArgs {
    #[arg(long)]
    pub doc: PathBuf,
    /// Field update as a JSON object; dotted keys and `-=key` tombstones allowed
    #[arg(long)]
    pub update: String,
    /// Embedded collection update as COLLECTION=JSON
    #[arg(long = "embedded", value_name = "COLLECTION=JSON")]
    pub embedded: Vec<String>,
    /// Item field embedded items are matched on
    #[arg(long, default_value = "name")]
    pub comparison_key: String,
    #[arg(long)]
    pub name: Option<String>,
    /// Apply without recording history
    #[arg(long)]
    pub permanent: bool,
}

#[derive(Args)]
pub struct RevertArgs {
    #[arg(long)]
    pub doc: PathBuf,
    #[arg(long, conflicts_with = "id")]
    pub name: Option<String>,
    #[arg(long)]
    pub id: Option<String>,
}

#[derive(Args)]
pub struct HistoryArgs {
    #[arg(long)]
    pub doc: PathBuf,
}

#[derive(Args)]
pub struct RevertAllArgs {
    #[arg(long)]
    pub doc: PathBuf,
}
