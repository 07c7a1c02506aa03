use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "fedi",
    about = "Moderation and operations for a federated link aggregator",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file with the endpoint and operator identity
    #[arg(short, long, global = true, default_value = "fedi.toml")]
    pub config: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List activities on the endpoint
    Activities(ActivitiesArgs),
    /// Search accounts
    Accounts(AccountsArgs),
    /// Block an account on behalf of the operator
    Block(BlockArgs),
    /// Report an item on behalf of the operator
    Report(ReportArgs),
}

/// Filter values accept `x`, `~x` (contains) and `!x` (not).
#[derive(Args)]
pub struct ActivitiesArgs {
    /// Activity type, e.g. Create, Like, Block
    #[arg(short = 't', long = "type")]
    pub types: Vec<String>,
    /// IRI of the acting actor
    #[arg(long)]
    pub actor: Vec<String>,
    /// IRI of the activity object
    #[arg(long)]
    pub object: Vec<String>,
    #[arg(short = 'n', long, default_value = "25")]
    pub max_items: usize,
}

#[derive(Args)]
pub struct AccountsArgs {
    /// Handle or name
    #[arg(long)]
    pub name: Vec<String>,
    /// Actor type, e.g. Person, Service
    #[arg(short = 't', long = "type")]
    pub types: Vec<String>,
    #[arg(short = 'n', long, default_value = "25")]
    pub max_items: usize,
}

#[derive(Args)]
pub struct BlockArgs {
    /// IRI of the account to block
    pub account: String,
    #[arg(long)]
    pub reason: Option<String>,
}

#[derive(Args)]
pub struct ReportArgs {
    /// IRI of the item to report
    pub item: String,
    #[arg(long)]
    pub reason: Option<String>,
}
