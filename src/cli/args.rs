//! Command-line argument definitions

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use crate::cli::commands::{
    completions::CompletionsArgs, equip::EquipCommands, init::InitArgs, qc::QcCommands,
    step::StepCommands, track::TrackCommands, unit::UnitCommands, user::UserCommands,
};

#[derive(Parser, Debug)]
#[command(
    name = "utrace",
    version,
    about = "Unit traceability: scannable identities, production history and quality gating",
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(clap::Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'o', global = true, value_enum, default_value_t = OutputFormat::Auto)]
    pub output: OutputFormat,

    /// Act as this user
    #[arg(long, short = 'u', global = true, env = "UTRACE_USER")]
    pub user: Option<String>,

    /// Database file (defaults to .utrace/trace.db in the project)
    #[arg(long, global = true, env = "UTRACE_DB")]
    pub db: Option<PathBuf>,

    /// Log more (-v info, -vv debug); UTRACE_LOG takes precedence
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Pretty text for single records, TSV for lists
    #[default]
    Auto,
    Yaml,
    Json,
    Tsv,
    Csv,
    /// Boxed table
    Table,
    /// Only ids, one per line
    Id,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a utrace project in the current directory
    Init(InitArgs),

    /// Manage users and roles
    #[command(subcommand)]
    User(UserCommands),

    /// Register and inspect units
    #[command(subcommand)]
    Unit(UnitCommands),

    /// Register production equipment
    #[command(subcommand)]
    Equip(EquipCommands),

    /// Assign, scan and verify tracking identities
    #[command(subcommand)]
    Track(TrackCommands),

    /// Record production steps
    #[command(subcommand)]
    Step(StepCommands),

    /// Record quality decisions
    #[command(subcommand)]
    Qc(QcCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}
