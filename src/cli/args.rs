use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::runner::Language;

#[derive(Parser, Debug)]
#[clap(name = "runlet")]
#[clap(version, about = "Sandboxed execution engine for untrusted code snippets")]
#[clap(propagate_version = true)]
pub struct Cli {
    #[clap(flatten)]
    pub global_opts: GlobalOpts,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct GlobalOpts {
    /// Configuration file path
    #[clap(short, long, global = true, env = "RUNLET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[clap(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[clap(long, global = true, default_value = "text", value_enum)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a source file in the sandbox
    Run(RunArgs),

    /// List supported languages and runtime availability
    Languages,

    /// Show recently recorded execution results
    History(HistoryArgs),

    /// Initialize a new runlet configuration
    Init(InitArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Source file to execute; `-` reads from standard input
    pub file: PathBuf,

    /// Snippet language (inferred from the file extension when omitted)
    #[clap(short, long, value_enum)]
    pub language: Option<Language>,

    /// Stdin value injected into the sandbox
    #[clap(long)]
    pub stdin: Option<String>,

    /// Read the injected stdin value from a file
    #[clap(long, conflicts_with = "stdin")]
    pub stdin_file: Option<PathBuf>,

    /// Wall-clock limit in milliseconds
    #[clap(long)]
    pub timeout_ms: Option<u64>,

    /// Memory limit in megabytes
    #[clap(long)]
    pub memory_limit_mb: Option<u64>,

    /// Do not append this result to the execution history
    #[clap(long)]
    pub no_record: bool,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Maximum number of entries to show
    #[clap(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Force overwrite existing configuration
    #[clap(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[clap(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Show configuration file path
    Path,
}

#[derive(Debug, Clone, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}
