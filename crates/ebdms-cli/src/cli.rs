use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ebdms",
    about = "EBDMS file registration core: two-phase uploads, index linkage, audit ledger",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Register a VCF with an index against in-memory adapters and print the audit trail
    Demo(DemoArgs),
    /// Verify an audit ledger's hash chain
    Verify(VerifyArgs),
    /// Print entries from an audit ledger file
    Audit(AuditArgs),
    /// Show or check engine configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct DemoArgs {
    /// Size of the generated VCF payload, in KiB
    #[arg(long, default_value = "1024")]
    pub size_kib: usize,
    /// Engine configuration file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Persist the audit ledger to this JSON-lines file
    #[arg(long)]
    pub ledger: Option<PathBuf>,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Ledger file to verify; without one a demo ledger is built and verified
    pub ledger: Option<PathBuf>,
}

#[derive(Args)]
pub struct AuditArgs {
    pub ledger: PathBuf,
    #[arg(long)]
    pub actor: Option<String>,
    /// Action name, e.g. ACCESS_DENIED
    #[arg(long)]
    pub action: Option<String>,
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the default configuration as TOML
    Show,
    /// Validate a configuration file
    Check { path: PathBuf },
}
