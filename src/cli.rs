use clap::{Parser, Subcommand};
use mediasweep::config::HumanDuration;
use mediasweep::media::MediaKind;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mediasweep")]
#[command(about = "Validate and repair media URLs stored in document collections", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $MEDIASWEEP_CONFIG or config/mediasweep.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the host process: task consumer, cleanup, /health and /metrics
    Serve(ServeArgs),
    /// Validate (and repair) every configured collection once
    Run(RunArgs),
    /// Load documents from a JSON file into the local store
    Import(ImportArgs),
    /// Validate a single URL
    CheckUrl(CheckUrlArgs),
    /// Validate and repair one document
    FixDocument(FixDocumentArgs),
    /// Show a task, or the most recent tasks
    Task(LookupArgs),
    /// Show a report, or the most recent reports
    Report(LookupArgs),
    /// Remove expired, never-completed tasks
    Cleanup,
}

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Schedule a validation task at this period (e.g. 24h)
    #[arg(long)]
    pub every: Option<HumanDuration>,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Validate only, write nothing back
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Target collection
    pub collection: String,
    /// JSON array of objects (with `id`) or an object keyed by id
    pub file: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct CheckUrlArgs {
    pub url: String,
    /// Expected media kind
    #[arg(long, value_parser = parse_kind, default_value = "unknown")]
    pub kind: MediaKind,
}

#[derive(clap::Args, Debug)]
pub struct FixDocumentArgs {
    pub collection: String,
    pub id: String,
    /// Show the repairs without writing them
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(clap::Args, Debug)]
pub struct LookupArgs {
    /// Record id; omitted lists the most recent ones
    pub id: Option<String>,
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

fn parse_kind(value: &str) -> Result<MediaKind, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "unknown" => Ok(MediaKind::Unknown),
        other => MediaKind::from_declared(other)
            .ok_or_else(|| format!("expected image, video or unknown, got '{}'", value)),
    }
}
