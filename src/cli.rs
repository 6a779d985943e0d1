use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "jobdeck",
    version,
    about = "A terminal dashboard for GPU batch jobs on Kubernetes."
)]
pub struct CliArgs {
    /// Namespace to work in (defaults to the settings file, then the kubeconfig)
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Identity used for ownership checks (defaults to $USER)
    #[arg(short, long)]
    pub identity: Option<String>,

    /// Directory holding saved configurations and the base template
    #[arg(long)]
    pub config_dir: Option<PathBuf>,

    /// Install this file as the base template before starting
    #[arg(long)]
    pub base_template: Option<PathBuf>,

    /// Minimum interval between manual refreshes in milliseconds
    #[arg(long)]
    pub refresh_interval_ms: Option<u64>,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Write logs to this file instead of discarding them
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
