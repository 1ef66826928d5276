use clap::Parser;
use std::path::PathBuf;

/// HTTP stub server replaying request/response dumps.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "mimic", version, about)]
pub struct Cli {
    /// Dump files to load, in match order
    #[arg(short, long = "dump", value_name = "FILE", num_args = 1..)]
    pub dumps: Vec<PathBuf>,

    /// Rhai hook scripts run after each response, in order
    #[arg(long = "hook", value_name = "FILE", num_args = 1..)]
    pub hooks: Vec<PathBuf>,

    /// Do not watch dump directories for changes
    #[arg(long)]
    pub no_listen: bool,

    /// Do not compute ETags or answer 304
    #[arg(long)]
    pub no_etag: bool,

    /// Address to bind
    #[arg(long, env = "MIMIC_HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "MIMIC_PORT")]
    pub port: Option<u16>,

    /// YAML config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Load dumps and hooks, print a summary and exit without serving
    #[arg(long)]
    pub check: bool,

    /// Log filter (overrides RUST_LOG), e.g. "debug" or "mimic_http=trace"
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,
}
