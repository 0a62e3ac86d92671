use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the proxy binary.
#[derive(Debug, Parser)]
#[command(
    name = "beacon-cache-proxy",
    version,
    about = "Caching reverse proxy for beacon-node committee queries"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "BEACON_PROXY_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the caching proxy.
    Serve(Box<ServeArgs>),
    /// Convert a JSON committees file to the protobuf record format and exit.
    #[command(name = "convert")]
    Convert(ConvertArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Beacon node to proxy, e.g. http://127.0.0.1:5052.
    #[arg(long = "bn-url", value_name = "URL")]
    pub bn_url: Option<String>,

    /// Address for the proxy to listen on.
    #[arg(long = "addr", value_name = "HOST:PORT")]
    pub addr: Option<String>,

    /// Directory in which cached records are saved.
    #[arg(long = "data-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub data_dir: Option<PathBuf>,

    /// Number of records to retain; 0 disables pruning.
    #[arg(long = "retain", value_name = "COUNT")]
    pub retain: Option<usize>,

    /// Enable debug logging.
    #[arg(long = "debug", action = clap::ArgAction::SetTrue)]
    pub debug: bool,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the upstream connect timeout.
    #[arg(long = "upstream-connect-timeout-seconds", value_name = "SECONDS")]
    pub upstream_connect_timeout_seconds: Option<u64>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "graceful-shutdown-seconds", value_name = "SECONDS")]
    pub graceful_shutdown_seconds: Option<u64>,

    /// Override how often the finalized epoch is polled to warm the cache.
    #[arg(long = "warm-interval-seconds", value_name = "SECONDS")]
    pub warm_interval_seconds: Option<u64>,

    /// Override how often the cache is pruned.
    #[arg(long = "prune-interval-seconds", value_name = "SECONDS")]
    pub prune_interval_seconds: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct ConvertArgs {
    /// JSON committees file; writes `<FILE>.pb` next to it (a `.bin` suffix is dropped).
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
}
