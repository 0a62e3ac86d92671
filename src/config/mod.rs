//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;
#[cfg(test)]
mod tests;

use std::{
    net::SocketAddr,
    num::NonZeroUsize,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{CliArgs, Command, ConvertArgs, ServeArgs, ServeOverrides};

use crate::cache::CacheConfig;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "beacon-cache-proxy";
const ENV_PREFIX: &str = "BEACON_PROXY";
const DEFAULT_ADDR: &str = "127.0.0.1:55052";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_RETAIN: usize = 7000;
const DEFAULT_WARM_INTERVAL_SECS: u64 = 3 * 60;
const DEFAULT_PRUNE_INTERVAL_SECS: u64 = 60 * 60;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub upstream: UpstreamSettings,
    pub server: ServerSettings,
    pub cache: CacheSettings,
    pub jobs: JobsSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Beacon node base URL. Required to serve, unused by `convert`.
    pub url: Option<Url>,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub data_dir: PathBuf,
    /// Records kept by each prune; zero disables pruning.
    pub retain: usize,
    pub warm_capacity: NonZeroUsize,
    pub read_ahead: u64,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub warm_interval: Duration,
    pub prune_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Convert(_)) => {}
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            upstream,
            server,
            cache,
            jobs,
            logging,
        } = raw;

        Ok(Self {
            upstream: build_upstream_settings(upstream)?,
            server: build_server_settings(server)?,
            cache: build_cache_settings(cache)?,
            jobs: build_jobs_settings(jobs)?,
            logging: build_logging_settings(logging)?,
        })
    }

    /// Cache configuration derived from these settings.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::from(&self.cache)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    upstream: RawUpstreamSettings,
    server: RawServerSettings,
    cache: RawCacheSettings,
    jobs: RawJobsSettings,
    logging: RawLoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUpstreamSettings {
    url: Option<String>,
    connect_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    addr: Option<String>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    data_dir: Option<PathBuf>,
    retain: Option<usize>,
    warm_capacity: Option<usize>,
    read_ahead: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    warm_interval_seconds: Option<u64>,
    prune_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
    debug: Option<bool>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(url) = overrides.bn_url.as_ref() {
            self.upstream.url = Some(url.clone());
        }
        if let Some(seconds) = overrides.upstream_connect_timeout_seconds {
            self.upstream.connect_timeout_seconds = Some(seconds);
        }
        if let Some(addr) = overrides.addr.as_ref() {
            self.server.addr = Some(addr.clone());
        }
        if let Some(seconds) = overrides.graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(dir) = overrides.data_dir.as_ref() {
            self.cache.data_dir = Some(dir.clone());
        }
        if let Some(retain) = overrides.retain {
            self.cache.retain = Some(retain);
        }
        if let Some(seconds) = overrides.warm_interval_seconds {
            self.jobs.warm_interval_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.prune_interval_seconds {
            self.jobs.prune_interval_seconds = Some(seconds);
        }
        if overrides.debug {
            self.logging.debug = Some(true);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

fn build_upstream_settings(upstream: RawUpstreamSettings) -> Result<UpstreamSettings, LoadError> {
    let url = match upstream.url.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_upstream_url(raw)?),
    };

    let connect_timeout = positive_seconds(
        upstream
            .connect_timeout_seconds
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        "upstream.connect_timeout_seconds",
    )?;

    Ok(UpstreamSettings {
        url,
        connect_timeout,
    })
}

fn parse_upstream_url(raw: &str) -> Result<Url, LoadError> {
    let url = Url::parse(raw)
        .map_err(|err| LoadError::invalid("upstream.url", format!("`{raw}`: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "upstream.url",
            format!("unsupported scheme `{}`", url.scheme()),
        ));
    }
    if url.host().is_none() {
        return Err(LoadError::invalid("upstream.url", "missing host"));
    }
    Ok(url)
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let candidate = server.addr.unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let addr = candidate.trim().parse::<SocketAddr>().map_err(|err| {
        LoadError::invalid("server.addr", format!("invalid address `{candidate}`: {err}"))
    })?;

    let graceful_shutdown = positive_seconds(
        server
            .graceful_shutdown_seconds
            .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS),
        "server.graceful_shutdown_seconds",
    )?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = CacheConfig::default();

    let data_dir = cache.data_dir.unwrap_or(defaults.data_dir);
    if data_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.data_dir",
            "path must not be empty",
        ));
    }

    let warm_capacity = NonZeroUsize::new(cache.warm_capacity.unwrap_or(defaults.warm_capacity))
        .ok_or_else(|| LoadError::invalid("cache.warm_capacity", "must be greater than zero"))?;

    Ok(CacheSettings {
        data_dir,
        retain: cache.retain.unwrap_or(DEFAULT_RETAIN),
        warm_capacity,
        read_ahead: cache.read_ahead.unwrap_or(defaults.read_ahead),
    })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    Ok(JobsSettings {
        warm_interval: positive_seconds(
            jobs.warm_interval_seconds
                .unwrap_or(DEFAULT_WARM_INTERVAL_SECS),
            "jobs.warm_interval_seconds",
        )?,
        prune_interval: positive_seconds(
            jobs.prune_interval_seconds
                .unwrap_or(DEFAULT_PRUNE_INTERVAL_SECS),
            "jobs.prune_interval_seconds",
        )?,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = if logging.debug.unwrap_or(false) {
        LevelFilter::DEBUG
    } else {
        match logging.level {
            Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
                LoadError::invalid("logging.level", format!("failed to parse: {err}"))
            })?,
            None => LevelFilter::INFO,
        }
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn positive_seconds(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}
