//! Runtime configuration.
//!
//! Values come from, in order of precedence: command-line flags, environment
//! variables, the TOML configuration file, built-in defaults.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use clap::builder::BoolishValueParser;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::server::ServerDescription;

pub const DEFAULT_CONFIG_FILE: &str = "/etc/dnsconfd.conf";
pub const DEFAULT_RESOLV_CONF_PATH: &str = "/etc/resolv.conf";
pub const DEFAULT_RESOLVER_OPTIONS: &str = "edns0 trust-ad";
pub const DEFAULT_CACHE_UNIT: &str = "unbound.service";
pub const DEFAULT_UNBOUND_CONFIG_PATH: &str = "/run/dnsconfd/unbound.conf";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Log verbosity accepted on the command line and in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    #[value(name = "DEBUG")]
    Debug,
    #[value(name = "INFO")]
    Info,
    #[value(name = "WARNING")]
    Warning,
    #[value(name = "ERROR")]
    Error,
    /// Reported at the error level; tracing has nothing above it.
    #[value(name = "CRITICAL")]
    Critical,
}

impl LogLevel {
    /// Directive for `tracing_subscriber::EnvFilter`.
    #[must_use]
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error | Self::Critical => "error",
        }
    }
}

/// dnsconfd: keeps a local DNS cache running and resolv.conf pointed at it.
#[derive(Debug, Parser)]
#[command(name = "dnsconfd", version, about)]
pub struct Cli {
    /// One-off administrative command; the daemon runs when absent.
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Log verbosity.
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    pub log_level: Option<LogLevel>,

    /// Path of the resolver configuration file to manage.
    #[arg(long, env = "RESOLV_CONF_PATH")]
    pub resolv_conf_path: Option<PathBuf>,

    /// Address the DNS cache listens on.
    #[arg(long, env = "LISTEN_ADDRESS")]
    pub listen_address: Option<IpAddr>,

    /// Value of the `options` line written to resolv.conf.
    #[arg(long, env = "RESOLVER_OPTIONS")]
    pub resolver_options: Option<String>,

    /// Enable DNSSEC validation in the cache (yes/no).
    #[arg(long, env = "DNSSEC_ENABLED", value_parser = BoolishValueParser::new())]
    pub dnssec_enabled: Option<bool>,

    /// Path of the TOML configuration file.
    #[arg(long, env = "CONFIG_FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: PathBuf,

    /// systemd unit of the DNS cache.
    #[arg(long, env = "CACHE_UNIT")]
    pub cache_unit: Option<String>,

    /// Where the generated unbound configuration is written.
    #[arg(long, env = "UNBOUND_CONFIG_PATH")]
    pub unbound_config_path: Option<PathBuf>,

    /// Spacing of cache readiness polls (e.g. "1s", "500ms").
    #[arg(long, env = "POLL_INTERVAL", value_parser = humantime::parse_duration)]
    pub poll_interval: Option<Duration>,

    /// Route each server's domains to it (yes/no). When off, every server
    /// forwards the root zone.
    #[arg(long, env = "HANDLE_ROUTING", value_parser = BoolishValueParser::new())]
    pub handle_routing: Option<bool>,

    /// Prefer servers learned on wired links over wireless ones (yes/no).
    #[arg(long, env = "PRIORITIZE_WIRE", value_parser = BoolishValueParser::new())]
    pub prioritize_wire: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Replace resolv.conf with an empty file owned by USER, so that
    /// dnsconfd can run without root.
    ChownResolvconf {
        /// User name or numeric uid.
        user: String,
    },
}

/// Contents of the configuration file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub log_level: Option<LogLevel>,
    pub resolv_conf_path: Option<PathBuf>,
    pub listen_address: Option<IpAddr>,
    pub resolver_options: Option<String>,
    pub dnssec_enabled: Option<bool>,
    pub cache_unit: Option<String>,
    pub unbound_config_path: Option<PathBuf>,
    /// humantime duration string.
    pub poll_interval: Option<String>,
    pub handle_routing: Option<bool>,
    pub prioritize_wire: Option<bool>,
    pub static_servers: Vec<ServerDescription>,
}

impl FileConfig {
    /// Reads `path`. A missing file yields an empty configuration.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Read`] if the file exists but cannot be read,
    /// [`ConfigError::Parse`] if it is not valid TOML for this schema.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(path, &contents)
    }

    /// Parses `contents`; `path` is only used in error messages.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on invalid TOML or unknown keys.
    pub fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fully resolved configuration of one daemon run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub log_level: LogLevel,
    pub resolv_conf_path: PathBuf,
    pub listen_address: IpAddr,
    pub resolver_options: String,
    pub dnssec_enabled: bool,
    pub config_file: PathBuf,
    pub cache_unit: String,
    pub unbound_config_path: PathBuf,
    pub poll_interval: Duration,
    pub handle_routing: bool,
    pub prioritize_wire: bool,
    pub static_servers: Vec<ServerDescription>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            resolv_conf_path: PathBuf::from(DEFAULT_RESOLV_CONF_PATH),
            listen_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            resolver_options: DEFAULT_RESOLVER_OPTIONS.to_string(),
            dnssec_enabled: false,
            config_file: PathBuf::from(DEFAULT_CONFIG_FILE),
            cache_unit: DEFAULT_CACHE_UNIT.to_string(),
            unbound_config_path: PathBuf::from(DEFAULT_UNBOUND_CONFIG_PATH),
            poll_interval: DEFAULT_POLL_INTERVAL,
            handle_routing: true,
            prioritize_wire: true,
            static_servers: Vec::new(),
        }
    }
}

impl DaemonConfig {
    /// Loads the file named by `cli` and layers `cli` on top of it.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`] from reading, parsing or validating.
    pub fn resolve(cli: Cli) -> Result<Self, ConfigError> {
        let file = FileConfig::load(&cli.config_file)?;
        Self::layered(cli, file)
    }

    /// Combines command line (including environment) and file values.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when a file value fails validation.
    pub fn layered(cli: Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let poll_interval = match (cli.poll_interval, file.poll_interval) {
            (Some(interval), _) => interval,
            (None, Some(raw)) => {
                humantime::parse_duration(&raw).map_err(|e| ConfigError::Invalid {
                    key: "poll_interval",
                    reason: e.to_string(),
                })?
            }
            (None, None) => defaults.poll_interval,
        };
        if poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "poll_interval",
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            log_level: cli.log_level.or(file.log_level).unwrap_or(defaults.log_level),
            resolv_conf_path: cli
                .resolv_conf_path
                .or(file.resolv_conf_path)
                .unwrap_or(defaults.resolv_conf_path),
            listen_address: cli
                .listen_address
                .or(file.listen_address)
                .unwrap_or(defaults.listen_address),
            resolver_options: cli
                .resolver_options
                .or(file.resolver_options)
                .unwrap_or(defaults.resolver_options),
            dnssec_enabled: cli
                .dnssec_enabled
                .or(file.dnssec_enabled)
                .unwrap_or(defaults.dnssec_enabled),
            config_file: cli.config_file,
            cache_unit: cli
                .cache_unit
                .or(file.cache_unit)
                .unwrap_or(defaults.cache_unit),
            unbound_config_path: cli
                .unbound_config_path
                .or(file.unbound_config_path)
                .unwrap_or(defaults.unbound_config_path),
            poll_interval,
            handle_routing: cli
                .handle_routing
                .or(file.handle_routing)
                .unwrap_or(defaults.handle_routing),
            prioritize_wire: cli
                .prioritize_wire
                .or(file.prioritize_wire)
                .unwrap_or(defaults.prioritize_wire),
            static_servers: file.static_servers,
        })
    }
}
