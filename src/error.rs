//! Error types for the daemon's collaborators and configuration.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Errors returned by a [`DnsManager`](crate::dns_manager::DnsManager).
#[derive(Debug, Error)]
pub enum DnsManagerError {
    /// Writing the cache configuration failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A control command ran but reported failure.
    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    /// A control command did not finish in time.
    #[error("`{command}` did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// An update was requested before `configure` succeeded.
    #[error("DNS manager has not been configured")]
    NotConfigured,
}

/// Errors returned by a [`ServiceManager`](crate::service_manager::ServiceManager).
#[derive(Debug, Error)]
pub enum BusError {
    /// The host was not booted with systemd.
    #[error("systemd is not running ({path} is missing)")]
    NotBooted { path: PathBuf },

    /// A job was submitted before `connect`.
    #[error("not connected to the service manager")]
    NotConnected,

    /// A job was submitted before job signals were subscribed.
    #[error("not subscribed to job signals")]
    NotSubscribed,

    /// The job could not be handed to the service manager.
    #[error("failed to submit {verb} job for {unit}: {source}")]
    Submit {
        verb: &'static str,
        unit: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors returned by a [`ResolvConfWriter`](crate::resolv_conf::ResolvConfWriter).
#[derive(Debug, Error)]
pub enum ResolvConfError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// There is no resolver configuration to back up.
    #[error("{path} does not exist")]
    Missing { path: PathBuf },

    /// Search domains were pushed before the file was taken over.
    #[error("resolv.conf has not been applied yet")]
    NotApplied,

    /// The owner given for resolv.conf is not a known user.
    #[error("no such user: {user}")]
    UnknownUser { user: String },
}

impl ResolvConfError {
    /// Returns `true` if the underlying I/O error is `PermissionDenied`.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::PermissionDenied)
    }
}

/// Errors raised while assembling the daemon configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A value parsed but is not acceptable for its key.
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
