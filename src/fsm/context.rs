//! State shared by every transition handler.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use dnsconfd_core::JobRegistry;

use crate::config::{DEFAULT_POLL_INTERVAL, DaemonConfig};
use crate::dns_manager::{DnsManager, Forwarding};
use crate::fsm::Event;
use crate::resolv_conf::ResolvConfWriter;
use crate::server::ServerDescription;
use crate::service_manager::{JobId, JobSink, ServiceManager};

/// Builds the DNS manager once the daemon starts configuring it.
pub type DnsManagerFactory = Box<dyn Fn(&DaemonSettings) -> Box<dyn DnsManager> + Send + Sync>;

/// Classification of how the run ended, used as the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    GracefulStop = 0,
    DbusFailure = 8,
    ResolvConfFailure = 9,
    ServiceFailure = 10,
    BadArguments = 12,
    ConfigFailure = 13,
    InternalFailure = 70,
}

impl ExitCode {
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GracefulStop => "GRACEFUL_STOP",
            Self::DbusFailure => "DBUS_FAILURE",
            Self::ResolvConfFailure => "RESOLV_CONF_FAILURE",
            Self::ServiceFailure => "SERVICE_FAILURE",
            Self::BadArguments => "BAD_ARGUMENTS",
            Self::ConfigFailure => "CONFIG_FAILURE",
            Self::InternalFailure => "INTERNAL_FAILURE",
        };
        write!(f, "{name} ({})", self.code())
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        Self::from(code.code())
    }
}

/// Readiness polling budget: one poll per `interval`, giving up after the
/// initial poll plus `max_retries` more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_retries: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_retries: 3,
        }
    }
}

/// The slice of configuration the handlers read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSettings {
    pub listen_address: IpAddr,
    pub dnssec_enabled: bool,
    pub resolver_options: String,
    pub cache_unit: String,
    pub poll: PollPolicy,
    pub forwarding: Forwarding,
}

impl From<&DaemonConfig> for DaemonSettings {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            listen_address: config.listen_address,
            dnssec_enabled: config.dnssec_enabled,
            resolver_options: config.resolver_options.clone(),
            cache_unit: config.cache_unit.clone(),
            poll: PollPolicy {
                interval: config.poll_interval,
                ..PollPolicy::default()
            },
            forwarding: Forwarding {
                handle_routing: config.handle_routing,
                prioritize_wire: config.prioritize_wire,
            },
        }
    }
}

/// A timer a handler asked for; armed by the dispatcher after the
/// transition is applied.
#[derive(Debug)]
pub(crate) struct ScheduledTimer {
    pub delay: Duration,
    pub event: Event,
}

/// Everything the handlers share. Owned by the dispatcher; handlers get it
/// by `&mut` for the duration of one transition.
pub struct DaemonContext {
    pub(crate) settings: DaemonSettings,
    pub(crate) servers: Vec<ServerDescription>,
    pub(crate) jobs: JobRegistry<JobId, Event>,
    pub(crate) dns_manager: Option<Box<dyn DnsManager>>,
    pub(crate) dns_manager_factory: DnsManagerFactory,
    pub(crate) service_manager: Box<dyn ServiceManager>,
    pub(crate) resolv_conf: Box<dyn ResolvConfWriter>,
    pub(crate) job_sink: Option<JobSink>,
    exit_code: Option<ExitCode>,
    timers: Vec<ScheduledTimer>,
}

impl DaemonContext {
    #[must_use]
    pub fn new(
        settings: DaemonSettings,
        dns_manager_factory: DnsManagerFactory,
        service_manager: Box<dyn ServiceManager>,
        resolv_conf: Box<dyn ResolvConfWriter>,
    ) -> Self {
        Self {
            settings,
            servers: Vec::new(),
            jobs: JobRegistry::new(),
            dns_manager: None,
            dns_manager_factory,
            service_manager,
            resolv_conf,
            job_sink: None,
            exit_code: None,
            timers: Vec::new(),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &DaemonSettings {
        &self.settings
    }

    /// Last server list received through `UPDATE`.
    #[must_use]
    pub fn servers(&self) -> &[ServerDescription] {
        &self.servers
    }

    #[must_use]
    pub fn outstanding_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Exit status for the process: the recorded failure, if any.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        self.exit_code.unwrap_or(ExitCode::GracefulStop)
    }

    #[must_use]
    pub fn recorded_exit_code(&self) -> Option<ExitCode> {
        self.exit_code
    }

    /// Records why the run is failing. Only the first failure is kept.
    pub fn set_exit_code(&mut self, code: ExitCode) {
        match self.exit_code {
            None => self.exit_code = Some(code),
            Some(first) => {
                tracing::debug!(%first, ignored = %code, "Exit code already set, keeping the first");
            }
        }
    }

    /// Asks for `event` to be delivered once `delay` has passed.
    pub fn schedule_once(&mut self, delay: Duration, event: Event) {
        self.timers.push(ScheduledTimer { delay, event });
    }

    pub(crate) fn take_timers(&mut self) -> Vec<ScheduledTimer> {
        std::mem::take(&mut self.timers)
    }

    /// Stores the servers of an `UPDATE`; empty or absent lists are ignored.
    pub(crate) fn store_servers(&mut self, event: Event) -> bool {
        match event.into_servers() {
            Some(servers) => {
                tracing::info!(count = servers.len(), "Saved new upstream server list");
                self.servers = servers;
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for DaemonContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DaemonContext")
            .field("settings", &self.settings)
            .field("servers", &self.servers)
            .field("jobs", &self.jobs.len())
            .field(
                "dns_manager",
                &self.dns_manager.as_ref().map(|m| m.service_name()),
            )
            .field("exit_code", &self.exit_code)
            .field("timers", &self.timers)
            .finish_non_exhaustive()
    }
}
