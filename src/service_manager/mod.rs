//! Submission of start/stop jobs to the service manager.
//!
//! Jobs finish asynchronously. The adapter reports each completion through
//! the [`JobSink`] it was handed in
//! [`subscribe_job_signals`](ServiceManager::subscribe_job_signals); the
//! daemon turns it into an event using its job registry.

mod systemctl;

use std::fmt;

use tokio::sync::mpsc;

pub use systemctl::SystemctlManager;

use crate::error::BusError;
use crate::fsm::Inbound;

/// Opaque handle of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job/{}", self.0)
    }
}

/// How a job ended, using systemd's job result vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobResult {
    Done,
    Canceled,
    Timeout,
    Failed,
    /// A job the unit depends on failed.
    Dependency,
}

impl JobResult {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Done)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Canceled => "canceled",
            Self::Timeout => "timeout",
            Self::Failed => "failed",
            Self::Dependency => "dependency",
        }
    }
}

impl fmt::Display for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a [`ServiceManager`] reports finished jobs.
///
/// Completions are queued on the daemon's inbound channel, so they are
/// handled on the daemon task like every other stimulus.
#[derive(Debug, Clone)]
pub struct JobSink {
    tx: mpsc::Sender<Inbound>,
}

impl JobSink {
    pub(crate) fn new(tx: mpsc::Sender<Inbound>) -> Self {
        Self { tx }
    }

    /// Reports that `job` finished with `result`.
    ///
    /// Returns `false` if the daemon has already exited.
    pub async fn job_removed(&self, job: JobId, result: JobResult) -> bool {
        self.tx
            .send(Inbound::JobRemoved { job, result })
            .await
            .is_ok()
    }
}

/// Service manager the daemon submits jobs to.
///
/// Submission calls return immediately; completion arrives through the
/// subscribed [`JobSink`].
pub trait ServiceManager: Send + Sync {
    /// Establishes the connection to the service manager.
    fn connect(&mut self) -> Result<(), BusError>;

    /// Starts reporting job completions to `sink`.
    fn subscribe_job_signals(&mut self, sink: JobSink) -> Result<(), BusError>;

    fn start_unit(&mut self, unit: &str) -> Result<JobId, BusError>;

    fn restart_unit(&mut self, unit: &str) -> Result<JobId, BusError>;

    fn stop_unit(&mut self, unit: &str) -> Result<JobId, BusError>;
}
