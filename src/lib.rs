//! # dnsconfd
//!
//! Brings up a local DNS cache, points the system resolver configuration at
//! it and keeps its upstream servers current.
//!
//! The daemon is a state machine driven by a declarative transition table
//! (see [`fsm`]). Collaborators sit behind traits so they can be swapped
//! out in tests:
//!
//! - [`DnsManager`]: the cache process ([`UnboundManager`])
//! - [`ServiceManager`]: start/stop jobs ([`SystemctlManager`])
//! - [`ResolvConfWriter`]: resolv.conf takeover ([`ResolvConfManager`])
//!
//! ## Example
//!
//! ```rust,no_run
//! use dnsconfd::{
//!     DaemonConfig, DaemonContext, DaemonSettings, Daemon, Event, EventKind,
//!     ResolvConfManager, SystemctlManager, UnboundManager,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DaemonConfig::default();
//! let unbound_config = config.unbound_config_path.clone();
//! let context = DaemonContext::new(
//!     DaemonSettings::from(&config),
//!     Box::new(move |_: &DaemonSettings| -> Box<dyn dnsconfd::DnsManager> {
//!         Box::new(UnboundManager::new(&unbound_config))
//!     }),
//!     Box::new(SystemctlManager::new()),
//!     Box::new(ResolvConfManager::new(&config.resolv_conf_path)),
//! );
//!
//! let (handle, task) = Daemon::spawn(context)?;
//! handle.send(Event::new(EventKind::Kickoff)).await?;
//! let context = task.await?;
//! println!("exit code: {}", context.exit_code());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dns_manager;
pub mod error;
pub mod fsm;
pub mod resolv_conf;
pub mod server;
pub mod service_manager;
mod util;

pub use config::{Cli, Command, DaemonConfig, FileConfig, LogLevel};
pub use dns_manager::{DnsManager, Forwarding, UnboundManager};
pub use error::{BusError, ConfigError, DnsManagerError, ResolvConfError};
pub use fsm::{
    Daemon, DaemonContext, DaemonHandle, DaemonSettings, DaemonTask, Event, EventKind, ExitCode,
    PollPolicy, State,
};
pub use resolv_conf::{ResolvConfManager, ResolvConfWriter};
pub use server::ServerDescription;
pub use service_manager::{JobId, JobResult, JobSink, ServiceManager, SystemctlManager};

#[doc(inline)]
pub use dnsconfd_core::{ShutdownMode, TableError, TaskError};
