//! The daemon state machine.
//!
//! [`Daemon::spawn`] runs the machine on its own task. Everything that can
//! move it (requests from the binary, timers, finished service jobs) is
//! queued on a single channel and handled one message at a time.

mod context;
mod daemon;
mod event;
mod state;
mod transitions;

pub use context::{DaemonContext, DaemonSettings, DnsManagerFactory, ExitCode, PollPolicy};
pub use daemon::{Daemon, DaemonHandle, DaemonTask, Inbound};
pub use event::{Event, EventKind, Payload};
pub use state::State;
pub use transitions::{DaemonTable, Handler, daemon_table, validate};
