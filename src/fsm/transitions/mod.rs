//! The daemon's transition table and the handlers its rows run.
//!
//! Rows are grouped by phase: bringing the cache up, keeping it
//! configured, and tearing everything down again.

mod running;
mod starting;
mod stopping;

use dnsconfd_core::{TableError, TableShape, TransitionTable};

use crate::fsm::{DaemonContext, Event, EventKind, State};

/// Transition table keyed on the daemon's states and event kinds.
pub type DaemonTable = TransitionTable<State, EventKind, Handler>;

/// Handler attached to a table row.
///
/// A handler may touch the context, call collaborators and request timers.
/// It returns the follow-up event, if any; it never picks the next state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Kickoff,
    ConnectBus,
    SubmitStartJob,
    /// Nothing to do; the machine waits for a job signal or a timer.
    Idle,
    JobFinished,
    PollReadiness,
    Update,
    StartJobFailed,
    SetUpResolvConf,
    PushServers,
    UpdateSearchDomains,
    EnterRunning,
    SubmitRestartJob,
    RestartJobFailed,
    IgnoreReload,
    Stop,
    SubmitStopJob,
    StopJobFailed,
    Exit,
}

impl Handler {
    pub(crate) async fn run(self, context: &mut DaemonContext, event: Event) -> Option<Event> {
        match self {
            Self::Kickoff => starting::kickoff(context).await,
            Self::ConnectBus => starting::connect_bus(context),
            Self::SubmitStartJob => starting::submit_start_job(context),
            Self::Idle => None,
            Self::JobFinished => starting::job_finished(context),
            Self::PollReadiness => starting::poll_readiness(context, &event).await,
            Self::Update => starting::update(context, event),
            Self::StartJobFailed => starting::start_job_failed(context),
            Self::SetUpResolvConf => running::set_up_resolv_conf(context),
            Self::PushServers => running::push_servers(context, event).await,
            Self::UpdateSearchDomains => running::update_search_domains(context),
            Self::EnterRunning => running::enter_running(context),
            Self::SubmitRestartJob => running::submit_restart_job(context),
            Self::RestartJobFailed => running::restart_job_failed(context),
            Self::IgnoreReload => {
                tracing::debug!("Reload requested while not running, ignoring");
                None
            }
            Self::Stop => stopping::stop(context),
            Self::SubmitStopJob => stopping::submit_stop_job(context),
            Self::StopJobFailed => stopping::stop_job_failed(context),
            Self::Exit => stopping::exit(context),
        }
    }
}

/// Builds the complete table.
#[must_use]
pub fn daemon_table() -> DaemonTable {
    let mut table = DaemonTable::new();
    starting::register(&mut table);
    running::register(&mut table);
    stopping::register(&mut table);
    table
}

/// Checks `table` for duplicate rows, unreachable states, states that
/// cannot stop, and resting states that would reject `UPDATE`, `STOP`
/// or `RELOAD`.
///
/// # Errors
///
/// Returns the first defect found.
pub fn validate(table: &DaemonTable) -> Result<(), TableError<State, EventKind>> {
    table.validate(&TableShape {
        initial: State::Starting,
        terminal: State::Stopped,
        states: &State::ALL,
        resting: &State::RESTING,
        external: &EventKind::EXTERNAL,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_table_is_valid() {
        assert_eq!(validate(&daemon_table()), Ok(()));
    }

    #[test]
    fn dropping_an_external_row_is_caught() {
        let mut table = DaemonTable::new();
        for (state, event, row) in daemon_table().rows() {
            if (state, event) != (State::Polling, EventKind::Reload) {
                table.on(state, event, row.next(), *row.handler());
            }
        }

        assert_eq!(
            validate(&table),
            Err(TableError::MissingExternal {
                state: State::Polling,
                event: EventKind::Reload,
            })
        );
    }

    #[test]
    fn declaring_a_row_twice_is_caught() {
        let mut table = daemon_table();
        table.on(State::Running, EventKind::Stop, State::Stopped, Handler::Exit);

        assert_eq!(
            validate(&table),
            Err(TableError::Duplicate {
                state: State::Running,
                event: EventKind::Stop,
            })
        );
    }

    #[test]
    fn every_resting_state_accepts_stop() {
        let table = daemon_table();
        for state in State::RESTING {
            assert!(table.contains(state, EventKind::Stop), "{state} rejects STOP");
        }
        assert!(table.rows().all(|(state, _, _)| state != State::Stopped));
    }
}
