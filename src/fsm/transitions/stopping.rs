//! Restoring resolv.conf and stopping the cache service.

use super::{DaemonTable, Handler};
use crate::fsm::{DaemonContext, Event, EventKind, ExitCode, State};

pub(super) fn register(table: &mut DaemonTable) {
    use EventKind::*;
    use State::*;

    // The stop job is submitted even if resolv.conf could not be restored.
    table
        .on(RevertingResolvConf, Success, SubmittingStopJob, Handler::SubmitStopJob)
        .on(RevertingResolvConf, Fail, SubmittingStopJob, Handler::SubmitStopJob);

    table
        .on(SubmittingStopJob, Success, WaitingStopJob, Handler::Idle)
        .on(SubmittingStopJob, Fail, Stopped, Handler::Exit);

    table
        .on(WaitingStopJob, StopSuccess, Stopped, Handler::Exit)
        .on(WaitingStopJob, StopFailure, Stopped, Handler::StopJobFailed)
        .on(WaitingStopJob, Update, WaitingStopJob, Handler::Update)
        .on(WaitingStopJob, Stop, WaitingStopJob, Handler::Idle)
        .on(WaitingStopJob, Reload, WaitingStopJob, Handler::IgnoreReload);
}

pub(super) fn stop(context: &mut DaemonContext) -> Option<Event> {
    tracing::info!("Stopping dnsconfd");
    match context.resolv_conf.revert() {
        Ok(()) => Some(EventKind::Success.into()),
        Err(e) => {
            tracing::error!(error = %e, "Failed to revert resolv.conf");
            context.set_exit_code(ExitCode::ResolvConfFailure);
            Some(EventKind::Fail.into())
        }
    }
}

/// Drops every outstanding job before submitting the stop job, so that a
/// late start or restart signal is logged and ignored.
pub(super) fn submit_stop_job(context: &mut DaemonContext) -> Option<Event> {
    let dropped = context.jobs.clear();
    if dropped > 0 {
        tracing::debug!(dropped, "Forgetting outstanding jobs before stopping");
    }

    let unit = context.settings.cache_unit.clone();
    match context.service_manager.stop_unit(&unit) {
        Ok(job) => {
            context.jobs.register(
                job,
                EventKind::StopSuccess.into(),
                EventKind::StopFailure.into(),
            );
            tracing::info!(%job, unit = %unit, "Submitted dns cache service stop job");
            Some(EventKind::Success.into())
        }
        Err(e) => {
            tracing::error!(unit = %unit, error = %e, "Failed to submit dns cache service stop job");
            context.set_exit_code(ExitCode::DbusFailure);
            Some(EventKind::Fail.into())
        }
    }
}

pub(super) fn stop_job_failed(context: &mut DaemonContext) -> Option<Event> {
    tracing::error!(
        unit = %context.settings.cache_unit,
        "Stop job of dns cache service failed"
    );
    context.set_exit_code(ExitCode::ServiceFailure);
    None
}

pub(super) fn exit(context: &mut DaemonContext) -> Option<Event> {
    tracing::info!(exit_code = %context.exit_code(), "dnsconfd stopped");
    None
}
