//! Bringing the cache service up: configure, connect, start, poll.

use super::{DaemonTable, Handler};
use crate::fsm::{DaemonContext, Event, EventKind, ExitCode, State};

pub(super) fn register(table: &mut DaemonTable) {
    use EventKind::*;
    use State::*;

    table
        .on(Starting, Kickoff, ConfiguringDnsManager, Handler::Kickoff)
        .on(Starting, Update, Starting, Handler::Update)
        .on(Starting, Stop, Stopped, Handler::Exit)
        .on(Starting, Reload, Starting, Handler::IgnoreReload);

    table
        .on(ConfiguringDnsManager, Success, ConnectingBus, Handler::ConnectBus)
        .on(ConfiguringDnsManager, Fail, Stopped, Handler::Exit);

    table
        .on(ConnectingBus, Success, SubmittingStartJob, Handler::SubmitStartJob)
        .on(ConnectingBus, Fail, Stopped, Handler::Exit);

    table
        .on(SubmittingStartJob, Success, WaitingForStartJob, Handler::Idle)
        .on(SubmittingStartJob, Fail, Stopped, Handler::Exit);

    table
        .on(WaitingForStartJob, StartOk, Polling, Handler::JobFinished)
        .on(WaitingForStartJob, StartFail, Stopped, Handler::StartJobFailed)
        .on(WaitingForStartJob, Update, WaitingForStartJob, Handler::Update)
        .on(WaitingForStartJob, Stop, RevertingResolvConf, Handler::Stop)
        .on(WaitingForStartJob, Reload, WaitingForStartJob, Handler::IgnoreReload);

    table
        .on(Polling, TimerUp, Polling, Handler::PollReadiness)
        .on(Polling, ServiceUp, SettingUpResolvConf, Handler::SetUpResolvConf)
        .on(Polling, Timeout, RevertingResolvConf, Handler::Stop)
        .on(Polling, Update, Polling, Handler::Update)
        .on(Polling, Stop, RevertingResolvConf, Handler::Stop)
        .on(Polling, Reload, Polling, Handler::IgnoreReload);
}

pub(super) async fn kickoff(context: &mut DaemonContext) -> Option<Event> {
    let settings = context.settings.clone();
    let manager = context
        .dns_manager
        .insert((context.dns_manager_factory)(&settings));

    let configured = manager
        .configure(settings.listen_address, settings.dnssec_enabled)
        .await;
    match configured {
        Ok(()) => {
            tracing::info!(service = manager.service_name(), "Successfully configured DNS manager");
            Some(EventKind::Success.into())
        }
        Err(e) => {
            tracing::error!(error = %e, "Unable to configure DNS manager");
            context.set_exit_code(ExitCode::ConfigFailure);
            Some(EventKind::Fail.into())
        }
    }
}

pub(super) fn connect_bus(context: &mut DaemonContext) -> Option<Event> {
    let Some(sink) = context.job_sink.clone() else {
        tracing::error!("No job signal sink installed, cannot subscribe");
        context.set_exit_code(ExitCode::DbusFailure);
        return Some(EventKind::Fail.into());
    };

    let connected = context
        .service_manager
        .connect()
        .and_then(|()| context.service_manager.subscribe_job_signals(sink));

    match connected {
        Ok(()) => {
            tracing::info!("Successfully connected to the service manager");
            Some(EventKind::Success.into())
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to the service manager");
            context.set_exit_code(ExitCode::DbusFailure);
            Some(EventKind::Fail.into())
        }
    }
}

pub(super) fn submit_start_job(context: &mut DaemonContext) -> Option<Event> {
    let unit = context.settings.cache_unit.clone();
    match context.service_manager.start_unit(&unit) {
        Ok(job) => {
            context.jobs.register(
                job,
                EventKind::StartOk.into(),
                EventKind::StartFail.into(),
            );
            tracing::info!(%job, unit = %unit, "Successfully submitted dns cache service start job");
            Some(EventKind::Success.into())
        }
        Err(e) => {
            tracing::error!(unit = %unit, error = %e, "Failed to submit dns cache service start job");
            context.set_exit_code(ExitCode::DbusFailure);
            Some(EventKind::Fail.into())
        }
    }
}

/// Start (or restart) job done; the first poll comes one interval later.
pub(super) fn job_finished(context: &mut DaemonContext) -> Option<Event> {
    tracing::info!("Cache service job finished successfully, starting polling");
    let interval = context.settings.poll.interval;
    context.schedule_once(interval, Event::timer_up(0));
    None
}

pub(super) async fn poll_readiness(context: &mut DaemonContext, event: &Event) -> Option<Event> {
    let attempt = event.attempt().unwrap_or(0);
    let Some(manager) = context.dns_manager.as_ref() else {
        tracing::error!("Polling readiness without a DNS manager");
        context.set_exit_code(ExitCode::InternalFailure);
        return Some(EventKind::Timeout.into());
    };

    if manager.is_ready().await {
        tracing::debug!(
            service = manager.service_name(),
            attempt,
            "DNS cache service is responding, proceeding to setup of resolv.conf"
        );
        return Some(EventKind::ServiceUp.into());
    }

    let policy = context.settings.poll;
    if attempt >= policy.max_retries {
        tracing::error!(
            service = manager.service_name(),
            attempts = attempt + 1,
            "DNS cache service did not respond in time, stopping dnsconfd"
        );
        context.set_exit_code(ExitCode::ServiceFailure);
        return Some(EventKind::Timeout.into());
    }

    tracing::debug!(
        service = manager.service_name(),
        attempt,
        "DNS cache service still not ready, scheduling additional poll"
    );
    context.schedule_once(policy.interval, Event::timer_up(attempt + 1));
    None
}

/// Remembers the servers for later; nothing is pushed before the cache runs.
pub(super) fn update(context: &mut DaemonContext, event: Event) -> Option<Event> {
    if !context.store_servers(event) {
        tracing::debug!("Update without servers, ignoring");
    }
    None
}

pub(super) fn start_job_failed(context: &mut DaemonContext) -> Option<Event> {
    tracing::error!(
        unit = %context.settings.cache_unit,
        "Start job of dns cache service failed"
    );
    context.set_exit_code(ExitCode::ServiceFailure);
    None
}
