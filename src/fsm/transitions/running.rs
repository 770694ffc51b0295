//! Taking over resolv.conf, pushing servers and restarting the cache.

use super::{DaemonTable, Handler};
use crate::fsm::{DaemonContext, Event, EventKind, ExitCode, State};
use crate::server::search_domains;

pub(super) fn register(table: &mut DaemonTable) {
    use EventKind::*;
    use State::*;

    table
        .on(SettingUpResolvConf, Success, UpdatingDnsManager, Handler::PushServers)
        .on(SettingUpResolvConf, Fail, RevertingResolvConf, Handler::Stop);

    table
        .on(UpdatingDnsManager, Success, UpdatingResolvConf, Handler::UpdateSearchDomains)
        .on(UpdatingDnsManager, Fail, RevertingResolvConf, Handler::Stop);

    table
        .on(UpdatingResolvConf, Success, Running, Handler::EnterRunning)
        .on(UpdatingResolvConf, Fail, RevertingResolvConf, Handler::Stop);

    table
        .on(Running, Update, UpdatingDnsManager, Handler::PushServers)
        .on(Running, Stop, RevertingResolvConf, Handler::Stop)
        .on(Running, Reload, SubmittingRestartJob, Handler::SubmitRestartJob);

    table
        .on(SubmittingRestartJob, Success, WaitingRestartJob, Handler::Idle)
        .on(SubmittingRestartJob, Fail, RevertingResolvConf, Handler::Stop);

    table
        .on(WaitingRestartJob, RestartSuccess, Polling, Handler::JobFinished)
        .on(WaitingRestartJob, RestartFail, RevertingResolvConf, Handler::RestartJobFailed)
        .on(WaitingRestartJob, Update, WaitingRestartJob, Handler::Update)
        .on(WaitingRestartJob, Stop, RevertingResolvConf, Handler::Stop)
        .on(WaitingRestartJob, Reload, WaitingRestartJob, Handler::IgnoreReload);
}

pub(super) fn set_up_resolv_conf(context: &mut DaemonContext) -> Option<Event> {
    let listen_address = context.settings.listen_address;
    let options = context.settings.resolver_options.clone();
    match context.resolv_conf.apply(listen_address, &options) {
        Ok(()) => Some(EventKind::Success.into()),
        Err(e) => {
            if e.is_permission_denied() {
                tracing::error!(error = %e, "Not allowed to write resolv.conf, is dnsconfd running as root?");
            } else {
                tracing::error!(error = %e, "Failed to set up resolv.conf");
            }
            context.set_exit_code(ExitCode::ResolvConfFailure);
            Some(EventKind::Fail.into())
        }
    }
}

/// Hands the known servers to the cache. An `UPDATE` replaces them first;
/// one without servers changes nothing.
pub(super) async fn push_servers(context: &mut DaemonContext, event: Event) -> Option<Event> {
    if event.kind == EventKind::Update && !context.store_servers(event) {
        tracing::debug!("Update without servers, keeping current configuration");
        return Some(EventKind::Success.into());
    }

    let Some(manager) = context.dns_manager.as_mut() else {
        tracing::error!("Pushing servers without a DNS manager");
        context.set_exit_code(ExitCode::InternalFailure);
        return Some(EventKind::Fail.into());
    };

    let updated = manager.update(&context.servers).await;
    match updated {
        Ok(()) => Some(EventKind::Success.into()),
        Err(e) => {
            tracing::error!(
                service = manager.service_name(),
                error = %e,
                "Failed to update DNS cache configuration"
            );
            context.set_exit_code(ExitCode::ConfigFailure);
            Some(EventKind::Fail.into())
        }
    }
}

pub(super) fn update_search_domains(context: &mut DaemonContext) -> Option<Event> {
    let domains = search_domains(&context.servers);
    match context.resolv_conf.update_search_domains(&domains) {
        Ok(()) => Some(EventKind::Success.into()),
        Err(e) => {
            tracing::error!(error = %e, "Failed to update search domains in resolv.conf");
            context.set_exit_code(ExitCode::ResolvConfFailure);
            Some(EventKind::Fail.into())
        }
    }
}

pub(super) fn enter_running(context: &mut DaemonContext) -> Option<Event> {
    tracing::info!(
        servers = context.servers.len(),
        listen_address = %context.settings.listen_address,
        "dnsconfd is running"
    );
    None
}

pub(super) fn submit_restart_job(context: &mut DaemonContext) -> Option<Event> {
    let unit = context.settings.cache_unit.clone();
    match context.service_manager.restart_unit(&unit) {
        Ok(job) => {
            context.jobs.register(
                job,
                EventKind::RestartSuccess.into(),
                EventKind::RestartFail.into(),
            );
            tracing::info!(%job, unit = %unit, "Submitted dns cache service restart job");
            Some(EventKind::Success.into())
        }
        Err(e) => {
            tracing::error!(unit = %unit, error = %e, "Failed to submit dns cache service restart job");
            context.set_exit_code(ExitCode::DbusFailure);
            Some(EventKind::Fail.into())
        }
    }
}

pub(super) fn restart_job_failed(context: &mut DaemonContext) -> Option<Event> {
    tracing::error!(
        unit = %context.settings.cache_unit,
        "Restart job of dns cache service failed"
    );
    context.set_exit_code(ExitCode::ServiceFailure);
    super::stopping::stop(context)
}
