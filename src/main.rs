use std::path::Path;

use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tracing_subscriber::EnvFilter;

use dnsconfd::{
    Cli, Command, Daemon, DaemonConfig, DaemonContext, DaemonHandle, DaemonSettings, DnsManager,
    Event, EventKind, ExitCode, FileConfig, LogLevel, ResolvConfManager, State, SystemctlManager,
    UnboundManager,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::process::ExitCode {
    let mut cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => {
            let _ = e.print();
            return std::process::ExitCode::SUCCESS;
        }
        Err(e) => {
            let _ = e.print();
            return ExitCode::BadArguments.into();
        }
    };

    let command = cli.command.take();
    let config = match DaemonConfig::resolve(cli) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(LogLevel::Info);
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::BadArguments.into();
        }
    };
    init_tracing(config.log_level);

    if let Some(Command::ChownResolvconf { user }) = command {
        return match ResolvConfManager::new(&config.resolv_conf_path).chown(&user) {
            Ok(()) => std::process::ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(
                    path = %config.resolv_conf_path.display(),
                    user = %user,
                    error = %e,
                    "Failed to change ownership of resolv.conf"
                );
                ExitCode::ResolvConfFailure.into()
            }
        };
    }

    tracing::info!(
        listen_address = %config.listen_address,
        resolv_conf = %config.resolv_conf_path.display(),
        cache_unit = %config.cache_unit,
        dnssec = config.dnssec_enabled,
        handle_routing = config.handle_routing,
        prioritize_wire = config.prioritize_wire,
        "Starting dnsconfd"
    );

    let unbound_config = config.unbound_config_path.clone();
    let context = DaemonContext::new(
        DaemonSettings::from(&config),
        Box::new(move |settings: &DaemonSettings| -> Box<dyn DnsManager> {
            Box::new(UnboundManager::new(&unbound_config).with_forwarding(settings.forwarding))
        }),
        Box::new(SystemctlManager::new()),
        Box::new(ResolvConfManager::new(&config.resolv_conf_path)),
    );

    let (handle, task) = match Daemon::spawn(context) {
        Ok(spawned) => spawned,
        Err(e) => {
            tracing::error!(error = %e, "Transition table is inconsistent");
            return ExitCode::InternalFailure.into();
        }
    };

    if !config.static_servers.is_empty() {
        send(&handle, Event::update(config.static_servers.clone())).await;
    }
    send(&handle, Event::new(EventKind::Kickoff)).await;

    if let Err(e) = supervise(&handle, &config.config_file).await {
        tracing::error!(error = %e, "Failed to install signal handlers, stopping");
        send(&handle, Event::new(EventKind::Stop)).await;
    }

    match task.await {
        Ok(context) => {
            let code = context.exit_code();
            tracing::info!(exit_code = %code, "dnsconfd exiting");
            code.into()
        }
        Err(e) => {
            tracing::error!(error = %e, "Daemon task failed");
            ExitCode::InternalFailure.into()
        }
    }
}

fn init_tracing(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(level.as_directive())),
        )
        .init();
}

async fn send(handle: &DaemonHandle, event: Event) {
    let kind = event.kind;
    if handle.send(event).await.is_err() {
        tracing::debug!(event = %kind, "Daemon already stopped, event not delivered");
    }
}

/// Turns signals into events until the daemon stops.
///
/// SIGTERM and SIGINT request a stop; a second one drops whatever is left.
/// SIGHUP re-reads the static servers from the config file. SIGUSR1
/// restarts the cache.
async fn supervise(handle: &DaemonHandle, config_file: &Path) -> std::io::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut user1 = signal(SignalKind::user_defined1())?;
    let mut stopping = false;

    loop {
        tokio::select! {
            _ = handle.wait_for_state(State::Stopped) => return Ok(()),
            _ = terminate.recv() => request_stop(handle, &mut stopping).await,
            _ = interrupt.recv() => request_stop(handle, &mut stopping).await,
            _ = hangup.recv() => reload_static_servers(handle, config_file).await,
            _ = user1.recv() => {
                tracing::info!("Reload requested");
                send(handle, Event::new(EventKind::Reload)).await;
            }
        }
    }
}

async fn request_stop(handle: &DaemonHandle, stopping: &mut bool) {
    if *stopping {
        tracing::warn!("Second stop request, shutting down immediately");
        handle.shutdown_immediate();
        return;
    }
    *stopping = true;
    tracing::info!("Stop requested");
    send(handle, Event::new(EventKind::Stop)).await;
}

async fn reload_static_servers(handle: &DaemonHandle, config_file: &Path) {
    match FileConfig::load(config_file) {
        Ok(file) => {
            tracing::info!(
                path = %config_file.display(),
                servers = file.static_servers.len(),
                "Reloaded static servers"
            );
            send(handle, Event::update(file.static_servers)).await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to reload config file, keeping current servers");
        }
    }
}
