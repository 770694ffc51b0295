#![allow(dead_code)]

use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;

use dnsconfd::{
    BusError, Daemon, DaemonContext, DaemonHandle, DaemonSettings, DaemonTask, DnsManager,
    DnsManagerError, Forwarding, JobId, JobResult, JobSink, PollPolicy, ResolvConfError,
    ResolvConfWriter, ServerDescription, ServiceManager,
};

pub const CACHE_UNIT: &str = "unbound.service";

/// Everything the mocks were asked to do, in order.
#[derive(Debug, Default)]
pub struct Log {
    calls: Mutex<Vec<String>>,
    polls: Mutex<Vec<Instant>>,
    updates: Mutex<Vec<Vec<ServerDescription>>>,
    sink: Mutex<Option<JobSink>>,
}

impl Log {
    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c == call)
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn polls(&self) -> Vec<Instant> {
        self.polls.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<Vec<ServerDescription>> {
        self.updates.lock().unwrap().clone()
    }

    pub fn sink(&self) -> JobSink {
        self.sink
            .lock()
            .unwrap()
            .clone()
            .expect("job signals were never subscribed")
    }
}

/// How the mock collaborators behave in one run.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub configure_ok: bool,
    /// Poll number (1-based) from which the cache reports ready.
    pub ready_on: Option<usize>,
    pub connect_ok: bool,
    pub submit_ok: bool,
    pub start_result: JobResult,
    pub restart_result: JobResult,
    pub stop_result: JobResult,
    pub apply_ok: bool,
    pub revert_ok: bool,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            configure_ok: true,
            ready_on: Some(1),
            connect_ok: true,
            submit_ok: true,
            start_result: JobResult::Done,
            restart_result: JobResult::Done,
            stop_result: JobResult::Done,
            apply_ok: true,
            revert_ok: true,
        }
    }
}

pub struct Harness {
    pub log: Arc<Log>,
    pub handle: DaemonHandle,
    pub task: DaemonTask,
}

impl Scenario {
    pub fn spawn(self) -> Harness {
        let log = Arc::new(Log::default());

        let settings = DaemonSettings {
            listen_address: "127.0.0.1".parse().unwrap(),
            dnssec_enabled: false,
            resolver_options: "edns0 trust-ad".to_string(),
            cache_unit: CACHE_UNIT.to_string(),
            poll: PollPolicy::default(),
            forwarding: Forwarding::default(),
        };

        let dns_log = log.clone();
        let scenario = self.clone();
        let context = DaemonContext::new(
            settings,
            Box::new(move |_: &DaemonSettings| -> Box<dyn DnsManager> {
                Box::new(MockDnsManager {
                    log: dns_log.clone(),
                    configure_ok: scenario.configure_ok,
                    ready_on: scenario.ready_on,
                })
            }),
            Box::new(MockServiceManager {
                log: log.clone(),
                scenario: self.clone(),
                last_job: 0,
            }),
            Box::new(MockResolvConf {
                log: log.clone(),
                apply_ok: self.apply_ok,
                revert_ok: self.revert_ok,
            }),
        );

        let (handle, task) = Daemon::spawn(context).expect("daemon table is valid");
        Harness { log, handle, task }
    }
}

pub fn server(addr: &str, domains: &[&str]) -> ServerDescription {
    ServerDescription::new(addr.parse().unwrap()).with_domains(domains.iter().copied())
}

struct MockDnsManager {
    log: Arc<Log>,
    configure_ok: bool,
    ready_on: Option<usize>,
}

#[async_trait]
impl DnsManager for MockDnsManager {
    fn service_name(&self) -> &str {
        "mock-cache"
    }

    async fn configure(&mut self, listen_address: IpAddr, _: bool) -> Result<(), DnsManagerError> {
        self.log.record(format!("dns.configure {listen_address}"));
        if self.configure_ok {
            Ok(())
        } else {
            Err(DnsManagerError::NotConfigured)
        }
    }

    async fn is_ready(&self) -> bool {
        let mut polls = self.log.polls.lock().unwrap();
        polls.push(Instant::now());
        self.ready_on.is_some_and(|n| polls.len() >= n)
    }

    async fn update(&mut self, servers: &[ServerDescription]) -> Result<(), DnsManagerError> {
        self.log.record("dns.update");
        self.log.updates.lock().unwrap().push(servers.to_vec());
        Ok(())
    }
}

struct MockServiceManager {
    log: Arc<Log>,
    scenario: Scenario,
    last_job: u64,
}

impl MockServiceManager {
    fn submit(&mut self, verb: &'static str, unit: &str, result: JobResult) -> Result<JobId, BusError> {
        self.log.record(format!("bus.{verb} {unit}"));
        if !self.scenario.submit_ok {
            return Err(BusError::NotConnected);
        }

        self.last_job += 1;
        let job = JobId::new(self.last_job);
        let sink = self.log.sink();
        tokio::spawn(async move {
            sink.job_removed(job, result).await;
        });
        Ok(job)
    }
}

impl ServiceManager for MockServiceManager {
    fn connect(&mut self) -> Result<(), BusError> {
        self.log.record("bus.connect");
        if self.scenario.connect_ok {
            Ok(())
        } else {
            Err(BusError::NotBooted {
                path: "/run/systemd/system".into(),
            })
        }
    }

    fn subscribe_job_signals(&mut self, sink: JobSink) -> Result<(), BusError> {
        self.log.record("bus.subscribe");
        *self.log.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn start_unit(&mut self, unit: &str) -> Result<JobId, BusError> {
        let result = self.scenario.start_result;
        self.submit("start", unit, result)
    }

    fn restart_unit(&mut self, unit: &str) -> Result<JobId, BusError> {
        let result = self.scenario.restart_result;
        self.submit("restart", unit, result)
    }

    fn stop_unit(&mut self, unit: &str) -> Result<JobId, BusError> {
        let result = self.scenario.stop_result;
        self.submit("stop", unit, result)
    }
}

struct MockResolvConf {
    log: Arc<Log>,
    apply_ok: bool,
    revert_ok: bool,
}

fn denied() -> ResolvConfError {
    std::io::Error::from(std::io::ErrorKind::PermissionDenied).into()
}

impl ResolvConfWriter for MockResolvConf {
    fn apply(&mut self, listen_address: IpAddr, _: &str) -> Result<(), ResolvConfError> {
        self.log.record(format!("resolv.apply {listen_address}"));
        if self.apply_ok { Ok(()) } else { Err(denied()) }
    }

    fn revert(&mut self) -> Result<(), ResolvConfError> {
        self.log.record("resolv.revert");
        if self.revert_ok { Ok(()) } else { Err(denied()) }
    }

    fn update_search_domains(&mut self, domains: &[String]) -> Result<(), ResolvConfError> {
        self.log.record(format!("resolv.search {}", domains.join(" ")));
        Ok(())
    }
}
