//! systemd through `systemctl`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use super::{JobId, JobResult, JobSink, ServiceManager};
use crate::error::BusError;

/// Present on every host booted with systemd.
const SYSTEMD_RUNTIME_DIR: &str = "/run/systemd/system";
const DEFAULT_SYSTEMCTL: &str = "systemctl";

/// Runs one `systemctl <verb> <unit>` child per job and reports its exit
/// status as the job result.
#[derive(Debug)]
pub struct SystemctlManager {
    runtime_dir: PathBuf,
    systemctl: PathBuf,
    connected: bool,
    sink: Option<JobSink>,
    last_job: u64,
}

impl SystemctlManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            runtime_dir: PathBuf::from(SYSTEMD_RUNTIME_DIR),
            systemctl: PathBuf::from(DEFAULT_SYSTEMCTL),
            connected: false,
            sink: None,
            last_job: 0,
        }
    }

    /// Checks for systemd under another directory (useful for testing).
    #[must_use]
    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = dir.into();
        self
    }

    /// Uses another `systemctl` binary (useful for testing).
    #[must_use]
    pub fn with_systemctl(mut self, systemctl: impl Into<PathBuf>) -> Self {
        self.systemctl = systemctl.into();
        self
    }

    #[must_use]
    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    fn submit(&mut self, verb: &'static str, unit: &str) -> Result<JobId, BusError> {
        if !self.connected {
            return Err(BusError::NotConnected);
        }
        let sink = self.sink.clone().ok_or(BusError::NotSubscribed)?;

        let child = Command::new(&self.systemctl)
            .arg(verb)
            .arg(unit)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BusError::Submit {
                verb,
                unit: unit.to_string(),
                source,
            })?;

        self.last_job += 1;
        let job = JobId::new(self.last_job);
        let unit = unit.to_string();
        tracing::debug!(%job, verb, unit = %unit, "Submitted systemctl job");

        tokio::spawn(async move {
            let result = match child.wait_with_output().await {
                Ok(output) if output.status.success() => JobResult::Done,
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let result = failure_kind(&stderr);
                    tracing::warn!(
                        %job,
                        verb,
                        unit = %unit,
                        status = %output.status,
                        %result,
                        stderr = %stderr.trim(),
                        "systemctl job failed"
                    );
                    result
                }
                Err(e) => {
                    tracing::warn!(%job, verb, unit = %unit, error = %e, "Lost track of systemctl job");
                    JobResult::Failed
                }
            };
            if !sink.job_removed(job, result).await {
                tracing::debug!(%job, "Daemon gone before job finished");
            }
        });

        Ok(job)
    }
}

/// Classifies a failed job from the message systemctl printed for it.
fn failure_kind(stderr: &str) -> JobResult {
    if stderr.contains("A dependency job for") {
        JobResult::Dependency
    } else if stderr.contains("timed out") || stderr.contains("timeout was exceeded") {
        JobResult::Timeout
    } else if stderr.contains("canceled") {
        JobResult::Canceled
    } else {
        JobResult::Failed
    }
}

impl Default for SystemctlManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceManager for SystemctlManager {
    fn connect(&mut self) -> Result<(), BusError> {
        if !self.runtime_dir.is_dir() {
            return Err(BusError::NotBooted {
                path: self.runtime_dir.clone(),
            });
        }
        self.connected = true;
        Ok(())
    }

    fn subscribe_job_signals(&mut self, sink: JobSink) -> Result<(), BusError> {
        if !self.connected {
            return Err(BusError::NotConnected);
        }
        self.sink = Some(sink);
        Ok(())
    }

    fn start_unit(&mut self, unit: &str) -> Result<JobId, BusError> {
        self.submit("start", unit)
    }

    fn restart_unit(&mut self, unit: &str) -> Result<JobId, BusError> {
        self.submit("restart", unit)
    }

    fn stop_unit(&mut self, unit: &str) -> Result<JobId, BusError> {
        self.submit("stop", unit)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::fsm::Inbound;

    fn connected(systemctl: &str) -> (SystemctlManager, mpsc::Receiver<Inbound>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel(8);
        let mut manager = SystemctlManager::new()
            .with_runtime_dir(dir.path())
            .with_systemctl(systemctl);
        manager.connect().unwrap();
        manager.subscribe_job_signals(JobSink::new(tx)).unwrap();
        (manager, rx, dir)
    }

    #[test]
    fn connect_requires_systemd_runtime_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = SystemctlManager::new().with_runtime_dir(dir.path().join("missing"));
        assert!(matches!(manager.connect(), Err(BusError::NotBooted { .. })));
    }

    #[test]
    fn jobs_need_connection_and_subscription() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = SystemctlManager::new().with_runtime_dir(dir.path());
        assert!(matches!(
            manager.start_unit("unbound.service"),
            Err(BusError::NotConnected)
        ));

        manager.connect().unwrap();
        assert!(matches!(
            manager.start_unit("unbound.service"),
            Err(BusError::NotSubscribed)
        ));
    }

    #[tokio::test]
    async fn successful_job_reports_done() {
        let (mut manager, mut rx, _dir) = connected("true");

        let job = manager.start_unit("unbound.service").unwrap();

        match rx.recv().await.unwrap() {
            Inbound::JobRemoved { job: finished, result } => {
                assert_eq!(finished, job);
                assert_eq!(result, JobResult::Done);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failing_job_reports_failed() {
        let (mut manager, mut rx, _dir) = connected("false");

        let first = manager.stop_unit("unbound.service").unwrap();
        let second = manager.restart_unit("unbound.service").unwrap();
        assert_ne!(first, second);

        for _ in 0..2 {
            match rx.recv().await.unwrap() {
                Inbound::JobRemoved { result, .. } => assert_eq!(result, JobResult::Failed),
                other => panic!("unexpected message: {other:?}"),
            }
        }
    }

    #[test]
    fn failure_messages_map_to_job_results() {
        let cases = [
            (
                "A dependency job for unbound.service failed. See 'journalctl -xe' for details.",
                JobResult::Dependency,
            ),
            ("Job for unbound.service timed out.", JobResult::Timeout),
            (
                "Job for unbound.service failed because a timeout was exceeded.",
                JobResult::Timeout,
            ),
            ("Job for unbound.service canceled.", JobResult::Canceled),
            (
                "Job for unbound.service failed because the control process exited with error code.",
                JobResult::Failed,
            ),
            ("", JobResult::Failed),
        ];
        for (stderr, expected) in cases {
            let result = failure_kind(stderr);
            assert_eq!(result, expected, "{stderr}");
            assert!(!result.is_success());
        }
        assert!(JobResult::Done.is_success());
    }

    #[tokio::test]
    async fn dependency_failure_is_reported_as_such() {
        use std::os::unix::fs::PermissionsExt;

        let scripts = tempfile::tempdir().unwrap();
        let script = scripts.path().join("systemctl");
        std::fs::write(
            &script,
            "#!/bin/sh\necho \"A dependency job for $2 failed.\" >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let (mut manager, mut rx, _dir) = connected(script.to_str().unwrap());
        manager.start_unit("unbound.service").unwrap();

        match rx.recv().await.unwrap() {
            Inbound::JobRemoved { result, .. } => assert_eq!(result, JobResult::Dependency),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_fails_submission() {
        let (mut manager, _rx, _dir) = connected("/nonexistent/systemctl");
        assert!(matches!(
            manager.start_unit("unbound.service"),
            Err(BusError::Submit { verb: "start", .. })
        ));
    }
}
