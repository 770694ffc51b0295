//! unbound as the local DNS cache.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::DnsManager;
use crate::error::DnsManagerError;
use crate::server::ServerDescription;

const SERVICE_NAME: &str = "unbound";
const DEFAULT_CONTROL: &str = "unbound-control";
const CONTROL_TIMEOUT: Duration = Duration::from_secs(2);

/// How upstream servers are laid out in forward zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Forwarding {
    /// Route each server's domains to it. When off, every server forwards
    /// the root zone only.
    pub handle_routing: bool,
    /// List servers learned on wired links before wireless ones.
    pub prioritize_wire: bool,
}

impl Default for Forwarding {
    fn default() -> Self {
        Self {
            handle_routing: true,
            prioritize_wire: true,
        }
    }
}

/// Drives unbound through a generated configuration file and
/// `unbound-control`.
#[derive(Debug, Clone)]
pub struct UnboundManager {
    config_path: PathBuf,
    control: PathBuf,
    control_timeout: Duration,
    forwarding: Forwarding,
    listen_address: Option<IpAddr>,
    dnssec_enabled: bool,
}

impl UnboundManager {
    #[must_use]
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            control: PathBuf::from(DEFAULT_CONTROL),
            control_timeout: CONTROL_TIMEOUT,
            forwarding: Forwarding::default(),
            listen_address: None,
            dnssec_enabled: false,
        }
    }

    /// Uses another `unbound-control` binary (useful for testing).
    #[must_use]
    pub fn with_control(mut self, control: impl Into<PathBuf>) -> Self {
        self.control = control.into();
        self
    }

    #[must_use]
    pub const fn with_control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_forwarding(mut self, forwarding: Forwarding) -> Self {
        self.forwarding = forwarding;
        self
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    async fn write_config(&self, servers: &[ServerDescription]) -> Result<(), DnsManagerError> {
        let listen = self.listen_address.ok_or(DnsManagerError::NotConfigured)?;
        if let Some(parent) = self.config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = render_config(listen, self.dnssec_enabled, self.forwarding, servers);
        tokio::fs::write(&self.config_path, contents).await?;
        tracing::debug!(path = %self.config_path.display(), "Wrote unbound configuration");
        Ok(())
    }

    async fn control(&self, verb: &str) -> Result<(), DnsManagerError> {
        let command = format!("{} {verb}", self.control.display());
        let mut cmd = Command::new(&self.control);
        cmd.arg("-c")
            .arg(&self.config_path)
            .arg(verb)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.control_timeout, cmd.output())
            .await
            .map_err(|_| DnsManagerError::Timeout {
                command: command.clone(),
                timeout: self.control_timeout,
            })??;

        if output.status.success() {
            Ok(())
        } else {
            Err(DnsManagerError::Command {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl DnsManager for UnboundManager {
    fn service_name(&self) -> &str {
        SERVICE_NAME
    }

    async fn configure(
        &mut self,
        listen_address: IpAddr,
        dnssec_enabled: bool,
    ) -> Result<(), DnsManagerError> {
        self.listen_address = Some(listen_address);
        self.dnssec_enabled = dnssec_enabled;
        self.write_config(&[]).await
    }

    async fn is_ready(&self) -> bool {
        match self.control("status").await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "unbound is not answering yet");
                false
            }
        }
    }

    async fn update(&mut self, servers: &[ServerDescription]) -> Result<(), DnsManagerError> {
        for server in servers {
            tracing::debug!(
                server = %server.forward_addr(),
                interface = server.interface.as_deref().unwrap_or("-"),
                domains = ?server.domains,
                "Forwarding to upstream server"
            );
        }
        self.write_config(servers).await?;
        self.control("reload").await?;
        tracing::info!(servers = servers.len(), "unbound forwarding updated");
        Ok(())
    }
}

/// Renders a complete unbound configuration.
///
/// Servers are grouped by zone; a server without domains serves the root
/// zone. Zones are emitted in sorted order. Within a zone, servers keep
/// their given order unless `forwarding` puts wired links first.
#[must_use]
pub fn render_config(
    listen_address: IpAddr,
    dnssec_enabled: bool,
    forwarding: Forwarding,
    servers: &[ServerDescription],
) -> String {
    let modules = if dnssec_enabled {
        "validator iterator"
    } else {
        "iterator"
    };

    let mut out = String::from("# Generated by dnsconfd\n");
    let _ = write!(
        out,
        "server:\n    interface: {listen_address}\n    do-not-query-localhost: no\n    module-config: \"{modules}\"\n"
    );
    out.push_str("\nremote-control:\n    control-enable: yes\n    control-use-cert: no\n");

    let mut ordered: Vec<&ServerDescription> = servers.iter().collect();
    if forwarding.prioritize_wire {
        ordered.sort_by_key(|server| server.is_wireless());
    }

    let mut zones: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for server in ordered {
        let served = if forwarding.handle_routing {
            server.zones()
        } else {
            vec!["."]
        };
        for zone in served {
            let addrs = zones.entry(zone).or_default();
            let addr = server.forward_addr();
            if !addrs.contains(&addr) {
                addrs.push(addr);
            }
        }
    }

    for (zone, addrs) in zones {
        let name = if zone.ends_with('.') {
            zone.to_string()
        } else {
            format!("{zone}.")
        };
        let _ = write!(out, "\nforward-zone:\n    name: \"{name}\"\n");
        for addr in addrs {
            let _ = writeln!(out, "    forward-addr: {addr}");
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn localhost() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[test]
    fn server_section_follows_dnssec_flag() {
        let plain = render_config(localhost(), false, Forwarding::default(), &[]);
        assert!(plain.contains("interface: 127.0.0.1"));
        assert!(plain.contains("module-config: \"iterator\""));
        assert!(!plain.contains("forward-zone"));

        let validating = render_config(localhost(), true, Forwarding::default(), &[]);
        assert!(validating.contains("module-config: \"validator iterator\""));
    }

    #[test]
    fn servers_are_grouped_by_zone() {
        let servers = vec![
            ServerDescription::new("192.0.2.1".parse().unwrap()),
            ServerDescription::new("192.0.2.2".parse().unwrap())
                .with_domains(["example.com", "~corp.example"]),
            ServerDescription::new("192.0.2.3".parse().unwrap())
                .with_port(5353)
                .with_domains(["example.com"]),
        ];

        let config = render_config(localhost(), false, Forwarding::default(), &servers);

        let root = config.find("name: \".\"").unwrap();
        let corp = config.find("name: \"corp.example.\"").unwrap();
        let example = config.find("name: \"example.com.\"").unwrap();
        assert!(root < corp && corp < example);
        assert!(config.contains(
            "name: \"example.com.\"\n    forward-addr: 192.0.2.2@53\n    forward-addr: 192.0.2.3@5353\n"
        ));
        assert!(config.contains("name: \".\"\n    forward-addr: 192.0.2.1@53\n"));
    }

    #[test]
    fn routing_off_sends_everything_to_root() {
        let servers = vec![
            ServerDescription::new("192.0.2.1".parse().unwrap()).with_domains(["example.com"]),
            ServerDescription::new("192.0.2.2".parse().unwrap()),
        ];
        let forwarding = Forwarding {
            handle_routing: false,
            ..Forwarding::default()
        };

        let config = render_config(localhost(), false, forwarding, &servers);

        assert!(!config.contains("example.com"));
        assert!(config.contains(
            "name: \".\"\n    forward-addr: 192.0.2.1@53\n    forward-addr: 192.0.2.2@53\n"
        ));
    }

    #[test]
    fn wired_servers_come_first_when_prioritized() {
        let servers = vec![
            ServerDescription::new("192.0.2.1".parse().unwrap()).with_interface("wlp2s0"),
            ServerDescription::new("192.0.2.2".parse().unwrap()).with_interface("enp3s0"),
            ServerDescription::new("192.0.2.3".parse().unwrap()),
        ];

        let wired_first = render_config(localhost(), false, Forwarding::default(), &servers);
        assert!(wired_first.contains(
            "forward-addr: 192.0.2.2@53\n    forward-addr: 192.0.2.3@53\n    forward-addr: 192.0.2.1@53\n"
        ));

        let as_given = render_config(
            localhost(),
            false,
            Forwarding {
                prioritize_wire: false,
                ..Forwarding::default()
            },
            &servers,
        );
        assert!(as_given.contains(
            "forward-addr: 192.0.2.1@53\n    forward-addr: 192.0.2.2@53\n    forward-addr: 192.0.2.3@53\n"
        ));
    }

    #[tokio::test]
    async fn configure_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("unbound.conf");
        let mut manager = UnboundManager::new(&path);

        manager.configure(localhost(), true).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, render_config(localhost(), true, Forwarding::default(), &[]));
    }

    #[tokio::test]
    async fn update_before_configure_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = UnboundManager::new(dir.path().join("unbound.conf"));
        let err = manager.update(&[]).await.unwrap_err();
        assert!(matches!(err, DnsManagerError::NotConfigured));
    }

    #[tokio::test]
    async fn readiness_follows_control_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unbound.conf");

        let up = UnboundManager::new(&path).with_control("true");
        assert!(up.is_ready().await);

        let down = UnboundManager::new(&path).with_control("false");
        assert!(!down.is_ready().await);

        let missing = UnboundManager::new(&path).with_control(dir.path().join("no-such-binary"));
        assert!(!missing.is_ready().await);
    }

    #[tokio::test]
    async fn failed_reload_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = UnboundManager::new(dir.path().join("unbound.conf")).with_control("false");
        manager.configure(localhost(), false).await.unwrap();

        let err = manager.update(&[]).await.unwrap_err();
        assert!(matches!(err, DnsManagerError::Command { .. }));
    }
}
