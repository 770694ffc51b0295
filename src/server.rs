//! Upstream DNS server descriptions.

use std::net::IpAddr;

use serde::Deserialize;

/// One upstream DNS server the cache forwards to.
///
/// Domains prefixed with `~` are routing-only: queries for them go to this
/// server, but they are not added to the `search` list.
///
/// # Example
///
/// ```
/// use dnsconfd::server::ServerDescription;
///
/// let server = ServerDescription::new("192.0.2.1".parse().unwrap())
///     .with_port(5353)
///     .with_domains(["example.com", "~corp.example"]);
///
/// assert_eq!(server.forward_addr(), "192.0.2.1@5353");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerDescription {
    pub address: IpAddr,

    /// DNS port; 53 when unset.
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub domains: Vec<String>,

    /// Interface the server was learned on. Servers on wireless links
    /// rank behind wired ones when wired links are prioritized.
    #[serde(default)]
    pub interface: Option<String>,
}

impl ServerDescription {
    #[must_use]
    pub fn new(address: IpAddr) -> Self {
        Self {
            address,
            port: None,
            domains: Vec::new(),
            interface: None,
        }
    }

    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_domains<I, D>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<String>,
    {
        self.domains = domains.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(53)
    }

    /// Address in unbound's `forward-addr` notation.
    #[must_use]
    pub fn forward_addr(&self) -> String {
        format!("{}@{}", self.address, self.port())
    }

    /// Whether the server was learned on a wireless link (`wl*` for WLAN,
    /// `ww*` for WWAN, per systemd's predictable interface names).
    #[must_use]
    pub fn is_wireless(&self) -> bool {
        self.interface
            .as_deref()
            .is_some_and(|name| name.starts_with("wl") || name.starts_with("ww"))
    }

    /// Zones this server answers for, without the routing-only marker.
    ///
    /// A server without domains answers for the root zone.
    #[must_use]
    pub fn zones(&self) -> Vec<&str> {
        if self.domains.is_empty() {
            return vec!["."];
        }
        self.domains
            .iter()
            .map(|d| d.strip_prefix('~').unwrap_or(d))
            .collect()
    }
}

/// Collects the search domains of `servers`, first occurrence wins.
#[must_use]
pub fn search_domains(servers: &[ServerDescription]) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    for domain in servers.iter().flat_map(|s| &s.domains) {
        if domain.starts_with('~') || domain == "." {
            continue;
        }
        if !domains.contains(domain) {
            domains.push(domain.clone());
        }
    }
    domains
}
