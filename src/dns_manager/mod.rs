//! Control of the local DNS cache process.

mod unbound;

use std::net::IpAddr;

use async_trait::async_trait;

pub use unbound::{Forwarding, UnboundManager, render_config};

use crate::error::DnsManagerError;
use crate::server::ServerDescription;

/// Lifecycle of the caching resolver the daemon brings up.
#[async_trait]
pub trait DnsManager: Send + Sync {
    /// Human-readable name used in log messages.
    fn service_name(&self) -> &str;

    /// Prepares the cache to listen on `listen_address`.
    async fn configure(
        &mut self,
        listen_address: IpAddr,
        dnssec_enabled: bool,
    ) -> Result<(), DnsManagerError>;

    /// Whether the cache answers requests yet.
    async fn is_ready(&self) -> bool;

    /// Replaces the upstream servers the cache forwards to.
    async fn update(&mut self, servers: &[ServerDescription]) -> Result<(), DnsManagerError>;
}
