//! IPv4 address allocation inside the configured VPN network.
//!
//! The allocator holds no lock on the range. The store's uniqueness
//! constraint on `vpn_ip` decides races between concurrent allocations.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use ipnet::Ipv4Net;
use serde::Serialize;
use tracing::debug;

use super::VpnError;
use crate::store::UserStore;

/// Utilization summary of the VPN network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    pub network: String,
    pub server_ip: Option<String>,
    pub total_usable: u64,
    pub used: u64,
    /// Not clamped: negative when more addresses are held than exist.
    pub available: i64,
}

/// Hands out and validates VPN addresses against the live assignment set.
pub struct IpAllocator {
    network: Option<String>,
    server_ip: Option<String>,
    store: Arc<dyn UserStore>,
}

impl IpAllocator {
    pub fn new(
        network: Option<String>,
        server_ip: Option<String>,
        store: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            network: network.filter(|n| !n.trim().is_empty()),
            server_ip: server_ip.filter(|s| !s.trim().is_empty()),
            store,
        }
    }

    /// Whether a network CIDR has been configured.
    pub fn is_configured(&self) -> bool {
        self.network.is_some()
    }

    /// First free address after the network base, in numeric order.
    pub async fn next_available(&self) -> Result<Ipv4Addr, VpnError> {
        let net = self.network()?;
        let server = self.server_addr()?;
        let used = self.used_set().await?;
        let ip = first_free(&net, server, &used).ok_or(VpnError::NoAvailableIp)?;
        debug!(%ip, network = %net, "next available VPN address");
        Ok(ip)
    }

    /// Check that `ip` may be assigned. `exclude_user_id` lets an identity
    /// keep the address it already holds.
    pub async fn validate(&self, ip: &str, exclude_user_id: Option<i64>) -> Result<(), VpnError> {
        let net = self.network()?;
        let addr = parse_addr(ip)?;
        if !net.contains(&addr) {
            return Err(VpnError::OutOfRange(addr.to_string()));
        }
        if self.server_addr()? == Some(addr) {
            return Err(VpnError::ReservedForServer(addr.to_string()));
        }
        let taken = self
            .store
            .assigned_vpn_ips()
            .await?
            .into_iter()
            .any(|(owner, assigned)| {
                Some(owner) != exclude_user_id && parse_addr(&assigned).ok() == Some(addr)
            });
        if taken {
            return Err(VpnError::AlreadyUsed(addr.to_string()));
        }
        Ok(())
    }

    pub async fn network_info(&self) -> Result<NetworkInfo, VpnError> {
        let net = self.network()?;
        let assigned: BTreeSet<String> = self
            .store
            .assigned_vpn_ips()
            .await?
            .into_iter()
            .map(|(_, ip)| ip)
            .collect();

        let total_usable = total_usable(&net);
        let used = assigned.len() as u64 + u64::from(self.server_addr()?.is_some());
        Ok(NetworkInfo {
            network: net.to_string(),
            server_ip: self.server_ip.clone(),
            total_usable,
            used,
            available: total_usable as i64 - used as i64,
        })
    }

    /// Distinct assigned addresses, ascending by numeric value.
    pub async fn used_ips(&self) -> Result<Vec<String>, VpnError> {
        let mut ips: Vec<String> = self
            .store
            .assigned_vpn_ips()
            .await?
            .into_iter()
            .map(|(_, ip)| ip)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        ips.sort_by_key(|ip| (ip.parse::<Ipv4Addr>().map_or(u32::MAX, u32::from), ip.clone()));
        Ok(ips)
    }

    fn network(&self) -> Result<Ipv4Net, VpnError> {
        let cidr = self
            .network
            .as_deref()
            .ok_or(VpnError::NetworkNotConfigured)?;
        parse_network(cidr)
    }

    /// A malformed server address is a configuration error, not the caller's.
    fn server_addr(&self) -> Result<Option<Ipv4Addr>, VpnError> {
        self.server_ip
            .as_deref()
            .map(|ip| {
                ip.trim()
                    .parse()
                    .map_err(|_| VpnError::InvalidNetwork(format!("server IP '{ip}'")))
            })
            .transpose()
    }

    async fn used_set(&self) -> Result<BTreeSet<Ipv4Addr>, VpnError> {
        Ok(self
            .store
            .assigned_vpn_ips()
            .await?
            .into_iter()
            .filter_map(|(_, ip)| ip.parse().ok())
            .collect())
    }
}

/// Parse an IPv4 CIDR, normalizing host bits away.
pub fn parse_network(cidr: &str) -> Result<Ipv4Net, VpnError> {
    cidr.trim()
        .parse::<Ipv4Net>()
        .map(|net| net.trunc())
        .map_err(|_| VpnError::InvalidNetwork(cidr.to_string()))
}

fn parse_addr(ip: &str) -> Result<Ipv4Addr, VpnError> {
    ip.trim()
        .parse()
        .map_err(|_| VpnError::InvalidAddress(ip.to_string()))
}

/// `2^host_bits - 2`, zero for /31 and /32.
pub fn total_usable(net: &Ipv4Net) -> u64 {
    let host_bits = 32 - u32::from(net.prefix_len());
    (1u64 << host_bits).saturating_sub(2)
}

fn first_free(
    net: &Ipv4Net,
    server: Option<Ipv4Addr>,
    used: &BTreeSet<Ipv4Addr>,
) -> Option<Ipv4Addr> {
    let base = u32::from(net.network());
    let broadcast = u32::from(net.broadcast());
    (base.saturating_add(1)..broadcast)
        .map(Ipv4Addr::from)
        .find(|ip| Some(*ip) != server && !used.contains(ip))
}
