//! VPN address management.

pub mod allocator;

use thiserror::Error;

use crate::store::StoreError;

pub use allocator::{IpAllocator, NetworkInfo};

/// VPN allocation and validation errors.
#[derive(Debug, Error)]
pub enum VpnError {
    #[error("VPN network is not configured")]
    NetworkNotConfigured,

    #[error("Invalid VPN network: {0}")]
    InvalidNetwork(String),

    #[error("No available IP addresses in the VPN network")]
    NoAvailableIp,

    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),

    #[error("IP {0} is outside the VPN network")]
    OutOfRange(String),

    #[error("IP {0} is reserved for the VPN server")]
    ReservedForServer(String),

    #[error("IP {0} is already assigned to another user")]
    AlreadyUsed(String),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),
}
