//! # vpnadmin_core
//!
//! Core domain logic for the VPN admin backend: authentication, token
//! revocation, rate limiting, RBAC, user persistence and VPN address
//! allocation.

pub mod audit;
pub mod auth;
pub mod migrate;
pub mod models;
pub mod rate_limit;
pub mod store;
pub mod vpn;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
