//! Request middleware.

pub mod auth;
pub mod rate_limit;
pub mod roles;
pub mod vpn_token;
