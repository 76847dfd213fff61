//! Request handlers.

pub mod auth;
pub mod health;
pub mod users;
pub mod vpn;
pub mod vpn_auth;
