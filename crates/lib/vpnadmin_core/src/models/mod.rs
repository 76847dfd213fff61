//! Domain models shared by the core services and the API layer.

pub mod auth;
pub mod user;

pub use auth::{IssuedToken, TokenClaims};
pub use user::{AccessDenial, ListScope, NewUser, Role, User};
