//! API server configuration.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;
use vpnadmin_core::auth::LockoutPolicy;
use vpnadmin_core::auth::jwt::{DEFAULT_TOKEN_TTL_HOURS, resolve_jwt_secret};
use vpnadmin_core::auth::password::DEFAULT_COST;
use vpnadmin_core::rate_limit::RateLimitConfig;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:8080").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Bearer token lifetime.
    pub jwt_expiration_hours: i64,
    /// `Max-Age` of the session cookie.
    pub session_cookie_hours: i64,
    /// Mark the session cookie `Secure`.
    pub cookie_secure: bool,
    pub bcrypt_cost: u32,
    /// Revoke tokens on logout.
    pub token_blacklist_enabled: bool,
    /// Login rate limiting.
    pub rate_limit: RateLimitConfig,
    /// Consecutive failures before lockout; 0 disables lockout.
    pub lockout_max_attempts: u32,
    pub lockout_duration_minutes: i64,
    /// VPN network CIDR, e.g. "10.8.0.0/24".
    pub vpn_network: Option<String>,
    /// Address reserved for the VPN server itself.
    pub vpn_server_ip: Option<String>,
    /// Shared secret expected in `X-VPN-Token`; VPN endpoints are disabled
    /// when unset.
    pub vpn_token: Option<String>,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                    | Default                                 |
    /// |-----------------------------|-----------------------------------------|
    /// | `BIND_ADDR`                 | `127.0.0.1:8080`                        |
    /// | `DATABASE_URL`              | `postgres://localhost:5432/vpnadmin`    |
    /// | `JWT_SECRET`                | generated per process                   |
    /// | `JWT_EXPIRATION_HOURS`      | `24`                                    |
    /// | `SESSION_COOKIE_HOURS`      | `24`                                    |
    /// | `COOKIE_SECURE`             | `false`                                 |
    /// | `BCRYPT_COST`               | `10`                                    |
    /// | `TOKEN_BLACKLIST_ENABLED`   | `true`                                  |
    /// | `RATE_LIMIT_ENABLED`        | `true`                                  |
    /// | `RATE_LIMIT_REQUESTS`       | `5`                                     |
    /// | `RATE_LIMIT_WINDOW_SECS`    | `60`                                    |
    /// | `RATE_LIMIT_BURST`          | `5`                                     |
    /// | `LOCKOUT_MAX_ATTEMPTS`      | `5`                                     |
    /// | `LOCKOUT_DURATION_MINUTES`  | `15`                                    |
    /// | `VPN_NETWORK`               | unset                                   |
    /// | `VPN_SERVER_IP`             | unset                                   |
    /// | `VPN_TOKEN`                 | unset                                   |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values fall back to
    /// their defaults with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            enabled: parse_or(&get, "RATE_LIMIT_ENABLED", true),
            requests: parse_or(&get, "RATE_LIMIT_REQUESTS", defaults.requests),
            window: Duration::from_secs(parse_or(
                &get,
                "RATE_LIMIT_WINDOW_SECS",
                defaults.window.as_secs(),
            )),
            burst: parse_or(&get, "RATE_LIMIT_BURST", defaults.burst),
            ..defaults
        };

        Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:8080".into()),
            pg_connection_url: get("DATABASE_URL")
                .unwrap_or_else(|| "postgres://localhost:5432/vpnadmin".into()),
            jwt_secret: resolve_jwt_secret(get("JWT_SECRET")),
            jwt_expiration_hours: parse_or(&get, "JWT_EXPIRATION_HOURS", DEFAULT_TOKEN_TTL_HOURS),
            session_cookie_hours: parse_or(&get, "SESSION_COOKIE_HOURS", 24),
            cookie_secure: parse_or(&get, "COOKIE_SECURE", false),
            bcrypt_cost: parse_or(&get, "BCRYPT_COST", DEFAULT_COST),
            token_blacklist_enabled: parse_or(&get, "TOKEN_BLACKLIST_ENABLED", true),
            rate_limit,
            lockout_max_attempts: parse_or(&get, "LOCKOUT_MAX_ATTEMPTS", 5),
            lockout_duration_minutes: parse_or(&get, "LOCKOUT_DURATION_MINUTES", 15),
            vpn_network: get("VPN_NETWORK"),
            vpn_server_ip: get("VPN_SERVER_IP"),
            vpn_token: get("VPN_TOKEN"),
        }
    }

    /// Token lifetime as a chrono duration.
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.jwt_expiration_hours)
    }

    pub fn lockout_policy(&self) -> Option<LockoutPolicy> {
        LockoutPolicy::from_settings(self.lockout_max_attempts, self.lockout_duration_minutes)
    }
}

fn parse_or<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match get(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "ignoring unparseable config value");
            default
        }),
    }
}
