//! # vpnadmin_api
//!
//! HTTP API library for vpnadmin.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use vpnadmin_core::audit::{AuditSink, TracingAuditSink};
use vpnadmin_core::auth::{AuthService, TokenBlacklist, TokenCodec};
use vpnadmin_core::models::Role;
use vpnadmin_core::rate_limit::RateLimiter;
use vpnadmin_core::store::UserStore;
use vpnadmin_core::vpn::IpAllocator;

use crate::config::ApiConfig;
use crate::handlers::{auth, health, users, vpn, vpn_auth};
use crate::middleware::roles::AllowedRoles;

/// Roles allowed on the user listing and creation endpoints.
pub const MANAGEMENT_ROLES: &[Role] = &[Role::Admin, Role::Manager];

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// API configuration.
    pub config: ApiConfig,
    /// User persistence.
    pub store: Arc<dyn UserStore>,
    /// Login flow and token codec.
    pub auth: Arc<AuthService>,
    /// Revoked tokens; `None` when revocation is disabled.
    pub blacklist: Option<Arc<TokenBlacklist>>,
    /// Per-IP login rate limiter.
    pub rate_limiter: Arc<RateLimiter>,
    /// VPN address allocator.
    pub allocator: Arc<IpAllocator>,
    /// Audit trail.
    pub audit: Arc<dyn AuditSink>,
}

impl AppState {
    /// Wire every service from `config` around `store`.
    pub fn new(config: ApiConfig, store: Arc<dyn UserStore>) -> Self {
        let codec = TokenCodec::new(config.jwt_secret.as_bytes());
        let auth = AuthService::new(store.clone(), codec, config.token_ttl())
            .with_lockout(config.lockout_policy());
        let blacklist = config
            .token_blacklist_enabled
            .then(|| Arc::new(TokenBlacklist::new()));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let allocator = Arc::new(IpAllocator::new(
            config.vpn_network.clone(),
            config.vpn_server_ip.clone(),
            store.clone(),
        ));

        Self {
            config,
            store,
            auth: Arc::new(auth),
            blacklist,
            rate_limiter,
            allocator,
            audit: Arc::new(TracingAuditSink),
        }
    }

    /// Replace the audit sink.
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let require_auth =
        axum::middleware::from_fn_with_state(state.clone(), middleware::auth::require_auth);

    // Public routes (no auth required)
    let public = Router::new().route("/health", get(health::health_handler));

    // Login is throttled per client IP.
    let login = Router::new()
        .route("/auth/login", post(auth::login_handler))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::limit_by_ip,
        ));

    // Machine-to-machine routes (shared VPN token, no user principal)
    let vpn_machine = Router::new()
        .route("/vpn-auth/authenticate", post(vpn_auth::authenticate_handler))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::vpn_token::require_vpn_token,
        ));

    // Protected routes (require auth; ownership checked in handlers)
    let protected = Router::new()
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/me", get(auth::me_handler))
        .route(
            "/users/{id}",
            get(users::get_user_handler)
                .put(users::update_user_handler)
                .delete(users::delete_user_handler),
        )
        .route("/users/{id}/password", put(users::update_password_handler))
        .route("/vpn/next-ip", get(vpn::next_ip_handler))
        .route("/vpn/network-info", get(vpn::network_info_handler))
        .route("/vpn/validate-ip", post(vpn::validate_ip_handler))
        .route("/vpn/used-ips", get(vpn::used_ips_handler))
        .route_layer(require_auth.clone());

    // Management routes (require auth and ADMIN or MANAGER)
    let management = Router::new()
        .route(
            "/users",
            get(users::list_users_handler).post(users::create_user_handler),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            AllowedRoles(MANAGEMENT_ROLES),
            middleware::roles::require_role,
        ))
        .route_layer(require_auth);

    Router::new()
        .merge(public)
        .merge(login)
        .merge(vpn_machine)
        .merge(protected)
        .merge(management)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
