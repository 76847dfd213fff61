//! Shared helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use chrono::Duration;
use serde_json::Value;
use tower::ServiceExt;
use vpnadmin_api::config::ApiConfig;
use vpnadmin_api::{AppState, router};
use vpnadmin_core::audit::MemoryAuditSink;
use vpnadmin_core::auth::password::hash_password_with_cost;
use vpnadmin_core::models::{NewUser, Role, User};
use vpnadmin_core::store::{MemoryUserStore, UserStore};

pub const PASSWORD: &str = "password123";

/// Test configuration: fixed secret, cheap bcrypt, no rate limit or lockout.
pub fn test_config() -> ApiConfig {
    let mut config = ApiConfig::from_lookup(|_| None);
    config.jwt_secret = "test-secret".into();
    config.bcrypt_cost = 4;
    config.rate_limit.enabled = false;
    config.lockout_max_attempts = 0;
    config
}

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryUserStore>,
    pub audit: Arc<MemoryAuditSink>,
}

impl TestApp {
    pub fn new(config: ApiConfig) -> Self {
        let store = Arc::new(MemoryUserStore::new());
        Self::with_store(config, store.clone(), store)
    }

    /// Serve through `backend`; `store` is the memory store it wraps, used for seeding.
    pub fn with_store(
        config: ApiConfig,
        store: Arc<MemoryUserStore>,
        backend: Arc<dyn UserStore>,
    ) -> Self {
        let audit = Arc::new(MemoryAuditSink::new());
        let state = AppState::new(config, backend).with_audit(audit.clone());
        Self {
            app: router(state.clone()),
            state,
            store,
            audit,
        }
    }

    /// Insert a user with `PASSWORD`.
    pub async fn seed(&self, username: &str, role: Role, manager_id: Option<i64>) -> User {
        self.seed_with(username, role, manager_id, |_| {}).await
    }

    pub async fn seed_with(
        &self,
        username: &str,
        role: Role,
        manager_id: Option<i64>,
        tweak: impl FnOnce(&mut NewUser),
    ) -> User {
        let mut user = NewUser {
            username: username.into(),
            email: format!("{username}@example.com"),
            full_name: None,
            password_hash: hash_password_with_cost(PASSWORD, 4).unwrap(),
            role,
            manager_id,
            is_active: true,
            valid_from: None,
            valid_to: None,
            vpn_ip: None,
        };
        tweak(&mut user);
        self.store.create(user).await.unwrap()
    }

    /// A valid bearer token for `user`, minted without going through login.
    pub fn token_for(&self, user: &User) -> String {
        self.state
            .auth
            .codec()
            .issue(user.id, &user.username, user.role, Duration::hours(1))
            .unwrap()
            .token
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.expect("request");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(request(Method::GET, uri, token, None)).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.send(request(Method::POST, uri, token, Some(body))).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.send(request(Method::PUT, uri, token, Some(body))).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(request(Method::DELETE, uri, token, None)).await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
