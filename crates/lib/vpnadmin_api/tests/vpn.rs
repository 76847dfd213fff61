//! VPN address management and the VPN server credential check.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{DateTime, Duration, Utc};
use common::{PASSWORD, TestApp, test_config};
use serde_json::json;
use vpnadmin_api::handlers::users::ALLOCATION_ATTEMPTS;
use vpnadmin_core::models::{ListScope, NewUser, Role, User};
use vpnadmin_core::store::{MemoryUserStore, StoreResult, UserStore};

const VPN_TOKEN: &str = "vpn-shared-secret";

fn vpn_app() -> TestApp {
    let mut config = test_config();
    config.vpn_network = Some("10.8.0.0/24".into());
    config.vpn_server_ip = Some("10.8.0.1".into());
    config.vpn_token = Some(VPN_TOKEN.into());
    TestApp::new(config)
}

fn vpn_auth(token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/vpn-auth/authenticate")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("x-vpn-token", token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn address_endpoints_reflect_assignments() {
    let t = vpn_app();
    let admin = t.seed("root", Role::Admin, None).await;
    t.seed_with("alice", Role::User, None, |u| {
        u.vpn_ip = Some("10.8.0.2".into())
    })
    .await;
    let token = t.token_for(&admin);

    let next = t.get("/vpn/next-ip", Some(&token)).await;
    assert_eq!(next.status, StatusCode::OK);
    assert_eq!(next.body["ip"], "10.8.0.3");

    let info = t.get("/vpn/network-info", Some(&token)).await;
    assert_eq!(info.status, StatusCode::OK);
    assert_eq!(info.body["network"], "10.8.0.0/24");
    assert_eq!(info.body["server_ip"], "10.8.0.1");
    assert_eq!(info.body["total_usable"], 254);
    assert_eq!(info.body["used"], 2);
    assert_eq!(info.body["available"], 252);

    let used = t.get("/vpn/used-ips", Some(&token)).await;
    assert_eq!(used.body["ips"], json!(["10.8.0.2"]));
    assert_eq!(used.body["count"], 1);
}

#[tokio::test]
async fn validate_ip_reports_reason_without_failing() {
    let t = vpn_app();
    let admin = t.seed("root", Role::Admin, None).await;
    let alice = t
        .seed_with("alice", Role::User, None, |u| {
            u.vpn_ip = Some("10.8.0.2".into())
        })
        .await;
    let token = t.token_for(&admin);

    let cases = [
        (json!({"ip": "10.8.0.1"}), false, Some("IP_RESERVED_FOR_SERVER")),
        (json!({"ip": "10.9.0.5"}), false, Some("IP_OUT_OF_RANGE")),
        (json!({"ip": "not-an-ip"}), false, Some("INVALID_IP")),
        (json!({"ip": "10.8.0.2"}), false, Some("IP_ALREADY_USED")),
        (json!({"ip": "10.8.0.2", "exclude_user_id": alice.id}), true, None),
        (json!({"ip": "10.8.0.50"}), true, None),
    ];
    for (body, valid, code) in cases {
        let resp = t.post("/vpn/validate-ip", Some(&token), body.clone()).await;
        assert_eq!(resp.status, StatusCode::OK, "{body}");
        assert_eq!(resp.body["valid"], valid, "{body}");
        match code {
            Some(code) => {
                assert_eq!(resp.body["code"], code, "{body}");
                assert!(resp.body["message"].is_string());
            }
            None => assert!(resp.body.get("code").is_none(), "{body}"),
        }
    }
}

#[tokio::test]
async fn unconfigured_network_is_unavailable() {
    let t = TestApp::new(test_config());
    let admin = t.seed("root", Role::Admin, None).await;
    let resp = t.get("/vpn/next-ip", Some(&t.token_for(&admin))).await;
    assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(resp.body["code"], "VPN_NETWORK_NOT_CONFIGURED");
}

#[tokio::test]
async fn any_signed_in_user_can_query_addresses() {
    let t = vpn_app();
    let user = t.seed("usr", Role::User, None).await;
    let token = t.token_for(&user);
    for uri in ["/vpn/next-ip", "/vpn/network-info", "/vpn/used-ips"] {
        assert_eq!(t.get(uri, Some(&token)).await.status, StatusCode::OK, "{uri}");
    }
    let check = t
        .post("/vpn/validate-ip", Some(&token), json!({"ip": "10.8.0.9"}))
        .await;
    assert_eq!(check.status, StatusCode::OK);
    assert_eq!(check.body["valid"], true);

    assert_eq!(
        t.get("/vpn/next-ip", None).await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        t.post("/vpn/validate-ip", None, json!({"ip": "10.8.0.9"}))
            .await
            .status,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn malformed_server_ip_is_a_configuration_error() {
    let mut config = test_config();
    config.vpn_network = Some("10.8.0.0/24".into());
    config.vpn_server_ip = Some("10.8.0.300".into());
    let t = TestApp::new(config);
    let admin = t.seed("root", Role::Admin, None).await;
    let token = t.token_for(&admin);

    let check = t
        .post("/vpn/validate-ip", Some(&token), json!({"ip": "10.8.0.9"}))
        .await;
    assert_eq!(check.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(check.body["code"], "VPN_INVALID_NETWORK");

    let next = t.get("/vpn/next-ip", Some(&token)).await;
    assert_eq!(next.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn created_users_get_distinct_addresses() {
    let t = vpn_app();
    let admin = t.seed("root", Role::Admin, None).await;
    let token = t.token_for(&admin);
    let (app, token) = (&t, token.as_str());

    let create = move |name: &'static str| {
        app.post(
            "/users",
            Some(token),
            json!({
                "username": name,
                "email": format!("{name}@example.com"),
                "password": PASSWORD,
            }),
        )
    };
    let (a, b) = tokio::join!(create("one"), create("two"));
    assert_eq!(a.status, StatusCode::CREATED);
    assert_eq!(b.status, StatusCode::CREATED);

    let mut ips = vec![
        a.body["vpn_ip"].as_str().unwrap().to_string(),
        b.body["vpn_ip"].as_str().unwrap().to_string(),
    ];
    ips.sort();
    assert_eq!(ips, vec!["10.8.0.2", "10.8.0.3"]);
}

/// Hands the address picked for each create to another account first, as a
/// concurrent request would, for up to `races` creates.
struct ContendedStore {
    inner: Arc<MemoryUserStore>,
    races: usize,
    raced: AtomicUsize,
}

impl ContendedStore {
    fn new(inner: Arc<MemoryUserStore>, races: usize) -> Self {
        Self {
            inner,
            races,
            raced: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl UserStore for ContendedStore {
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.inner.find_by_username(username).await
    }

    async fn list(&self, scope: ListScope) -> StoreResult<Vec<User>> {
        self.inner.list(scope).await
    }

    async fn create(&self, user: NewUser) -> StoreResult<User> {
        if user.vpn_ip.is_some() {
            let n = self.raced.load(Ordering::SeqCst);
            if n < self.races {
                self.raced.store(n + 1, Ordering::SeqCst);
                let mut rival = user.clone();
                rival.username = format!("rival{n}");
                rival.email = format!("rival{n}@example.com");
                self.inner.create(rival).await?;
            }
        }
        self.inner.create(user).await
    }

    async fn update(&self, user: &User) -> StoreResult<User> {
        self.inner.update(user).await
    }

    async fn record_login_state(
        &self,
        id: i64,
        failed_login_attempts: i32,
        locked_until: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        self.inner
            .record_login_state(id, failed_login_attempts, locked_until)
            .await
    }

    async fn soft_delete(&self, id: i64) -> StoreResult<()> {
        self.inner.soft_delete(id).await
    }

    async fn assigned_vpn_ips(&self) -> StoreResult<Vec<(i64, String)>> {
        self.inner.assigned_vpn_ips().await
    }
}

fn contended_app(races: usize) -> (TestApp, Arc<ContendedStore>) {
    let mut config = test_config();
    config.vpn_network = Some("10.8.0.0/24".into());
    config.vpn_server_ip = Some("10.8.0.1".into());
    let memory = Arc::new(MemoryUserStore::new());
    let contended = Arc::new(ContendedStore::new(memory.clone(), races));
    (
        TestApp::with_store(config, memory, contended.clone()),
        contended,
    )
}

fn carl() -> serde_json::Value {
    json!({
        "username": "carl",
        "email": "carl@example.com",
        "password": PASSWORD,
    })
}

#[tokio::test]
async fn create_repicks_when_the_allocated_address_is_taken() {
    let (t, contended) = contended_app(1);
    let admin = t.seed("root", Role::Admin, None).await;

    let resp = t.post("/users", Some(&t.token_for(&admin)), carl()).await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.body["vpn_ip"], "10.8.0.3");
    assert_eq!(contended.raced.load(Ordering::SeqCst), 1);

    let used = t.get("/vpn/used-ips", Some(&t.token_for(&admin))).await;
    assert_eq!(used.body["ips"], json!(["10.8.0.2", "10.8.0.3"]));
}

#[tokio::test]
async fn create_gives_up_after_repeated_collisions() {
    let (t, contended) = contended_app(usize::MAX);
    let admin = t.seed("root", Role::Admin, None).await;

    let resp = t.post("/users", Some(&t.token_for(&admin)), carl()).await;
    assert_eq!(resp.status, StatusCode::CONFLICT);
    assert_eq!(resp.body["code"], "IP_ALREADY_USED");
    assert_eq!(contended.raced.load(Ordering::SeqCst), ALLOCATION_ATTEMPTS);
    assert!(t.store.find_by_username("carl").await.unwrap().is_none());
}

#[tokio::test]
async fn explicit_address_is_validated_on_create_and_update() {
    let t = vpn_app();
    let admin = t.seed("root", Role::Admin, None).await;
    let alice = t
        .seed_with("alice", Role::User, None, |u| {
            u.vpn_ip = Some("10.8.0.2".into())
        })
        .await;
    let bob = t.seed("bob", Role::User, None).await;
    let token = t.token_for(&admin);

    let taken = t
        .post(
            "/users",
            Some(&token),
            json!({
                "username": "carl",
                "email": "carl@example.com",
                "password": PASSWORD,
                "vpn_ip": "10.8.0.2",
            }),
        )
        .await;
    assert_eq!(taken.status, StatusCode::CONFLICT);
    assert_eq!(taken.body["code"], "IP_ALREADY_USED");

    let outside = t
        .put(&format!("/users/{}", bob.id), Some(&token), json!({"vpn_ip": "192.168.1.1"}))
        .await;
    assert_eq!(outside.status, StatusCode::BAD_REQUEST);
    assert_eq!(outside.body["code"], "IP_OUT_OF_RANGE");

    // Re-saving a user's own address is not a collision.
    let same = t
        .put(&format!("/users/{}", alice.id), Some(&token), json!({"vpn_ip": "10.8.0.2"}))
        .await;
    assert_eq!(same.status, StatusCode::OK);

    let released = t
        .put(&format!("/users/{}", alice.id), Some(&token), json!({"vpn_ip": ""}))
        .await;
    assert_eq!(released.status, StatusCode::OK);
    assert!(released.body["vpn_ip"].is_null());
    assert_eq!(
        t.get("/vpn/next-ip", Some(&token)).await.body["ip"],
        "10.8.0.2"
    );
}

#[tokio::test]
async fn vpn_auth_requires_the_shared_token() {
    let t = vpn_app();
    t.seed("alice", Role::User, None).await;
    let body = json!({"username": "alice", "password": PASSWORD}).to_string();

    assert_eq!(
        t.send(vpn_auth(None, &body)).await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        t.send(vpn_auth(Some("wrong"), &body)).await.status,
        StatusCode::UNAUTHORIZED
    );

    let unconfigured = TestApp::new(test_config());
    assert_eq!(
        unconfigured.send(vpn_auth(Some(VPN_TOKEN), &body)).await.status,
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn vpn_auth_answers_logical_failures_with_200() {
    let t = vpn_app();
    let alice = t
        .seed_with("alice", Role::User, None, |u| {
            u.vpn_ip = Some("10.8.0.2".into())
        })
        .await;
    t.seed_with("idle", Role::User, None, |u| u.is_active = false)
        .await;
    let yesterday = Utc::now().date_naive() - Duration::days(1);
    t.seed_with("gone", Role::User, None, |u| u.valid_to = Some(yesterday))
        .await;

    let ok = t
        .send(vpn_auth(
            Some(VPN_TOKEN),
            &json!({"username": "alice", "password": PASSWORD}).to_string(),
        ))
        .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["success"], true);
    assert_eq!(ok.body["user_id"], alice.id);
    assert_eq!(ok.body["vpn_ip"], "10.8.0.2");

    let denied = [
        ("alice", "wrong-password", "Invalid credentials"),
        ("nobody", PASSWORD, "Invalid credentials"),
        ("idle", PASSWORD, "User account is inactive"),
        ("gone", PASSWORD, "User account has expired"),
    ];
    for (username, password, message) in denied {
        let resp = t
            .send(vpn_auth(
                Some(VPN_TOKEN),
                &json!({"username": username, "password": password}).to_string(),
            ))
            .await;
        assert_eq!(resp.status, StatusCode::OK, "{username}");
        assert_eq!(resp.body["success"], false, "{username}");
        assert_eq!(resp.body["message"], message, "{username}");
    }

    let malformed = t.send(vpn_auth(Some(VPN_TOKEN), "{not json")).await;
    assert_eq!(malformed.status, StatusCode::UNAUTHORIZED);
}
