use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::json;

use userlink_auth::InMemoryCredentialStore;
use userlink_core::UserId;
use userlink_infra::{Config, InMemoryReplicaStore, ReplicaStore};

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn serve(app: axum::Router) -> Self {
        // Same router as prod, but bound to an ephemeral port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    async fn spawn_auth() -> Self {
        let env: HashMap<&str, &str> = HashMap::from([
            ("AUTH_SECRET_KEY", SECRET),
            ("AUTH_HASH_ITERATIONS", "1"),
            ("AUTH_HASH_MEMORY_KIB", "8"),
        ]);
        let config = Config::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        let auth = userlink_api::app::services::auth_service(
            &config,
            Arc::new(InMemoryCredentialStore::new()),
        )
        .unwrap();

        Self::serve(userlink_api::app::build_auth_app(auth)).await
    }

    async fn spawn_replica(replica: InMemoryReplicaStore) -> Self {
        Self::serve(userlink_api::app::build_replica_app(Arc::new(replica))).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint(claims: serde_json::Value) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn register(client: &reqwest::Client, srv: &TestServer, username: &str, password: &str) -> reqwest::Response {
    client
        .post(srv.url("/auth/register"))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await
        .unwrap()
}

async fn login(client: &reqwest::Client, srv: &TestServer, username: &str, password: &str) -> reqwest::Response {
    client
        .post(srv.url("/auth/login"))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await
        .unwrap()
}

async fn validate(client: &reqwest::Client, srv: &TestServer, token: &str) -> StatusCode {
    client
        .get(srv.url("/auth/validate"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn_auth().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn register_login_validate() {
    let srv = TestServer::spawn_auth().await;
    let client = reqwest::Client::new();

    let res = register(&client, &srv, "alice", "correctpw").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["user_id"], 1);

    let res = login(&client, &srv, "alice", "correctpw").await;
    assert_eq!(res.status(), StatusCode::OK);
    let tokens: serde_json::Value = res.json().await.unwrap();
    let access = tokens["access_token"].as_str().unwrap();
    assert!(tokens["refresh_token"].as_str().is_some());

    let res = client
        .get(srv.url("/auth/validate"))
        .bearer_auth(access)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["valid"], true);
}

#[tokio::test]
async fn wrong_password_issues_no_tokens() {
    let srv = TestServer::spawn_auth().await;
    let client = reqwest::Client::new();
    register(&client, &srv, "alice", "correctpw").await;

    let res = login(&client, &srv, "alice", "wrongpw").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthenticated");
    assert!(body.get("access_token").is_none());
}

#[tokio::test]
async fn input_and_lookup_errors_map_to_statuses() {
    let srv = TestServer::spawn_auth().await;
    let client = reqwest::Client::new();

    let res = register(&client, &srv, "", "pw").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_input");
    assert_eq!(body["message"], "you must fill the 'Username' value");

    let res = client
        .post(srv.url("/auth/register"))
        .json(&json!({ "username": "bob" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    register(&client, &srv, "bob", "pw").await;
    let res = register(&client, &srv, "bob", "pw2").await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = login(&client, &srv, "ghost", "pw").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(srv.url("/auth/login"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_body");
}

#[tokio::test]
async fn refresh_rotates_and_rejects_garbage() {
    let srv = TestServer::spawn_auth().await;
    let client = reqwest::Client::new();
    register(&client, &srv, "alice", "pw").await;
    let tokens: serde_json::Value = login(&client, &srv, "alice", "pw").await.json().await.unwrap();

    let res = client
        .post(srv.url("/auth/refresh"))
        .json(&json!({ "refresh_token": tokens["refresh_token"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let rotated: serde_json::Value = res.json().await.unwrap();
    assert_eq!(
        validate(&client, &srv, rotated["access_token"].as_str().unwrap()).await,
        StatusCode::OK
    );

    for bad in [json!(""), json!("a.b"), tokens["access_token"].clone()] {
        let res = client
            .post(srv.url("/auth/refresh"))
            .json(&json!({ "refresh_token": bad }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "token {bad}");
    }
}

#[tokio::test]
async fn gate_rejects_bad_headers_and_tokens() {
    let srv = TestServer::spawn_auth().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/auth/validate")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthenticated");

    let exp = (Utc::now() + ChronoDuration::minutes(10)).timestamp();
    let good = mint(json!({ "userId": 1, "username": "alice", "exp": exp }));
    assert_eq!(validate(&client, &srv, &good).await, StatusCode::OK);

    let res = client
        .get(srv.url("/auth/validate"))
        .header("authorization", format!("Token {good}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let string_id = mint(json!({ "userId": "1", "username": "alice", "exp": exp }));
    assert_eq!(validate(&client, &srv, &string_id).await, StatusCode::UNAUTHORIZED);

    let expired = mint(json!({
        "userId": 1,
        "username": "alice",
        "exp": (Utc::now() - ChronoDuration::minutes(1)).timestamp(),
    }));
    assert_eq!(validate(&client, &srv, &expired).await, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn known_users_reflect_the_replica() {
    let replica = InMemoryReplicaStore::new();
    replica.insert_user_id(UserId::new(42)).await.unwrap();
    let srv = TestServer::spawn_replica(replica).await;

    let res = reqwest::get(srv.url("/known-users/42")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["known"], true);

    let res = reqwest::get(srv.url("/known-users/7")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = reqwest::get(srv.url("/known-users/abc")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
