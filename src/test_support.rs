// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for handler and extractor tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use crate::auth::directory::normalize_email;
use crate::auth::{AuthenticatedUser, LocalTokenIssuer, Role, TokenSource, TokenVerifier};
use crate::config::{Config, Environment, LocalTokenConfig};
use crate::mail::{Mailer, OutboxMessage};
use crate::media::{MediaClient, MediaConfig};
use crate::state::AppState;
use crate::storage::{
    AuditEvent, AuditQueue, AuditRepository, Database, StoredUser, UserRepository,
};
use crate::storage::audit::AuditWriter;

pub const TEST_SECRET: &str = "test-local-secret";
pub const TEST_ISSUER: &str = "realty-server-test";

pub struct TestApp {
    pub state: AppState,
    issuer: LocalTokenIssuer,
    audit_writer: Option<AuditWriter>,
    _dir: tempfile::TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_environment(environment: Environment) -> Self {
        Self::with_config(|config| config.environment = environment)
    }

    /// Temp database, local token strategy, audit queue without a running
    /// writer (see [`TestApp::flush_audit`]).
    pub fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::with_database(dir.path().join("test.redb"));
        config.local_tokens = Some(LocalTokenConfig {
            secret: TEST_SECRET.to_string(),
            issuer: TEST_ISSUER.to_string(),
            ttl: Duration::from_secs(3600),
        });
        customize(&mut config);

        let db = Arc::new(Database::open(&config.database_path).unwrap());
        let verifier = TokenVerifier::from_config(config.provider.as_ref(), config.local_tokens.as_ref())
            .unwrap();
        let (audit, audit_writer) = AuditQueue::channel(config.audit_queue_capacity);
        let issuer = LocalTokenIssuer::new(TEST_SECRET.as_bytes(), TEST_ISSUER, Duration::from_secs(3600));

        Self {
            state: AppState::new(db, config, verifier, audit),
            issuer,
            audit_writer: Some(audit_writer),
            _dir: dir,
        }
    }

    /// Attach an in-memory mailer and return its outbox.
    pub fn with_outbox(&mut self) -> Arc<Mutex<Vec<OutboxMessage>>> {
        let (mailer, outbox) = Mailer::in_memory("Realty Listings <noreply@realty.test>").unwrap();
        self.state = self.state.clone().with_mailer(mailer);
        outbox
    }

    /// Attach a media client pointed at a local stand-in for the image
    /// host. Returns the public ids the host was asked to destroy.
    pub async fn with_media_host(&mut self) -> Arc<Mutex<Vec<String>>> {
        let (base, destroyed) = spawn_media_host().await;
        let media = MediaClient::new(MediaConfig {
            cloud_name: "demo".to_string(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            api_base: base,
            folder: "realty".to_string(),
        })
        .unwrap();
        self.state = self.state.clone().with_media(media);
        destroyed
    }

    pub fn router(&self) -> Router {
        crate::api::router(self.state.clone())
    }

    /// Store a user record directly.
    pub fn seed_user(&self, email: &str, role: Role) -> StoredUser {
        let email = normalize_email(email);
        let name = email.split('@').next().unwrap_or_default().to_string();
        let mut user = StoredUser::new(email, name);
        user.role = role;
        UserRepository::new(&self.state.db).create(&user).unwrap();
        user
    }

    /// A local token for `email`, whether or not a record exists.
    pub fn token_for(&self, email: &str) -> String {
        let identity = AuthenticatedUser {
            user_id: uuid::Uuid::new_v4().to_string(),
            email: normalize_email(email),
            name: "Test User".to_string(),
            role: Role::User,
            provider_subject: None,
            source: TokenSource::Local,
            session_id: None,
        };
        self.issuer.issue(&identity).unwrap().token
    }

    pub fn bearer_for(&self, email: &str) -> String {
        format!("Bearer {}", self.token_for(email))
    }

    /// Write every queued audit event and return the full log.
    ///
    /// Closes the queue: later events are dropped.
    pub async fn flush_audit(&mut self) -> Vec<AuditEvent> {
        if let Some(writer) = self.audit_writer.take() {
            let stop = CancellationToken::new();
            stop.cancel();
            writer.run(Arc::clone(&self.state.db), stop).await;
        }
        AuditRepository::new(&self.state.db).list().unwrap()
    }

    /// Send one request through the full router, returning status and JSON body.
    pub async fn call(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}

/// Build a JSON request, optionally authenticated as `bearer`.
pub fn json_request(
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(bearer) = bearer {
        builder = builder.header("Authorization", bearer);
    }
    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Local image host: uploads are stored as `{folder}/upload`, destroy
/// requests are recorded and always succeed.
async fn spawn_media_host() -> (String, Arc<Mutex<Vec<String>>>) {
    use axum::extract::{Form, Multipart, State};
    use axum::routing::post;
    use axum::Json;
    use std::collections::HashMap;

    async fn upload(mut form: Multipart) -> Json<serde_json::Value> {
        let mut folder = String::new();
        while let Some(field) = form.next_field().await.unwrap() {
            if field.name() == Some("folder") {
                folder = field.text().await.unwrap();
            }
        }
        Json(serde_json::json!({
            "secure_url": format!("https://img.test/{folder}/upload.jpg"),
            "public_id": format!("{folder}/upload"),
        }))
    }

    async fn destroy(
        State(destroyed): State<Arc<Mutex<Vec<String>>>>,
        Form(form): Form<HashMap<String, String>>,
    ) -> Json<serde_json::Value> {
        if let Some(public_id) = form.get("public_id") {
            destroyed.lock().unwrap().push(public_id.clone());
        }
        Json(serde_json::json!({ "result": "ok" }))
    }

    let destroyed = Arc::new(Mutex::new(Vec::new()));
    let host = Router::new()
        .route("/demo/image/upload", post(upload))
        .route("/demo/image/destroy", post(destroy))
        .with_state(Arc::clone(&destroyed));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, host).await.unwrap();
    });
    (base, destroyed)
}

/// Build a `multipart/form-data` request carrying one `file` part.
pub fn upload_request(
    uri: &str,
    bearer: Option<&str>,
    file_name: &str,
    content_type: &str,
    bytes: &[u8],
) -> Request<Body> {
    const BOUNDARY: &str = "realty-test-boundary";
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
         Content-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", format!("multipart/form-data; boundary={BOUNDARY}"));
    if let Some(bearer) = bearer {
        builder = builder.header("Authorization", bearer);
    }
    builder.body(Body::from(body)).unwrap()
}

/// Wait up to a second for spawned cleanup to reach the image host.
pub async fn wait_for_destroyed(destroyed: &Mutex<Vec<String>>, count: usize) -> Vec<String> {
    for _ in 0..50 {
        if destroyed.lock().unwrap().len() >= count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    destroyed.lock().unwrap().clone()
}
