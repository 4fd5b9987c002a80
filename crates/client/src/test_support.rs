// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test helpers: an error assertion macro, an instrumented credential store
//! and an in-process mock of the caltrack API.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use axum::extract::{Form, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post, put};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::config::ClientConfig;
use crate::credential::{CredentialPair, CredentialStore, MemoryStore, StoreFuture};

/// Assert that an expression returns `Err` whose `Display` contains a substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}

static CRYPTO_INIT: Once = Once::new();

/// Install the rustls ring provider once per process; reqwest needs a
/// process-level provider before any client is built.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Memory-backed store that counts calls and can be told to fail writes.
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: MemoryStore,
    gets: AtomicU32,
    sets: AtomicU32,
    clears: AtomicU32,
    fail_writes: AtomicBool,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(pair: CredentialPair) -> Self {
        Self { inner: MemoryStore::with_pair(pair), ..Self::default() }
    }

    /// Stored pair, without counting as a `get`.
    pub fn pair(&self) -> Option<CredentialPair> {
        self.inner.snapshot()
    }

    pub fn get_calls(&self) -> u32 {
        self.gets.load(Ordering::Relaxed)
    }

    pub fn set_calls(&self) -> u32 {
        self.sets.load(Ordering::Relaxed)
    }

    pub fn clear_calls(&self) -> u32 {
        self.clears.load(Ordering::Relaxed)
    }

    /// Make `set` and `clear` fail until switched back.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    fn write_error(&self) -> Option<StoreFuture<'_, ()>> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Some(Box::pin(async { Err(anyhow::anyhow!("disk full")) }));
        }
        None
    }
}

impl CredentialStore for CountingStore {
    fn get(&self) -> StoreFuture<'_, Option<CredentialPair>> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.inner.get()
    }

    fn set(&self, pair: CredentialPair) -> StoreFuture<'_, ()> {
        self.sets.fetch_add(1, Ordering::Relaxed);
        match self.write_error() {
            Some(fail) => fail,
            None => self.inner.set(pair),
        }
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        self.clears.fetch_add(1, Ordering::Relaxed);
        match self.write_error() {
            Some(fail) => fail,
            None => self.inner.clear(),
        }
    }
}

/// Path prefix the mock serves the API under.
pub const API_PREFIX: &str = "/api/v1";

/// Account every mock backend starts with.
pub const DEFAULT_EMAIL: &str = "demo@caltrack.test";
pub const DEFAULT_PASSWORD: &str = "correct-horse";

/// How the mock answers `POST /auth/refresh`.
#[derive(Debug, Clone)]
pub enum RefreshReply {
    /// Issue fresh sequential tokens (`access-N`, `refresh-N`).
    Rotate,
    /// Issue exactly these tokens; `refresh: None` omits the field.
    Issue { access: String, refresh: Option<String> },
    /// Answer `status` with a raw body.
    Reject { status: u16, body: String },
}

/// One request as the mock received it.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
}

struct Account {
    password: String,
    record: Value,
}

struct Backend {
    accounts: Mutex<HashMap<String, Account>>,
    /// Valid access token → account email.
    sessions: Mutex<HashMap<String, String>>,
    /// Known refresh token → account email.
    refresh_owners: Mutex<HashMap<String, String>>,
    seq: AtomicU32,
    refresh_calls: AtomicU32,
    refresh_reply: Mutex<RefreshReply>,
    refresh_delay: Mutex<Duration>,
    login_override: Mutex<Option<Value>>,
    logout_status: Mutex<u16>,
    seen: Mutex<Vec<SeenRequest>>,
}

fn default_record() -> Value {
    json!({
        "id": 1,
        "email": DEFAULT_EMAIL,
        "created_at": "2026-01-05T09:30:00Z",
        "profile": {
            "name": "Demo User",
            "gender": "female",
            "birth_date": "1990-04-12",
            "height_cm": 168.0,
            "weight_kg": 61.5,
            "activity_level_id": 3,
            "activity_level_code": "moderate"
        }
    })
}

impl Backend {
    fn new() -> Self {
        let mut accounts = HashMap::new();
        accounts.insert(
            DEFAULT_EMAIL.to_owned(),
            Account { password: DEFAULT_PASSWORD.to_owned(), record: default_record() },
        );
        Self {
            accounts: Mutex::new(accounts),
            sessions: Mutex::new(HashMap::new()),
            refresh_owners: Mutex::new(HashMap::new()),
            seq: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
            refresh_reply: Mutex::new(RefreshReply::Rotate),
            refresh_delay: Mutex::new(Duration::ZERO),
            login_override: Mutex::new(None),
            logout_status: Mutex::new(200),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn issue(&self, email: &str) -> CredentialPair {
        let n = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let pair = CredentialPair::new(format!("access-{n}"), format!("refresh-{n}"));
        self.sessions.lock().insert(pair.access.clone(), email.to_owned());
        self.refresh_owners.lock().insert(pair.refresh.clone(), email.to_owned());
        pair
    }

    /// Email behind a valid bearer token, or the 401 to send back.
    fn authorize(&self, headers: &HeaderMap) -> Result<String, Response> {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| detail(StatusCode::UNAUTHORIZED, "Not authenticated"))?;
        self.sessions
            .lock()
            .get(token)
            .cloned()
            .ok_or_else(|| detail(StatusCode::UNAUTHORIZED, "Could not validate credentials"))
    }

    fn record(&self, email: &str) -> Option<Value> {
        self.accounts.lock().get(email).map(|a| a.record.clone())
    }
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

fn raw(status: u16, body: String) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(CONTENT_TYPE, "application/json")], body).into_response()
}

fn header_string(headers: &HeaderMap, name: axum::http::HeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
}

async fn record_request(State(b): State<Arc<Backend>>, req: Request, next: Next) -> Response {
    let path = req.uri().path();
    b.seen.lock().push(SeenRequest {
        method: req.method().to_string(),
        path: path.strip_prefix(API_PREFIX).unwrap_or(path).to_owned(),
        authorization: header_string(req.headers(), AUTHORIZATION),
        content_type: header_string(req.headers(), CONTENT_TYPE),
    });
    next.run(req).await
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(State(b): State<Arc<Backend>>, Form(form): Form<LoginForm>) -> Response {
    if let Some(body) = b.login_override.lock().clone() {
        return Json(body).into_response();
    }
    let known = b.accounts.lock().get(&form.username).is_some_and(|a| a.password == form.password);
    if !known {
        return detail(StatusCode::UNAUTHORIZED, "Incorrect email or password");
    }
    let pair = b.issue(&form.username);
    Json(json!({
        "access_token": pair.access,
        "refresh_token": pair.refresh,
        "token_type": "bearer"
    }))
    .into_response()
}

async fn register(State(b): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    let (Some(email), Some(password)) = (body["email"].as_str(), body["password"].as_str()) else {
        let missing = json!({ "detail": [{ "loc": ["body", "email"], "msg": "field required" }] });
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(missing)).into_response();
    };
    let mut accounts = b.accounts.lock();
    if accounts.contains_key(email) {
        return detail(StatusCode::BAD_REQUEST, "Email already registered");
    }
    let record = json!({
        "id": format!("user-{}", accounts.len() + 1),
        "email": email,
        "created_at": "2026-03-01T12:00:00Z",
        "profile": {
            "name": body["name"],
            "gender": body["gender"],
            "birth_date": body["birth_date"],
        }
    });
    accounts.insert(
        email.to_owned(),
        Account { password: password.to_owned(), record: record.clone() },
    );
    (StatusCode::CREATED, Json(record)).into_response()
}

async fn refresh(State(b): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    b.refresh_calls.fetch_add(1, Ordering::Relaxed);
    let delay = *b.refresh_delay.lock();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let presented = body["refresh_token"].as_str().unwrap_or_default();
    let owner = b
        .refresh_owners
        .lock()
        .get(presented)
        .cloned()
        .unwrap_or_else(|| DEFAULT_EMAIL.to_owned());

    let reply = b.refresh_reply.lock().clone();
    match reply {
        RefreshReply::Rotate => {
            let pair = b.issue(&owner);
            Json(json!({ "access_token": pair.access, "refresh_token": pair.refresh }))
                .into_response()
        }
        RefreshReply::Issue { access, refresh } => {
            b.sessions.lock().insert(access.clone(), owner.clone());
            let mut out = json!({ "access_token": access });
            if let Some(refresh) = refresh {
                b.refresh_owners.lock().insert(refresh.clone(), owner);
                out["refresh_token"] = Value::String(refresh);
            }
            Json(out).into_response()
        }
        RefreshReply::Reject { status, body } => raw(status, body),
    }
}

async fn logout(State(b): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    let status = *b.logout_status.lock();
    if status != 200 {
        return raw(status, json!({ "detail": "logout unavailable" }).to_string());
    }
    if let Some(token) = header_string(&headers, AUTHORIZATION) {
        if let Some(token) = token.strip_prefix("Bearer ") {
            b.sessions.lock().remove(token);
        }
    }
    Json(json!({ "ok": true })).into_response()
}

async fn me(State(b): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    let email = match b.authorize(&headers) {
        Ok(email) => email,
        Err(resp) => return resp,
    };
    match b.record(&email) {
        Some(record) => Json(record).into_response(),
        None => detail(StatusCode::NOT_FOUND, "User not found"),
    }
}

async fn update_profile(
    State(b): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let email = match b.authorize(&headers) {
        Ok(email) => email,
        Err(resp) => return resp,
    };
    let mut accounts = b.accounts.lock();
    let Some(account) = accounts.get_mut(&email) else {
        return detail(StatusCode::NOT_FOUND, "User not found");
    };
    if !account.record["profile"].is_object() {
        account.record["profile"] = json!({ "name": "", "gender": "male" });
    }
    for field in ["height_cm", "weight_kg", "activity_level_code"] {
        if let Some(value) = body.get(field) {
            account.record["profile"][field] = value.clone();
        }
    }
    Json(account.record.clone()).into_response()
}

async fn echo(State(b): State<Arc<Backend>>, headers: HeaderMap, body: String) -> Response {
    if let Err(resp) = b.authorize(&headers) {
        return resp;
    }
    Json(json!({
        "authorization": header_string(&headers, AUTHORIZATION),
        "content_type": header_string(&headers, CONTENT_TYPE),
        "trace": header_string(&headers, axum::http::HeaderName::from_static("x-trace-id")),
        "body": body,
    }))
    .into_response()
}

fn router(state: Arc<Backend>) -> Router {
    let api = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/users/me", get(me))
        .route("/users/me/profile", put(update_profile))
        .route("/echo", any(echo))
        .route("/fail/detail", get(|| async { detail(StatusCode::UNPROCESSABLE_ENTITY, "bad input") }))
        .route(
            "/fail/structured",
            get(|| async {
                let body = json!({ "detail": [{ "loc": ["query", "day"], "msg": "invalid date" }] });
                (StatusCode::UNPROCESSABLE_ENTITY, Json(body))
            }),
        )
        .route(
            "/fail/message",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": "boom" }))) }),
        )
        .route("/fail/bare", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route("/fail/unauthorized", any(|| async { detail(StatusCode::UNAUTHORIZED, "Not authenticated") }))
        .route("/empty", get(|| async { StatusCode::NO_CONTENT }))
        .route("/null", get(|| async { raw(200, "null".to_owned()) }))
        .route("/garbage", get(|| async { (StatusCode::OK, "<html>not json</html>") }))
        .with_state(Arc::clone(&state));

    Router::new()
        .nest(API_PREFIX, api)
        .layer(middleware::from_fn_with_state(state, record_request))
}

/// In-process mock of the caltrack API on an ephemeral localhost port.
///
/// Starts with one account ([`DEFAULT_EMAIL`] / [`DEFAULT_PASSWORD`]).
/// Refresh tokens it has never issued are treated as belonging to that
/// account, so tests can seed stores with arbitrary pairs.
pub struct MockBackend {
    addr: SocketAddr,
    state: Arc<Backend>,
}

impl MockBackend {
    pub async fn start() -> anyhow::Result<Self> {
        ensure_crypto();
        let state = Arc::new(Backend::new());
        let app = router(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        Ok(Self { addr, state })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}{API_PREFIX}", self.addr)
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::for_testing(self.base_url())
    }

    /// Accept `access` as a valid token for the default account.
    pub fn grant(&self, access: &str) {
        self.state.sessions.lock().insert(access.to_owned(), DEFAULT_EMAIL.to_owned());
    }

    /// Expire every access token issued so far.
    pub fn expire_all(&self) {
        self.state.sessions.lock().clear();
    }

    pub fn set_refresh_reply(&self, reply: RefreshReply) {
        *self.state.refresh_reply.lock() = reply;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.state.refresh_delay.lock() = delay;
    }

    /// Answer every login with `body` (200) instead of checking the password.
    pub fn set_login_override(&self, body: Option<Value>) {
        *self.state.login_override.lock() = body;
    }

    pub fn set_logout_status(&self, status: u16) {
        *self.state.logout_status.lock() = status;
    }

    pub fn refresh_calls(&self) -> u32 {
        self.state.refresh_calls.load(Ordering::Relaxed)
    }

    /// Every request received, in arrival order. Paths exclude [`API_PREFIX`].
    pub fn requests(&self) -> Vec<SeenRequest> {
        self.state.seen.lock().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<SeenRequest> {
        self.state.seen.lock().iter().filter(|r| r.path == path).cloned().collect()
    }

    /// Stored backend record for `email`.
    pub fn account(&self, email: &str) -> Option<Value> {
        self.state.record(email)
    }
}
