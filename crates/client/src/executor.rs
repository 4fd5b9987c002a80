// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated request execution with one refresh-and-replay per request.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::credential::refresh::REFRESH_PATH;
use crate::credential::{CredentialStore, Credentials, RefreshCoordinator};
use crate::error::{error_message, AuthError};

const JSON: &str = "application/json";
const FORM: &str = "application/x-www-form-urlencoded";

/// Where a request stands in the expiry protocol.
///
/// A `First` attempt that hits a 401 may trigger one renewal and is then
/// replayed as `Retried`; a 401 on a `Retried` attempt is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retried,
}

#[derive(Debug, Clone)]
enum Body {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

/// Immutable description of one API call, replayable as-is.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Body,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), headers: HeaderMap::new(), body: Body::Empty }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// JSON body; default content type `application/json`.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Body::Json(body);
        self
    }

    /// URL-encoded form body; default content type
    /// `application/x-www-form-urlencoded`.
    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        self.body =
            Body::Form(fields.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect());
        self
    }

    /// Extra header. Overrides the default content type, but never the
    /// `Authorization` header attached from stored credentials.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Calls to the renewal endpoint never enter the refresh protocol.
    pub fn is_renewal(&self) -> bool {
        let path = self.path.trim_end_matches('/');
        path == REFRESH_PATH || path == REFRESH_PATH.trim_start_matches('/')
    }

    /// Final header set for an attempt carrying `access_token`.
    pub fn headers_for(&self, access_token: Option<&str>) -> HeaderMap {
        let default_type = match self.body {
            Body::Form(_) => FORM,
            Body::Empty | Body::Json(_) => JSON,
        };
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(default_type));
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
        if let Some(token) = access_token {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("stored access token is not a valid header value, sending without"),
            }
        }
        headers
    }
}

/// Sends [`ApiRequest`]s with the current access token and runs the expiry
/// protocol on 401. Cheap to clone; clones share credentials and the
/// refresh coordinator.
#[derive(Clone)]
pub struct RequestExecutor {
    config: ClientConfig,
    http: reqwest::Client,
    credentials: Arc<Credentials>,
    coordinator: Arc<RefreshCoordinator>,
}

impl RequestExecutor {
    /// Wire up an HTTP client, a credential vault over `store` and a fresh
    /// refresh coordinator.
    pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self, AuthError> {
        let http = config.build_http_client()?;
        let credentials = Credentials::new(store);
        let coordinator =
            RefreshCoordinator::new(&config, http.clone(), Arc::clone(&credentials));
        Ok(Self { config, http, credentials, coordinator })
    }

    /// Assemble from existing parts, e.g. to share one coordinator.
    pub fn from_parts(
        config: ClientConfig,
        http: reqwest::Client,
        credentials: Arc<Credentials>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self { config, http, credentials, coordinator }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn credentials(&self) -> &Arc<Credentials> {
        &self.credentials
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Perform `request` as a first attempt.
    ///
    /// Returns the parsed JSON body, or `None` for an empty or unparseable
    /// 2xx body.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Option<Value>, AuthError> {
        self.execute_attempt(request, Attempt::First).await
    }

    /// Perform `request` and deserialize the payload into `T`.
    pub async fn execute_as<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, AuthError> {
        let payload = self.execute(request).await?.ok_or_else(|| {
            AuthError::UnexpectedPayload(format!("{} {}: empty body", request.method, request.path))
        })?;
        serde_json::from_value(payload).map_err(|e| {
            AuthError::UnexpectedPayload(format!("{} {}: {e}", request.method, request.path))
        })
    }

    /// Perform `request` starting from `attempt`.
    pub async fn execute_attempt(
        &self,
        request: &ApiRequest,
        attempt: Attempt,
    ) -> Result<Option<Value>, AuthError> {
        let mut attempt = attempt;
        loop {
            let sent = self.credentials.access_token().await?;
            let (status, body) = self.send(request, sent.as_deref()).await?;
            debug!(
                method = %request.method,
                path = %request.path,
                status = status.as_u16(),
                ?attempt,
                "api call"
            );

            if status != StatusCode::UNAUTHORIZED {
                return decode(status, &body);
            }

            let message = error_message(status.as_u16(), &body);
            if request.is_renewal() {
                return Err(AuthError::ExpiredFirstAttempt(message));
            }
            match attempt {
                Attempt::Retried => {
                    warn!(path = %request.path, "unauthorized after renewal, ending session");
                    self.clear_credentials("unauthorized after renewal").await;
                    return Err(AuthError::ExpiredAfterRetry(message));
                }
                Attempt::First => {
                    self.renew(sent.as_deref()).await?;
                    attempt = Attempt::Retried;
                }
            }
        }
    }

    /// Make sure a newer access token than `sent_access` is stored.
    async fn renew(&self, sent_access: Option<&str>) -> Result<(), AuthError> {
        let current = self.credentials.current().await?;

        if let Some(pair) = current.as_deref() {
            if sent_access != Some(pair.access.as_str()) {
                // A renewal landed after this attempt left; just replay.
                debug!("access token changed since send, replaying without renewal");
                return Ok(());
            }
        }

        let Some(pair) = current else {
            self.clear_credentials("no refresh credential").await;
            return Err(AuthError::NoRefreshCredential);
        };

        // On failure the coordinator has already cleared the store.
        self.coordinator.request_refresh(Some(pair.refresh.clone())).await.map(|_| ())
    }

    async fn send(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<(StatusCode, Vec<u8>), AuthError> {
        let url = self.config.endpoint(&request.path);
        let mut builder = self.http.request(request.method.clone(), &url);
        builder = match &request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Form(fields) => builder.form(fields),
        };
        let resp = builder.headers(request.headers_for(access_token)).send().await?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(|e| {
            debug!(path = %request.path, err = %e, "failed to read response body");
            AuthError::from(e)
        })?;
        Ok((status, body.to_vec()))
    }

    async fn clear_credentials(&self, reason: &str) {
        if let Err(e) = self.credentials.clear(reason).await {
            warn!(err = %e, "failed to clear credentials");
        }
    }
}

fn decode(status: StatusCode, body: &[u8]) -> Result<Option<Value>, AuthError> {
    if !status.is_success() {
        let code = status.as_u16();
        return Err(AuthError::Http { status: code, message: error_message(code, body) });
    }
    Ok(parse_payload(body))
}

/// Parse a 2xx body; empty, `null` or malformed bodies are an absent payload.
fn parse_payload(body: &[u8]) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Null) => None,
        Ok(value) => Some(value),
        Err(e) => {
            debug!(err = %e, "ignoring unparseable response body");
            None
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
