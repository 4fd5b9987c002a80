// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight token renewal.
//!
//! However many requests observe an expired access token at once, only one
//! `POST /auth/refresh` is made. Everyone else parks a one-shot waiter and
//! receives the same outcome when that renewal finishes.

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::credential::{CredentialPair, Credentials};
use crate::error::{error_message, AuthError};
use crate::event::AuthEvent;

/// Path of the renewal endpoint, relative to the API base URL.
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Message used when the renewal answers 2xx without an access token.
const MISSING_ACCESS_TOKEN: &str = "SESSION_EXPIRED";

type RefreshOutcome = Result<Arc<CredentialPair>, AuthError>;
type Waiter = oneshot::Sender<RefreshOutcome>;

enum RefreshState {
    Idle,
    /// A renewal is running; waiters in arrival order.
    Refreshing { waiters: Vec<Waiter> },
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Owns the renewal state for one client. Share it as `Arc<RefreshCoordinator>`.
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    credentials: Arc<Credentials>,
    http: reqwest::Client,
    refresh_url: String,
}

impl RefreshCoordinator {
    pub fn new(
        config: &ClientConfig,
        http: reqwest::Client,
        credentials: Arc<Credentials>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RefreshState::Idle),
            credentials,
            http,
            refresh_url: config.endpoint(REFRESH_PATH),
        })
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.state.lock(), RefreshState::Refreshing { .. })
    }

    /// Obtain a renewed pair, starting a renewal only if none is in flight.
    ///
    /// The renewal runs on its own task: dropping this future stops the
    /// caller from waiting but never cancels the renewal, which still
    /// updates the store and releases every other waiter.
    pub async fn request_refresh(
        self: &Arc<Self>,
        refresh_token: Option<String>,
    ) -> RefreshOutcome {
        let Some(refresh_token) = refresh_token else {
            return Err(AuthError::NoRefreshCredential);
        };

        let (tx, rx) = oneshot::channel();
        // Check-and-set and enqueue in one critical section; no await inside.
        let leader = {
            let mut state = self.state.lock();
            match &mut *state {
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing { waiters: vec![tx] };
                    true
                }
                RefreshState::Refreshing { waiters } => {
                    waiters.push(tx);
                    false
                }
            }
        };

        if leader {
            let epoch = self.credentials.epoch();
            debug!(epoch, "starting token renewal");
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run_renewal(refresh_token, epoch).await });
        } else {
            debug!("token renewal in flight, waiting");
        }

        rx.await.unwrap_or_else(|_| Err(AuthError::RefreshRejected("renewal aborted".into())))
    }

    async fn run_renewal(&self, refresh_token: String, epoch: u64) {
        let outcome = match self.exchange(&refresh_token).await {
            Ok(pair) => self.credentials.replace_if_epoch(pair, epoch).await,
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(_) => {
                info!("token renewal succeeded");
                self.credentials.publish(AuthEvent::CredentialsRefreshed);
            }
            Err(e) => {
                warn!(code = e.as_str(), err = %e, "token renewal failed");
                // Cleared once per episode, before any waiter wakes. A clear
                // that already happened during the episode (sign-out) counts.
                if self.credentials.epoch() == epoch {
                    if let Err(clear_err) = self.credentials.clear("token renewal failed").await {
                        warn!(err = %clear_err, "failed to clear credentials after renewal failure");
                    }
                }
                self.credentials.publish(AuthEvent::RefreshFailed { error: e.to_string() });
            }
        }

        let waiters = match mem::replace(&mut *self.state.lock(), RefreshState::Idle) {
            RefreshState::Refreshing { waiters } => waiters,
            RefreshState::Idle => Vec::new(),
        };
        debug!(waiters = waiters.len(), "releasing renewal waiters");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    /// One call to the renewal endpoint. Never goes through the executor.
    async fn exchange(&self, refresh_token: &str) -> Result<CredentialPair, AuthError> {
        let resp = self
            .http
            .post(&self.refresh_url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.bytes().await.unwrap_or_default();

        if !status.is_success() {
            return Err(AuthError::RefreshRejected(error_message(status.as_u16(), &body)));
        }

        let parsed: Option<RefreshResponse> = serde_json::from_slice(&body).ok();
        let Some(RefreshResponse { access_token: Some(access), refresh_token: new_refresh }) =
            parsed
        else {
            return Err(AuthError::RefreshRejected(MISSING_ACCESS_TOKEN.into()));
        };
        if access.is_empty() {
            return Err(AuthError::RefreshRejected(MISSING_ACCESS_TOKEN.into()));
        }

        // An omitted refresh token means the old one stays valid.
        let refresh =
            new_refresh.filter(|r| !r.is_empty()).unwrap_or_else(|| refresh_token.to_owned());
        Ok(CredentialPair { access, refresh })
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
