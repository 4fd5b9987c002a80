// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sign-in, sign-up, sign-out and profile edits on top of the executor.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::credential::{CredentialPair, CredentialStore};
use crate::error::{detail_message, AuthError};
use crate::event::AuthEvent;
use crate::executor::{ApiRequest, RequestExecutor};
use crate::profile::{BackendUser, ProfileUpdate, RegistrationData, User};

const LOGIN_PATH: &str = "/auth/login";
const REGISTER_PATH: &str = "/auth/register";
const LOGOUT_PATH: &str = "/auth/logout";
const ME_PATH: &str = "/users/me";
const PROFILE_PATH: &str = "/users/me/profile";

/// Message used when the login endpoint rejects without a `detail`.
const LOGIN_FAILED: &str = "LOGIN_FAILED";

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(User),
}

#[derive(Debug, Default, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// The signed-in user and the operations that change it.
///
/// The session is authenticated only while it holds a confirmed profile
/// and the vault still holds a credential pair; any component clearing the
/// vault (a failed renewal, a 401 after retry) signs the session out.
pub struct AuthSession {
    executor: RequestExecutor,
    user: Mutex<Option<User>>,
    login_url: String,
}

impl AuthSession {
    pub fn new(executor: RequestExecutor) -> Self {
        let login_url = executor.config().endpoint(LOGIN_PATH);
        Self { executor, user: Mutex::new(None), login_url }
    }

    pub fn from_config(
        config: ClientConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, AuthError> {
        Ok(Self::new(RequestExecutor::new(config, store)?))
    }

    /// Executor for other authenticated calls sharing this session's
    /// credentials and refresh coordinator.
    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub fn state(&self) -> SessionState {
        match &*self.user.lock() {
            Some(user) if self.executor.credentials().is_present() => {
                SessionState::Authenticated(user.clone())
            }
            _ => SessionState::Unauthenticated,
        }
    }

    pub fn user(&self) -> Option<User> {
        match self.state() {
            SessionState::Authenticated(user) => Some(user),
            SessionState::Unauthenticated => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state(), SessionState::Authenticated(_))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.executor.credentials().subscribe()
    }

    /// Exchange an identifier (email) and secret for a credential pair, then
    /// confirm it by fetching the profile. Never retried.
    ///
    /// Any failure leaves the session unauthenticated, including when a
    /// previous user was signed in.
    pub async fn sign_in(&self, identifier: &str, secret: &str) -> Result<User, AuthError> {
        match self.exchange_login(identifier, secret).await {
            Ok(pair) => self.executor.credentials().replace(pair).await?,
            Err(e) => {
                self.abandon_session("sign-in failed").await;
                return Err(e);
            }
        };

        match self.fetch_profile().await {
            Ok(user) => {
                info!(user_id = %user.id, "signed in");
                *self.user.lock() = Some(user.clone());
                self.executor
                    .credentials()
                    .publish(AuthEvent::SignedIn { user_id: user.id.clone() });
                Ok(user)
            }
            Err(e) => {
                warn!(err = %e, "profile fetch after sign-in failed");
                self.abandon_session("profile fetch failed").await;
                Err(AuthError::ProfileFetchFailed(Box::new(e)))
            }
        }
    }

    async fn exchange_login(
        &self,
        identifier: &str,
        secret: &str,
    ) -> Result<CredentialPair, AuthError> {
        // Straight to the endpoint: a 401 here means bad credentials, not expiry.
        let resp = self
            .executor
            .http()
            .post(&self.login_url)
            .form(&[("username", identifier), ("password", secret)])
            .send()
            .await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        if !status.is_success() {
            let message = detail_message(&body).unwrap_or_else(|| LOGIN_FAILED.to_owned());
            warn!(status = status.as_u16(), err = %message, "sign-in rejected");
            return Err(AuthError::InvalidCredentials(message));
        }

        let tokens: LoginResponse = serde_json::from_slice(&body).unwrap_or_default();
        match (
            tokens.access_token.filter(|t| !t.is_empty()),
            tokens.refresh_token.filter(|t| !t.is_empty()),
        ) {
            (Some(access), Some(refresh)) => Ok(CredentialPair { access, refresh }),
            _ => {
                warn!("sign-in response carried no token pair");
                Err(AuthError::InvalidLoginResponse)
            }
        }
    }

    /// Drop the local user and any stored pair that is still there. A pair
    /// already cleared by a failed renewal is not cleared again.
    async fn abandon_session(&self, reason: &str) {
        *self.user.lock() = None;
        match self.executor.credentials().current().await {
            Ok(Some(_)) => {
                if let Err(e) = self.executor.credentials().clear(reason).await {
                    warn!(err = %e, "failed to clear credentials");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(err = %e, "could not read credentials"),
        }
    }

    /// Register, then sign in with the same email and password.
    pub async fn sign_up(&self, data: &RegistrationData) -> Result<User, AuthError> {
        let body = serde_json::to_value(data)
            .map_err(|e| AuthError::UnexpectedPayload(format!("registration body: {e}")))?;
        self.executor.execute(&ApiRequest::post(REGISTER_PATH).json(body)).await?;
        debug!(email = %data.email, "registered");
        self.sign_in(&data.email, &data.password).await
    }

    /// Tell the server (best effort), then drop local state and clear the
    /// store. Local sign-out always happens; only a store failure is
    /// returned.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        match self.executor.credentials().current().await {
            Ok(Some(_)) => {
                if let Err(e) = self.executor.execute(&ApiRequest::post(LOGOUT_PATH)).await {
                    warn!(err = %e, "logout request failed, signing out locally");
                }
            }
            Ok(None) => debug!("no stored credentials, skipping logout request"),
            Err(e) => warn!(err = %e, "could not read credentials before logout"),
        }

        *self.user.lock() = None;
        let result = self.executor.credentials().clear("signed out").await;
        self.executor.credentials().publish(AuthEvent::SignedOut);
        info!("signed out");
        result
    }

    /// Send a partial profile edit; the server's normalized response
    /// replaces the local user.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, AuthError> {
        let body = serde_json::to_value(update)
            .map_err(|e| AuthError::UnexpectedPayload(format!("profile body: {e}")))?;
        let request = ApiRequest::put(PROFILE_PATH).json(body);

        let raw: BackendUser = match self.executor.execute_as(&request).await {
            Ok(raw) => raw,
            Err(e) => {
                if e.ends_session() {
                    *self.user.lock() = None;
                }
                return Err(e);
            }
        };
        let user = User::from(raw);
        *self.user.lock() = Some(user.clone());
        self.executor.credentials().publish(AuthEvent::ProfileUpdated { user_id: user.id.clone() });
        debug!(user_id = %user.id, "profile updated");
        Ok(user)
    }

    /// Resume a session from stored credentials.
    ///
    /// With nothing stored the session stays unauthenticated. When the API is
    /// unreachable the credentials are kept for a later attempt; any other
    /// failure clears them.
    pub async fn restore(&self) -> Result<SessionState, AuthError> {
        if self.executor.credentials().current().await?.is_none() {
            debug!("no stored credentials to restore");
            return Ok(SessionState::Unauthenticated);
        }

        match self.fetch_profile().await {
            Ok(user) => {
                info!(user_id = %user.id, "session restored");
                *self.user.lock() = Some(user.clone());
                Ok(SessionState::Authenticated(user))
            }
            Err(e @ AuthError::Unreachable(_)) => {
                warn!(err = %e, "api unreachable, keeping stored credentials");
                Err(e)
            }
            Err(e) => {
                warn!(code = e.as_str(), err = %e, "session restore failed");
                self.abandon_session("session restore failed").await;
                Err(e)
            }
        }
    }

    async fn fetch_profile(&self) -> Result<User, AuthError> {
        let raw: BackendUser = self.executor.execute_as(&ApiRequest::get(ME_PATH)).await?;
        Ok(raw.into())
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
