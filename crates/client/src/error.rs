// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde_json::Value;

/// Failure of an authenticated operation.
///
/// Cloneable so a single renewal outcome can be handed to every caller that
/// was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No response was received (connect failure, timeout, reset).
    Unreachable(String),
    /// Non-2xx response with a server-supplied (or synthesized) message.
    Http { status: u16, message: String },
    /// 401 on a call that may not start a renewal (the refresh endpoint itself).
    ExpiredFirstAttempt(String),
    /// 401 on a call that was already retried after a renewal. Terminal.
    ExpiredAfterRetry(String),
    /// A renewal was needed but no refresh token is stored.
    NoRefreshCredential,
    /// The refresh endpoint refused the renewal or returned no access token.
    RefreshRejected(String),
    /// The login endpoint rejected the identifier/secret.
    InvalidCredentials(String),
    /// The login endpoint answered 2xx without both tokens.
    InvalidLoginResponse,
    /// Sign-in succeeded but the confirming profile fetch did not.
    ProfileFetchFailed(Box<AuthError>),
    /// A 2xx payload was absent or did not have the expected shape.
    UnexpectedPayload(String),
    /// The credential store failed to read, write or clear.
    Storage(String),
    /// Client configuration is unusable.
    Config(String),
}

impl AuthError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unreachable(_) => "UNREACHABLE",
            Self::Http { .. } => "HTTP_FAILURE",
            Self::ExpiredFirstAttempt(_) => "EXPIRED_FIRST_ATTEMPT",
            Self::ExpiredAfterRetry(_) => "EXPIRED_AFTER_RETRY",
            Self::NoRefreshCredential => "NO_REFRESH_CREDENTIAL",
            Self::RefreshRejected(_) => "REFRESH_REJECTED",
            Self::InvalidCredentials(_) => "INVALID_CREDENTIALS",
            Self::InvalidLoginResponse => "INVALID_LOGIN_RESPONSE",
            Self::ProfileFetchFailed(_) => "PROFILE_FETCH_FAILED",
            Self::UnexpectedPayload(_) => "UNEXPECTED_PAYLOAD",
            Self::Storage(_) => "STORAGE",
            Self::Config(_) => "CONFIG",
        }
    }

    /// HTTP status carried by the error, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::ExpiredFirstAttempt(_) | Self::ExpiredAfterRetry(_) => Some(401),
            Self::ProfileFetchFailed(inner) => inner.status(),
            _ => None,
        }
    }

    /// Errors after which the stored credentials are gone and the user must
    /// sign in again.
    pub fn ends_session(&self) -> bool {
        match self {
            Self::ExpiredAfterRetry(_) | Self::RefreshRejected(_) | Self::NoRefreshCredential => {
                true
            }
            Self::ProfileFetchFailed(inner) => inner.ends_session(),
            _ => false,
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable(reason) => write!(f, "server unreachable: {reason}"),
            Self::Http { message, .. } => f.write_str(message),
            Self::ExpiredFirstAttempt(message) | Self::ExpiredAfterRetry(message) => {
                f.write_str(message)
            }
            Self::NoRefreshCredential => f.write_str("NO_REFRESH_TOKEN"),
            Self::RefreshRejected(message) => f.write_str(message),
            Self::InvalidCredentials(message) => f.write_str(message),
            Self::InvalidLoginResponse => f.write_str("INVALID_LOGIN_RESPONSE"),
            Self::ProfileFetchFailed(inner) => {
                write!(f, "profile fetch failed after sign-in: {inner}")
            }
            Self::UnexpectedPayload(reason) => write!(f, "unexpected response payload: {reason}"),
            Self::Storage(reason) => write!(f, "credential storage failed: {reason}"),
            Self::Config(reason) => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ProfileFetchFailed(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        Self::Unreachable(e.to_string())
    }
}

/// Pick the human-readable message out of an error body.
///
/// Checks `detail`, then `message`, then falls back to `HTTP {status}`.
/// A structured `detail` (validation error lists) is rendered as JSON text.
pub fn error_message(status: u16, body: &[u8]) -> String {
    let parsed: Option<Value> = serde_json::from_slice(body).ok();
    parsed
        .as_ref()
        .and_then(|v| message_field(v, "detail").or_else(|| message_field(v, "message")))
        .unwrap_or_else(|| format!("HTTP {status}"))
}

/// The `detail` field of an error body, if it carries one.
pub fn detail_message(body: &[u8]) -> Option<String> {
    let parsed: Value = serde_json::from_slice(body).ok()?;
    message_field(&parsed, "detail")
}

fn message_field(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(false) => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
