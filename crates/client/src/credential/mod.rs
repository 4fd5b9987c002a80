// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential handling: the persisted access/refresh pair, the store
//! contract, the in-memory vault in front of it, and single-flight renewal.

pub mod refresh;
pub mod store;
pub mod vault;

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

pub use refresh::RefreshCoordinator;
pub use store::{FileStore, MemoryStore};
pub use vault::Credentials;

/// Boxed future returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Access/refresh token pair. Replaced wholesale, never edited in place.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    #[serde(rename = "access_token")]
    pub access: String,
    #[serde(rename = "refresh_token")]
    pub refresh: String,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self { access: access.into(), refresh: refresh.into() }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Durable home of the credential pair.
///
/// Both slots are written together and removed together. Implementations do
/// no retrying of their own; errors surface to the caller as
/// [`AuthError::Storage`](crate::error::AuthError::Storage).
///
/// Object-safe for use as `Arc<dyn CredentialStore>`.
pub trait CredentialStore: Send + Sync + 'static {
    fn get(&self) -> StoreFuture<'_, Option<CredentialPair>>;

    fn set(&self, pair: CredentialPair) -> StoreFuture<'_, ()>;

    fn clear(&self) -> StoreFuture<'_, ()>;
}

/// Resolve the state directory for persisted credentials.
///
/// Checks `CALTRACK_STATE_DIR`, then `$XDG_STATE_HOME/caltrack`,
/// then `$HOME/.local/state/caltrack`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CALTRACK_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("caltrack");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/caltrack");
    }
    PathBuf::from(".caltrack")
}
