// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Caltrack client: authenticated request layer for the caltrack API.
//!
//! Every call goes through [`executor::RequestExecutor`], which attaches the
//! stored access token and, on a 401, defers to a single
//! [`credential::refresh::RefreshCoordinator`] so that one expiry episode
//! produces exactly one `/auth/refresh` call no matter how many requests
//! observed it. [`session::AuthSession`] builds sign-in, sign-up, sign-out
//! and profile updates on top.

pub mod config;
pub mod credential;
pub mod error;
pub mod event;
pub mod executor;
pub mod profile;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::ClientConfig;
pub use credential::{CredentialPair, CredentialStore};
pub use error::AuthError;
pub use event::AuthEvent;
pub use executor::{ApiRequest, Attempt, RequestExecutor};
pub use session::{AuthSession, SessionState};
