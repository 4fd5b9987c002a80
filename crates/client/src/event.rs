// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

/// Capacity of the auth event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle events published by the credential vault, the refresh
/// coordinator and the session. Token values are never included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    /// A new pair was stored after sign-in.
    SignedIn { user_id: String },
    /// The user signed out locally.
    SignedOut,
    /// The server returned a new normalized profile.
    ProfileUpdated { user_id: String },
    /// A renewal episode completed and a new pair was stored.
    CredentialsRefreshed,
    /// A renewal episode failed; every waiter received `error`.
    #[serde(rename = "refresh:failed")]
    RefreshFailed { error: String },
    /// Both credential slots were removed.
    CredentialsCleared { reason: String },
}
