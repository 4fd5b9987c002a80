// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command runner, shared by `main` and tests.

use std::sync::Arc;

use anyhow::Context;
use caltrack_client::credential::FileStore;
use caltrack_client::profile::User;
use caltrack_client::{AuthSession, CredentialStore, SessionState};
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::{Command, Config};

/// Initialize tracing/logging from config. Logs go to stderr so stdout
/// carries only command output.
///
/// Uses `try_init` so it's safe to call multiple times (e.g. from tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init(),
    };
    drop(result);
}

/// Run one command to completion.
///
/// Returns the JSON document to print, if the command produces one.
pub async fn run(config: &Config) -> anyhow::Result<Option<Value>> {
    let state_dir = config.state_dir();
    debug!(state_dir = %state_dir.display(), "using credential store");
    let store: Arc<dyn CredentialStore> = Arc::new(FileStore::in_dir(&state_dir));
    let session = AuthSession::from_config(config.client.clone(), store)?;

    match &config.command {
        Command::Login { email, password } => {
            let user = session.sign_in(email.trim(), password).await.context("sign-in failed")?;
            info!(user_id = %user.id, "signed in");
            Ok(Some(serde_json::to_value(&user)?))
        }
        Command::Register { .. } => {
            let data = config.registration().context("missing registration details")?;
            let user = session.sign_up(&data).await.context("registration failed")?;
            info!(user_id = %user.id, "registered");
            Ok(Some(serde_json::to_value(&user)?))
        }
        Command::Logout => {
            session.sign_out().await?;
            Ok(None)
        }
        Command::Whoami => {
            let user = signed_in_user(&session).await?;
            Ok(Some(serde_json::to_value(&user)?))
        }
        Command::Profile { .. } => {
            let update = config.profile_update().context("missing profile changes")?;
            signed_in_user(&session).await?;
            let user = session.update_profile(&update).await.context("profile update failed")?;
            Ok(Some(serde_json::to_value(&user)?))
        }
    }
}

async fn signed_in_user(session: &AuthSession) -> anyhow::Result<User> {
    match session.restore().await.context("could not resume session")? {
        SessionState::Authenticated(user) => Ok(user),
        SessionState::Unauthenticated => anyhow::bail!("not signed in (run `caltrack login`)"),
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
