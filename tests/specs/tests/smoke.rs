// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `caltrack` binary against the
//! mock API.

use caltrack_client::test_support::{DEFAULT_EMAIL, DEFAULT_PASSWORD};
use caltrack_specs::Caltrack;

const LOGIN: [&str; 5] = ["login", "--email", DEFAULT_EMAIL, "--password", DEFAULT_PASSWORD];

#[tokio::test]
async fn login_whoami_logout() -> anyhow::Result<()> {
    let ct = Caltrack::start().await?;

    let out = ct.run(&LOGIN).await?;
    assert!(out.success(), "login failed: {}", out.stderr);
    assert_eq!(out.json()?["email"], DEFAULT_EMAIL);
    assert!(ct.credentials_file().exists());

    let out = ct.run(&["whoami"]).await?;
    assert!(out.success(), "whoami failed: {}", out.stderr);
    assert_eq!(out.json()?["activity_level"], "moderate");

    let out = ct.run(&["logout"]).await?;
    assert!(out.success(), "logout failed: {}", out.stderr);
    assert!(out.stdout.is_empty());
    assert!(!ct.credentials_file().exists());
    assert_eq!(ct.mock.requests_to("/auth/logout").len(), 1);
    Ok(())
}

#[tokio::test]
async fn expired_token_is_renewed_between_runs() -> anyhow::Result<()> {
    let ct = Caltrack::start().await?;
    assert!(ct.run(&LOGIN).await?.success());
    let before = std::fs::read_to_string(ct.credentials_file())?;

    ct.mock.expire_all();
    let out = ct.run(&["whoami"]).await?;

    assert!(out.success(), "whoami failed: {}", out.stderr);
    assert_eq!(ct.mock.refresh_calls(), 1);
    let after = std::fs::read_to_string(ct.credentials_file())?;
    assert_ne!(before, after);
    Ok(())
}

#[tokio::test]
async fn revoked_session_signs_out() -> anyhow::Result<()> {
    let ct = Caltrack::start().await?;
    assert!(ct.run(&LOGIN).await?.success());

    ct.mock.expire_all();
    ct.mock.set_refresh_reply(caltrack_client::test_support::RefreshReply::Reject {
        status: 401,
        body: r#"{"detail":"invalid_grant"}"#.into(),
    });
    let out = ct.run(&["whoami"]).await?;

    assert_eq!(out.code, Some(1));
    assert!(out.stderr.contains("invalid_grant"), "stderr: {}", out.stderr);
    assert!(!ct.credentials_file().exists());
    Ok(())
}

#[tokio::test]
async fn bad_password_exits_one() -> anyhow::Result<()> {
    let ct = Caltrack::start().await?;

    let out = ct.run(&["login", "--email", DEFAULT_EMAIL, "--password", "wrong"]).await?;

    assert_eq!(out.code, Some(1));
    assert!(out.stderr.contains("Incorrect email or password"), "stderr: {}", out.stderr);
    assert!(!ct.credentials_file().exists());
    Ok(())
}

#[tokio::test]
async fn whoami_without_login_exits_one() -> anyhow::Result<()> {
    let ct = Caltrack::start().await?;

    let out = ct.run(&["whoami"]).await?;

    assert_eq!(out.code, Some(1));
    assert!(out.stderr.contains("not signed in"), "stderr: {}", out.stderr);
    assert!(ct.mock.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn invalid_configuration_exits_two() -> anyhow::Result<()> {
    let ct = Caltrack::start().await?;

    let out = ct.run_with_env(&["whoami"], &[("CALTRACK_API_URL", "not-a-url")]).await?;

    assert_eq!(out.code, Some(2));
    assert!(out.stderr.contains("http(s)"), "stderr: {}", out.stderr);
    Ok(())
}

#[tokio::test]
async fn json_logs_go_to_stderr() -> anyhow::Result<()> {
    let ct = Caltrack::start().await?;

    let out = ct.run(&["--log-format", "json", "--log-level", "debug", "login", "--email",
                       DEFAULT_EMAIL, "--password", DEFAULT_PASSWORD]).await?;

    assert!(out.success(), "login failed: {}", out.stderr);
    out.json()?;
    let first = out.stderr.lines().next().unwrap_or_default();
    let line: serde_json::Value = serde_json::from_str(first)?;
    assert!(line["level"].is_string());
    assert!(!out.stderr.contains(DEFAULT_PASSWORD));
    Ok(())
}
