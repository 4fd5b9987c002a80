// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `caltrack` binary as a subprocess against an in-process
//! mock API, with an isolated state directory per harness.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use caltrack_client::test_support::MockBackend;
use tokio::process::Command;

const RUN_TIMEOUT: Duration = Duration::from_secs(20);

/// Resolve the path to the compiled `caltrack` binary.
pub fn caltrack_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("caltrack")
}

/// Captured result of one binary invocation.
#[derive(Debug)]
pub struct CliOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CliOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Parse stdout as the JSON document the command printed.
    pub fn json(&self) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.stdout)?)
    }
}

/// A mock API plus a private state directory for running `caltrack`.
pub struct Caltrack {
    pub mock: MockBackend,
    state_dir: tempfile::TempDir,
}

impl Caltrack {
    pub async fn start() -> anyhow::Result<Self> {
        let binary = caltrack_binary();
        anyhow::ensure!(binary.exists(), "caltrack binary not found at {}", binary.display());
        Ok(Self { mock: MockBackend::start().await?, state_dir: tempfile::tempdir()? })
    }

    pub fn state_dir(&self) -> &Path {
        self.state_dir.path()
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.state_dir.path().join("credentials.json")
    }

    /// Run `caltrack <args>` against the mock and wait for it to exit.
    ///
    /// Runs asynchronously so the mock keeps serving on this runtime.
    pub async fn run(&self, args: &[&str]) -> anyhow::Result<CliOutput> {
        self.run_with_env(args, &[]).await
    }

    pub async fn run_with_env(
        &self,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> anyhow::Result<CliOutput> {
        let mut cmd = Command::new(caltrack_binary());
        cmd.args(args)
            .env("CALTRACK_API_URL", self.mock.base_url())
            .env("CALTRACK_STATE_DIR", self.state_dir.path())
            .env("CALTRACK_HTTP_TIMEOUT_MS", "5000")
            .env_remove("CALTRACK_LOG_LEVEL")
            .env_remove("CALTRACK_LOG_FORMAT")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let output = tokio::time::timeout(RUN_TIMEOUT, cmd.output())
            .await
            .map_err(|_| anyhow::anyhow!("caltrack {args:?} did not exit within {RUN_TIMEOUT:?}"))??;

        Ok(CliOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
