// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use crate::error::AuthError;

/// Connection settings for the caltrack API.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Base URL of the API; endpoint paths are appended to it.
    #[arg(long, default_value = "http://127.0.0.1:8000/api/v1", env = "CALTRACK_API_URL")]
    pub api_url: String,

    /// Total per-request timeout in milliseconds.
    #[arg(long, default_value_t = 30000, env = "CALTRACK_HTTP_TIMEOUT_MS")]
    pub http_timeout_ms: u64,

    /// Connect timeout in milliseconds.
    #[arg(long, default_value_t = 10000, env = "CALTRACK_CONNECT_TIMEOUT_MS")]
    pub connect_timeout_ms: u64,
}

impl ClientConfig {
    /// Config pointing at `api_url` with short timeouts.
    pub fn for_testing(api_url: impl Into<String>) -> Self {
        Self { api_url: api_url.into(), http_timeout_ms: 5000, connect_timeout_ms: 1000 }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        let url = self.api_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AuthError::Config(format!("api url must be http(s): {url:?}")));
        }
        if self.http_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(AuthError::Config("timeouts must be greater than zero".into()));
        }
        Ok(())
    }

    /// Join an endpoint path onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url.trim().trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// Build the shared HTTP client used by every component.
    pub fn build_http_client(&self) -> Result<reqwest::Client, AuthError> {
        self.validate()?;
        reqwest::Client::builder()
            .timeout(self.http_timeout())
            .connect_timeout(self.connect_timeout())
            .build()
            .map_err(|e| AuthError::Config(format!("http client: {e}")))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
