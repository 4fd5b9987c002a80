// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential store implementations: process memory and a JSON file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::credential::{CredentialPair, CredentialStore, StoreFuture};

/// Store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slot: Mutex<Option<CredentialPair>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `pair`.
    pub fn with_pair(pair: CredentialPair) -> Self {
        Self { slot: Mutex::new(Some(pair)) }
    }

    /// Current contents, read synchronously.
    pub fn snapshot(&self) -> Option<CredentialPair> {
        self.slot.lock().clone()
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self) -> StoreFuture<'_, Option<CredentialPair>> {
        let pair = self.slot.lock().clone();
        Box::pin(async move { Ok(pair) })
    }

    fn set(&self, pair: CredentialPair) -> StoreFuture<'_, ()> {
        *self.slot.lock() = Some(pair);
        Box::pin(async { Ok(()) })
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        *self.slot.lock() = None;
        Box::pin(async { Ok(()) })
    }
}

/// On-disk layout: two named slots in one JSON object.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSlots {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

/// Store backed by a JSON file, written atomically (tmp file + rename) so
/// both slots always change together.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `credentials.json` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("credentials.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> anyhow::Result<Option<CredentialPair>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let slots: StoredSlots = serde_json::from_str(&contents)?;
        // A half-written pair is unusable; treat it as absent.
        match (slots.access_token, slots.refresh_token) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => {
                Ok(Some(CredentialPair { access, refresh }))
            }
            _ => {
                debug!(path = %self.path.display(), "stored credentials incomplete, ignoring");
                Ok(None)
            }
        }
    }

    async fn save(&self, pair: CredentialPair) -> anyhow::Result<()> {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let slots =
            StoredSlots { access_token: Some(pair.access), refresh_token: Some(pair.refresh) };
        let json = serde_json::to_string_pretty(&slots)?;

        // Unique temp name so concurrent saves never interleave in one file.
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        if let Err(e) = tokio::fs::write(&tmp_path, json).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp_path, &self.path).await {
            // The temp file holds plaintext tokens.
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        debug!(path = %self.path.display(), "persisted credentials");
        Ok(())
    }

    async fn remove(&self) -> anyhow::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed credentials");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl CredentialStore for FileStore {
    fn get(&self) -> StoreFuture<'_, Option<CredentialPair>> {
        Box::pin(self.load())
    }

    fn set(&self, pair: CredentialPair) -> StoreFuture<'_, ()> {
        Box::pin(self.save(pair))
    }

    fn clear(&self) -> StoreFuture<'_, ()> {
        Box::pin(self.remove())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
