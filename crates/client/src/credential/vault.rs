// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory front for a [`CredentialStore`].

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::credential::{CredentialPair, CredentialStore};
use crate::error::AuthError;
use crate::event::{AuthEvent, EVENT_CHANNEL_CAPACITY};

enum Cached {
    /// The store has not been read yet.
    Unloaded,
    Loaded(Option<Arc<CredentialPair>>),
}

struct Slot {
    cached: Cached,
    /// Bumped by every clear.
    epoch: u64,
}

/// Shared view of the current credential pair.
///
/// Caches the last pair read from or written to the store so that hot paths
/// do not hit storage on every request. Writes go to the store first and the
/// cache second; a clear drops the cache first so no caller can pick up a
/// pair that is being removed.
///
/// Each clear starts a new epoch. A write tagged with an older epoch (a
/// renewal that was in flight across a sign-out) is refused.
pub struct Credentials {
    store: Arc<dyn CredentialStore>,
    slot: Mutex<Slot>,
    event_tx: broadcast::Sender<AuthEvent>,
}

impl Credentials {
    pub fn new(store: Arc<dyn CredentialStore>) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let slot = Slot { cached: Cached::Unloaded, epoch: 0 };
        Arc::new(Self { store, slot: Mutex::new(slot), event_tx })
    }

    /// Current pair, reading through to the store on first use.
    pub async fn current(&self) -> Result<Option<Arc<CredentialPair>>, AuthError> {
        if let Cached::Loaded(pair) = &self.slot.lock().cached {
            return Ok(pair.clone());
        }
        let loaded = self.store.get().await.map_err(storage_error)?.map(Arc::new);
        let mut slot = self.slot.lock();
        // A concurrent replace/clear that landed while we were reading wins.
        if let Cached::Loaded(pair) = &slot.cached {
            return Ok(pair.clone());
        }
        slot.cached = Cached::Loaded(loaded.clone());
        Ok(loaded)
    }

    /// Number of clears so far.
    pub fn epoch(&self) -> u64 {
        self.slot.lock().epoch
    }

    pub async fn access_token(&self) -> Result<Option<String>, AuthError> {
        Ok(self.current().await?.map(|p| p.access.clone()))
    }

    pub async fn refresh_token(&self) -> Result<Option<String>, AuthError> {
        Ok(self.current().await?.map(|p| p.refresh.clone()))
    }

    /// Persist `pair` and make it the current one.
    pub async fn replace(&self, pair: CredentialPair) -> Result<Arc<CredentialPair>, AuthError> {
        self.store.set(pair.clone()).await.map_err(storage_error)?;
        let pair = Arc::new(pair);
        self.slot.lock().cached = Cached::Loaded(Some(Arc::clone(&pair)));
        debug!("credentials replaced");
        Ok(pair)
    }

    /// Like [`replace`](Self::replace), but only while no clear has happened
    /// since `epoch` was read.
    ///
    /// Fails with `NoRefreshCredential` when a clear got there first. If the
    /// clear lands while the store write is in progress, the written pair is
    /// removed again.
    pub async fn replace_if_epoch(
        &self,
        pair: CredentialPair,
        epoch: u64,
    ) -> Result<Arc<CredentialPair>, AuthError> {
        if self.epoch() != epoch {
            debug!("credentials cleared since renewal started, discarding pair");
            return Err(AuthError::NoRefreshCredential);
        }
        self.store.set(pair.clone()).await.map_err(storage_error)?;

        let pair = Arc::new(pair);
        {
            let mut slot = self.slot.lock();
            if slot.epoch == epoch {
                slot.cached = Cached::Loaded(Some(Arc::clone(&pair)));
                debug!("credentials replaced");
                return Ok(pair);
            }
        }

        debug!("credentials cleared during write, removing stored pair");
        self.store.clear().await.map_err(storage_error)?;
        Err(AuthError::NoRefreshCredential)
    }

    /// Remove both slots from the store and the cache.
    pub async fn clear(&self, reason: &str) -> Result<(), AuthError> {
        {
            let mut slot = self.slot.lock();
            slot.cached = Cached::Loaded(None);
            slot.epoch += 1;
        }
        let result = self.store.clear().await.map_err(storage_error);
        info!(reason, "credentials cleared");
        let _ = self.event_tx.send(AuthEvent::CredentialsCleared { reason: reason.to_owned() });
        result
    }

    /// Whether a pair is known to be present, without touching the store.
    ///
    /// Returns `false` until the store has been read once.
    pub fn is_present(&self) -> bool {
        matches!(&self.slot.lock().cached, Cached::Loaded(Some(_)))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn publish(&self, event: AuthEvent) {
        let _ = self.event_tx.send(event);
    }
}

fn storage_error(e: anyhow::Error) -> AuthError {
    AuthError::Storage(format!("{e:#}"))
}

#[cfg(test)]
#[path = "vault_tests.rs"]
mod tests;
