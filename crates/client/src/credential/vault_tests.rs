// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::credential::CredentialPair;
use crate::test_support::CountingStore;

use super::*;

#[tokio::test]
async fn reads_through_once_then_serves_from_cache() -> anyhow::Result<()> {
    let store = Arc::new(CountingStore::with_pair(CredentialPair::new("a1", "r1")));
    let creds = Credentials::new(Arc::clone(&store) as Arc<dyn CredentialStore>);

    assert!(!creds.is_present());
    assert_eq!(creds.access_token().await?.as_deref(), Some("a1"));
    assert_eq!(creds.refresh_token().await?.as_deref(), Some("r1"));
    assert!(creds.is_present());
    assert_eq!(store.get_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn empty_store_is_cached_as_absent() -> anyhow::Result<()> {
    let store = Arc::new(CountingStore::new());
    let creds = Credentials::new(Arc::clone(&store) as Arc<dyn CredentialStore>);

    assert!(creds.current().await?.is_none());
    assert!(creds.current().await?.is_none());
    assert_eq!(store.get_calls(), 1);
    assert!(!creds.is_present());
    Ok(())
}

#[tokio::test]
async fn replace_writes_store_and_cache() -> anyhow::Result<()> {
    let store = Arc::new(CountingStore::new());
    let creds = Credentials::new(Arc::clone(&store) as Arc<dyn CredentialStore>);

    let pair = creds.replace(CredentialPair::new("a2", "r2")).await?;
    assert_eq!(pair.access, "a2");
    assert_eq!(store.pair(), Some(CredentialPair::new("a2", "r2")));
    assert_eq!(creds.access_token().await?.as_deref(), Some("a2"));
    // Cache was populated by the write; no read needed.
    assert_eq!(store.get_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn clear_empties_both_and_broadcasts() -> anyhow::Result<()> {
    let store = Arc::new(CountingStore::with_pair(CredentialPair::new("a1", "r1")));
    let creds = Credentials::new(Arc::clone(&store) as Arc<dyn CredentialStore>);
    let mut events = creds.subscribe();

    creds.clear("test").await?;

    assert!(store.pair().is_none());
    assert!(creds.current().await?.is_none());
    assert!(!creds.is_present());
    assert_eq!(store.clear_calls(), 1);
    assert_eq!(events.recv().await?, AuthEvent::CredentialsCleared { reason: "test".into() });
    Ok(())
}

#[tokio::test]
async fn failed_write_leaves_cache_untouched() -> anyhow::Result<()> {
    let store = Arc::new(CountingStore::with_pair(CredentialPair::new("a1", "r1")));
    let creds = Credentials::new(Arc::clone(&store) as Arc<dyn CredentialStore>);
    creds.current().await?;

    store.fail_writes(true);
    let err = creds.replace(CredentialPair::new("a2", "r2")).await;
    assert!(matches!(err, Err(AuthError::Storage(ref msg)) if msg.contains("disk full")));
    assert_eq!(creds.access_token().await?.as_deref(), Some("a1"));
    Ok(())
}

#[tokio::test]
async fn failed_clear_still_drops_cache() -> anyhow::Result<()> {
    let store = Arc::new(CountingStore::with_pair(CredentialPair::new("a1", "r1")));
    let creds = Credentials::new(Arc::clone(&store) as Arc<dyn CredentialStore>);
    creds.current().await?;

    store.fail_writes(true);
    crate::assert_err_contains!(creds.clear("test").await, "credential storage failed");
    assert!(!creds.is_present());
    assert!(creds.current().await?.is_none());
    Ok(())
}

#[tokio::test]
async fn write_from_a_cleared_epoch_is_refused() -> anyhow::Result<()> {
    let store = Arc::new(CountingStore::with_pair(CredentialPair::new("a1", "r1")));
    let creds = Credentials::new(Arc::clone(&store) as Arc<dyn CredentialStore>);
    let epoch = creds.epoch();

    creds.clear("signed out").await?;
    let result = creds.replace_if_epoch(CredentialPair::new("a2", "r2"), epoch).await;

    assert_eq!(result, Err(AuthError::NoRefreshCredential));
    assert!(store.pair().is_none());
    assert!(!creds.is_present());
    assert_eq!(store.set_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn write_in_the_current_epoch_lands() -> anyhow::Result<()> {
    let store = Arc::new(CountingStore::new());
    let creds = Credentials::new(Arc::clone(&store) as Arc<dyn CredentialStore>);
    creds.clear("start").await?;

    let pair = creds.replace_if_epoch(CredentialPair::new("a2", "r2"), creds.epoch()).await?;

    assert_eq!(pair.access, "a2");
    assert_eq!(store.pair(), Some(CredentialPair::new("a2", "r2")));
    assert!(creds.is_present());
    Ok(())
}
