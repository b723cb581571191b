// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential manager tests.
//!
//! These tests verify that:
//! 1. Credentials valid beyond the refresh margin are returned untouched
//! 2. Expiring credentials are refreshed once and persisted
//! 3. A failed refresh never modifies the stored credential
//! 4. Concurrent callers for one user share a single refresh

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use vrc_coach::db::{CredentialStore, MemoryDb};
use vrc_coach::error::AppError;
use vrc_coach::models::Credential;
use vrc_coach::services::RefreshedTokens;

mod common;
use common::{credential, credential_manager, seed_credential, FakeRefresher};

#[tokio::test]
async fn test_fresh_credential_is_returned_without_refresh() {
    let db = MemoryDb::new();
    let refresher = Arc::new(FakeRefresher::succeeding("unused", 6 * 3600));
    let manager = credential_manager(&db, refresher.clone());

    let stored = credential("u1", "still_good", 2 * 3600);
    seed_credential(&db, &stored).await;

    let result = manager.get_valid_credential("u1").await.unwrap();

    assert_eq!(result, stored);
    assert_eq!(refresher.calls(), 0);
    assert_eq!(db.write_count(), 1, "Only the seed write should exist");
}

#[tokio::test]
async fn test_credential_inside_margin_is_refreshed_and_persisted() {
    let db = MemoryDb::new();
    let refresher = Arc::new(FakeRefresher::succeeding("new_access", 6 * 3600));
    let manager = credential_manager(&db, refresher.clone());

    // Expires in 50 minutes, inside the one hour margin
    seed_credential(&db, &credential("u1", "old_access", 3000)).await;

    let result = manager.get_valid_credential("u1").await.unwrap();

    assert_eq!(result.access_token, "new_access");
    assert_eq!(result.refresh_token, "new_access_refresh");
    assert!(result.updated_at.is_some());
    assert_eq!(refresher.calls(), 1);
    assert_eq!(refresher.seen_tokens(), vec!["old_access_refresh".to_string()]);

    let persisted = db.get_credential("u1").await.unwrap().unwrap();
    assert_eq!(persisted, result);

    // A second call finds the refreshed credential and leaves it alone
    let again = manager.get_valid_credential("u1").await.unwrap();
    assert_eq!(again, result);
    assert_eq!(refresher.calls(), 1);
}

#[tokio::test]
async fn test_already_expired_credential_is_refreshed() {
    let db = MemoryDb::new();
    let refresher = Arc::new(FakeRefresher::succeeding("new_access", 6 * 3600));
    let manager = credential_manager(&db, refresher.clone());

    seed_credential(&db, &credential("u1", "expired", -600)).await;

    let result = manager.get_valid_credential("u1").await.unwrap();
    assert_eq!(result.access_token, "new_access");
    assert_eq!(refresher.calls(), 1);
}

#[tokio::test]
async fn test_failed_refresh_leaves_store_untouched() {
    let db = MemoryDb::new();
    let refresher = Arc::new(FakeRefresher::rejecting(400));
    let manager = credential_manager(&db, refresher.clone());

    let stale = credential("u1", "old_access", 600);
    seed_credential(&db, &stale).await;

    let err = manager.get_valid_credential("u1").await.unwrap_err();

    match &err {
        AppError::CredentialRefresh {
            user_id, status, ..
        } => {
            assert_eq!(user_id, "u1");
            assert_eq!(*status, Some(400));
        }
        other => panic!("Expected CredentialRefresh, got {:?}", other),
    }
    assert!(err.is_retryable());
    assert_eq!(refresher.calls(), 1);

    let persisted = db.get_credential("u1").await.unwrap().unwrap();
    assert_eq!(persisted, stale);
    assert_eq!(db.write_count(), 1);
}

#[tokio::test]
async fn test_missing_credential_is_not_found() {
    let db = MemoryDb::new();
    let refresher = Arc::new(FakeRefresher::succeeding("unused", 6 * 3600));
    let manager = credential_manager(&db, refresher.clone());

    let err = manager.get_valid_credential("nobody").await.unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert!(!err.is_retryable());
    assert_eq!(refresher.calls(), 0);
    assert_eq!(db.write_count(), 0);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let db = MemoryDb::new();
    let refresher = Arc::new(
        FakeRefresher::succeeding("new_access", 6 * 3600).with_delay(Duration::from_millis(50)),
    );
    let manager = credential_manager(&db, refresher.clone());

    seed_credential(&db, &credential("u1", "old_access", 60)).await;

    let calls = (0..8).map(|_| {
        let manager = manager.clone();
        async move { manager.get_valid_credential("u1").await }
    });
    let results = futures_util::future::join_all(calls).await;

    for result in results {
        assert_eq!(result.unwrap().access_token, "new_access");
    }
    assert_eq!(refresher.calls(), 1, "Only one refresh should reach the endpoint");
    assert_eq!(db.write_count(), 2, "Seed plus a single refresh write");
}

#[tokio::test]
async fn test_refreshes_for_different_users_are_independent() {
    let db = MemoryDb::new();
    let refresher = Arc::new(FakeRefresher::succeeding("new_access", 6 * 3600));
    let manager = credential_manager(&db, refresher.clone());

    seed_credential(&db, &credential("u1", "old_1", 60)).await;
    seed_credential(&db, &credential("u2", "old_2", 60)).await;

    let (a, b) = tokio::join!(
        manager.get_valid_credential("u1"),
        manager.get_valid_credential("u2")
    );

    assert_eq!(a.unwrap().user_id, "u1");
    assert_eq!(b.unwrap().user_id, "u2");
    assert_eq!(refresher.calls(), 2);
}

#[tokio::test]
async fn test_rejected_refresh_after_lost_race_uses_winner() {
    // Two instances share a store but not their locks. The slow one sends
    // the old refresh token after the fast one has already used it.
    let db = MemoryDb::new();
    let slow = Arc::new(FakeRefresher::rejecting(400).with_delay(Duration::from_millis(200)));
    let fast = Arc::new(FakeRefresher::succeeding("winner", 6 * 3600));
    let slow_instance = credential_manager(&db, slow.clone());
    let fast_instance = credential_manager(&db, fast.clone());

    seed_credential(&db, &credential("u1", "old_access", 60)).await;

    let loser = tokio::spawn(async move { slow_instance.get_valid_credential("u1").await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let winner = fast_instance.get_valid_credential("u1").await.unwrap();
    let lost = loser.await.unwrap().unwrap();

    assert_eq!(winner.access_token, "winner");
    assert_eq!(lost, winner);
    assert_eq!(slow.calls(), 1);
    assert_eq!(fast.calls(), 1);
}

#[tokio::test]
async fn test_older_refresh_result_does_not_overwrite_newer() {
    let db = MemoryDb::new();
    // The slow instance gets a pair that expires sooner than the fast one's
    let slow = Arc::new(
        FakeRefresher::succeeding("slow_pair", 2 * 3600).with_delay(Duration::from_millis(200)),
    );
    let fast = Arc::new(FakeRefresher::succeeding("fast_pair", 6 * 3600));
    let slow_instance = credential_manager(&db, slow.clone());
    let fast_instance = credential_manager(&db, fast.clone());

    seed_credential(&db, &credential("u1", "old_access", 60)).await;

    let pending = tokio::spawn(async move { slow_instance.get_valid_credential("u1").await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let fast_result = fast_instance.get_valid_credential("u1").await.unwrap();
    let slow_result = pending.await.unwrap().unwrap();

    assert_eq!(fast_result.access_token, "fast_pair");
    assert_eq!(slow_result.access_token, "fast_pair");

    let persisted = db.get_credential("u1").await.unwrap().unwrap();
    assert_eq!(persisted.access_token, "fast_pair");
}

#[tokio::test]
async fn test_rotated_token_with_same_expiry_is_stored_but_not_handed_out() {
    let db = MemoryDb::new();
    let expires_at = Utc::now().timestamp() + 600;
    let stale = Credential {
        user_id: "u1".to_string(),
        access_token: "old_access".to_string(),
        refresh_token: "old_refresh".to_string(),
        expires_at,
        updated_at: None,
    };
    seed_credential(&db, &stale).await;

    // The provider keeps the expiry but rotates the refresh token
    let refresher = Arc::new(FakeRefresher::returning(RefreshedTokens {
        access_token: "same_access".to_string(),
        refresh_token: "rotated_refresh".to_string(),
        expires_at,
    }));
    let manager = credential_manager(&db, refresher.clone());

    let err = manager.get_valid_credential("u1").await.unwrap_err();

    assert!(matches!(err, AppError::CredentialRefresh { .. }));
    assert!(err.is_retryable());
    assert_eq!(refresher.calls(), 1);

    let persisted = db.get_credential("u1").await.unwrap().unwrap();
    assert_eq!(persisted.refresh_token, "rotated_refresh");
    assert_eq!(persisted.expires_at, expires_at);
}

#[tokio::test]
async fn test_rejected_write_never_returns_expiring_credential() {
    let db = MemoryDb::new();
    let stale = credential("u1", "old_access", 600);
    seed_credential(&db, &stale).await;

    // An older expiry than the stored one loses the conditional write, and
    // the stored credential is itself inside the margin
    let refresher = Arc::new(FakeRefresher::succeeding("older_pair", 300));
    let manager = credential_manager(&db, refresher.clone());

    let err = manager.get_valid_credential("u1").await.unwrap_err();

    match &err {
        AppError::CredentialRefresh { user_id, .. } => assert_eq!(user_id, "u1"),
        other => panic!("Expected CredentialRefresh, got {:?}", other),
    }
    let persisted = db.get_credential("u1").await.unwrap().unwrap();
    assert_eq!(persisted, stale);
    assert_eq!(db.write_count(), 1);
}
