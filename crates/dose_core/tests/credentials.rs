mod common;

use std::sync::Arc;

use chrono::Duration;
use common::{InMemoryBlacklist, InMemoryResetTokens, ScriptedTokens};
use dose_core::credentials::hash_token;
use dose_core::{
    Clock, CredentialError, CredentialLifecycle, ManualClock, OsTokenSource, PurgeReport,
    TokenPolicy,
};
use uuid::Uuid;

struct Fixture {
    lifecycle: CredentialLifecycle,
    resets: Arc<InMemoryResetTokens>,
    clock: Arc<ManualClock>,
}

fn fixture(tokens: &[&str]) -> Fixture {
    let clock = common::clock();
    let resets = Arc::new(InMemoryResetTokens::default());
    let lifecycle = CredentialLifecycle::new(
        resets.clone(),
        Arc::new(InMemoryBlacklist::default()),
        Arc::new(ScriptedTokens::new(tokens)),
        clock.clone(),
        TokenPolicy::default(),
    );
    Fixture {
        lifecycle,
        resets,
        clock,
    }
}

#[tokio::test]
async fn reset_token_is_single_use() {
    let f = fixture(&["first-raw-token"]);
    let user = Uuid::new_v4();

    let (raw, record) = f.lifecycle.issue_reset_token(user).await.unwrap();
    assert_eq!(raw, "first-raw-token");
    assert_eq!(record.expires_at, f.clock.now() + Duration::hours(1));
    assert!(!record.is_used);

    assert_eq!(f.lifecycle.redeem_reset_token(&raw).await.unwrap(), user);
    assert!(matches!(
        f.lifecycle.redeem_reset_token(&raw).await,
        Err(CredentialError::InvalidOrExpiredToken)
    ));
}

#[tokio::test]
async fn only_the_hash_is_stored() {
    let f = fixture(&["visible-only-once"]);
    f.lifecycle.issue_reset_token(Uuid::new_v4()).await.unwrap();

    let rows = f.resets.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].token_hash, hash_token("visible-only-once"));
    assert_ne!(rows[0].token_hash, "visible-only-once");
}

#[tokio::test]
async fn issuing_again_invalidates_the_earlier_token() {
    let f = fixture(&["older", "newer"]);
    let user = Uuid::new_v4();

    let (older, _) = f.lifecycle.issue_reset_token(user).await.unwrap();
    let (newer, _) = f.lifecycle.issue_reset_token(user).await.unwrap();

    assert_eq!(f.resets.rows.lock().unwrap().len(), 1);
    assert!(f.lifecycle.redeem_reset_token(&older).await.is_err());
    assert_eq!(f.lifecycle.redeem_reset_token(&newer).await.unwrap(), user);
}

#[tokio::test]
async fn tokens_for_different_users_are_independent() {
    let f = fixture(&["alice", "bob"]);
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let (a, _) = f.lifecycle.issue_reset_token(alice).await.unwrap();
    let (b, _) = f.lifecycle.issue_reset_token(bob).await.unwrap();

    assert_eq!(f.lifecycle.redeem_reset_token(&b).await.unwrap(), bob);
    assert_eq!(f.lifecycle.redeem_reset_token(&a).await.unwrap(), alice);
}

#[tokio::test]
async fn expired_tokens_are_rejected() {
    let f = fixture(&["slow-user"]);
    let (raw, _) = f.lifecycle.issue_reset_token(Uuid::new_v4()).await.unwrap();

    f.clock.advance(Duration::minutes(60));
    assert!(matches!(
        f.lifecycle.redeem_reset_token(&raw).await,
        Err(CredentialError::InvalidOrExpiredToken)
    ));
}

#[tokio::test]
async fn unknown_tokens_are_rejected() {
    let f = fixture(&[]);
    assert!(matches!(
        f.lifecycle.redeem_reset_token("never-issued").await,
        Err(CredentialError::InvalidOrExpiredToken)
    ));
}

#[tokio::test]
async fn concurrent_redemptions_succeed_once() {
    let clock = common::clock();
    let lifecycle = CredentialLifecycle::new(
        Arc::new(InMemoryResetTokens::default()),
        Arc::new(InMemoryBlacklist::default()),
        Arc::new(OsTokenSource),
        clock,
        TokenPolicy::default(),
    );
    let user = Uuid::new_v4();
    let (raw, _) = lifecycle.issue_reset_token(user).await.unwrap();

    let first = {
        let lifecycle = lifecycle.clone();
        let raw = raw.clone();
        tokio::spawn(async move { lifecycle.redeem_reset_token(&raw).await })
    };
    let second = {
        let lifecycle = lifecycle.clone();
        let raw = raw.clone();
        tokio::spawn(async move { lifecycle.redeem_reset_token(&raw).await })
    };
    let (first, second) = tokio::join!(first, second);

    let successes = [first.unwrap(), second.unwrap()]
        .into_iter()
        .filter(|outcome| outcome.is_ok())
        .count();
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn blacklisted_tokens_stay_revoked_until_their_own_expiry() {
    let f = fixture(&[]);
    let user = Uuid::new_v4();
    let natural_expiry = f.clock.now() + Duration::days(30);

    f.lifecycle
        .blacklist("auth-session-1", user, natural_expiry)
        .await
        .unwrap();
    assert!(f.lifecycle.is_blacklisted("auth-session-1").await.unwrap());
    assert!(!f.lifecycle.is_blacklisted("auth-session-2").await.unwrap());

    f.clock.advance(Duration::days(29));
    assert_eq!(f.lifecycle.purge_expired().await.unwrap(), PurgeReport::default());
    assert!(f.lifecycle.is_blacklisted("auth-session-1").await.unwrap());

    f.clock.advance(Duration::days(1));
    assert!(!f.lifecycle.is_blacklisted("auth-session-1").await.unwrap());
    assert_eq!(
        f.lifecycle.purge_expired().await.unwrap(),
        PurgeReport {
            reset_tokens: 0,
            blacklist_entries: 1
        }
    );
}

#[tokio::test]
async fn blacklisting_twice_is_harmless() {
    let f = fixture(&[]);
    let user = Uuid::new_v4();
    let expiry = f.clock.now() + Duration::hours(2);

    f.lifecycle.blacklist("dup", user, expiry).await.unwrap();
    f.lifecycle.blacklist("dup", user, expiry).await.unwrap();
    assert!(f.lifecycle.is_blacklisted("dup").await.unwrap());
}

#[tokio::test]
async fn purge_removes_only_what_has_expired() {
    let f = fixture(&["early", "late"]);
    f.lifecycle.issue_reset_token(Uuid::new_v4()).await.unwrap();
    f.clock.advance(Duration::minutes(30));
    let (late, _) = f.lifecycle.issue_reset_token(Uuid::new_v4()).await.unwrap();

    f.clock.advance(Duration::minutes(30));
    let report = f.lifecycle.purge_expired().await.unwrap();
    assert_eq!(report.reset_tokens, 1);
    assert_eq!(f.resets.rows.lock().unwrap().len(), 1);

    // The surviving token is still redeemable.
    let user = f.lifecycle.redeem_reset_token(&late).await;
    assert!(user.is_ok());
}
