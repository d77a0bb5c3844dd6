mod common;

use std::sync::Arc;

use common::{InMemoryLinks, InMemoryUsers, StubProvider};
use dose_core::{AccountError, AccountLinker, LinkOutcome, OAuthProfile, OAuthProviderKind, PortError};

fn linker() -> (AccountLinker, Arc<InMemoryUsers>, Arc<InMemoryLinks>) {
    let users = Arc::new(InMemoryUsers::default());
    let links = Arc::new(InMemoryLinks::default());
    let linker = AccountLinker::new(users.clone(), links.clone(), common::clock());
    (linker, users, links)
}

fn github(id: &str, email: &str) -> OAuthProfile {
    OAuthProfile {
        provider: OAuthProviderKind::Github,
        provider_user_id: id.to_string(),
        email: email.to_string(),
        name: Some("Octo Cat".to_string()),
    }
}

#[tokio::test]
async fn unknown_identity_creates_a_verified_passwordless_user() {
    let (linker, users, links) = linker();

    let (user, outcome) = linker
        .link_or_create(github("42", "Octo@Example.com"))
        .await
        .unwrap();

    assert_eq!(outcome, LinkOutcome::Created);
    assert_eq!(user.email, "octo@example.com");
    assert!(user.is_verified);
    assert_eq!(users.count(), 1);
    let links = links.rows.lock().unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].user_id, user.user_id);
    assert_eq!(links[0].provider_user_id, "42");
}

#[tokio::test]
async fn matching_email_links_the_existing_user() {
    let (linker, users, _) = linker();
    let existing = users.seed("octo@example.com", true);

    let (user, outcome) = linker
        .link_or_create(github("42", "octo@example.com"))
        .await
        .unwrap();

    assert_eq!(outcome, LinkOutcome::LinkedByEmail);
    assert_eq!(user.user_id, existing.user_id);
    assert_eq!(users.count(), 1);
}

#[tokio::test]
async fn a_linked_identity_signs_straight_in() {
    let (linker, users, links) = linker();

    let (first, _) = linker
        .link_or_create(github("42", "octo@example.com"))
        .await
        .unwrap();
    // The provider email changed; the link still wins.
    let (second, outcome) = linker
        .link_or_create(github("42", "renamed@example.com"))
        .await
        .unwrap();

    assert_eq!(outcome, LinkOutcome::ExistingLink);
    assert_eq!(first.user_id, second.user_id);
    assert_eq!(users.count(), 1);
    assert_eq!(links.rows.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn deactivated_users_cannot_sign_in() {
    let (linker, users, links) = linker();
    let inactive = users.seed("gone@example.com", false);

    let err = linker
        .link_or_create(github("7", "gone@example.com"))
        .await
        .unwrap_err();

    assert!(matches!(err, AccountError::Inactive(id) if id == inactive.user_id));
    assert!(links.rows.lock().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_provider_email_is_rejected() {
    let (linker, _, _) = linker();
    assert!(matches!(
        linker.link_or_create(github("9", "not-an-email")).await,
        Err(AccountError::InvalidEmail(_))
    ));
}

#[tokio::test]
async fn sign_in_exchanges_the_code_first() {
    let (linker, _, _) = linker();
    let provider = StubProvider {
        code: "good-code".to_string(),
        profile: github("42", "octo@example.com"),
    };

    let (_, outcome) = linker
        .sign_in_with_code(&provider, "good-code", "https://app.example.com/callback")
        .await
        .unwrap();
    assert_eq!(outcome, LinkOutcome::Created);

    assert!(matches!(
        linker
            .sign_in_with_code(&provider, "bad-code", "https://app.example.com/callback")
            .await,
        Err(AccountError::Port(PortError::Unauthorized))
    ));
}
