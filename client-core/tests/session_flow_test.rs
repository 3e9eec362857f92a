// client-core/tests/session_flow_test.rs
mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Utc;
use client_core::{
    sign_in, sign_out, AccessDecision, DeferredActionMediator, LoginRequest, MemoryStore,
    ReplayOutcome, RouteRequirement, SessionStore,
};
use common::models::PendingComment;
use support::{test_user, token_expiring_in, CountingCommentApi, FakeAuthApi, FakeClock};
use uuid::Uuid;

fn credentials() -> LoginRequest {
    LoginRequest {
        username: "ada".to_string(),
        password: "hunter2".to_string(),
    }
}

#[tokio::test]
async fn test_sign_in_commits_atomically() {
    let storage = Arc::new(MemoryStore::new());
    let store = SessionStore::new(storage.clone());
    let api = FakeAuthApi::issuing(test_user(), token_expiring_in(3600));

    let user = sign_in(&store, &api, &credentials()).await.unwrap();

    let snapshot = store.snapshot();
    assert!(snapshot.is_authenticated);
    assert_eq!(snapshot.user, Some(user));
    assert!(snapshot.token.is_some());
    assert!(!snapshot.is_loading);
    assert_eq!(snapshot.last_error, None);
}

#[tokio::test]
async fn test_failed_sign_in_surfaces_error() {
    let storage = Arc::new(MemoryStore::new());
    let store = SessionStore::new(storage.clone());
    let api = FakeAuthApi::issuing(test_user(), token_expiring_in(3600));
    api.fail.store(true, Ordering::SeqCst);

    assert!(sign_in(&store, &api, &credentials()).await.is_err());

    let snapshot = store.snapshot();
    assert!(!snapshot.is_authenticated);
    assert!(snapshot.last_error.is_some());
}

#[tokio::test]
async fn test_sign_out_clears_local_session() {
    let storage = Arc::new(MemoryStore::new());
    let store = SessionStore::new(storage.clone());
    let api = FakeAuthApi::issuing(test_user(), token_expiring_in(3600));

    sign_in(&store, &api, &credentials()).await.unwrap();
    sign_out(&store, &api).await;
    assert!(!store.is_authenticated());
}

/// The full compose-now-submit-after-login path: an anonymous visitor drafts
/// a comment on a post, gets bounced to login, authenticates, and the draft
/// is replayed exactly once into the post view.
#[tokio::test]
async fn test_comment_survives_login_interruption() {
    let storage = Arc::new(MemoryStore::new());
    let store = SessionStore::new(storage.clone());
    let clock = Arc::new(FakeClock::at(Utc::now()));
    let mediator =
        DeferredActionMediator::new(storage.clone(), clock, chrono::Duration::minutes(5));
    let comments = CountingCommentApi::new();
    let auth = FakeAuthApi::issuing(test_user(), token_expiring_in(3600));

    let post_id = Uuid::new_v4();
    let post_path = format!("/posts/{}", post_id);

    // Anonymous visitor tries a guarded action: draft is stashed and the
    // route gate sends them to login with a return hint
    assert!(!store.is_authenticated());
    mediator
        .stash(&PendingComment::new(
            post_id,
            "what a read".to_string(),
            None,
        ))
        .unwrap();

    let gate = RouteRequirement::protected("/login");
    match gate.evaluate(&store.snapshot(), &post_path) {
        AccessDecision::Redirect { target, return_to } => {
            assert_eq!(target, "/login");
            assert_eq!(return_to, Some(post_path.clone()));
        }
        AccessDecision::Grant => panic!("anonymous visitor must not pass"),
    }

    // Login succeeds, the post view mounts again, the draft replays once
    sign_in(&store, &auth, &credentials()).await.unwrap();
    assert_eq!(gate.evaluate(&store.snapshot(), &post_path), AccessDecision::Grant);

    match mediator.replay(&post_id, &comments).await {
        ReplayOutcome::Submitted(comment) => {
            assert_eq!(comment.post_id, post_id);
            assert_eq!(comment.content, "what a read");
        }
        other => panic!("expected submission, got {:?}", other),
    }
    assert_eq!(comments.call_count(), 1);
    assert!(!mediator.has_pending());
}
