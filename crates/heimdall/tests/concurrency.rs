mod common;

use common::{api_url, harness, vault_with, ScriptedTokens, ScriptedTransport};
use heimdall::{
    AuthError, HttpRequest, SessionEvent, SessionSnapshot, SessionStatus, Token, UserInfo,
};
use std::sync::Arc;
use tokio::sync::{Barrier, Notify};

const CONCURRENT: usize = 8;

fn stored_old() -> Option<SessionSnapshot> {
    Some(SessionSnapshot::new(
        Token::new("old", "r1"),
        UserInfo::new("oscar"),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_401s_share_a_single_refresh() {
    let barrier = Arc::new(Barrier::new(CONCURRENT));
    let h = harness(
        vault_with(stored_old()),
        ScriptedTransport::accepting(&["new"]).with_unauthorized_barrier(barrier),
        ScriptedTokens::new(None, Some(Token::new("new", "r2"))),
        None,
    );
    h.runtime.store().set_token(Token::new("old", "r1")).unwrap();

    let requests: Vec<_> = (0..CONCURRENT)
        .map(|i| {
            let client = h.runtime.client();
            tokio::spawn(async move {
                client
                    .send(HttpRequest::get(api_url(&format!("/api/items/{}", i))))
                    .await
            })
        })
        .collect();

    for request in requests {
        let response = request.await.unwrap().unwrap();
        assert_eq!(response.status, 200);
    }

    assert_eq!(h.tokens.refresh_calls(), 1);
    assert_eq!(h.runtime.store().refresh_gate().started(), 1);
    let retried_with_new = h
        .transport
        .seen()
        .iter()
        .filter(|bearer| bearer.as_deref() == Some("new"))
        .count();
    assert_eq!(retried_with_new, CONCURRENT);
    assert_eq!(h.runtime.status(), SessionStatus::Authenticated);
}

#[tokio::test]
async fn cancelling_one_request_leaves_refresh_and_others_running() {
    let release = Arc::new(Notify::new());
    let h = harness(
        vault_with(stored_old()),
        ScriptedTransport::accepting(&["new"]),
        ScriptedTokens::new(None, Some(Token::access_only("new"))).gated(release.clone()),
        None,
    );
    h.runtime.store().set_token(Token::new("old", "r1")).unwrap();
    let client = h.runtime.client();

    let (first, first_pending) = client.send_cancellable(HttpRequest::get(api_url("/api/a")));
    let (_second, second_pending) = client.send_cancellable(HttpRequest::get(api_url("/api/b")));
    while h.tokens.refresh_calls() == 0 || h.transport.requests() < 2 {
        tokio::task::yield_now().await;
    }

    first.cancel(Some("view closed"));
    let err = first_pending.await.unwrap_err();
    assert!(matches!(err, AuthError::Cancelled(ref reason) if reason == "view closed"));
    assert!(!err.is_auth_expired() && !err.is_transport());

    release.notify_one();
    let response = second_pending.await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(h.tokens.refresh_calls(), 1);
    assert_eq!(h.runtime.store().token().access_token, "new");
    assert!(client.registry().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_shared_refresh_redirects_to_login_once() {
    let barrier = Arc::new(Barrier::new(CONCURRENT));
    let h = harness(
        vault_with(stored_old()),
        ScriptedTransport::accepting(&[]).with_unauthorized_barrier(barrier),
        ScriptedTokens::new(None, None),
        None,
    );
    h.runtime.store().set_token(Token::new("old", "r1")).unwrap();

    let requests: Vec<_> = (0..CONCURRENT)
        .map(|i| {
            let client = h.runtime.client();
            tokio::spawn(async move {
                client
                    .send(HttpRequest::get(api_url(&format!("/api/items/{}", i))))
                    .await
            })
        })
        .collect();

    for request in requests {
        let err = request.await.unwrap().unwrap_err();
        assert!(err.is_auth_expired());
    }

    let trace = h.runtime.settle().await;
    assert_eq!(trace, vec![SessionEvent::Login]);
    assert_eq!(h.tokens.refresh_calls(), 1);
    assert_eq!(h.redirector.logins(), 1);
    assert_eq!(h.runtime.status(), SessionStatus::Anonymous);
    assert!(h.runtime.store().snapshot().is_empty());
}

#[tokio::test]
async fn refresh_failing_after_its_caller_cancelled_still_redirects() {
    let release = Arc::new(Notify::new());
    let h = harness(
        vault_with(stored_old()),
        ScriptedTransport::accepting(&[]),
        ScriptedTokens::new(None, None).gated(release.clone()),
        None,
    );
    h.runtime.store().set_token(Token::new("old", "r1")).unwrap();
    let client = h.runtime.client();

    let (handle, pending) = client.send_cancellable(HttpRequest::get(api_url("/api/a")));
    while h.tokens.refresh_calls() == 0 {
        tokio::task::yield_now().await;
    }
    handle.cancel(Some("view closed"));
    assert!(pending.await.unwrap_err().is_cancelled());

    release.notify_one();
    while h.runtime.store().refresh_gate().is_refreshing() {
        tokio::task::yield_now().await;
    }

    let trace = h.runtime.settle().await;
    assert_eq!(trace, vec![SessionEvent::Login]);
    assert_eq!(h.redirector.logins(), 1);
    assert!(h.runtime.store().snapshot().is_empty());
}

#[tokio::test]
async fn cancel_all_rejects_every_pending_request() {
    let hold = Arc::new(Notify::new());
    let h = harness(
        vault_with(stored_old()),
        ScriptedTransport::accepting(&["old"]).with_hold(hold),
        ScriptedTokens::new(None, None),
        None,
    );
    let client = h.runtime.client();

    let pending: Vec<_> = (0..3)
        .map(|i| client.send_cancellable(HttpRequest::get(api_url(&format!("/api/{}", i)))))
        .collect();
    while h.transport.requests() < 3 {
        tokio::task::yield_now().await;
    }

    assert_eq!(client.cancel_all(None), 3);
    assert!(client.registry().is_empty());

    for (handle, response) in pending {
        let err = response.await.unwrap_err();
        assert!(matches!(err, AuthError::Cancelled(ref reason) if reason == "all requests cancelled"));
        handle.cancel(None);
    }
    assert!(client.registry().is_empty());
    assert_eq!(h.tokens.refresh_calls(), 0);
    assert_eq!(h.redirector.logins(), 0);
}
