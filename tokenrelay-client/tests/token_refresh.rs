//! Integration tests for transparent credential renewal.
//!
//! These tests run the client against a wiremock server and verify that:
//! - concurrent 401s share a single renewal call and all replay with the new token
//! - a failed or malformed renewal rejects every waiting request and logs out
//! - authentication endpoints never carry a credential or trigger renewal
//! - a replayed request is never renewed a second time

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokenrelay_client::{ApiClient, ApiRequest, Channel, ClientConfig, ClientError, FormPart, RenewalError};
use tokenrelay_core::{
    CredentialPair, CredentialStore, MemoryStore, SecretCredentialStore, SessionSink, SessionState,
    SessionStatus,
};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REFRESH: &str = "/api/v1/authentications/refresh-token";
const LOGIN: &str = "/api/v1/authentications/login";

struct Harness {
    client: ApiClient,
    store: Arc<SecretCredentialStore<MemoryStore>>,
    session: Arc<SessionState>,
}

/// A client signed in as `user-1` with `at-1` / `rt-1`.
async fn signed_in(server: &MockServer) -> Harness {
    signed_in_with(server, CredentialPair::new("at-1", "rt-1"), Some("user-1")).await
}

async fn signed_in_with(server: &MockServer, pair: CredentialPair, user_id: Option<&str>) -> Harness {
    let store = Arc::new(SecretCredentialStore::new(MemoryStore::new(), "test"));
    let session = Arc::new(SessionState::new());
    let client = ApiClient::new(ClientConfig::new(server.uri()), store.clone(), session.clone()).unwrap();

    match user_id {
        Some(user_id) => client.establish_session(pair, user_id).await.unwrap(),
        None => store.set_credentials(&pair).await.unwrap(),
    }

    Harness {
        client,
        store,
        session,
    }
}

fn renewed(access: &str, refresh: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "data": {
            "user": {"id": "user-1"},
            "tokens": {"accessToken": access, "refreshToken": refresh}
        }
    }))
}

/// 401 for `at-1`, 200 for `at-2`.
async fn mount_protected(server: &MockServer, verb: &str, route: &str, expected_calls: u64) {
    Mock::given(method(verb))
        .and(path(route))
        .and(header("authorization", "Bearer at-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "jwt expired"})))
        .expect(expected_calls)
        .mount(server)
        .await;
    Mock::given(method(verb))
        .and(path(route))
        .and(header("authorization", "Bearer at-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"route": route})))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_concurrent_unauthorized_requests_share_one_renewal() {
    let server = MockServer::start().await;
    mount_protected(&server, "GET", "/api/v1/courses", 5).await;
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .and(body_json(json!({"userId": "user-1", "refreshToken": "rt-1"})))
        // Keep the renewal outstanding until every 401 has come back.
        .respond_with(renewed("at-2", "rt-2").set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&server)
        .await;

    let h = signed_in(&server).await;
    let c = &h.client;

    let results = tokio::join!(
        c.get_json::<Value>("/api/v1/courses"),
        c.get_json::<Value>("/api/v1/courses"),
        c.get_json::<Value>("/api/v1/courses"),
        c.get_json::<Value>("/api/v1/courses"),
        c.get_json::<Value>("/api/v1/courses"),
    );
    for result in [results.0, results.1, results.2, results.3, results.4] {
        assert_eq!(result.unwrap()["route"], "/api/v1/courses");
    }

    let pair = h.store.load_pair().await.unwrap().unwrap();
    assert_eq!(pair.access_token.expose(), "at-2");
    assert_eq!(pair.refresh_token.expose(), "rt-2");
    assert!(!h.client.is_refreshing());
    assert_eq!(h.session.status(), SessionStatus::Active);

    // The renewal call itself never carries a bearer credential.
    let received = server.received_requests().await.unwrap();
    let renewals: Vec<_> = received.iter().filter(|r| r.url.path() == REFRESH).collect();
    assert_eq!(renewals.len(), 1);
    assert!(renewals[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_renewal_missing_refresh_token_logs_out_everyone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/lessons"))
        .respond_with(ResponseTemplate::new(401))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": {"tokens": {"accessToken": "at-2"}}}))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = signed_in(&server).await;
    let mut updates = h.session.subscribe();
    updates.borrow_and_update();
    let c = &h.client;

    let (a, b, d) = tokio::join!(
        c.send(ApiRequest::get("/api/v1/lessons")),
        c.send(ApiRequest::get("/api/v1/lessons")),
        c.send(ApiRequest::get("/api/v1/lessons")),
    );
    for result in [a, b, d] {
        let err = result.unwrap_err();
        assert!(
            matches!(err, ClientError::Renewal(RenewalError::InvalidResponse { .. })),
            "{err}"
        );
        assert!(err.is_session_ended());
    }

    assert!(h.session.is_logged_out());
    assert!(updates.has_changed().unwrap());
    assert!(h.session.current_user_id().is_none());
    assert!(h.store.access_token().await.unwrap().is_none());
    assert!(h.store.refresh_token().await.unwrap().is_none());
}

#[tokio::test]
async fn test_login_unauthorized_is_not_renewed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "wrong password"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .respond_with(renewed("at-2", "rt-2"))
        .expect(0)
        .mount(&server)
        .await;

    let h = signed_in(&server).await;
    let err = h
        .client
        .post_json::<_, Value>(LOGIN, &json!({"email": "a@b.c", "password": "nope"}))
        .await
        .unwrap_err();

    let http = err.http().unwrap();
    assert!(http.is_unauthorized());
    assert!(http.body.as_deref().unwrap_or_default().contains("wrong password"));
    assert!(!err.is_session_ended());
    assert_eq!(h.session.status(), SessionStatus::Active);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_replay_rejected_again_is_surfaced_without_second_renewal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/admin"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .respond_with(renewed("at-2", "rt-2"))
        .expect(1)
        .mount(&server)
        .await;

    let h = signed_in(&server).await;
    let err = h.client.send(ApiRequest::get("/api/v1/admin")).await.unwrap_err();

    assert!(matches!(&err, ClientError::Http(e) if e.is_unauthorized()), "{err}");
    // The renewal itself succeeded, so the session survives.
    assert_eq!(h.session.status(), SessionStatus::Active);

    let requests = server.received_requests().await.unwrap();
    let replay = requests
        .iter()
        .filter(|r| r.url.path() == "/api/v1/admin")
        .nth(1)
        .unwrap();
    assert_eq!(replay.headers.get("authorization").unwrap(), "Bearer at-2");
}

#[tokio::test]
async fn test_missing_refresh_token_tears_down_without_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/profile"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .respond_with(renewed("at-2", "rt-2"))
        .expect(0)
        .mount(&server)
        .await;

    let h = signed_in_with(&server, CredentialPair::new("at-1", ""), Some("user-1")).await;
    let err = h.client.send(ApiRequest::get("/api/v1/profile")).await.unwrap_err();

    assert!(
        matches!(err, ClientError::Renewal(RenewalError::MissingRefreshToken)),
        "{err}"
    );
    assert!(h.session.is_logged_out());
    assert!(h.store.load_pair().await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_user_id_tears_down_without_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/profile"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .respond_with(renewed("at-2", "rt-2"))
        .expect(0)
        .mount(&server)
        .await;

    let h = signed_in_with(&server, CredentialPair::new("at-1", "rt-1"), None).await;
    let err = h.client.send(ApiRequest::get("/api/v1/profile")).await.unwrap_err();

    assert!(matches!(err, ClientError::Renewal(RenewalError::MissingUserId)), "{err}");
    assert!(h.session.is_logged_out());
    assert!(h.store.load_pair().await.unwrap().is_none());
}

#[tokio::test]
async fn test_no_credential_reaches_any_channel_after_teardown() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orders"))
        .and(header("authorization", "Bearer at-1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/uploads"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let h = signed_in(&server).await;
    let err = h.client.send(ApiRequest::get("/api/v1/orders")).await.unwrap_err();
    assert!(matches!(err, ClientError::Renewal(RenewalError::Transport(_))), "{err}");

    for channel in Channel::ALL {
        assert!(h.client.default_headers(channel).get("authorization").is_none());
    }
    h.client
        .upload("/api/v1/uploads", vec![FormPart::text("title", "after logout")])
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let upload = requests
        .iter()
        .find(|r| r.url.path() == "/api/v1/uploads")
        .unwrap();
    assert!(upload.headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_multipart_upload_is_renewed_and_replayed() {
    let server = MockServer::start().await;
    mount_protected(&server, "POST", "/api/v1/avatars", 1).await;
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .respond_with(renewed("at-2", "rt-2"))
        .expect(1)
        .mount(&server)
        .await;

    let h = signed_in(&server).await;
    let part = FormPart::file("avatar", "me.png", vec![0x89, 0x50, 0x4e, 0x47]).with_content_type("image/png");
    let response = h.client.upload("/api/v1/avatars", vec![part]).await.unwrap();
    assert!(response.status.is_success());

    let requests = server.received_requests().await.unwrap();
    let replay = requests.last().unwrap();
    let content_type = replay.headers.get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data"));
    assert!(String::from_utf8_lossy(&replay.body).contains("me.png"));
}

#[tokio::test]
async fn test_non_auth_failures_pass_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/forbidden"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(REFRESH))
        .respond_with(renewed("at-2", "rt-2"))
        .expect(0)
        .mount(&server)
        .await;

    let h = signed_in(&server).await;
    let err = h.client.delete("/api/v1/forbidden").await.unwrap_err();
    assert_eq!(err.http().unwrap().status, Some(403));
}

#[tokio::test]
async fn test_logout_clears_session() {
    let server = MockServer::start().await;
    let h = signed_in(&server).await;

    h.client.logout().await;

    assert!(h.session.is_logged_out());
    assert!(h.store.load_pair().await.unwrap().is_none());
    assert!(h.client.default_headers(Channel::Json).get("authorization").is_none());

    // Logging out twice is harmless.
    h.client.logout().await;
    assert!(h.session.is_logged_out());
}

mod proactive {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn jwt_expiring_in(seconds: i64) -> String {
        let exp = chrono::Utc::now().timestamp() + seconds;
        let payload = URL_SAFE_NO_PAD.encode(json!({"sub": "user-1", "exp": exp}).to_string());
        format!("eyJhbGciOiJIUzI1NiJ9.{payload}.signature")
    }

    #[tokio::test]
    async fn test_refreshes_token_close_to_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH))
            .respond_with(renewed("at-2", "rt-2"))
            .expect(1)
            .mount(&server)
            .await;

        let h = signed_in_with(&server, CredentialPair::new(jwt_expiring_in(30), "rt-1"), Some("user-1")).await;
        let renewed = h
            .client
            .refresh_if_expiring(chrono::Duration::minutes(5))
            .await
            .unwrap();

        assert!(renewed);
        assert_eq!(h.store.access_token().await.unwrap().unwrap().expose(), "at-2");
    }

    #[tokio::test]
    async fn test_leaves_fresh_token_alone() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(REFRESH))
            .respond_with(renewed("at-2", "rt-2"))
            .expect(0)
            .mount(&server)
            .await;

        let h = signed_in_with(&server, CredentialPair::new(jwt_expiring_in(3600), "rt-1"), Some("user-1")).await;
        let renewed = h
            .client
            .refresh_if_expiring(chrono::Duration::minutes(5))
            .await
            .unwrap();

        assert!(!renewed);
    }
}
