#![allow(clippy::unwrap_used)]

mod common;

use common::{can_bind_localhost, jwt, session, sign_in, token_pair};
use serde_json::{json, Value};
use std::time::Duration;
use tripkey::{auth::types::Role, transport::ApiRequest, Error};
use wiremock::{
    matchers::{body_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

#[tokio::test]
async fn concurrent_requests_share_one_refresh() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start().await;
    let (session, _clock) = session(&server.uri());
    // Inside the refresh skew, so both calls refresh before sending.
    sign_in(&session, "old", 1);

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refresh_token": "r1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_pair("new", "r2"))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/trips"))
        .and(header("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .expect(2)
        .mount(&server)
        .await;

    let gateway = session.gateway();
    let (first, second) = tokio::join!(
        gateway.get_json::<Value>("/trips"),
        gateway.get_json::<Value>("/trips")
    );

    assert_eq!(first.unwrap(), json!([{"id": 1}]));
    assert_eq!(second.unwrap(), json!([{"id": 1}]));
    let stored = session.current().unwrap();
    assert_eq!(stored.access_token, "new");
    assert_eq!(stored.refresh_token.as_deref(), Some("r2"));
}

#[tokio::test]
async fn unauthorized_is_refreshed_and_replayed_once() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start().await;
    let (session, _clock) = session(&server.uri());
    sign_in(&session, "old", 900);

    Mock::given(method("GET"))
        .and(path("/trips"))
        .and(header("authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_pair("new", "r2")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/trips"))
        .and(header("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let value = session
        .gateway()
        .send_value(&ApiRequest::get("/trips"))
        .await
        .unwrap();
    assert_eq!(value, json!({"ok": true}));
    assert_eq!(session.current().unwrap().access_token, "new");
}

#[tokio::test]
async fn second_unauthorized_clears_the_session() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start().await;
    let (session, _clock) = session(&server.uri());
    sign_in(&session, "old", 900);

    Mock::given(method("GET"))
        .and(path("/trips"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_pair("new", "r2")))
        .expect(1)
        .mount(&server)
        .await;

    let result = session.gateway().get_json::<Value>("/trips").await;
    assert!(matches!(result, Err(Error::Unauthorized)));
    assert!(session.current().is_none());
    assert!(session.cache().peek().is_none());
}

#[tokio::test]
async fn rejected_refresh_clears_the_session() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start().await;
    let (session, _clock) = session(&server.uri());
    sign_in(&session, "old", 900);

    Mock::given(method("GET"))
        .and(path("/participants"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "refresh token revoked"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let response = session
        .fetch(&ApiRequest::get("/participants"))
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
    assert!(session.current().is_none());
}

#[tokio::test]
async fn unauthorized_without_refresh_token_skips_the_network() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start().await;
    let (session, _clock) = session(&server.uri());
    session
        .establish(serde_json::from_value(json!({"access_token": "only-access"})).unwrap())
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/documents"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_pair("new", "r2")))
        .expect(0)
        .mount(&server)
        .await;

    let result = session.gateway().get_json::<Value>("/documents").await;
    assert!(matches!(result, Err(Error::Unauthorized)));
    assert!(session.current().is_none());
}

#[tokio::test]
async fn failed_proactive_refresh_keeps_the_session() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start().await;
    let (session, _clock) = session(&server.uri());
    sign_in(&session, "stale", 1);

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sections"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let value: Value = session.gateway().get_json("/sections").await.unwrap();
    assert_eq!(value, json!([]));
    assert_eq!(session.current().unwrap().access_token, "stale");
}

#[tokio::test]
async fn rejected_proactive_refresh_sends_anonymously() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start().await;
    let (session, _clock) = session(&server.uri());
    sign_in(&session, "stale", 1);

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "refresh token revoked"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let value: Value = session.gateway().get_json("/sections").await.unwrap();
    assert_eq!(value, json!([]));
    assert!(session.current().is_none());

    let requests = server.received_requests().await.unwrap();
    let get = requests
        .iter()
        .find(|request| request.url.path() == "/sections")
        .unwrap();
    assert!(get.headers.get("authorization").is_none());
}

#[tokio::test]
async fn logout_during_refresh_stays_logged_out() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start().await;
    let (session, _clock) = session(&server.uri());
    sign_in(&session, "old", 900);

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_pair("new", "r2"))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (refreshed, ()) = tokio::join!(session.refresh(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.logout();
    });

    assert!(!refreshed);
    assert!(session.current().is_none());
    assert!(session.cache().peek().is_none());
}

#[tokio::test]
async fn anonymous_requests_carry_no_authorization() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start().await;
    let (session, _clock) = session(&server.uri());

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let value = session
        .gateway()
        .send_value(&ApiRequest::get("/health"))
        .await
        .unwrap();
    assert_eq!(value, Value::String("ok".to_string()));

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn identity_falls_back_to_me_for_opaque_tokens() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start().await;
    let (session, _clock) = session(&server.uri());
    sign_in(&session, "opaque", 900);

    Mock::given(method("GET"))
        .and(path("/me"))
        .and(header("authorization", "Bearer opaque"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "42",
            "email": "teacher@school.example",
            "role": "TEACHER"
        })))
        .expect(1)
        .mount(&server)
        .await;

    assert!(session.can("trips", "create").await.allow);
    // Served from the cache the second time.
    assert!(!session.can("users", "list").await.allow);
    let identity = session.identity().await.unwrap();
    assert_eq!(identity.roles, vec![Role::Teacher]);
}

#[tokio::test]
async fn identity_comes_from_token_claims_without_network() {
    if !can_bind_localhost() {
        return;
    }
    let server = MockServer::start().await;
    let (session, _clock) = session(&server.uri());
    let access = jwt(&json!({"sub": "9", "email": "admin@school.example", "roles": ["ADMIN"]}));
    sign_in(&session, &access, 900);

    Mock::given(method("GET"))
        .and(path("/me"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let identity = session.identity().await.unwrap();
    assert_eq!(identity.id, "9");
    assert!(session.can("admin", "show").await.allow);
}
