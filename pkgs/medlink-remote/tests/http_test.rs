//! Tests for HttpApi against a mock MedLink server
//!
//! These tests cover:
//! - Request paths, query parameters, bodies and the bearer credential
//! - Status classification into ChatError
//! - Entry-level quarantine of malformed list items

use medlink_chat::{
    AssistantApi, AssistantRole, AssistantTurn, ChatError, ConversationApi, DoctorApi, MessageApi,
    Role,
};
use medlink_remote::{HttpApi, RemoteConfig};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_for(server: &MockServer) -> HttpApi {
    let config = RemoteConfig {
        api_url: format!("{}/api", server.uri()),
        ..Default::default()
    }
    .with_token("secret-token");
    HttpApi::new(&config).unwrap()
}

#[tokio::test]
async fn test_list_conversations_sends_role_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations"))
        .and(query_param("role", "doctor"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "room-1", "name": "Dr. Amal", "lastMessage": "ok", "unread": true},
            {"id": "room-2", "name": "Dr. Mira"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let list = api_for(&server).list_conversations(Role::Doctor).await.unwrap();

    assert_eq!(list.len(), 2);
    assert_eq!(list[0].last_message.as_deref(), Some("ok"));
    assert!(list[0].unread);
    assert!(!list[1].unread);
}

#[tokio::test]
async fn test_malformed_entries_are_quarantined() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/rooms/room-1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "m1", "sender": "u1", "text": "hi", "timestamp": "2024-03-01T10:00:00Z"},
            {"id": "m2", "text": "missing sender and time"},
            {"id": "m3", "sender": "u2", "text": "bye", "timestamp": "2024-03-01T10:05:00Z"}
        ])))
        .mount(&server)
        .await;

    let history = api_for(&server).fetch_history("room-1").await.unwrap();

    let ids: Vec<_> = history.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m3"]);
}

#[tokio::test]
async fn test_non_list_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "nope"})))
        .mount(&server)
        .await;

    let err = api_for(&server)
        .list_conversations(Role::Patient)
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::MalformedPayload(_)));
}

#[tokio::test]
async fn test_send_message_posts_body_and_reads_ack() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/rooms/room-1/messages"))
        .and(body_json(json!({"roomId": "room-1", "content": "hello"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "srv-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let ack = api_for(&server).send_message("room-1", "hello").await.unwrap();

    assert_eq!(ack.id.as_deref(), Some("srv-1"));
}

#[tokio::test]
async fn test_empty_ack_body_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/connections/requests"))
        .and(body_json(json!({"doctorId": "doc-1"})))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let ack = api_for(&server).send_request("doc-1").await.unwrap();

    assert!(ack.id.is_none());
}

#[tokio::test]
async fn test_unauthorized_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/connections/requests/pending"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let err = api_for(&server).pending_requests().await.unwrap_err();

    assert!(matches!(err, ChatError::Auth { status: 401 }));
}

#[tokio::test]
async fn test_conflict_on_duplicate_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/connections/requests/req-1/accept"))
        .respond_with(ResponseTemplate::new(409).set_body_string("already accepted"))
        .mount(&server)
        .await;

    let err = api_for(&server).accept_request("req-1").await.unwrap_err();

    assert!(matches!(err, ChatError::Conflict(ref body) if body == "already accepted"));
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/doctors/search"))
        .and(query_param("q", "priya"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = api_for(&server).search_doctors("priya").await.unwrap_err();

    assert!(matches!(err, ChatError::TransientFetch(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_transient() {
    let config = RemoteConfig {
        api_url: "http://127.0.0.1:9/api".to_string(),
        ..Default::default()
    };
    let api = HttpApi::new(&config).unwrap();

    let err = api.reject_request("req-1").await.unwrap_err();

    assert!(matches!(err, ChatError::TransientFetch(_)));
}

#[tokio::test]
async fn test_assistant_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/assistant/reply"))
        .and(body_json(json!({
            "messages": [{"role": "user", "text": "Is 120/80 normal?"}]
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"reply": "Yes, that is normal."})),
        )
        .mount(&server)
        .await;

    let thread = vec![AssistantTurn {
        role: AssistantRole::User,
        text: "Is 120/80 normal?".to_string(),
    }];
    let reply = api_for(&server).reply(&thread).await.unwrap();

    assert_eq!(reply, "Yes, that is normal.");
}
