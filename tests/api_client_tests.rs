//! Integration tests for the HTTP queue API client

use clinic_sync::api::{HttpQueueApi, QueueApi};
use clinic_sync::error::FailureKind;
use clinic_sync::models::{MessageId, SenderRole, TicketStatus};
use clinic_sync::SyncError;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_fetch_departments_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/departments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "id": "D1",
                "name": "Cardiology",
                "is_open": true,
                "waiting_count": 4,
                "serving_token": "C-12",
                "doctor": "Dr. Ray",
                "current_patient": "-"
            },
            { "name": "No id" }
        ])))
        .mount(&mock_server)
        .await;

    let api = HttpQueueApi::new(format!("{}/api", mock_server.uri()));
    let records = api.fetch_departments().await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id.as_deref(), Some("D1"));
    assert_eq!(records[0].waiting_count, 4);
    assert_eq!(records[0].doctor.as_deref(), Some("Dr. Ray"));
    assert!(records[1].id.is_none());
}

#[tokio::test]
async fn test_fetch_threads_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "id": "t-1",
                "category": "billing",
                "status": "OPEN",
                "last_message": "Thanks",
                "last_message_at": "2024-01-01T10:00:00Z"
            },
            { "id": "t-2", "status": "CLOSED" }
        ])))
        .mount(&mock_server)
        .await;

    let api = HttpQueueApi::new(mock_server.uri());
    let threads = api.fetch_threads().await.unwrap();

    assert_eq!(threads.len(), 2);
    assert_eq!(threads[0].status, TicketStatus::Open);
    assert_eq!(threads[0].last_message.as_deref(), Some("Thanks"));
    assert_eq!(threads[1].status, TicketStatus::Closed);
    assert!(!threads[1].unread);
}

#[tokio::test]
async fn test_fetch_messages_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/threads/t-1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {
                "id": "m-1",
                "thread_id": "t-1",
                "sender_role": "patient",
                "content": "Hello",
                "created_at": "2024-01-01T10:00:00Z"
            }
        ])))
        .mount(&mock_server)
        .await;

    let api = HttpQueueApi::new(mock_server.uri());
    let messages = api.fetch_messages("t-1").await.unwrap();

    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender_role, SenderRole::Patient);
    assert!(!messages[0].optimistic);
}

#[tokio::test]
async fn test_send_message_returns_stored_copy() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/threads/t-1/messages"))
        .and(body_json(serde_json::json!({"content": "On my way"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "message": {
                "id": "m-7",
                "thread_id": "t-1",
                "sender_role": "staff",
                "content": "On my way",
                "created_at": "2024-01-01T10:05:00Z"
            }
        })))
        .mount(&mock_server)
        .await;

    let api = HttpQueueApi::new(mock_server.uri());
    let receipt = api.send_message("t-1", "On my way").await.unwrap();

    assert_eq!(receipt.message.unwrap().id, MessageId::new("m-7"));
}

#[tokio::test]
async fn test_send_message_ack_only() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/threads/t-1/messages"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let api = HttpQueueApi::new(mock_server.uri());
    let receipt = api.send_message("t-1", "hello").await.unwrap();

    assert!(receipt.message.is_none());
}

#[tokio::test]
async fn test_send_message_rejected() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/threads/t-1/messages"))
        .respond_with(ResponseTemplate::new(409).set_body_string("Thread is closed"))
        .mount(&mock_server)
        .await;

    let api = HttpQueueApi::new(mock_server.uri());
    let err = api.send_message("t-1", "hello").await.unwrap_err();

    match err {
        SyncError::RequestFailed { kind, message } => {
            assert_eq!(kind, FailureKind::Rejected { status: 409 });
            assert!(message.contains("Thread is closed"));
        }
        other => panic!("Expected RequestFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_close_thread_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/threads/t-1/close"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let api = HttpQueueApi::new(mock_server.uri());
    api.close_thread("t-1").await.unwrap();
}

#[tokio::test]
async fn test_mark_read_posts_ids() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/threads/t-1/read"))
        .and(body_json(serde_json::json!({"message_ids": ["m-1", "m-2"]})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let api = HttpQueueApi::new(mock_server.uri());
    api.mark_read("t-1", &[MessageId::new("m-1"), MessageId::new("m-2")])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unreachable_server_is_network_failure() {
    // Nothing listens on port 9
    let api = HttpQueueApi::new("http://127.0.0.1:9");
    let err = api.fetch_threads().await.unwrap_err();

    assert!(matches!(
        err,
        SyncError::RequestFailed {
            kind: FailureKind::Network,
            ..
        }
    ));
}
