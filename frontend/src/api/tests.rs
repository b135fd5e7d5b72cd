use super::test_support::mock::*;
use super::*;
use crate::error::ScannerError;
use crate::scanner::classifier::AttendeeIdentity;
use chrono::NaiveDate;
use serde_json::json;

fn scan_request() -> ScanRequest {
    ScanRequest::new(
        "eyJ1c2VySUQiOjQyLCJlbWFpbCI6ImFAYi5jb20ifQ==",
        &AttendeeIdentity {
            attendee_id: 42,
            email: "a@b.com".into(),
        },
        7,
        "device-abc",
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
    )
}

#[tokio::test]
async fn submit_scan_sends_session_and_bearer_headers() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/checkin/scan");
        then.status(202).json_body(json!({ "accepted": true }));
    });

    let client = ApiClient::new_with_base_url(server.url("/api"));
    client
        .post_scan("session-1", "token-abc", &scan_request())
        .await
        .unwrap();

    let received = server.received();
    assert_eq!(received.len(), 1);
    let request = &received[0];
    assert_eq!(request.method, POST);
    assert_eq!(request.path, "/api/checkin/scan");
    assert_eq!(request.header("X-Socket-SessionId"), Some("session-1"));
    assert_eq!(request.header("authorization"), Some("Bearer token-abc"));
    assert_eq!(
        request.body,
        Some(json!({
            "userId": 42,
            "scannerUserId": 7,
            "hash": "eyJ1c2VySUQiOjQyLCJlbWFpbCI6ImFAYi5jb20ifQ==",
            "deviceId": "device-abc",
            "scanDate": "2025-03-14"
        }))
    );
}

#[tokio::test]
async fn submit_scan_maps_unauthorized_to_authentication_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/checkin/scan");
        then.status(401)
            .json_body(json!({ "error": "Token expired", "code": "UNAUTHORIZED" }));
    });

    let client = ApiClient::new_with_base_url(server.url("/api"));
    let err = client
        .submit_scan("session-1", "token-abc", &scan_request())
        .await
        .unwrap_err();
    assert_eq!(err, ScannerError::Authentication("Token expired".into()));
    assert!(err.requires_logout());
}

#[tokio::test]
async fn submit_scan_surfaces_server_rejection_message() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/checkin/scan");
        then.status(422)
            .json_body(json!({ "message": "Attendee not registered for today" }));
    });

    let client = ApiClient::new_with_base_url(server.url("/api"));
    let err = client
        .submit_scan("session-1", "token-abc", &scan_request())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ScannerError::ServerRejection("Attendee not registered for today".into())
    );
}

#[tokio::test]
async fn missing_route_is_a_network_error() {
    let server = MockServer::start();
    let client = ApiClient::new_with_base_url(server.url("/api"));
    let err = client
        .submit_scan("session-1", "token-abc", &scan_request())
        .await
        .unwrap_err();
    assert!(matches!(err, ScannerError::Network(_)));
}
