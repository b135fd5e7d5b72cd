use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scanner::classifier::AttendeeIdentity;

/// Body of `POST /checkin/scan`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    #[serde(rename = "userId")]
    pub attendee_id: i64,
    #[serde(rename = "scannerUserId")]
    pub scanner_id: i64,
    #[serde(rename = "hash")]
    pub raw_payload: String,
    #[serde(rename = "deviceId")]
    pub device_id: String,
    #[serde(rename = "scanDate")]
    pub scan_date: NaiveDate,
}

impl ScanRequest {
    pub fn new(
        raw_payload: &str,
        identity: &AttendeeIdentity,
        scanner_id: i64,
        device_id: &str,
        scan_date: NaiveDate,
    ) -> Self {
        Self {
            attendee_id: identity.attendee_id,
            scanner_id,
            raw_payload: raw_payload.to_string(),
            device_id: device_id.to_string(),
            scan_date,
        }
    }
}

/// Error body returned by the check-in backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(alias = "message")]
    pub error: String,
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl From<ApiError> for String {
    fn from(error: ApiError) -> Self {
        error.error
    }
}

impl ApiError {
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            code: "UNKNOWN".to_string(),
            details: None,
        }
    }
}

/// A scan the server accepted, as pushed on the success channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub data: Value,
    pub received_at: DateTime<Utc>,
}

impl ScanOutcome {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            received_at: Utc::now(),
        }
    }

    pub fn attendee_name(&self) -> Option<&str> {
        ["userName", "fullName", "name"]
            .iter()
            .find_map(|key| self.data.get(*key).and_then(Value::as_str))
    }

    pub fn message(&self) -> Option<&str> {
        self.data.get("message").and_then(Value::as_str)
    }

    pub fn attendee_id(&self) -> Option<i64> {
        self.data.get("userId").and_then(Value::as_i64)
    }
}

/// Human-readable text of an error-channel message body.
pub fn error_message_from_body(body: &str) -> String {
    let trimmed = body.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => ["message", "error"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| trimmed.to_string()),
        Ok(Value::String(text)) => text,
        _ if trimmed.is_empty() => "Scan was rejected by the server".to_string(),
        _ => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scan_request_uses_backend_field_names() {
        let identity = AttendeeIdentity {
            attendee_id: 42,
            email: "a@b.com".into(),
        };
        let request = ScanRequest::new(
            "eyJ1c2VySUQiOjQyfQ==",
            &identity,
            7,
            "device-1",
            NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
        );
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "userId": 42,
                "scannerUserId": 7,
                "hash": "eyJ1c2VySUQiOjQyfQ==",
                "deviceId": "device-1",
                "scanDate": "2025-03-14"
            })
        );
    }

    #[test]
    fn api_error_accepts_message_key() {
        let err: ApiError = serde_json::from_value(json!({ "message": "Forbidden" })).unwrap();
        assert_eq!(err.error, "Forbidden");
        assert!(err.code.is_empty());
    }

    #[test]
    fn error_bodies_are_reduced_to_text() {
        assert_eq!(
            error_message_from_body(r#"{"message":"Bag already issued"}"#),
            "Bag already issued"
        );
        assert_eq!(error_message_from_body(r#""plain""#), "plain");
        assert_eq!(error_message_from_body("oops"), "oops");
        assert_eq!(
            error_message_from_body("  "),
            "Scan was rejected by the server"
        );
    }

    #[test]
    fn outcome_reads_common_fields() {
        let outcome = ScanOutcome::new(json!({
            "userId": 42,
            "userName": "Ada Lovelace",
            "message": "Lunch coupon issued"
        }));
        assert_eq!(outcome.attendee_id(), Some(42));
        assert_eq!(outcome.attendee_name(), Some("Ada Lovelace"));
        assert_eq!(outcome.message(), Some("Lunch coupon issued"));
    }
}
