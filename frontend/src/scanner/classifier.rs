//! Classification of decoded QR payloads.
//!
//! Attendee badges carry a base64-encoded JSON record such as
//! `{"userID":42,"email":"a@b.com"}`. Everything else a camera might pick up
//! (URLs, Wi-Fi credentials, vCards) is recognised only so the scanner can
//! tell the operator what they pointed at.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const IDENTITY_KEYS: [&str; 4] = ["userID", "userId", "attendeeId", "id"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeeIdentity {
    pub attendee_id: i64,
    pub email: String,
}

/// Result of trying to read a payload as an attendee badge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedPayload {
    Identity(AttendeeIdentity),
    NotIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanKind {
    AttendeeIdentity(AttendeeIdentity),
    Url,
    WiFi,
    Email,
    Contact,
    Text,
}

impl ScanKind {
    pub fn label(&self) -> &'static str {
        match self {
            ScanKind::AttendeeIdentity(_) => "attendee badge",
            ScanKind::Url => "URL",
            ScanKind::WiFi => "Wi-Fi network",
            ScanKind::Email => "email address",
            ScanKind::Contact => "phone contact",
            ScanKind::Text => "plain text",
        }
    }

    pub fn identity(&self) -> Option<&AttendeeIdentity> {
        match self {
            ScanKind::AttendeeIdentity(identity) => Some(identity),
            _ => None,
        }
    }
}

pub fn classify(payload: &str) -> ScanKind {
    if let DecodedPayload::Identity(identity) = decode_identity(payload) {
        return ScanKind::AttendeeIdentity(identity);
    }
    if payload.starts_with("http://") || payload.starts_with("https://") {
        ScanKind::Url
    } else if payload.starts_with("WiFi:") {
        ScanKind::WiFi
    } else if payload.contains('@') && payload.contains('.') {
        ScanKind::Email
    } else if payload.starts_with("tel:") || payload.starts_with("sms:") {
        ScanKind::Contact
    } else {
        ScanKind::Text
    }
}

pub fn decode_identity(payload: &str) -> DecodedPayload {
    let bytes = match STANDARD.decode(payload.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return DecodedPayload::NotIdentity,
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(record)) => identity_from_record(&record),
        _ => DecodedPayload::NotIdentity,
    }
}

/// Inverse of [`decode_identity`]; used to print badges and in tests.
pub fn encode_identity(identity: &AttendeeIdentity) -> String {
    let record = serde_json::json!({
        "userID": identity.attendee_id,
        "email": identity.email,
    });
    STANDARD.encode(record.to_string())
}

fn identity_from_record(record: &Map<String, Value>) -> DecodedPayload {
    let attendee_id = IDENTITY_KEYS
        .iter()
        .find_map(|key| record.get(*key))
        .and_then(id_value);
    let email = record
        .get("email")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|email| is_email_shaped(email));

    match (attendee_id, email) {
        (Some(attendee_id), Some(email)) => DecodedPayload::Identity(AttendeeIdentity {
            attendee_id,
            email: email.to_string(),
        }),
        _ => DecodedPayload::NotIdentity,
    }
}

fn id_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_email_shaped(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    }
}
