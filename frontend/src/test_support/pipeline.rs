//! A connection manager wired to in-memory doubles.

use std::rc::Rc;

use crate::api::checkin::mock::RecordingGateway;
use crate::config::RuntimeConfig;
use crate::pages::scanner::view_model::ScannerDeps;
use crate::realtime::transport::{mock::MockTransport, TransportEvent};
use crate::realtime::{ConnectionManager, ConnectionOptions};
use crate::scanner::classifier::{encode_identity, AttendeeIdentity};
use crate::scanner::DuplicateCache;
use crate::state::auth::mock::MemoryTokenStore;
use crate::state::scanner::ScannerSession;

pub const CONNECTED_FRAME: &str = "CONNECTED\nversion:1.2\nheart-beat:10000,10000\n\n\0";

pub struct Pipeline {
    pub manager: ConnectionManager,
    pub transport: MockTransport,
    pub tokens: Rc<MemoryTokenStore>,
    pub gateway: Rc<RecordingGateway>,
    pub cache: DuplicateCache,
}

impl Pipeline {
    pub fn new() -> Self {
        let transport = MockTransport::new();
        let tokens = Rc::new(MemoryTokenStore::valid());
        let gateway = Rc::new(RecordingGateway::default());
        let manager = ConnectionManager::new(
            ConnectionOptions::from_config(&RuntimeConfig::default()),
            Rc::new(transport.clone()),
            tokens.clone(),
            gateway.clone(),
        );
        Self {
            manager,
            transport,
            tokens,
            gateway,
            cache: DuplicateCache::new(),
        }
    }

    pub async fn connect(&self) {
        let pending = self.manager.connect();
        self.transport.emit(TransportEvent::Opened);
        self.transport.emit_text(CONNECTED_FRAME);
        pending.await.expect("handshake");
    }

    pub fn scanner_deps(&self) -> ScannerDeps {
        ScannerDeps {
            session: ScannerSession {
                connection: self.manager.clone(),
                cache: self.cache.clone(),
            },
            tokens: self.tokens.clone(),
            device_id: "device-test".into(),
        }
    }

    pub fn push_success(&self, body: &str) {
        self.transport.emit_text(&format!(
            "MESSAGE\nsubscription:sub-0\ndestination:/user/queue/checkin-success\nmessage-id:s\n\n{}\0",
            body
        ));
    }

    pub fn push_error(&self, body: &str) {
        self.transport.emit_text(&format!(
            "MESSAGE\nsubscription:sub-1\ndestination:/user/queue/checkin-errors\nmessage-id:e\n\n{}\0",
            body
        ));
    }
}

pub fn identity(attendee_id: i64) -> AttendeeIdentity {
    AttendeeIdentity {
        attendee_id,
        email: format!("attendee{}@example.com", attendee_id),
    }
}

/// Badge payload as printed on an attendee's QR code.
pub fn badge(attendee_id: i64) -> String {
    encode_identity(&identity(attendee_id))
}
