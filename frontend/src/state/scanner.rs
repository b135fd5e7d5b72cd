use std::rc::Rc;

use chrono::{DateTime, Utc};
use leptos::*;

use crate::{
    api::{ApiClient, ScanGateway, ScanOutcome},
    config::RuntimeConfig,
    realtime::{
        transport::{Transport, WebSocketTransport},
        ConnectionManager, ConnectionOptions,
    },
    scanner::{
        controller::{CameraSession, ScanPhase, ScannerView},
        notify::{Toast, ToastSink},
        DuplicateCache,
    },
    state::auth::{LocalStorageTokenStore, TokenStore},
};

pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct ScanRecord {
    pub attendee_id: Option<i64>,
    pub attendee_name: Option<String>,
    pub message: Option<String>,
    pub scanned_at: DateTime<Utc>,
}

impl From<&ScanOutcome> for ScanRecord {
    fn from(outcome: &ScanOutcome) -> Self {
        Self {
            attendee_id: outcome.attendee_id(),
            attendee_name: outcome.attendee_name().map(str::to_string),
            message: outcome.message().map(str::to_string),
            scanned_at: outcome.received_at,
        }
    }
}

/// Reactive mirror of the scanner pipeline for the scanner screen.
#[derive(Clone, Copy)]
pub struct ScannerState {
    pub connected: RwSignal<bool>,
    pub session_id: RwSignal<Option<String>>,
    pub camera: RwSignal<CameraSession>,
    pub phase: RwSignal<ScanPhase>,
    pub last_result: RwSignal<Option<ScanOutcome>>,
    pub last_error: RwSignal<Option<String>>,
    pub history: RwSignal<Vec<ScanRecord>>,
    pub toasts: RwSignal<Vec<Toast>>,
    pub auth_rejected: RwSignal<bool>,
}

impl ScannerState {
    pub fn new(inactivity_secs: u32) -> Self {
        Self {
            connected: create_rw_signal(false),
            session_id: create_rw_signal(None),
            camera: create_rw_signal(CameraSession {
                active: false,
                remaining_seconds: inactivity_secs,
                processing_lock: false,
            }),
            phase: create_rw_signal(ScanPhase::Idle),
            last_result: create_rw_signal(None),
            last_error: create_rw_signal(None),
            history: create_rw_signal(Vec::new()),
            toasts: create_rw_signal(Vec::new()),
            auth_rejected: create_rw_signal(false),
        }
    }

    /// Newest first, capped at [`HISTORY_LIMIT`].
    pub fn record(&self, outcome: &ScanOutcome) {
        self.history.update(|history| {
            history.insert(0, ScanRecord::from(outcome));
            history.truncate(HISTORY_LIMIT);
        });
    }

    pub fn dismiss_toast(&self, id: u64) {
        self.toasts.update(|toasts| toasts.retain(|toast| toast.id != id));
    }
}

/// Connection and duplicate cache of the signed-in scanner. Built once per
/// login and shared by every scanner screen mounted meanwhile.
#[derive(Clone)]
pub struct ScannerSession {
    pub connection: ConnectionManager,
    pub cache: DuplicateCache,
}

impl ScannerSession {
    pub fn new(
        config: &RuntimeConfig,
        transport: Rc<dyn Transport>,
        tokens: Rc<dyn TokenStore>,
        gateway: Rc<dyn ScanGateway>,
    ) -> Self {
        Self {
            connection: ConnectionManager::new(
                ConnectionOptions::from_config(config),
                transport,
                tokens,
                gateway,
            ),
            cache: DuplicateCache::new(),
        }
    }

    pub fn browser(config: &RuntimeConfig, client: ApiClient) -> Self {
        Self::new(
            config,
            Rc::new(WebSocketTransport),
            Rc::new(LocalStorageTokenStore),
            Rc::new(client),
        )
    }
}

pub fn provide_scanner_session(session: ScannerSession) {
    provide_context(session);
}

pub fn use_scanner_session() -> Option<ScannerSession> {
    use_context::<ScannerSession>()
}

pub fn provide_scanner_state(inactivity_secs: u32) -> ScannerState {
    let state = ScannerState::new(inactivity_secs);
    provide_context(state);
    state
}

pub fn use_scanner_state() -> Option<ScannerState> {
    use_context::<ScannerState>()
}

/// Feeds controller events into [`ScannerState`].
#[derive(Clone, Copy)]
pub struct SignalScannerView {
    state: ScannerState,
    toast_ttl_ms: u32,
}

impl SignalScannerView {
    pub fn new(state: ScannerState, toast_ttl_ms: u32) -> Self {
        Self {
            state,
            toast_ttl_ms,
        }
    }
}

impl ToastSink for SignalScannerView {
    fn show_toast(&self, toast: Toast) {
        let id = toast.id;
        self.state.toasts.update(|toasts| toasts.push(toast));
        #[cfg(target_arch = "wasm32")]
        {
            let state = self.state;
            gloo_timers::callback::Timeout::new(self.toast_ttl_ms, move || {
                state.dismiss_toast(id);
            })
            .forget();
        }
        #[cfg(not(target_arch = "wasm32"))]
        let _ = (id, self.toast_ttl_ms);
    }
}

impl ScannerView for SignalScannerView {
    fn on_connected(&self, session_id: &str) {
        self.state.connected.set(true);
        self.state.session_id.set(Some(session_id.to_string()));
    }

    fn on_disconnected(&self) {
        self.state.connected.set(false);
        self.state.session_id.set(None);
    }

    fn on_scan_success(&self, outcome: &ScanOutcome) {
        self.state.last_error.set(None);
        self.state.last_result.set(Some(outcome.clone()));
        self.state.record(outcome);
    }

    fn on_scan_error(&self, message: &str) {
        self.state.last_result.set(None);
        self.state.last_error.set(Some(message.to_string()));
    }

    fn on_inactivity_timeout(&self) {
        log::debug!("scanner idle");
    }

    fn on_auth_rejected(&self) {
        self.state.connected.set(false);
        self.state.auth_rejected.set(true);
        #[cfg(target_arch = "wasm32")]
        crate::state::auth::force_logout(&crate::state::auth::LocalStorageTokenStore);
    }

    fn on_camera_state(&self, session: CameraSession, phase: ScanPhase) {
        self.state.camera.set(session);
        self.state.phase.set(phase);
        if phase == ScanPhase::CameraActive {
            self.state.last_result.set(None);
            self.state.last_error.set(None);
        }
    }
}
