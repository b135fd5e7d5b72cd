use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde_json::Value;

use super::{
    classifier::{classify, decode_identity, DecodedPayload},
    dedupe::DuplicateCache,
    notify::{Notifier, ToastSink},
    submission::ScanSubmissionService,
};
use crate::{
    api::{ScanOutcome, ScanRequest},
    config::ScannerSettings,
    error::ScannerError,
    realtime::{ConnectFuture, ConnectionListener, ConnectionManager},
    state::auth::TokenStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    CameraActive,
    /// A request is out and the camera is off until the server answers.
    AwaitingResult,
    ScanCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraSession {
    pub active: bool,
    pub remaining_seconds: u32,
    pub processing_lock: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanAttempt {
    Submitted(ScanRequest),
    /// Dropped because the camera is off or another submission is out.
    Ignored,
}

/// Presentation side of the scanner screen.
pub trait ScannerView {
    fn on_connected(&self, session_id: &str);
    fn on_disconnected(&self);
    fn on_scan_success(&self, outcome: &ScanOutcome);
    fn on_scan_error(&self, message: &str);
    fn on_inactivity_timeout(&self);
    fn on_auth_rejected(&self);
    fn on_camera_state(&self, session: CameraSession, phase: ScanPhase);
}

struct ControllerState {
    phase: ScanPhase,
    session: CameraSession,
    pending_payload: Option<String>,
    last_outcome: Option<ScanOutcome>,
}

struct Inner {
    inactivity_secs: u32,
    connection: ConnectionManager,
    submission: ScanSubmissionService,
    cache: DuplicateCache,
    tokens: Rc<dyn TokenStore>,
    device_id: String,
    notifier: Notifier,
    view: Rc<dyn ScannerView>,
    state: RefCell<ControllerState>,
}

/// Camera session state machine. Owns the inactivity countdown and the
/// processing lock; receives scan verdicts from the connection manager.
#[derive(Clone)]
pub struct CameraController {
    inner: Rc<Inner>,
}

impl CameraController {
    pub fn new(
        settings: &ScannerSettings,
        connection: ConnectionManager,
        cache: DuplicateCache,
        tokens: Rc<dyn TokenStore>,
        device_id: String,
        view: Rc<dyn ScannerView>,
        toasts: Rc<dyn ToastSink>,
    ) -> Self {
        let controller = Self {
            inner: Rc::new(Inner {
                inactivity_secs: settings.inactivity_secs,
                submission: ScanSubmissionService::new(connection.clone(), cache.clone()),
                connection,
                cache,
                tokens,
                device_id,
                notifier: Notifier::new(toasts, settings.toast_debounce()),
                view,
                state: RefCell::new(ControllerState {
                    phase: ScanPhase::Idle,
                    session: CameraSession {
                        active: false,
                        remaining_seconds: settings.inactivity_secs,
                        processing_lock: false,
                    },
                    pending_payload: None,
                    last_outcome: None,
                }),
            }),
        };
        controller
            .inner
            .connection
            .set_listener(Rc::new(ControllerListener(Rc::downgrade(&controller.inner))));
        // A connection kept from an earlier screen is already live.
        if controller.inner.connection.is_connected() {
            if let Some(session_id) = controller.inner.connection.session_id() {
                controller.inner.view.on_connected(&session_id);
            }
        }
        controller
    }

    pub fn phase(&self) -> ScanPhase {
        self.inner.state.borrow().phase
    }

    pub fn session(&self) -> CameraSession {
        self.inner.state.borrow().session
    }

    pub fn last_outcome(&self) -> Option<ScanOutcome> {
        self.inner.state.borrow().last_outcome.clone()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }

    pub fn connect(&self) -> ConnectFuture {
        self.inner.connection.connect()
    }

    /// User-requested reconnect.
    pub fn reconnect(&self) -> ConnectFuture {
        self.inner.notifier.info("Reconnecting to the check-in server");
        self.inner.connection.reconnect()
    }

    pub fn enable_camera(&self) -> bool {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.phase == ScanPhase::AwaitingResult {
                log::debug!("camera stays off while a scan is pending");
                return false;
            }
            state.phase = ScanPhase::CameraActive;
            state.session = CameraSession {
                active: true,
                remaining_seconds: self.inner.inactivity_secs,
                processing_lock: false,
            };
            state.last_outcome = None;
        }
        self.publish();
        true
    }

    /// One-second countdown tick.
    pub fn tick(&self) {
        let timed_out = {
            let mut state = self.inner.state.borrow_mut();
            if state.phase != ScanPhase::CameraActive || !state.session.active {
                return;
            }
            state.session.remaining_seconds = state.session.remaining_seconds.saturating_sub(1);
            if state.session.remaining_seconds == 0 {
                state.session.active = false;
                state.phase = ScanPhase::Idle;
                true
            } else {
                false
            }
        };
        if timed_out {
            log::info!("camera stopped after {}s without a scan", self.inner.inactivity_secs);
            self.inner.view.on_inactivity_timeout();
            self.inner
                .notifier
                .info("Camera turned off due to inactivity");
        }
        self.publish();
    }

    pub fn reset_timer(&self) {
        {
            let mut state = self.inner.state.borrow_mut();
            if !state.session.active {
                return;
            }
            state.session.remaining_seconds = self.inner.inactivity_secs;
        }
        self.publish();
    }

    pub async fn on_decoded_payload(&self, payload: &str) -> Result<ScanAttempt, ScannerError> {
        {
            let state = self.inner.state.borrow();
            if !state.session.active || state.session.processing_lock {
                log::debug!("decode dropped: camera inactive or scan in flight");
                return Ok(ScanAttempt::Ignored);
            }
        }
        if let Err(err) = self.check_guards(payload) {
            self.inner.notifier.error(&err);
            return Err(err);
        }
        let scanner_id = match self.scanner_id() {
            Some(id) => id,
            None => {
                let err = ScannerError::Authentication("Sign in again to scan".into());
                self.inner.notifier.error(&err);
                return Err(err);
            }
        };

        self.inner.state.borrow_mut().session.processing_lock = true;
        let identity = match decode_identity(payload) {
            DecodedPayload::Identity(identity) => identity,
            DecodedPayload::NotIdentity => {
                self.inner.state.borrow_mut().session.processing_lock = false;
                let err = ScannerError::validation(format!(
                    "Not an attendee badge (looks like {})",
                    classify(payload).label()
                ));
                self.inner.notifier.error(&err);
                return Err(err);
            }
        };

        {
            let mut state = self.inner.state.borrow_mut();
            state.phase = ScanPhase::AwaitingResult;
            state.session.active = false;
            state.pending_payload = Some(payload.to_string());
        }
        self.publish();

        let result = self
            .inner
            .submission
            .submit(payload, &identity, scanner_id, &self.inner.device_id)
            .await;
        match result {
            Ok(request) => Ok(ScanAttempt::Submitted(request)),
            Err(err) => {
                {
                    let mut state = self.inner.state.borrow_mut();
                    state.session.processing_lock = false;
                    state.pending_payload = None;
                    if state.phase == ScanPhase::AwaitingResult {
                        state.phase = ScanPhase::Idle;
                    }
                }
                self.inner.notifier.error(&err);
                self.publish();
                Err(err)
            }
        }
    }

    fn check_guards(&self, payload: &str) -> Result<(), ScannerError> {
        if payload.trim().is_empty() {
            return Err(ScannerError::validation("Empty QR code"));
        }
        if self.inner.cache.has(payload) {
            return Err(ScannerError::DuplicateScan);
        }
        if !self.inner.connection.is_connected() {
            return Err(ScannerError::NotConnected);
        }
        Ok(())
    }

    fn scanner_id(&self) -> Option<i64> {
        self.inner.tokens.current().and_then(|session| session.user_id)
    }

    pub fn handle_scan_success(&self, data: Value) {
        let outcome = ScanOutcome::new(data);
        {
            let mut state = self.inner.state.borrow_mut();
            state.session.processing_lock = false;
            state.session.active = false;
            state.pending_payload = None;
            state.phase = ScanPhase::ScanCompleted;
            state.last_outcome = Some(outcome.clone());
        }
        let message = match (outcome.message(), outcome.attendee_name()) {
            (Some(message), _) => message.to_string(),
            (None, Some(name)) => format!("Checked in {}", name),
            (None, None) => "Check-in recorded".to_string(),
        };
        self.inner.notifier.success(message);
        self.inner.view.on_scan_success(&outcome);
        self.publish();
    }

    pub fn handle_scan_error(&self, message: String) {
        let pending = {
            let mut state = self.inner.state.borrow_mut();
            state.session.processing_lock = false;
            state.session.active = false;
            if state.phase == ScanPhase::AwaitingResult {
                state.phase = ScanPhase::Idle;
            }
            state.pending_payload.take()
        };
        if let Some(payload) = pending {
            self.inner.cache.remove(&payload);
        }
        self.inner
            .notifier
            .error(&ScannerError::ServerRejection(message.clone()));
        self.inner.view.on_scan_error(&message);
        self.publish();
    }

    /// Finish with the current attendee and turn the camera off.
    pub fn complete_process(&self) {
        self.reset();
        self.publish();
    }

    pub fn start_new_scan(&self) -> bool {
        self.reset();
        self.enable_camera()
    }

    fn reset(&self) {
        let mut state = self.inner.state.borrow_mut();
        state.phase = ScanPhase::Idle;
        state.session = CameraSession {
            active: false,
            remaining_seconds: self.inner.inactivity_secs,
            processing_lock: false,
        };
        state.pending_payload = None;
        state.last_outcome = None;
    }

    /// The verdict for a pending payload can only arrive on the session it
    /// was sent under; once that session is gone the payload is released.
    fn release_pending_on_disconnect(&self) {
        let pending = {
            let mut state = self.inner.state.borrow_mut();
            let pending = state.pending_payload.take();
            if pending.is_some() {
                state.session.processing_lock = false;
                state.phase = ScanPhase::Idle;
            }
            pending
        };
        if let Some(payload) = pending {
            self.inner.cache.remove(&payload);
            self.inner.notifier.error(&ScannerError::NotConnected);
            self.publish();
        }
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    pub fn health_check(&self) -> Option<ConnectFuture> {
        self.inner.connection.health_check()
    }

    pub fn send_heartbeat(&self) {
        self.inner.connection.send_heartbeat();
    }

    fn publish(&self) {
        let (session, phase) = {
            let state = self.inner.state.borrow();
            (state.session, state.phase)
        };
        self.inner.view.on_camera_state(session, phase);
    }
}

struct ControllerListener(Weak<Inner>);

impl ControllerListener {
    fn controller(&self) -> Option<CameraController> {
        self.0.upgrade().map(|inner| CameraController { inner })
    }
}

impl ConnectionListener for ControllerListener {
    fn on_connected(&self, session_id: &str) {
        if let Some(controller) = self.controller() {
            controller.inner.view.on_connected(session_id);
        }
    }

    fn on_disconnected(&self) {
        if let Some(controller) = self.controller() {
            controller.release_pending_on_disconnect();
            controller.inner.view.on_disconnected();
        }
    }

    fn on_scan_success(&self, data: Value) {
        if let Some(controller) = self.controller() {
            controller.handle_scan_success(data);
        }
    }

    fn on_scan_error(&self, message: String) {
        if let Some(controller) = self.controller() {
            controller.handle_scan_error(message);
        }
    }

    fn on_auth_rejected(&self) {
        if let Some(controller) = self.controller() {
            controller.reset();
            controller.inner.notifier.error(&ScannerError::Authentication(
                "Your session has expired. Please sign in again.".into(),
            ));
            controller.inner.view.on_auth_rejected();
            controller.publish();
        }
    }
}
