use std::cell::RefCell;
use std::rc::{Rc, Weak};

use chrono::Utc;
use futures::channel::oneshot;
use futures::future::{self, FutureExt, LocalBoxFuture, Shared};
use serde_json::Value;

use super::{
    backoff::Backoff,
    stomp::{self, Command, Frame},
    transport::{EventHandler, Transport, TransportEvent, TransportLink},
};
use crate::{
    api::{error_message_from_body, ScanGateway, ScanRequest},
    config::RuntimeConfig,
    error::ScannerError,
    state::auth::{StoredSession, TokenStore},
    utils::time::sleep,
};

const SUCCESS_SUBSCRIPTION: &str = "sub-0";
const ERROR_SUBSCRIPTION: &str = "sub-1";

/// Outcome of a connect or reconnect, shared by every caller that asked for
/// it while it was in flight.
pub type ConnectFuture = Shared<LocalBoxFuture<'static, Result<(), ScannerError>>>;

type Resolver = RefCell<Option<oneshot::Sender<Result<(), ScannerError>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Receives connection and scan-result events.
pub trait ConnectionListener {
    fn on_connected(&self, session_id: &str);
    fn on_disconnected(&self);
    fn on_scan_success(&self, data: Value);
    fn on_scan_error(&self, message: String);
    /// The server refused our credentials; the persisted session is already gone.
    fn on_auth_rejected(&self);
}

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub ws_url: String,
    pub host: String,
    pub device_type: String,
    pub heart_beat: String,
    pub success_destination: String,
    pub error_destination: String,
    pub token_margin: chrono::Duration,
    pub backoff: Backoff,
}

impl ConnectionOptions {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let ws_url = config.ws_url().to_string();
        let host = reqwest::Url::parse(&ws_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string());
        let scanner = &config.scanner;
        Self {
            ws_url,
            host,
            device_type: config.device_type().to_string(),
            heart_beat: scanner.heartbeat_header(),
            success_destination: scanner.success_destination.clone(),
            error_destination: scanner.error_destination.clone(),
            token_margin: scanner.token_expiry_margin(),
            backoff: Backoff::new(scanner.backoff_base(), scanner.backoff_max()),
        }
    }
}

/// One connect attempt. The resolver lives only in the event handler built
/// for this attempt, so events from an older socket can never settle it.
struct Attempt {
    epoch: u64,
    op: u64,
    resolver: Resolver,
}

struct State {
    status: ConnectionStatus,
    session_id: Option<String>,
    access_token: Option<String>,
    transport_open: bool,
    handshake_acked: bool,
    has_connected: bool,
    link: Option<Box<dyn TransportLink>>,
    inflight: Option<(u64, ConnectFuture)>,
    epoch: u64,
    next_op: u64,
    backoff: Backoff,
}

struct Inner {
    options: ConnectionOptions,
    transport: Rc<dyn Transport>,
    tokens: Rc<dyn TokenStore>,
    gateway: Rc<dyn ScanGateway>,
    listener: RefCell<Option<Rc<dyn ConnectionListener>>>,
    state: RefCell<State>,
}

/// Owns the single messaging connection of the signed-in scanner.
///
/// Clones share one connection; construct once per authenticated session and
/// hand clones to whoever needs them.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Rc<Inner>,
}

impl ConnectionManager {
    pub fn new(
        options: ConnectionOptions,
        transport: Rc<dyn Transport>,
        tokens: Rc<dyn TokenStore>,
        gateway: Rc<dyn ScanGateway>,
    ) -> Self {
        let backoff = options.backoff.clone();
        Self {
            inner: Rc::new(Inner {
                options,
                transport,
                tokens,
                gateway,
                listener: RefCell::new(None),
                state: RefCell::new(State {
                    status: ConnectionStatus::Disconnected,
                    session_id: None,
                    access_token: None,
                    transport_open: false,
                    handshake_acked: false,
                    has_connected: false,
                    link: None,
                    inflight: None,
                    epoch: 0,
                    next_op: 0,
                    backoff,
                }),
            }),
        }
    }

    pub fn set_listener(&self, listener: Rc<dyn ConnectionListener>) {
        *self.inner.listener.borrow_mut() = Some(listener);
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.borrow().status
    }

    /// Transport open and handshake acknowledged.
    pub fn is_connected(&self) -> bool {
        let state = self.inner.state.borrow();
        state.transport_open && state.handshake_acked
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.state.borrow().session_id.clone()
    }

    pub fn backoff_attempt(&self) -> u32 {
        self.inner.state.borrow().backoff.attempt()
    }

    pub fn connect(&self) -> ConnectFuture {
        if let Some(pending) = self.pending() {
            return pending;
        }
        if self.is_connected() {
            return settled(Ok(()));
        }
        let op = self.next_op();
        match self.begin_attempt(op) {
            Ok(attempt) => {
                let shared = attempt.shared();
                self.inner.state.borrow_mut().inflight = Some((op, shared.clone()));
                shared
            }
            Err(err) => settled(Err(err)),
        }
    }

    /// Tears the connection down. Safe to call when already disconnected.
    pub fn disconnect(&self) {
        let (link, was_connected) = {
            let mut state = self.inner.state.borrow_mut();
            state.epoch += 1;
            state.inflight = None;
            let was_connected = state.transport_open && state.handshake_acked;
            state.status = ConnectionStatus::Disconnected;
            state.transport_open = false;
            state.handshake_acked = false;
            (state.link.take(), was_connected)
        };
        let Some(link) = link else {
            return;
        };
        if was_connected {
            for id in [SUCCESS_SUBSCRIPTION, ERROR_SUBSCRIPTION] {
                let _ = link.send(&Frame::unsubscribe(id).encode());
            }
            let _ = link.send(&Frame::disconnect().encode());
        }
        link.close();
        log::info!("messaging connection closed");
        if was_connected {
            if let Some(listener) = self.listener() {
                listener.on_disconnected();
            }
        }
    }

    /// Disconnects, waits out the backoff delay, then connects again under a
    /// fresh session id.
    pub fn reconnect(&self) -> ConnectFuture {
        if let Some(pending) = self.pending() {
            return pending;
        }
        self.disconnect();
        let op = self.next_op();
        let (epoch, delay) = {
            let mut state = self.inner.state.borrow_mut();
            (state.epoch, state.backoff.next_delay())
        };
        log::info!("reconnecting in {}ms", delay.as_millis());

        let weak: Weak<Inner> = Rc::downgrade(&self.inner);
        let reconnect = async move {
            sleep(delay).await;
            let attempt = {
                let Some(inner) = weak.upgrade() else {
                    return Err(ScannerError::network("Connection manager dropped"));
                };
                let manager = ConnectionManager { inner };
                if manager.inner.state.borrow().epoch != epoch {
                    manager.clear_inflight(op);
                    return Err(ScannerError::network("Reconnect superseded"));
                }
                match manager.begin_attempt(op) {
                    Ok(attempt) => attempt,
                    Err(err) => {
                        manager.clear_inflight(op);
                        return Err(err);
                    }
                }
            };
            attempt.await
        }
        .boxed_local()
        .shared();

        self.inner.state.borrow_mut().inflight = Some((op, reconnect.clone()));
        reconnect
    }

    /// Starts a reconnect when a previously established connection is gone
    /// and nothing is in flight. A stale token is rejected once instead of
    /// being retried.
    pub fn health_check(&self) -> Option<ConnectFuture> {
        {
            let state = self.inner.state.borrow();
            let connected = state.transport_open && state.handshake_acked;
            if connected || !state.has_connected || state.inflight.is_some() {
                return None;
            }
        }
        if self.usable_token().is_none() {
            log::warn!("messaging connection lost and the access token is no longer valid");
            self.reject_credentials();
            return None;
        }
        log::warn!("messaging connection lost");
        Some(self.reconnect())
    }

    pub fn send_heartbeat(&self) {
        if !self.is_connected() {
            return;
        }
        let state = self.inner.state.borrow();
        if let Some(link) = &state.link {
            if let Err(err) = link.send(stomp::HEARTBEAT) {
                log::warn!("heartbeat failed: {}", err);
            }
        }
    }

    /// Posts a scan over HTTP, correlated with the current session. Only
    /// acceptance is reported here; the verdict arrives on a subscription.
    pub async fn send_scan_request(&self, request: &ScanRequest) -> Result<(), ScannerError> {
        let (session_id, access_token) = {
            let state = self.inner.state.borrow();
            if !(state.transport_open && state.handshake_acked) {
                return Err(ScannerError::NotConnected);
            }
            (
                state.session_id.clone().unwrap_or_default(),
                state.access_token.clone().unwrap_or_default(),
            )
        };
        let gateway = self.inner.gateway.clone();
        let result = gateway
            .post_scan(&session_id, &access_token, request)
            .await;
        if let Err(err) = &result {
            if err.requires_logout() {
                self.reject_credentials();
            }
        }
        result
    }

    fn pending(&self) -> Option<ConnectFuture> {
        self.inner
            .state
            .borrow()
            .inflight
            .as_ref()
            .map(|(_, pending)| pending.clone())
    }

    fn next_op(&self) -> u64 {
        let mut state = self.inner.state.borrow_mut();
        state.next_op += 1;
        state.next_op
    }

    fn clear_inflight(&self, op: u64) {
        let mut state = self.inner.state.borrow_mut();
        if matches!(state.inflight, Some((current, _)) if current == op) {
            state.inflight = None;
        }
    }

    fn listener(&self) -> Option<Rc<dyn ConnectionListener>> {
        self.inner.listener.borrow().clone()
    }

    fn begin_attempt(
        &self,
        op: u64,
    ) -> Result<LocalBoxFuture<'static, Result<(), ScannerError>>, ScannerError> {
        let Some(session) = self.usable_token() else {
            log::warn!("not connecting: no valid access token");
            self.reject_credentials();
            return Err(ScannerError::Authentication("No valid access token".into()));
        };
        let inner = &self.inner;

        let session_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        let epoch = {
            let mut state = inner.state.borrow_mut();
            state.epoch += 1;
            state.status = ConnectionStatus::Connecting;
            state.session_id = Some(session_id.clone());
            state.access_token = Some(session.access_token);
            state.transport_open = false;
            state.handshake_acked = false;
            state.epoch
        };
        log::info!("connecting to {} (session {})", inner.options.ws_url, session_id);

        let attempt = Rc::new(Attempt {
            epoch,
            op,
            resolver: RefCell::new(Some(tx)),
        });
        let weak = Rc::downgrade(inner);
        let handler_attempt = attempt.clone();
        let handler: EventHandler = Rc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                ConnectionManager { inner }.handle_event(&handler_attempt, event);
            }
        });

        match inner.transport.open(&inner.options.ws_url, handler) {
            Ok(link) => inner.state.borrow_mut().link = Some(link),
            Err(err) => {
                self.fail_attempt(&attempt, err.clone());
                return Err(err);
            }
        }

        Ok(async move {
            rx.await
                .unwrap_or_else(|_| Err(ScannerError::network("Connection attempt abandoned")))
        }
        .boxed_local())
    }

    fn handle_event(&self, attempt: &Attempt, event: TransportEvent) {
        if self.inner.state.borrow().epoch != attempt.epoch {
            log::debug!("ignoring event from a superseded connection");
            return;
        }
        match event {
            TransportEvent::Opened => self.send_handshake(attempt),
            TransportEvent::Message(text) => match stomp::decode(&text) {
                Ok(frames) => {
                    for frame in frames {
                        self.handle_frame(attempt, frame);
                    }
                }
                Err(err) => log::error!("dropping malformed frame: {}", err),
            },
            TransportEvent::Closed { code, reason } => {
                log::warn!("socket closed ({}): {}", code, reason);
                self.fail_attempt(
                    attempt,
                    ScannerError::network(format!("Connection closed ({})", code)),
                );
            }
            TransportEvent::Error(message) => {
                log::warn!("socket error: {}", message);
                self.fail_attempt(attempt, ScannerError::network(message));
            }
        }
    }

    fn send_handshake(&self, attempt: &Attempt) {
        let (session_id, access_token) = {
            let mut state = self.inner.state.borrow_mut();
            state.transport_open = true;
            (
                state.session_id.clone().unwrap_or_default(),
                state.access_token.clone().unwrap_or_default(),
            )
        };
        let options = &self.inner.options;
        let authorization = format!("Bearer {}", access_token);
        let frame = Frame::connect(
            &options.host,
            &options.heart_beat,
            &[
                ("Authorization", authorization.as_str()),
                ("X-Device-Type", options.device_type.as_str()),
                ("X-Session-Id", session_id.as_str()),
            ],
        );
        if let Err(err) = self.send_frame(&frame) {
            self.fail_attempt(attempt, err);
        }
    }

    fn handle_frame(&self, attempt: &Attempt, frame: Frame) {
        if self.inner.state.borrow().epoch != attempt.epoch {
            return;
        }
        match frame.command {
            Command::Connected => self.complete_handshake(attempt),
            Command::Message => self.route_message(&frame),
            Command::Error => {
                let message = frame.error_message();
                log::warn!("server sent ERROR: {}", message);
                if is_unauthorized(&message) {
                    self.fail_attempt(attempt, ScannerError::Authentication(message));
                    self.reject_credentials();
                } else {
                    self.fail_attempt(attempt, ScannerError::network(message));
                }
            }
            Command::Receipt => log::debug!("receipt {:?}", frame.get("receipt-id")),
            other => log::error!("unexpected {} frame from server", other.as_str()),
        }
    }

    fn complete_handshake(&self, attempt: &Attempt) {
        let session_id = {
            let mut state = self.inner.state.borrow_mut();
            state.handshake_acked = true;
            state.status = ConnectionStatus::Connected;
            state.has_connected = true;
            state.backoff.reset();
            if matches!(state.inflight, Some((current, _)) if current == attempt.op) {
                state.inflight = None;
            }
            state.session_id.clone().unwrap_or_default()
        };
        let options = &self.inner.options;
        for (id, destination) in [
            (SUCCESS_SUBSCRIPTION, options.success_destination.as_str()),
            (ERROR_SUBSCRIPTION, options.error_destination.as_str()),
        ] {
            if let Err(err) = self.send_frame(&Frame::subscribe(id, destination)) {
                self.fail_attempt(attempt, err);
                return;
            }
        }
        log::info!("connected (session {})", session_id);
        resolve(attempt, Ok(()));
        if let Some(listener) = self.listener() {
            listener.on_connected(&session_id);
        }
    }

    fn route_message(&self, frame: &Frame) {
        let options = &self.inner.options;
        let subscription = frame.get("subscription").unwrap_or_default();
        let destination = frame.get("destination").unwrap_or_default();
        let Some(listener) = self.listener() else {
            return;
        };
        if subscription == SUCCESS_SUBSCRIPTION || destination == options.success_destination {
            let data = serde_json::from_str(&frame.body)
                .unwrap_or_else(|_| Value::String(frame.body.clone()));
            listener.on_scan_success(data);
        } else if subscription == ERROR_SUBSCRIPTION || destination == options.error_destination
        {
            listener.on_scan_error(error_message_from_body(&frame.body));
        } else {
            log::warn!("message for unknown subscription {:?}", subscription);
        }
    }

    fn fail_attempt(&self, attempt: &Attempt, err: ScannerError) {
        let link = {
            let mut state = self.inner.state.borrow_mut();
            if state.epoch != attempt.epoch {
                return;
            }
            state.epoch += 1;
            state.status = ConnectionStatus::Disconnected;
            state.transport_open = false;
            state.handshake_acked = false;
            if matches!(state.inflight, Some((current, _)) if current == attempt.op) {
                state.inflight = None;
            }
            state.link.take()
        };
        if let Some(link) = link {
            link.close();
        }
        log::warn!("messaging connection failed: {}", err);
        resolve(attempt, Err(err));
        if let Some(listener) = self.listener() {
            listener.on_disconnected();
        }
    }

    fn usable_token(&self) -> Option<StoredSession> {
        let margin = self.inner.options.token_margin;
        self.inner
            .tokens
            .current()
            .filter(|session| session.is_usable(Utc::now(), margin))
    }

    /// Clears the persisted session and tells the listener once. The health
    /// check stays quiet until a later connect succeeds.
    fn reject_credentials(&self) {
        self.inner.state.borrow_mut().has_connected = false;
        self.inner.tokens.clear();
        if let Some(listener) = self.listener() {
            listener.on_auth_rejected();
        }
    }

    fn send_frame(&self, frame: &Frame) -> Result<(), ScannerError> {
        let state = self.inner.state.borrow();
        match &state.link {
            Some(link) => link.send(&frame.encode()),
            None => Err(ScannerError::NotConnected),
        }
    }
}

fn resolve(attempt: &Attempt, result: Result<(), ScannerError>) {
    if let Some(tx) = attempt.resolver.borrow_mut().take() {
        let _ = tx.send(result);
    }
}

fn settled(result: Result<(), ScannerError>) -> ConnectFuture {
    future::ready(result).boxed_local().shared()
}

fn is_unauthorized(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["401", "403", "unauthorized", "forbidden", "expired", "invalid token"]
        .iter()
        .any(|needle| lower.contains(needle))
}
