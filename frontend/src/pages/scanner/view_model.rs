use std::rc::Rc;

use leptos::{ev::MouseEvent, *};

use super::camera::FacingMode;
use crate::{
    api::ApiClient,
    config::{RuntimeConfig, ScannerSettings},
    scanner::{runtime::ScannerRuntime, CameraController, ScanPhase},
    state::{
        auth::{LocalStorageTokenStore, TokenStore},
        scanner::{
            provide_scanner_state, use_scanner_session, ScannerSession, ScannerState,
            SignalScannerView,
        },
    },
    utils::storage as storage_utils,
};

/// Collaborators the scanner screen is built from.
pub struct ScannerDeps {
    pub session: ScannerSession,
    pub tokens: Rc<dyn TokenStore>,
    pub device_id: String,
}

impl ScannerDeps {
    /// Uses the session provided at the app root, so remounting the screen
    /// keeps the connection and the duplicate cache.
    pub fn browser(config: &RuntimeConfig) -> Self {
        let device_id = storage_utils::local_storage()
            .and_then(|storage| storage_utils::ensure_device_id(&storage))
            .unwrap_or_else(|err| {
                log::warn!("device id unavailable: {}", err);
                "device-unknown".to_string()
            });
        let session = use_scanner_session().unwrap_or_else(|| {
            log::warn!("no scanner session in context; starting a screen-local one");
            ScannerSession::browser(config, use_context::<ApiClient>().unwrap_or_default())
        });
        Self {
            session,
            tokens: Rc::new(LocalStorageTokenStore),
            device_id,
        }
    }
}

#[derive(Clone)]
pub struct ScannerViewModel {
    pub state: ScannerState,
    pub controller: CameraController,
    pub facing: RwSignal<FacingMode>,
    pub camera_error: RwSignal<Option<String>>,
    pub settings: ScannerSettings,
}

impl ScannerViewModel {
    pub fn new(deps: ScannerDeps, config: &RuntimeConfig) -> Self {
        let settings = config.scanner.clone();
        let state = provide_scanner_state(settings.inactivity_secs);
        let view = Rc::new(SignalScannerView::new(state, settings.toast_ttl_ms));
        let controller = CameraController::new(
            &settings,
            deps.session.connection,
            deps.session.cache,
            deps.tokens,
            deps.device_id,
            view.clone(),
            view,
        );
        Self {
            state,
            controller,
            facing: create_rw_signal(FacingMode::Environment),
            camera_error: create_rw_signal(None),
            settings,
        }
    }

    pub fn camera_active(&self) -> Signal<bool> {
        let camera = self.state.camera;
        Signal::derive(move || camera.get().active)
    }

    pub fn status_label(&self) -> Signal<&'static str> {
        let connected = self.state.connected;
        Signal::derive(move || {
            if connected.get() {
                "Connected"
            } else {
                "Disconnected"
            }
        })
    }

    pub fn countdown_label(&self) -> Signal<String> {
        let camera = self.state.camera;
        Signal::derive(move || format_countdown(camera.get().remaining_seconds))
    }

    pub fn phase_hint(&self) -> Signal<&'static str> {
        let phase = self.state.phase;
        Signal::derive(move || match phase.get() {
            ScanPhase::Idle => "Start the camera to scan an attendee badge.",
            ScanPhase::CameraActive => "Hold the badge QR code in front of the camera.",
            ScanPhase::AwaitingResult => "Checking in…",
            ScanPhase::ScanCompleted => "Check-in complete.",
        })
    }

    pub fn handle_enable_camera(&self) -> impl Fn(MouseEvent) + Clone + 'static {
        let controller = self.controller.clone();
        move |_| {
            controller.enable_camera();
        }
    }

    pub fn handle_reset_timer(&self) -> impl Fn(MouseEvent) + Clone + 'static {
        let controller = self.controller.clone();
        move |_| controller.reset_timer()
    }

    pub fn handle_start_new_scan(&self) -> impl Fn(MouseEvent) + Clone + 'static {
        let controller = self.controller.clone();
        move |_| {
            controller.start_new_scan();
        }
    }

    pub fn handle_complete(&self) -> impl Fn(MouseEvent) + Clone + 'static {
        let controller = self.controller.clone();
        move |_| controller.complete_process()
    }

    pub fn handle_reconnect(&self) -> impl Fn(MouseEvent) + Clone + 'static {
        let controller = self.controller.clone();
        move |_| ScannerRuntime::reconnect(&controller)
    }

    pub fn handle_switch_camera(&self) -> impl Fn(MouseEvent) + Clone + 'static {
        let facing = self.facing;
        move |_| facing.update(|mode| *mode = mode.toggled())
    }

    pub fn dismiss_toast(&self) -> Callback<u64> {
        let state = self.state;
        Callback::new(move |id| state.dismiss_toast(id))
    }
}

fn format_countdown(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
