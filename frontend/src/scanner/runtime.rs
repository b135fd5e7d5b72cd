use std::cell::RefCell;
use std::rc::Rc;

use chrono::Utc;
use gloo_timers::callback::Interval;
use leptos::spawn_local;

use super::{
    controller::CameraController,
    frame::{FrameDecoderAdapter, FrameSource, QrDecoder},
};
use crate::{config::ScannerSettings, realtime::ConnectFuture};

/// Periodic work of a mounted scanner screen. Dropping the runtime cancels
/// every timer.
pub struct ScannerRuntime {
    _poll: Interval,
    _countdown: Interval,
    _cache_clear: Interval,
    _health_check: Interval,
    _heartbeat: Interval,
}

fn millis(duration: std::time::Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX).max(1)
}

fn spawn_connect(label: &'static str, pending: ConnectFuture) {
    spawn_local(async move {
        if let Err(err) = pending.await {
            log::warn!("{} failed: {}", label, err);
        }
    });
}

impl ScannerRuntime {
    pub fn start<S, D>(
        settings: &ScannerSettings,
        controller: CameraController,
        adapter: Rc<RefCell<FrameDecoderAdapter<S, D>>>,
    ) -> Self
    where
        S: FrameSource + 'static,
        D: QrDecoder + 'static,
    {
        let poll_controller = controller.clone();
        let poll = Interval::new(millis(settings.poll_interval()), move || {
            let active = poll_controller.session().active;
            let decoded = adapter.borrow_mut().poll(active, Utc::now());
            if let Some(payload) = decoded {
                let controller = poll_controller.clone();
                spawn_local(async move {
                    // Guard failures have already been surfaced to the user.
                    let _ = controller.on_decoded_payload(&payload).await;
                });
            }
        });

        let tick_controller = controller.clone();
        let countdown = Interval::new(1_000, move || tick_controller.tick());

        let clear_controller = controller.clone();
        let cache_clear = Interval::new(millis(settings.cache_clear_interval()), move || {
            clear_controller.clear_cache()
        });

        let health_controller = controller.clone();
        let health_check = Interval::new(millis(settings.health_check_interval()), move || {
            if let Some(pending) = health_controller.health_check() {
                spawn_connect("reconnect", pending);
            }
        });

        let heartbeat = Interval::new(
            millis(std::time::Duration::from_millis(settings.heartbeat_ms)),
            move || controller.send_heartbeat(),
        );

        log::debug!("scanner timers started");
        Self {
            _poll: poll,
            _countdown: countdown,
            _cache_clear: cache_clear,
            _health_check: health_check,
            _heartbeat: heartbeat,
        }
    }

    /// First connection of a freshly mounted screen.
    pub fn connect(controller: &CameraController) {
        spawn_connect("connect", controller.connect());
    }

    pub fn reconnect(controller: &CameraController) {
        spawn_connect("manual reconnect", controller.reconnect());
    }
}

impl Drop for ScannerRuntime {
    fn drop(&mut self) {
        log::debug!("scanner timers stopped");
    }
}
