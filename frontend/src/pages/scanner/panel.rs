use std::cell::RefCell;
use std::rc::Rc;

use leptos::{html, *};

use super::{
    camera::{bind_camera, CanvasFrameSource, JsQrDecoder},
    view_model::{ScannerDeps, ScannerViewModel},
};
use crate::{
    components::{error::InlineErrorMessage, toast::ToastStack},
    config,
    scanner::{frame::FrameDecoderAdapter, runtime::ScannerRuntime, ScanPhase},
};

#[component]
pub fn ScannerPage() -> impl IntoView {
    let config = config::current();
    let vm = ScannerViewModel::new(ScannerDeps::browser(&config), &config);
    let video_ref = create_node_ref::<html::Video>();

    bind_camera(video_ref, vm.camera_active(), vm.facing, vm.camera_error);

    let adapter = Rc::new(RefCell::new(FrameDecoderAdapter::new(
        CanvasFrameSource::new(video_ref),
        JsQrDecoder,
        vm.settings.decode_cooldown(),
    )));
    // Timers live as long as the page; unmounting drops and cancels them.
    let _runtime = store_value(ScannerRuntime::start(
        &vm.settings,
        vm.controller.clone(),
        adapter,
    ));
    // Joins the session's connection when it is already up.
    ScannerRuntime::connect(&vm.controller);

    view! { <ScannerPanel vm=vm video_ref=video_ref /> }
}

#[component]
pub fn ScannerPanel(vm: ScannerViewModel, video_ref: NodeRef<html::Video>) -> impl IntoView {
    let state = vm.state;
    let camera_active = vm.camera_active();
    let status = vm.status_label();
    let connected = state.connected;
    let phase = state.phase;
    let facing = vm.facing;
    let last_error = state.last_error;
    let camera_error = vm.camera_error;
    let phase_hint = vm.phase_hint();
    let countdown = vm.countdown_label();
    let reconnect = vm.handle_reconnect();
    let enable = vm.handle_enable_camera();
    let reset = vm.handle_reset_timer();
    let switch_camera = vm.handle_switch_camera();
    let start_new = vm.handle_start_new_scan();
    let complete = vm.handle_complete();

    view! {
        <div class="max-w-3xl mx-auto p-4 space-y-4">
            <ToastStack toasts=state.toasts on_dismiss=vm.dismiss_toast() />
            <header class="flex items-center justify-between">
                <h1 class="text-2xl font-bold">"Check-in scanner"</h1>
                <div class="flex items-center gap-2">
                    <span class=move || {
                        if connected.get() {
                            "px-2 py-1 rounded text-xs bg-status-success-bg text-status-success-text"
                        } else {
                            "px-2 py-1 rounded text-xs bg-status-error-bg text-status-error-text"
                        }
                    }>
                        {move || status.get()}
                    </span>
                    <Show when=move || !connected.get() fallback=|| ()>
                        <button class="text-sm underline" on:click=reconnect.clone()>
                            "Reconnect"
                        </button>
                    </Show>
                </div>
            </header>

            <p class="text-sm text-fg-muted">{move || phase_hint.get()}</p>

            <section class="relative bg-black rounded-lg overflow-hidden aspect-video">
                <video
                    node_ref=video_ref
                    class="w-full h-full object-cover"
                    class:hidden=move || !camera_active.get()
                    autoplay=true
                    muted=true
                    playsinline=true
                ></video>
                <Show when=move || camera_active.get() fallback=|| ()>
                    <div class="absolute top-2 right-2 bg-black/60 text-white text-sm px-2 py-1 rounded font-mono">
                        {move || countdown.get()}
                    </div>
                </Show>
            </section>

            <InlineErrorMessage error=camera_error.into() />
            <InlineErrorMessage error=last_error.into() />

            <div class="flex flex-wrap gap-2">
                {move || match phase.get() {
                        ScanPhase::Idle => view! {
                            <button class="btn-primary" on:click=enable.clone()>"Start scanning"</button>
                        }.into_view(),
                        ScanPhase::CameraActive => view! {
                            <button class="btn-secondary" on:click=reset.clone()>"Keep camera on"</button>
                            <button class="btn-secondary" on:click=switch_camera.clone()>
                                {move || format!("Switch to {}", facing.get().toggled().label())}
                            </button>
                        }.into_view(),
                        ScanPhase::AwaitingResult => view! {
                            <span class="text-sm">"Waiting for the server…"</span>
                        }.into_view(),
                        ScanPhase::ScanCompleted => view! {
                            <button class="btn-primary" on:click=start_new.clone()>"Scan next attendee"</button>
                            <button class="btn-secondary" on:click=complete.clone()>"Done"</button>
                        }.into_view(),
                }}
            </div>

            <Show when=move || state.last_result.get().is_some() fallback=|| ()>
                <div class="bg-status-success-bg border border-status-success-border text-status-success-text px-4 py-3 rounded">
                    {move || state.last_result.get().map(|outcome| {
                        let name = outcome.attendee_name().unwrap_or("Attendee").to_string();
                        let message = outcome.message().unwrap_or("Checked in").to_string();
                        view! {
                            <div class="font-bold">{name}</div>
                            <div class="text-sm">{message}</div>
                        }
                    })}
                </div>
            </Show>

            <section>
                <h2 class="text-lg font-semibold mb-2">"Recent scans"</h2>
                <Show
                    when=move || !state.history.get().is_empty()
                    fallback=|| view! { <p class="text-sm text-fg-muted">"No scans yet."</p> }
                >
                    <ul class="divide-y divide-border">
                        <For
                            each=move || state.history.get()
                            key=|record| (record.scanned_at, record.attendee_id)
                            children=move |record| {
                                let who = record
                                    .attendee_name
                                    .clone()
                                    .or_else(|| record.attendee_id.map(|id| format!("#{}", id)))
                                    .unwrap_or_else(|| "Unknown attendee".into());
                                view! {
                                    <li class="py-2 flex justify-between text-sm">
                                        <span>{who}</span>
                                        <span class="text-fg-muted font-mono">
                                            {record.scanned_at.with_timezone(&chrono::Local).format("%H:%M:%S").to_string()}
                                        </span>
                                    </li>
                                }
                            }
                        />
                    </ul>
                </Show>
            </section>
        </div>
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod host_tests {
    use super::*;
    use crate::api::ScanOutcome;
    use crate::config::RuntimeConfig;
    use crate::test_support::{pipeline::Pipeline, ssr::render_to_string};
    use serde_json::json;

    #[test]
    fn idle_panel_offers_to_start_scanning() {
        let html = render_to_string(|| {
            let pipeline = Pipeline::new();
            let vm = ScannerViewModel::new(pipeline.scanner_deps(), &RuntimeConfig::default());
            let video_ref = create_node_ref::<html::Video>();
            view! { <ScannerPanel vm=vm video_ref=video_ref /> }
        });
        assert!(html.contains("Check-in scanner"));
        assert!(html.contains("Disconnected"));
        assert!(html.contains("Reconnect"));
        assert!(html.contains("Start scanning"));
        assert!(html.contains("No scans yet."));
    }

    #[test]
    fn recent_scans_are_listed() {
        let html = render_to_string(|| {
            let pipeline = Pipeline::new();
            let vm = ScannerViewModel::new(pipeline.scanner_deps(), &RuntimeConfig::default());
            vm.state.record(&ScanOutcome::new(json!({ "userId": 42, "userName": "Ada Lovelace" })));
            vm.state.record(&ScanOutcome::new(json!({ "userId": 43 })));
            let video_ref = create_node_ref::<html::Video>();
            view! { <ScannerPanel vm=vm video_ref=video_ref /> }
        });
        assert!(html.contains("Recent scans"));
        assert!(html.contains("Ada Lovelace"));
        assert!(html.contains("#43"));
        assert!(!html.contains("No scans yet."));
    }

    #[test]
    fn completed_scan_shows_result_and_next_actions() {
        let html = render_to_string(|| {
            let pipeline = Pipeline::new();
            let vm = ScannerViewModel::new(pipeline.scanner_deps(), &RuntimeConfig::default());
            vm.controller.enable_camera();
            vm.controller.handle_scan_success(json!({
                "userId": 42,
                "userName": "Ada Lovelace",
                "message": "Welcome pack issued"
            }));
            let video_ref = create_node_ref::<html::Video>();
            view! { <ScannerPanel vm=vm video_ref=video_ref /> }
        });
        assert!(html.contains("Welcome pack issued"));
        assert!(html.contains("Scan next attendee"));
        assert!(html.contains("Done"));
    }
}
