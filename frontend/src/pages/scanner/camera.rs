use leptos::{html, *};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    CanvasRenderingContext2d, HtmlCanvasElement, HtmlVideoElement, MediaStream,
    MediaStreamConstraints, MediaStreamTrack,
};

use crate::{
    scanner::frame::{FrameSource, QrDecoder, VideoFrame},
    utils::storage as storage_utils,
};

/// `HAVE_CURRENT_DATA` in the media element ready-state enum.
const HAVE_CURRENT_DATA: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    Environment,
    User,
}

impl FacingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::Environment => "environment",
            FacingMode::User => "user",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            FacingMode::Environment => FacingMode::User,
            FacingMode::User => FacingMode::Environment,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FacingMode::Environment => "Rear camera",
            FacingMode::User => "Front camera",
        }
    }
}

pub async fn acquire_stream(facing: FacingMode) -> Result<MediaStream, String> {
    let devices = storage_utils::window()?
        .navigator()
        .media_devices()
        .map_err(|_| "Camera access is not available in this browser".to_string())?;
    let video = js_sys::Object::new();
    js_sys::Reflect::set(&video, &"facingMode".into(), &facing.as_str().into())
        .map_err(|_| "Failed to build camera constraints".to_string())?;
    let constraints = MediaStreamConstraints::new();
    constraints.set_audio(&JsValue::FALSE);
    constraints.set_video(&video.into());
    let promise = devices
        .get_user_media_with_constraints(&constraints)
        .map_err(|_| "Camera access was refused".to_string())?;
    let stream = JsFuture::from(promise)
        .await
        .map_err(|_| "Camera permission denied".to_string())?;
    stream
        .dyn_into::<MediaStream>()
        .map_err(|_| "Unexpected camera stream".to_string())
}

pub fn stop_stream(stream: &MediaStream) {
    for track in stream.get_tracks().iter() {
        if let Ok(track) = track.dyn_into::<MediaStreamTrack>() {
            track.stop();
        }
    }
}

/// Keeps the camera stream in step with `active`: acquires it when the
/// session starts, releases it when the session ends, and re-acquires it
/// when the facing mode changes. Only one stream is held at a time.
pub fn bind_camera(
    video_ref: NodeRef<html::Video>,
    active: Signal<bool>,
    facing: RwSignal<FacingMode>,
    camera_error: RwSignal<Option<String>>,
) {
    let current = store_value(None::<MediaStream>);
    let release = move || {
        if let Some(stream) = current.try_update_value(|slot| slot.take()).flatten() {
            stop_stream(&stream);
        }
    };

    create_effect(move |_| {
        let wanted = active.get();
        let mode = facing.get();
        release();
        if !wanted {
            return;
        }
        spawn_local(async move {
            match acquire_stream(mode).await {
                Ok(stream) => {
                    if !active.get_untracked() || facing.get_untracked() != mode {
                        stop_stream(&stream);
                        return;
                    }
                    if let Some(video) = video_ref.get_untracked() {
                        let element: &HtmlVideoElement = &video;
                        element.set_src_object(Some(&stream));
                        let _ = element.play();
                    }
                    camera_error.set(None);
                    current.set_value(Some(stream));
                }
                Err(err) => {
                    log::warn!("camera unavailable: {}", err);
                    camera_error.set(Some(err));
                }
            }
        });
    });

    on_cleanup(release);
}

/// Samples the `<video>` element through an offscreen canvas.
pub struct CanvasFrameSource {
    video_ref: NodeRef<html::Video>,
    canvas: Option<HtmlCanvasElement>,
}

impl CanvasFrameSource {
    pub fn new(video_ref: NodeRef<html::Video>) -> Self {
        Self {
            video_ref,
            canvas: None,
        }
    }

    fn canvas(&mut self) -> Option<&HtmlCanvasElement> {
        if self.canvas.is_none() {
            let document = web_sys::window()?.document()?;
            let canvas = document
                .create_element("canvas")
                .ok()?
                .dyn_into::<HtmlCanvasElement>()
                .ok()?;
            self.canvas = Some(canvas);
        }
        self.canvas.as_ref()
    }
}

impl FrameSource for CanvasFrameSource {
    fn capture(&mut self) -> Option<VideoFrame> {
        let element = self.video_ref.get_untracked()?;
        let video: &HtmlVideoElement = &element;
        let video = video.clone();
        if video.ready_state() < HAVE_CURRENT_DATA {
            return None;
        }
        let (width, height) = (video.video_width(), video.video_height());
        if width == 0 || height == 0 {
            return None;
        }
        let canvas = self.canvas()?;
        canvas.set_width(width);
        canvas.set_height(height);
        let context = canvas
            .get_context("2d")
            .ok()??
            .dyn_into::<CanvasRenderingContext2d>()
            .ok()?;
        context
            .draw_image_with_html_video_element(&video, 0.0, 0.0)
            .ok()?;
        let image = context
            .get_image_data(0.0, 0.0, width as f64, height as f64)
            .ok()?;
        Some(VideoFrame {
            width,
            height,
            rgba: image.data().0,
        })
    }
}

/// Bridge to the page-provided `window.jsQR(data, width, height)`.
#[derive(Clone, Copy, Default)]
pub struct JsQrDecoder;

impl QrDecoder for JsQrDecoder {
    fn decode(&self, frame: &VideoFrame) -> Option<String> {
        let window = web_sys::window()?;
        let decoder = js_sys::Reflect::get(&window, &"jsQR".into())
            .ok()?
            .dyn_into::<js_sys::Function>()
            .ok()?;
        let pixels = js_sys::Uint8ClampedArray::from(frame.rgba.as_slice());
        let result = decoder
            .call3(
                &JsValue::NULL,
                &pixels,
                &JsValue::from(frame.width),
                &JsValue::from(frame.height),
            )
            .ok()?;
        if result.is_null() || result.is_undefined() {
            return None;
        }
        js_sys::Reflect::get(&result, &"data".into())
            .ok()?
            .as_string()
            .filter(|data| !data.is_empty())
    }
}
