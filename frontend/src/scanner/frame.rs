use chrono::{DateTime, Duration, Utc};

/// RGBA pixels of one sampled video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Renders the current camera frame onto an offscreen buffer.
pub trait FrameSource {
    fn capture(&mut self) -> Option<VideoFrame>;
}

/// External QR decoding capability.
pub trait QrDecoder {
    fn decode(&self, frame: &VideoFrame) -> Option<String>;
}

/// Samples frames on every poll and emits at most one decoded string per
/// cooldown window. A camera restart starts a fresh window.
pub struct FrameDecoderAdapter<S, D> {
    source: S,
    decoder: D,
    cooldown: Duration,
    resume_at: Option<DateTime<Utc>>,
    was_active: bool,
}

impl<S: FrameSource, D: QrDecoder> FrameDecoderAdapter<S, D> {
    pub fn new(source: S, decoder: D, cooldown: Duration) -> Self {
        Self {
            source,
            decoder,
            cooldown,
            resume_at: None,
            was_active: false,
        }
    }

    /// Called on every poll tick. Returns the decoded payload, if any.
    pub fn poll(&mut self, camera_active: bool, now: DateTime<Utc>) -> Option<String> {
        if !camera_active {
            self.was_active = false;
            return None;
        }
        if !self.was_active {
            self.was_active = true;
            self.reset();
        }
        if self.cooling_down(now) {
            return None;
        }
        let frame = self.source.capture()?;
        let decoded = self.decoder.decode(&frame)?;
        self.resume_at = Some(now + self.cooldown);
        log::debug!("decoded QR payload ({} chars)", decoded.len());
        Some(decoded)
    }

    pub fn cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.resume_at.map(|at| now < at).unwrap_or(false)
    }

    fn reset(&mut self) {
        self.resume_at = None;
    }
}
