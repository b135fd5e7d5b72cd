pub mod classifier;
pub mod controller;
pub mod dedupe;
pub mod frame;
pub mod notify;
pub mod runtime;
pub mod submission;

pub use controller::{CameraController, CameraSession, ScanAttempt, ScanPhase, ScannerView};
pub use dedupe::DuplicateCache;
