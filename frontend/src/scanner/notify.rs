use chrono::{DateTime, Duration, Utc};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{ErrorClass, ScannerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: u64,
    pub level: ToastLevel,
    pub message: String,
}

/// Anything that can put a toast on screen.
pub trait ToastSink {
    fn show_toast(&self, toast: Toast);
}

/// Remembers when each error class was last shown.
#[derive(Debug, Clone)]
pub struct ErrorDebouncer {
    window: Duration,
    last_shown: HashMap<ErrorClass, DateTime<Utc>>,
}

impl ErrorDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_shown: HashMap::new(),
        }
    }

    /// Records `class` as shown at `now` unless it was shown inside the window.
    pub fn should_show(&mut self, class: ErrorClass, now: DateTime<Utc>) -> bool {
        if let Some(previous) = self.last_shown.get(&class) {
            if now - *previous < self.window {
                return false;
            }
        }
        self.last_shown.insert(class, now);
        true
    }
}

pub struct Notifier {
    sink: Rc<dyn ToastSink>,
    debouncer: RefCell<ErrorDebouncer>,
    next_id: Cell<u64>,
}

impl Notifier {
    pub fn new(sink: Rc<dyn ToastSink>, debounce_window: Duration) -> Self {
        Self {
            sink,
            debouncer: RefCell::new(ErrorDebouncer::new(debounce_window)),
            next_id: Cell::new(1),
        }
    }

    /// Shows `error` unless the same class was shown moments ago.
    pub fn error(&self, error: &ScannerError) -> bool {
        self.error_at(error, Utc::now())
    }

    pub fn error_at(&self, error: &ScannerError, now: DateTime<Utc>) -> bool {
        let show = self.debouncer.borrow_mut().should_show(error.class(), now);
        if show {
            self.push(ToastLevel::Error, error.to_string());
        } else {
            log::debug!("suppressed repeated {:?} notice", error.class());
        }
        show
    }

    pub fn success(&self, message: impl Into<String>) {
        self.push(ToastLevel::Success, message.into());
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(ToastLevel::Info, message.into());
    }

    fn push(&self, level: ToastLevel, message: String) {
        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1));
        self.sink.show_toast(Toast { id, level, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<Toast>>);

    impl ToastSink for Recorder {
        fn show_toast(&self, toast: Toast) {
            self.0.borrow_mut().push(toast);
        }
    }

    fn notifier() -> (Notifier, Rc<Recorder>) {
        let recorder = Rc::new(Recorder::default());
        (
            Notifier::new(recorder.clone(), Duration::seconds(3)),
            recorder,
        )
    }

    #[test]
    fn repeated_class_within_window_is_suppressed() {
        let (notifier, recorder) = notifier();
        let t0 = Utc::now();
        assert!(notifier.error_at(&ScannerError::DuplicateScan, t0));
        assert!(!notifier.error_at(&ScannerError::DuplicateScan, t0 + Duration::seconds(1)));
        assert!(!notifier.error_at(
            &ScannerError::DuplicateScan,
            t0 + Duration::milliseconds(2999)
        ));
        assert!(notifier.error_at(&ScannerError::DuplicateScan, t0 + Duration::seconds(3)));
        assert_eq!(recorder.0.borrow().len(), 2);
    }

    #[test]
    fn different_classes_are_independent() {
        let (notifier, recorder) = notifier();
        let now = Utc::now();
        assert!(notifier.error_at(&ScannerError::NotConnected, now));
        assert!(notifier.error_at(&ScannerError::DuplicateScan, now));
        assert!(notifier.error_at(&ScannerError::validation("bad"), now));
        assert_eq!(recorder.0.borrow().len(), 3);
    }

    #[test]
    fn toasts_get_increasing_ids() {
        let (notifier, recorder) = notifier();
        notifier.info("camera on");
        notifier.success("checked in");
        let toasts = recorder.0.borrow();
        assert_eq!(toasts[0].level, ToastLevel::Info);
        assert_eq!(toasts[1].level, ToastLevel::Success);
        assert!(toasts[1].id > toasts[0].id);
    }
}
