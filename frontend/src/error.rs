use thiserror::Error;

/// Failures surfaced by the scan pipeline.
///
/// The enum is `Clone` so one outcome can be handed to every caller awaiting a
/// shared connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScannerError {
    #[error("{0}")]
    Validation(String),
    #[error("This QR code was already scanned. Wait a moment before scanning it again.")]
    DuplicateScan,
    #[error("Not connected to the check-in server.")]
    NotConnected,
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("{0}")]
    ServerRejection(String),
}

/// Debounce key for user-facing notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Validation,
    Duplicate,
    NotConnected,
    Authentication,
    Network,
    ServerRejection,
}

impl ScannerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) => ErrorClass::Validation,
            Self::DuplicateScan => ErrorClass::Duplicate,
            Self::NotConnected => ErrorClass::NotConnected,
            Self::Authentication(_) => ErrorClass::Authentication,
            Self::Network(_) => ErrorClass::Network,
            Self::ServerRejection(_) => ErrorClass::ServerRejection,
        }
    }

    /// Authentication failures end the session instead of being retried.
    pub fn requires_logout(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}
