//! Pipeline error taxonomy

use thiserror::Error;

/// Errors raised by the capture-to-parameter pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("No audio device connected")]
    NotConnected,

    #[error("Spectrum of {len} samples cannot fill {bins} bins")]
    InsufficientSpectrum { len: usize, bins: usize },

    #[error("Feature slot {slot} is out of range for a vector of {len} slots")]
    MissingFeatureSlot { slot: usize, len: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Device request failures the user can retry from the toggle
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_) | Self::DeviceUnavailable(_)
        )
    }

    /// Classify a platform error message from a device request.
    ///
    /// Hosts report a denied capture request through backend-specific
    /// errors (EACCES, E_ACCESSDENIED, TCC), so the message is the only hint.
    pub fn from_device_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("permission") || lower.contains("denied") || lower.contains("access") {
            Self::PermissionDenied(message)
        } else {
            Self::DeviceUnavailable(message)
        }
    }
}
