//! Error types for moodcam.
//!
//! Each subsystem owns its own error enum. Inference failures never appear
//! here: the gateway absorbs them into degraded results (see
//! [`crate::gateway::Inference`]).

/// Faults raised by the capture device adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    /// A capture was requested while the camera is switched off.
    #[error("camera is not active")]
    NotActive,

    /// The platform refused camera access.
    #[error("camera permission denied")]
    PermissionDenied,

    /// Device acquisition, frame grab or image encoding failed.
    #[error("capture failed: {0}")]
    CaptureFailed(String),

    /// The device produced a frame with no pixels.
    #[error("camera returned an empty frame")]
    EmptyFrame,
}

impl CameraError {
    /// Returns true if the fault is an explicit refusal of camera access.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied)
    }
}

/// Errors produced while exporting or re-reading chat history.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Only the welcome message exists; there is no conversation to export.
    #[error("nothing to export")]
    NothingToExport,

    /// Writing the history file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed.
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A history line could not be parsed.
    #[error("parse error on line {line}: {reason}")]
    Parse {
        /// 1-based line number in the exported text.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },
}

/// Top-level error type for the conversation client.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// History export error.
    #[error("export error: {0}")]
    Export(#[from] ExportError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ChatError>;
