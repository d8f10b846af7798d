//! Camera permission and activity state machine.
//!
//! An active camera always has permission, so the "active but denied"
//! combination cannot be constructed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of the most recent camera-access check.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Not checked yet this session.
    #[default]
    Unknown,
    /// The platform handed out a stream.
    Granted,
    /// The platform refused access.
    Denied,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Permission::Unknown => "unknown",
            Permission::Granted => "granted",
            Permission::Denied => "denied",
        };
        f.write_str(s)
    }
}

/// State of one camera session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    /// Switched off, with whatever permission is currently known.
    Off(Permission),
    /// Switched on and idle. Implies [`Permission::Granted`].
    Ready,
    /// Switched on with a frame grab in flight. Implies [`Permission::Granted`].
    Capturing,
}

impl Default for CameraState {
    fn default() -> Self {
        Self::Off(Permission::Unknown)
    }
}

impl CameraState {
    pub fn is_active(self) -> bool {
        matches!(self, Self::Ready | Self::Capturing)
    }

    pub fn is_capturing(self) -> bool {
        matches!(self, Self::Capturing)
    }

    pub fn permission(self) -> Permission {
        match self {
            Self::Off(permission) => permission,
            Self::Ready | Self::Capturing => Permission::Granted,
        }
    }

    /// Apply the outcome of a permission check.
    ///
    /// A denial always switches the camera off. A grant keeps an active
    /// camera active.
    pub fn with_permission_result(self, granted: bool) -> Self {
        match (self, granted) {
            (_, false) => Self::Off(Permission::Denied),
            (Self::Off(_), true) => Self::Off(Permission::Granted),
            (active, true) => active,
        }
    }

    /// Flip between on and off. Only meaningful once permission is granted.
    pub fn toggled(self) -> Self {
        match self {
            Self::Off(_) => Self::Ready,
            Self::Ready | Self::Capturing => Self::Off(Permission::Granted),
        }
    }

    /// Snapshot for display.
    pub fn status(self) -> CameraStatus {
        CameraStatus {
            is_active: self.is_active(),
            permission: self.permission(),
            is_capturing: self.is_capturing(),
        }
    }
}

/// Flattened, copyable view of the camera for the view layer and for the
/// orchestrator's precondition checks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraStatus {
    pub is_active: bool,
    pub permission: Permission,
    pub is_capturing: bool,
}
