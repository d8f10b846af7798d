//! Camera capture subsystem.
//!
//! - [`state`]: permission/activity state machine
//! - [`backend`]: device seam plus file and HTTP snapshot backends
//! - [`frame`]: encoded image handles and JPEG conversion
//! - [`adapter`]: the [`CameraAdapter`] used by the conversation

pub mod adapter;
pub mod backend;
pub mod frame;
pub mod state;

pub use adapter::CameraAdapter;
pub use backend::{
    CameraBackend, DeviceError, ImageFileCamera, NoCamera, SnapshotCamera, VideoStream,
    backend_from_config,
};
pub use frame::{ImageHandle, JPEG_MIME, encode_jpeg};
pub use state::{CameraState, CameraStatus, Permission};

use crate::error::CameraError;
use async_trait::async_trait;

/// Camera operations the conversation depends on.
///
/// [`CameraAdapter`] is the production implementation; tests substitute
/// scripted fakes.
#[async_trait]
pub trait CameraControl: Send + Sync {
    /// Current `{active, permission, capturing}` view.
    fn status(&self) -> CameraStatus;

    /// Resolve the permission by briefly opening the device.
    ///
    /// Not re-entrancy-safe: concurrent checks race on the permission.
    async fn check_permission(&self) -> bool;

    /// Switch the camera on or off. Returns `false` if activation was refused.
    async fn toggle(&self) -> bool;

    /// Grab and encode exactly one frame.
    async fn capture_frame(&self) -> Result<ImageHandle, CameraError>;
}
