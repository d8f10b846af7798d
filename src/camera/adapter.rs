//! Capture device adapter: permission lifecycle and one-shot frame capture.

use super::backend::{CameraBackend, DeviceError, StreamGuard, VideoStream};
use super::frame::{ImageHandle, encode_jpeg};
use super::state::{CameraState, CameraStatus, Permission};
use super::CameraControl;
use crate::config::{CameraConfig, Facing};
use crate::error::CameraError;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Drives one camera device for the lifetime of a chat session.
///
/// Streams are never held between calls: each permission check and each
/// capture opens a fresh stream and releases it before returning.
pub struct CameraAdapter {
    backend: Arc<dyn CameraBackend>,
    state: Mutex<CameraState>,
    capture_lock: tokio::sync::Mutex<()>,
    facing: Facing,
    jpeg_quality: u8,
    open_timeout: Duration,
}

impl std::fmt::Debug for CameraAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraAdapter")
            .field("backend", &self.backend.name())
            .field("state", &self.state())
            .field("facing", &self.facing)
            .finish()
    }
}

/// Returns a `Capturing` camera to `Ready` when dropped.
struct CapturingFlag<'a> {
    state: &'a Mutex<CameraState>,
}

impl Drop for CapturingFlag<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == CameraState::Capturing {
            *state = CameraState::Ready;
        }
    }
}

impl CameraAdapter {
    pub fn new(backend: Arc<dyn CameraBackend>, config: &CameraConfig) -> Self {
        Self {
            backend,
            state: Mutex::new(CameraState::default()),
            capture_lock: tokio::sync::Mutex::new(()),
            facing: config.facing,
            jpeg_quality: config.jpeg_quality,
            open_timeout: config.open_timeout(),
        }
    }

    /// Current state machine value.
    pub fn state(&self) -> CameraState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, f: impl FnOnce(CameraState) -> CameraState) -> CameraState {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let next = f(*state);
        if next != *state {
            debug!(from = ?*state, to = ?next, "camera state change");
        }
        *state = next;
        next
    }

    async fn open(&self) -> Result<Box<dyn VideoStream>, DeviceError> {
        match tokio::time::timeout(self.open_timeout, self.backend.open_stream(self.facing)).await {
            Ok(result) => result,
            Err(_) => Err(DeviceError::Unavailable(format!(
                "timed out after {:?} opening camera stream",
                self.open_timeout
            ))),
        }
    }

    async fn grab_and_encode(&self) -> Result<ImageHandle, CameraError> {
        let stream = match self.open().await {
            Ok(stream) => stream,
            Err(DeviceError::AccessDenied(reason)) => {
                warn!(%reason, "camera access refused during capture");
                self.update(|s| s.with_permission_result(false));
                return Err(CameraError::PermissionDenied);
            }
            Err(e) => return Err(CameraError::CaptureFailed(e.to_string())),
        };

        let mut guard = StreamGuard::new(stream);
        let frame = match tokio::time::timeout(self.open_timeout, guard.next_frame()).await {
            Ok(frame) => frame,
            Err(_) => Err(DeviceError::Frame(format!(
                "timed out after {:?} waiting for a frame",
                self.open_timeout
            ))),
        };
        guard.release();

        let raster = frame.map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        debug!(width = raster.width(), height = raster.height(), "frame grabbed");
        encode_jpeg(&raster, self.jpeg_quality)
    }
}

#[async_trait]
impl CameraControl for CameraAdapter {
    fn status(&self) -> CameraStatus {
        self.state().status()
    }

    async fn check_permission(&self) -> bool {
        debug!(backend = self.backend.name(), "checking camera permission");
        let granted = match self.open().await {
            Ok(stream) => {
                StreamGuard::new(stream).release();
                true
            }
            Err(e) => {
                warn!(error = %e, "camera permission check failed");
                false
            }
        };
        self.update(|s| s.with_permission_result(granted));
        if granted {
            info!("camera permission granted");
        }
        granted
    }

    async fn toggle(&self) -> bool {
        let state = self.state();
        if !state.is_active() && state.permission() != Permission::Granted && !self.check_permission().await {
            info!("cannot activate camera: permission denied");
            return false;
        }

        let next = self.update(CameraState::toggled);
        info!(active = next.is_active(), "camera toggled");
        true
    }

    async fn capture_frame(&self) -> Result<ImageHandle, CameraError> {
        // An active camera always holds a grant, so NotActive covers the
        // denied case here; refusals at acquisition time are mapped below.
        if !self.state().is_active() {
            return Err(CameraError::NotActive);
        }

        let Ok(_single_flight) = self.capture_lock.try_lock() else {
            return Err(CameraError::CaptureFailed(
                "a capture is already in progress".into(),
            ));
        };

        // Re-check under the lock: the camera may have been switched off.
        let state = self.update(|s| match s {
            CameraState::Ready => CameraState::Capturing,
            other => other,
        });
        if !state.is_active() {
            return Err(CameraError::NotActive);
        }
        let _flag = CapturingFlag { state: &self.state };

        let result = self.grab_and_encode().await;
        match &result {
            Ok(handle) => info!(bytes = handle.len(), "photo captured"),
            Err(e) => warn!(error = %e, "photo capture failed"),
        }
        result
    }
}
