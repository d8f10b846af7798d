//! Platform seam for camera devices.
//!
//! A [`CameraBackend`] hands out [`VideoStream`]s. The adapter opens a fresh
//! stream for every permission check and every capture, and stops it again
//! before returning.

use crate::config::{CameraConfig, CameraSourceKind, Facing};
use async_trait::async_trait;
use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Device-level faults reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// The platform refused access to the camera.
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// No usable device (missing, busy, unreachable).
    #[error("device unavailable: {0}")]
    Unavailable(String),
    /// The stream opened but a frame could not be produced.
    #[error("frame error: {0}")]
    Frame(String),
}

/// A source of camera streams.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Acquire a stream from the device.
    async fn open_stream(&self, facing: Facing) -> Result<Box<dyn VideoStream>, DeviceError>;
}

/// An open camera stream. Must be stopped to release the device.
#[async_trait]
pub trait VideoStream: Send {
    /// Render the next frame to an RGB raster.
    async fn next_frame(&mut self) -> Result<RgbImage, DeviceError>;

    /// Release the device. Called exactly once per stream.
    fn stop(&mut self);
}

/// Owns an open stream and stops it on every exit path.
pub(crate) struct StreamGuard {
    stream: Option<Box<dyn VideoStream>>,
}

impl StreamGuard {
    pub(crate) fn new(stream: Box<dyn VideoStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    pub(crate) async fn next_frame(&mut self) -> Result<RgbImage, DeviceError> {
        match self.stream.as_mut() {
            Some(stream) => stream.next_frame().await,
            None => Err(DeviceError::Frame("stream already released".into())),
        }
    }

    /// Stop the stream now rather than at drop.
    pub(crate) fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Build the backend described by the camera config.
pub fn backend_from_config(config: &CameraConfig) -> Arc<dyn CameraBackend> {
    match config.source {
        CameraSourceKind::None => Arc::new(NoCamera),
        CameraSourceKind::File => match &config.file_path {
            Some(path) => Arc::new(ImageFileCamera::new(path.clone())),
            None => {
                warn!("camera source is 'file' but no file_path is set");
                Arc::new(NoCamera)
            }
        },
        CameraSourceKind::Snapshot => match &config.snapshot_url {
            Some(url) => Arc::new(SnapshotCamera::new(url.clone(), config.open_timeout())),
            None => {
                warn!("camera source is 'snapshot' but no snapshot_url is set");
                Arc::new(NoCamera)
            }
        },
    }
}

// ── NoCamera ──────────────────────────────────────────────────

/// Backend for hosts without a camera. Every open fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCamera;

#[async_trait]
impl CameraBackend for NoCamera {
    fn name(&self) -> &str {
        "none"
    }

    async fn open_stream(&self, _facing: Facing) -> Result<Box<dyn VideoStream>, DeviceError> {
        Err(DeviceError::Unavailable("no camera configured".into()))
    }
}

// ── ImageFileCamera ───────────────────────────────────────────

/// Treats a still image on disk as the camera. The file is re-read for every
/// frame, so replacing it changes what the "camera" sees.
#[derive(Debug, Clone)]
pub struct ImageFileCamera {
    path: PathBuf,
}

impl ImageFileCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CameraBackend for ImageFileCamera {
    fn name(&self) -> &str {
        "file"
    }

    async fn open_stream(&self, facing: Facing) -> Result<Box<dyn VideoStream>, DeviceError> {
        debug!(path = %self.path.display(), ?facing, "opening file camera");
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() => Ok(Box::new(FileStream {
                path: self.path.clone(),
            })),
            Ok(_) => Err(DeviceError::Unavailable(format!(
                "{} is not a file",
                self.path.display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(DeviceError::AccessDenied(format!("{}: {e}", self.path.display())))
            }
            Err(e) => Err(DeviceError::Unavailable(format!(
                "{}: {e}",
                self.path.display()
            ))),
        }
    }
}

struct FileStream {
    path: PathBuf,
}

#[async_trait]
impl VideoStream for FileStream {
    async fn next_frame(&mut self) -> Result<RgbImage, DeviceError> {
        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|e| DeviceError::Frame(format!("read {}: {e}", self.path.display())))?;
        decode_frame(&data)
    }

    fn stop(&mut self) {
        debug!(path = %self.path.display(), "file camera stream stopped");
    }
}

// ── SnapshotCamera ────────────────────────────────────────────

/// Pulls JPEG/PNG stills from an HTTP snapshot endpoint.
///
/// HTTP 401/403 is reported as [`DeviceError::AccessDenied`]; connection
/// failures and other statuses as [`DeviceError::Unavailable`].
#[derive(Debug, Clone)]
pub struct SnapshotCamera {
    url: String,
    client: reqwest::Client,
}

impl SnapshotCamera {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "snapshot client builder failed, using defaults");
                reqwest::Client::new()
            });
        Self {
            url: url.into(),
            client,
        }
    }
}

async fn fetch_snapshot(client: &reqwest::Client, url: &str) -> Result<bytes::Bytes, DeviceError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| DeviceError::Unavailable(format!("snapshot request failed: {e}")))?;

    let status = response.status();
    match status.as_u16() {
        401 | 403 => {
            return Err(DeviceError::AccessDenied(format!(
                "snapshot endpoint returned HTTP {}",
                status.as_u16()
            )));
        }
        _ if !status.is_success() => {
            return Err(DeviceError::Unavailable(format!(
                "snapshot endpoint returned HTTP {}",
                status.as_u16()
            )));
        }
        _ => {}
    }

    response
        .bytes()
        .await
        .map_err(|e| DeviceError::Frame(format!("snapshot body: {e}")))
}

#[async_trait]
impl CameraBackend for SnapshotCamera {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn open_stream(&self, facing: Facing) -> Result<Box<dyn VideoStream>, DeviceError> {
        debug!(url = %self.url, ?facing, "opening snapshot camera");
        // The permission check response doubles as the first frame.
        let first = fetch_snapshot(&self.client, &self.url).await?;
        Ok(Box::new(SnapshotStream {
            url: self.url.clone(),
            client: self.client.clone(),
            pending: Some(first),
        }))
    }
}

struct SnapshotStream {
    url: String,
    client: reqwest::Client,
    pending: Option<bytes::Bytes>,
}

#[async_trait]
impl VideoStream for SnapshotStream {
    async fn next_frame(&mut self) -> Result<RgbImage, DeviceError> {
        let data = match self.pending.take() {
            Some(data) => data,
            None => fetch_snapshot(&self.client, &self.url).await?,
        };
        decode_frame(&data)
    }

    fn stop(&mut self) {
        self.pending = None;
        debug!(url = %self.url, "snapshot stream stopped");
    }
}

/// Decode any supported still format into an RGB raster.
fn decode_frame(data: &[u8]) -> Result<RgbImage, DeviceError> {
    image::load_from_memory(data)
        .map(|img| img.to_rgb8())
        .map_err(|e| DeviceError::Frame(format!("decode: {e}")))
}
