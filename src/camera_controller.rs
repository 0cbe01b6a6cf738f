use async_trait::async_trait;
use chrono::Local;
use image::{ImageBuffer, RgbImage};
use image::codecs::jpeg::JpegEncoder;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::image_source::{ImageArtifact, PreviewHandle};

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("Camera permission denied")]
    PermissionDenied,
    #[error("Camera device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Failed to capture image: {0}")]
    CaptureFailed(String),
}

/// Handle to an active camera preview stream.
///
/// At most one session exists at a time. The session is stopped on capture,
/// explicit close, or workflow reset; `stop` is idempotent and `Drop` stops
/// as a last resort.
pub struct CameraSession {
    preview_path: PathBuf,
    preview_process: Option<Child>,
    stopped: bool,
}

impl CameraSession {
    pub(crate) fn new(preview_path: PathBuf, preview_process: Option<Child>) -> Self {
        Self {
            preview_path,
            preview_process,
            stopped: false,
        }
    }

    /// Latest preview frame written by the stream.
    pub fn preview_path(&self) -> &Path {
        &self.preview_path
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stop the underlying stream. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(mut process) = self.preview_process.take() {
            let _ = process.kill();
            let _ = process.wait();
            log::info!("Camera preview stopped");
        }
        self.stopped = true;
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.stop();

        if self.preview_path.exists() {
            let _ = std::fs::remove_file(&self.preview_path);
        }
    }
}

/// Camera backend abstraction: the Pi camera on target hardware, a
/// simulated device elsewhere.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Open the rear camera and start a live preview stream.
    async fn open(&self) -> Result<CameraSession, CameraError>;

    /// Freeze a frame from the session and return it as a JPEG artifact.
    ///
    /// A successful capture stops the session as part of the same operation.
    /// A failed capture leaves the session running; teardown stays with the
    /// caller.
    async fn capture(&self, session: &mut CameraSession) -> Result<ImageArtifact, CameraError>;
}

/// Camera controller for the Raspberry Pi camera using libcamera
pub struct RpiCameraController {
    quality: u8,
    capture_dir: PathBuf,
    preview_path: PathBuf,
}

impl RpiCameraController {
    pub fn new(config: &Config) -> Self {
        Self {
            quality: config.camera.capture_quality,
            capture_dir: config.paths.capture_dir.clone(),
            preview_path: std::env::temp_dir().join("ripecheck_camera_preview.jpg"),
        }
    }

    /// Check whether rpicam-still is available on this host.
    pub fn probe() -> bool {
        match Command::new("rpicam-still").arg("--help").output() {
            Ok(_) => {
                log::info!("Raspberry Pi Camera detected (using rpicam-still)");
                true
            }
            Err(e) => {
                log::warn!("rpicam-still not found: {}", e);
                false
            }
        }
    }

    fn capture_path(&self) -> PathBuf {
        let file_name = format!("capture_{}.jpg", Local::now().format("%Y%m%d_%H%M%S%3f"));
        self.capture_dir.join(file_name)
    }

    fn map_spawn_error(e: std::io::Error) -> CameraError {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => CameraError::PermissionDenied,
            _ => CameraError::DeviceUnavailable(e.to_string()),
        }
    }
}

#[async_trait]
impl CameraDevice for RpiCameraController {
    async fn open(&self) -> Result<CameraSession, CameraError> {
        log::info!("Starting camera preview...");

        // Remove a stale preview frame from a previous session
        if self.preview_path.exists() {
            let _ = std::fs::remove_file(&self.preview_path);
        }

        // Continuous low-resolution capture into the preview file
        let mut cmd = Command::new("rpicam-still");
        cmd.arg("-o")
            .arg(&self.preview_path)
            .args([
                "--width", "800",
                "--height", "600",
                "--quality", "70",
                "--timeout", "0",
                "--nopreview",
                "--signal",
                "--loop",
            ]);

        let child = cmd.spawn().map_err(|e| {
            log::error!("Failed to start camera preview: {}", e);
            Self::map_spawn_error(e)
        })?;

        log::info!("Camera preview started successfully");
        Ok(CameraSession::new(self.preview_path.clone(), Some(child)))
    }

    async fn capture(&self, session: &mut CameraSession) -> Result<ImageArtifact, CameraError> {
        log::info!("Taking photo with Pi Camera...");

        let capture_path = self.capture_path();

        if let Some(parent) = capture_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        }

        // No size flags: capture at the sensor's native resolution
        let output = Command::new("rpicam-still")
            .arg("-o")
            .arg(&capture_path)
            .args([
                "--quality", &self.quality.to_string(),
                "--immediate",
                "--nopreview",
                "--timeout", "1000",
            ])
            .output()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::warn!("rpicam-still failed with status: {}", output.status);
            return Err(CameraError::CaptureFailed(stderr.trim().to_string()));
        }

        let data = tokio::fs::read(&capture_path)
            .await
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        log::info!("Photo captured successfully ({} bytes)", data.len());

        // Capture and session teardown are one operation
        session.stop();

        Ok(ImageArtifact::new(data, PreviewHandle::owned(capture_path)))
    }
}

/// Simulated camera for development on hosts without a Pi camera.
///
/// Frames are generated test patterns at the fallback capture size.
pub struct SimulatedCamera {
    width: u32,
    height: u32,
    quality: u8,
    capture_dir: PathBuf,
    preview_path: PathBuf,
}

impl SimulatedCamera {
    pub fn new(config: &Config) -> Self {
        Self {
            width: config.camera.fallback_width,
            height: config.camera.fallback_height,
            quality: config.camera.capture_quality,
            capture_dir: config.paths.capture_dir.clone(),
            preview_path: config.paths.capture_dir.join("simulated_preview.jpg"),
        }
    }

    fn test_pattern(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            let r = (x * 255 / width) as u8;
            let g = (y * 255 / height) as u8;
            let b = ((x + y) * 255 / (width + height)) as u8;
            image::Rgb([r, g, b])
        })
    }
}

#[async_trait]
impl CameraDevice for SimulatedCamera {
    async fn open(&self) -> Result<CameraSession, CameraError> {
        log::info!("Opening simulated camera");

        std::fs::create_dir_all(&self.capture_dir)
            .map_err(|e| CameraError::DeviceUnavailable(e.to_string()))?;

        let frame = Self::test_pattern(800, 600);
        frame
            .save(&self.preview_path)
            .map_err(|e| CameraError::DeviceUnavailable(e.to_string()))?;

        Ok(CameraSession::new(self.preview_path.clone(), None))
    }

    async fn capture(&self, session: &mut CameraSession) -> Result<ImageArtifact, CameraError> {
        let frame = Self::test_pattern(self.width, self.height);
        let data = encode_jpeg(&frame, self.quality)?;

        std::fs::create_dir_all(&self.capture_dir)
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        let file_name = format!("capture_{}.jpg", Local::now().format("%Y%m%d_%H%M%S%3f"));
        let capture_path = self.capture_dir.join(file_name);
        std::fs::write(&capture_path, &data)
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        log::info!("Simulated capture: {}x{}, {} bytes", self.width, self.height, data.len());

        session.stop();

        Ok(ImageArtifact::new(data, PreviewHandle::owned(capture_path)))
    }
}

/// Encode a frame as JPEG at the given quality.
fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, CameraError> {
    let mut data = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut data, quality);
    encoder
        .encode(image.as_raw(), image.width(), image.height(), image::ColorType::Rgb8)
        .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
    Ok(data)
}

// Factory function that returns the appropriate backend for this host
pub fn create_camera(config: &Config) -> Arc<dyn CameraDevice> {
    #[cfg(feature = "camera")]
    {
        if RpiCameraController::probe() {
            return Arc::new(RpiCameraController::new(config));
        }
    }

    log::warn!("No Pi camera available, using simulated camera");
    Arc::new(SimulatedCamera::new(config))
}
