//! V4L2 camera capture via the `v4l` crate.

use crate::frame;
use async_trait::async_trait;
use frs_core::{Frame, MediaSource, StreamError, VideoStream};
use std::io;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("permission denied opening {0}")]
    PermissionDenied(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

impl From<CameraError> for StreamError {
    fn from(e: CameraError) -> Self {
        match e {
            CameraError::PermissionDenied(_) => StreamError::PermissionDenied(e.to_string()),
            CameraError::CaptureFailed(_) => StreamError::CaptureFailed(e.to_string()),
            _ => StreamError::Unavailable(e.to_string()),
        }
    }
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// 8-bit grayscale.
    Grey,
    /// Packed 24-bit RGB.
    Rgb24,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"YUYV") {
            Some(PixelFormat::Yuyv)
        } else if fourcc == FourCC::new(b"GREY") {
            Some(PixelFormat::Grey)
        } else if fourcc == FourCC::new(b"RGB3") {
            Some(PixelFormat::Rgb24)
        } else {
            None
        }
    }
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => CameraError::PermissionDenied(device_path.to_string()),
            _ if e.raw_os_error() == Some(16) => CameraError::DeviceBusy, // EBUSY
            _ => CameraError::DeviceNotFound(format!("{device_path}: {e}")),
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUESTED_WIDTH;
        fmt.height = REQUESTED_HEIGHT;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let pixel_format = PixelFormat::from_fourcc(negotiated.fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV, GREY, or RGB3)",
                negotiated.fourcc
            ))
        })?;

        tracing::info!(
            device = device_path,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?negotiated.fourcc,
            "opened camera"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            pixel_format,
        })
    }

    /// Capture a single frame, converted to RGB8.
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;

        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let data = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height),
            PixelFormat::Grey => frame::grey_to_rgb(buf, self.width, self.height),
            PixelFormat::Rgb24 => frame::rgb24(buf, self.width, self.height),
        }
        .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        Ok(Frame {
            data,
            width: self.width,
            height: self.height,
            sequence: meta.sequence,
            timestamp: std::time::Instant::now(),
        })
    }
}

/// A [`MediaSource`] that opens a fixed V4L2 device path.
pub struct CameraSource {
    device_path: String,
}

impl CameraSource {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
        }
    }
}

#[async_trait]
impl MediaSource for CameraSource {
    async fn acquire(&self) -> Result<Box<dyn VideoStream>, StreamError> {
        // Opening and format negotiation are blocking ioctls.
        let path = self.device_path.clone();
        let camera = tokio::task::spawn_blocking(move || Camera::open(&path))
            .await
            .map_err(|e| StreamError::Unavailable(format!("camera open task: {e}")))??;
        Ok(Box::new(CameraStream::new(camera)))
    }
}

/// An open camera. Stopping drops the device handle, which releases the
/// V4L2 buffers and closes the file descriptor.
pub struct CameraStream {
    camera: Option<Camera>,
}

impl CameraStream {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera: Some(camera),
        }
    }
}

impl VideoStream for CameraStream {
    fn dimensions(&self) -> Option<(u32, u32)> {
        self.camera
            .as_ref()
            .map(|c| (c.width, c.height))
            .filter(|&(w, h)| w > 0 && h > 0)
    }

    fn capture_frame(&mut self) -> Result<Frame, StreamError> {
        let camera = self.camera.as_ref().ok_or(StreamError::Stopped)?;
        Ok(camera.capture_frame()?)
    }

    fn stop(&mut self) {
        if let Some(camera) = self.camera.take() {
            tracing::debug!(device = %camera.device_path, "camera released");
        }
    }

    fn is_stopped(&self) -> bool {
        self.camera.is_none()
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.stop();
    }
}
