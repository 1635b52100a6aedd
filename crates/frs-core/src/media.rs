//! Camera stream seam: acquiring a stream, sampling frames, releasing tracks.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum StreamError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("stream already stopped")]
    Stopped,
}

/// A captured RGB8 frame at the stream's native resolution.
#[derive(Clone)]
pub struct Frame {
    /// Packed RGB pixel data (width * height * 3 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u32,
    pub timestamp: std::time::Instant,
}

impl Frame {
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.data.len() == (self.width as usize) * (self.height as usize) * 3
    }
}

/// An open video stream.
///
/// `stop` releases every underlying track and is idempotent. After it
/// returns, `is_stopped` reports true and captures fail with
/// [`StreamError::Stopped`].
pub trait VideoStream: Send {
    /// Native pixel dimensions, or `None` while the stream has no usable size.
    fn dimensions(&self) -> Option<(u32, u32)>;

    fn capture_frame(&mut self) -> Result<Frame, StreamError>;

    fn stop(&mut self);

    fn is_stopped(&self) -> bool;
}

/// Something that can open a video stream (a camera device).
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn VideoStream>, StreamError>;
}

/// A [`VideoStream`] that is captured from on the blocking thread pool and can
/// be stopped from any thread without waiting for a capture in progress.
///
/// `stop` marks the handle stopped immediately. If a capture holds the stream
/// at that moment, the capturing thread releases the tracks as soon as its
/// frame read returns and discards the frame.
#[derive(Clone)]
pub struct SharedStream {
    inner: Arc<SharedInner>,
}

struct SharedInner {
    stream: Mutex<Box<dyn VideoStream>>,
    stopped: AtomicBool,
    dims: Option<(u32, u32)>,
}

impl SharedStream {
    pub fn new(stream: Box<dyn VideoStream>) -> Self {
        let dims = stream.dimensions();
        let stopped = AtomicBool::new(stream.is_stopped());
        Self {
            inner: Arc::new(SharedInner {
                stream: Mutex::new(stream),
                stopped,
                dims,
            }),
        }
    }

    /// Native size reported when the stream was opened; `None` once stopped.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        if self.is_stopped() {
            None
        } else {
            self.inner.dims
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Capture one frame on the blocking pool.
    pub async fn capture(&self) -> Result<Frame, StreamError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.capture_blocking())
            .await
            .map_err(|e| StreamError::CaptureFailed(format!("capture task: {e}")))?
    }

    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.inner.stream.try_lock() {
            Ok(mut stream) => stream.stop(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().stop(),
            Err(TryLockError::WouldBlock) => {
                tracing::debug!("capture in progress; tracks released when it returns");
            }
        }
    }
}

impl SharedInner {
    fn lock(&self) -> MutexGuard<'_, Box<dyn VideoStream>> {
        self.stream.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn capture_blocking(&self) -> Result<Frame, StreamError> {
        let result = {
            let mut stream = self.lock();
            if self.stopped.load(Ordering::SeqCst) {
                return Err(StreamError::Stopped);
            }
            stream.capture_frame()
        };
        // A stop that arrived mid-capture could not take the lock.
        if self.stopped.load(Ordering::SeqCst) {
            self.lock().stop();
            return Err(StreamError::Stopped);
        }
        let frame = result?;
        if !frame.is_well_formed() {
            return Err(StreamError::CaptureFailed(format!(
                "{} bytes do not form a {}x{} RGB frame",
                frame.data.len(),
                frame.width,
                frame.height
            )));
        }
        Ok(frame)
    }
}

impl Drop for SharedInner {
    fn drop(&mut self) {
        self.stream.get_mut().unwrap_or_else(|e| e.into_inner()).stop();
    }
}
