//! In-process fakes for the camera, vision engine, store and overlay.

use async_trait::async_trait;
use chrono::Utc;
use frs_core::{
    BoundingBox, Detection, Embedding, FaceSummary, Frame, MediaSource, OverlayStyle, OverlaySurface,
    RegisteredFace, StreamError, VideoStream, VisionEngine, VisionError,
};
use frs_store::{DescriptorStore, StoreError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn face(id: &str, name: &str, values: Vec<f32>) -> RegisteredFace {
    RegisteredFace {
        id: id.into(),
        name: name.into(),
        descriptor: Embedding::new(values),
        created_at: Utc::now(),
    }
}

pub fn detection(values: Vec<f32>) -> Detection {
    Detection {
        bounding_box: BoundingBox { x: 10.0, y: 20.0, width: 30.0, height: 40.0, confidence: 0.9 },
        embedding: Embedding::new(values),
        landmarks: Vec::new(),
    }
}

// --- camera -----------------------------------------------------------------

pub struct FakeStream {
    stopped: Arc<AtomicBool>,
    dims: Option<(u32, u32)>,
}

impl VideoStream for FakeStream {
    fn dimensions(&self) -> Option<(u32, u32)> {
        if self.stopped.load(Ordering::SeqCst) {
            None
        } else {
            self.dims
        }
    }

    fn capture_frame(&mut self) -> Result<Frame, StreamError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(StreamError::Stopped);
        }
        let (w, h) = self.dims.unwrap_or((0, 0));
        Ok(Frame {
            data: vec![0; (w * h * 3) as usize],
            width: w,
            height: h,
            sequence: 0,
            timestamp: std::time::Instant::now(),
        })
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Hands out streams and remembers their stop flags.
#[derive(Default)]
pub struct FakeMedia {
    pub deny: AtomicBool,
    pub acquired: AtomicUsize,
    streams: Mutex<Vec<Arc<AtomicBool>>>,
}

impl FakeMedia {
    pub fn denying() -> Self {
        let media = Self::default();
        media.deny.store(true, Ordering::SeqCst);
        media
    }

    /// True when every stream handed out so far has been stopped.
    pub fn all_stopped(&self) -> bool {
        self.streams.lock().unwrap().iter().all(|s| s.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl MediaSource for FakeMedia {
    async fn acquire(&self) -> Result<Box<dyn VideoStream>, StreamError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(StreamError::PermissionDenied("denied by test".into()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        let stopped = Arc::new(AtomicBool::new(false));
        self.streams.lock().unwrap().push(Arc::clone(&stopped));
        Ok(Box::new(FakeStream {
            stopped,
            dims: Some((64, 48)),
        }))
    }
}

// --- vision engine ----------------------------------------------------------

/// Returns queued results in order, then `fallback` forever.
pub struct FakeEngine {
    pub loaded: AtomicBool,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub delay: Duration,
    script: Mutex<VecDeque<Result<Vec<Detection>, VisionError>>>,
    fallback: Mutex<Vec<Detection>>,
}

impl FakeEngine {
    pub fn new(fallback: Vec<Detection>) -> Self {
        Self {
            loaded: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Duration::ZERO,
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(fallback),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn unloaded(self) -> Self {
        self.loaded.store(false, Ordering::SeqCst);
        self
    }

    pub fn push(&self, result: Result<Vec<Detection>, VisionError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn next(&self) -> Result<Vec<Detection>, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.fallback.lock().unwrap().clone()))
    }
}

#[async_trait]
impl VisionEngine for FakeEngine {
    fn models_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    async fn detect_all(&self, _frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        self.next().await
    }

    async fn detect_single(&self, _frame: &Frame) -> Result<Option<Detection>, VisionError> {
        Ok(self.next().await?.into_iter().next())
    }
}

// --- store ------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    faces: Mutex<Vec<RegisteredFace>>,
    next_id: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
    bump_on_read: AtomicBool,
    generation: AtomicU64,
    pub inserts: AtomicUsize,
}

impl MemoryStore {
    pub fn with_faces(faces: Vec<RegisteredFace>) -> Self {
        let store = Self::default();
        *store.faces.lock().unwrap() = faces;
        store
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Simulate a configuration change landing while a read is in flight.
    pub fn bump_generation_on_read(&self, bump: bool) {
        self.bump_on_read.store(bump, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.faces.lock().unwrap().len()
    }
}

#[async_trait]
impl DescriptorStore for MemoryStore {
    async fn list_faces(&self) -> Result<Vec<RegisteredFace>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::ReadFailed("offline".into()));
        }
        if self.bump_on_read.load(Ordering::SeqCst) {
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        Ok(self.faces.lock().unwrap().clone())
    }

    async fn list_summaries(&self) -> Result<Vec<FaceSummary>, StoreError> {
        let mut summaries: Vec<FaceSummary> =
            self.list_faces().await?.iter().map(FaceSummary::from).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(summaries)
    }

    async fn insert_face(&self, name: &str, descriptor: &Embedding) -> Result<RegisteredFace, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("offline".into()));
        }
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = RegisteredFace {
            id,
            name: name.to_string(),
            descriptor: descriptor.clone(),
            created_at: Utc::now(),
        };
        self.faces.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn delete_face(&self, id: &str) -> Result<(), StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::DeleteFailed("offline".into()));
        }
        self.faces.lock().unwrap().retain(|f| f.id != id);
        Ok(())
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

// --- overlay ----------------------------------------------------------------

/// Records every draw call as a short string.
#[derive(Clone, Default)]
pub struct RecordingOverlay {
    pub ops: Arc<Mutex<Vec<String>>>,
}

impl RecordingOverlay {
    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }
}

impl OverlaySurface for RecordingOverlay {
    fn resize(&mut self, width: u32, height: u32) {
        self.ops.lock().unwrap().push(format!("resize {width}x{height}"));
    }

    fn clear(&mut self) {
        self.ops.lock().unwrap().push("clear".into());
    }

    fn stroke_rect(&mut self, _bbox: &BoundingBox, style: &OverlayStyle) {
        let [r, g, b] = style.color;
        self.ops.lock().unwrap().push(format!("rect #{r:02x}{g:02x}{b:02x}"));
    }

    fn fill_text(&mut self, text: &str, _x: f32, _y: f32, _style: &OverlayStyle) {
        self.ops.lock().unwrap().push(format!("text {text}"));
    }
}
