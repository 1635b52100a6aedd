//! Continuous recognition: sample the camera on a fixed period, detect and
//! match every face, publish the recognized names, and draw the overlay.
//!
//! The loop owns its stream and its periodic task as one session. Both are
//! released together under the state lock, and every tick re-checks its
//! session under that same lock before publishing anything, so once
//! [`RecognitionLoop::stop`] returns no tick output can land. Frame capture
//! runs on the blocking pool without the state lock held.

use crate::registry::{FaceRegistry, FaceSet};
use frs_core::overlay::{self, Annotation};
use frs_core::{
    FaceMatcher, Frame, MatchResult, MediaSource, OverlaySurface, SharedStream, StreamError, VisionEngine,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("camera: {0}")]
    Stream(#[from] StreamError),
    #[error("face detection models are not loaded")]
    ModelsNotLoaded,
    #[error("no registered faces to recognize")]
    NoRegisteredFaces,
}

/// Lifecycle state. `Stopping` only exists while the state lock is held
/// during release, so callers observe `Idle` or `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Active,
    Stopping,
}

#[derive(Debug, Clone, Copy)]
pub struct RecognitionSettings {
    pub threshold: f32,
    pub tick_interval: Duration,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            threshold: frs_core::DEFAULT_MATCH_THRESHOLD,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

struct Session {
    id: u64,
    stream: SharedStream,
    task: Option<JoinHandle<()>>,
}

struct Shared {
    state: LoopState,
    next_session: u64,
    session: Option<Session>,
    overlay: Box<dyn OverlaySurface>,
}

struct Inner {
    engine: Arc<dyn VisionEngine>,
    media: Arc<dyn MediaSource>,
    registry: FaceRegistry,
    settings: RecognitionSettings,
    shared: Mutex<Shared>,
    names: watch::Sender<Vec<String>>,
    annotations: watch::Sender<Vec<Annotation>>,
}

pub struct RecognitionLoop {
    inner: Arc<Inner>,
    /// Serializes `start` calls across the stream-acquisition await.
    starting: tokio::sync::Mutex<()>,
}

impl RecognitionLoop {
    pub fn new(
        engine: Arc<dyn VisionEngine>,
        media: Arc<dyn MediaSource>,
        registry: FaceRegistry,
        overlay: Box<dyn OverlaySurface>,
        settings: RecognitionSettings,
    ) -> Self {
        let (names, _) = watch::channel(Vec::new());
        let (annotations, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                engine,
                media,
                registry,
                settings,
                shared: Mutex::new(Shared {
                    state: LoopState::Idle,
                    next_session: 0,
                    session: None,
                    overlay,
                }),
                names,
                annotations,
            }),
            starting: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> LoopState {
        self.inner.lock().state
    }

    /// Whether a start request would pass its guards right now.
    pub fn can_start(&self) -> bool {
        self.inner.engine.models_loaded() && !self.inner.registry.is_empty()
    }

    pub fn recognized_names(&self) -> Vec<String> {
        self.inner.names.borrow().clone()
    }

    pub fn annotations(&self) -> Vec<Annotation> {
        self.inner.annotations.borrow().clone()
    }

    /// PNG of the overlay as last drawn, when the surface keeps pixels.
    pub fn overlay_png(&self) -> Option<Vec<u8>> {
        self.inner.lock().overlay.snapshot_png()
    }

    /// Idle → Active. Starting an active loop is a no-op.
    pub async fn start(&self) -> Result<(), RecognitionError> {
        let _guard = self.starting.lock().await;
        if self.state() == LoopState::Active {
            return Ok(());
        }
        if !self.inner.engine.models_loaded() {
            return Err(RecognitionError::ModelsNotLoaded);
        }
        if self.inner.registry.is_empty() {
            return Err(RecognitionError::NoRegisteredFaces);
        }

        // Subscribed before the final emptiness check so the task sees every
        // replacement made after it.
        let mut faces_rx = self.inner.registry.subscribe();
        let stream = SharedStream::new(self.inner.media.acquire().await?);

        // The set may have emptied while the camera was opening.
        if faces_rx.borrow_and_update().is_empty() {
            stream.stop();
            return Err(RecognitionError::NoRegisteredFaces);
        }

        let mut shared = self.inner.lock();
        shared.next_session += 1;
        let id = shared.next_session;
        let task = tokio::spawn(run(Arc::clone(&self.inner), id, faces_rx));
        shared.session = Some(Session {
            id,
            stream,
            task: Some(task),
        });
        shared.state = LoopState::Active;
        tracing::info!(
            session = id,
            interval_ms = self.inner.settings.tick_interval.as_millis() as u64,
            "recognition started"
        );
        Ok(())
    }

    /// Active → Idle. Stops every stream track and cancels the periodic
    /// task before returning. Stopping an idle loop is a no-op.
    pub fn stop(&self) {
        if self.inner.shutdown(None) {
            tracing::info!("recognition stopped");
        }
    }
}

impl Drop for RecognitionLoop {
    fn drop(&mut self) {
        self.inner.shutdown(None);
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Release the session if it is the expected one (or any, for `None`).
    /// Returns whether a session was released.
    fn shutdown(&self, expected: Option<u64>) -> bool {
        let mut shared = self.lock();
        let current = shared.session.as_ref().map(|s| s.id);
        if current.is_none() || (expected.is_some() && expected != current) {
            return false;
        }

        shared.state = LoopState::Stopping;
        if let Some(mut session) = shared.session.take() {
            session.stream.stop();
            if let Some(task) = session.task.take() {
                task.abort();
            }
        }
        shared.overlay.clear();
        self.names.send_replace(Vec::new());
        self.annotations.send_replace(Vec::new());
        shared.state = LoopState::Idle;
        true
    }

    /// Capture one frame for the given session. Returns the overlay size
    /// and the frame, or `None` when the tick should be skipped.
    async fn capture(&self, session: u64, faces: &FaceSet) -> Option<((u32, u32), Option<Frame>)> {
        let stream = {
            let shared = self.lock();
            shared.session.as_ref().filter(|s| s.id == session)?.stream.clone()
        };
        let dims = stream.dimensions()?;
        if faces.is_empty() {
            return None;
        }
        match stream.capture().await {
            Ok(frame) => Some(((frame.width, frame.height), Some(frame))),
            Err(StreamError::Stopped) => None,
            Err(e) => {
                tracing::warn!(error = %e, "frame capture failed; treating as no detections");
                Some((dims, None))
            }
        }
    }

    async fn tick(&self, session: u64) {
        let faces = self.registry.snapshot();
        let Some(((width, height), frame)) = self.capture(session, &faces).await else {
            return;
        };

        let detections = match frame {
            Some(frame) => match self.engine.detect_all(&frame).await {
                Ok(detections) => detections,
                Err(e) => {
                    tracing::warn!(error = %e, "detection failed; treating as no detections");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let matcher = FaceMatcher::with_distance(&faces, self.settings.threshold, self.engine.distance_fn());
        let results: Vec<MatchResult> = detections
            .iter()
            .map(|d| matcher.find_best_match(&d.embedding))
            .collect();
        let names: Vec<String> = results
            .iter()
            .filter_map(|r| r.label.name().map(str::to_string))
            .collect();
        let annotations: Vec<Annotation> = detections
            .iter()
            .zip(&results)
            .map(|(d, r)| Annotation::from_match(d, r))
            .collect();

        let mut shared = self.lock();
        if shared.session.as_ref().map(|s| s.id) != Some(session) {
            tracing::debug!(session, "discarding output of a stopped session");
            return;
        }
        overlay::render(shared.overlay.as_mut(), width, height, &annotations);
        tracing::trace!(faces = detections.len(), recognized = names.len(), "tick");
        self.names.send_replace(names);
        self.annotations.send_replace(annotations);
    }
}

/// Periodic task body. Ticks run one after another; a fire that comes due
/// while a tick is still running is skipped.
async fn run(inner: Arc<Inner>, session: u64, mut faces_rx: watch::Receiver<FaceSet>) {
    let mut ticker = tokio::time::interval(inner.settings.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => inner.tick(session).await,
            changed = faces_rx.changed() => {
                let emptied = changed.is_err() || faces_rx.borrow_and_update().is_empty();
                if emptied {
                    if inner.shutdown(Some(session)) {
                        tracing::info!(session, "registered set is empty; recognition stopped");
                    }
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{detection, face, FakeEngine, FakeMedia, RecordingOverlay};
    use frs_core::VisionError;
    use std::sync::atomic::Ordering;

    const TICK: Duration = Duration::from_millis(100);

    struct Harness {
        engine: Arc<FakeEngine>,
        media: Arc<FakeMedia>,
        registry: FaceRegistry,
        overlay: RecordingOverlay,
        recognition: RecognitionLoop,
    }

    fn harness(engine: FakeEngine, media: FakeMedia, faces: Vec<frs_core::RegisteredFace>) -> Harness {
        let engine = Arc::new(engine);
        let media = Arc::new(media);
        let registry = FaceRegistry::new();
        registry.replace(faces);
        let overlay = RecordingOverlay::default();
        let recognition = RecognitionLoop::new(
            engine.clone(),
            media.clone(),
            registry.clone(),
            Box::new(overlay.clone()),
            RecognitionSettings {
                threshold: frs_core::DEFAULT_MATCH_THRESHOLD,
                tick_interval: TICK,
            },
        );
        Harness { engine, media, registry, overlay, recognition }
    }

    fn alice() -> Vec<frs_core::RegisteredFace> {
        vec![face("1", "Alice", vec![0.0, 0.0])]
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_recognizes_and_draws() {
        let h = harness(
            FakeEngine::new(vec![detection(vec![0.3, 0.0]), detection(vec![0.0, 0.9])]),
            FakeMedia::default(),
            alice(),
        );
        h.recognition.start().await.unwrap();
        assert_eq!(h.recognition.state(), LoopState::Active);
        advance(50).await;

        assert_eq!(h.recognition.recognized_names(), vec!["Alice".to_string()]);
        let annotations = h.recognition.annotations();
        assert_eq!(annotations.len(), 2);
        assert!(annotations[0].matched);
        assert!((annotations[0].distance - 0.3).abs() < 1e-6);
        assert_eq!(annotations[1].label, "Unknown");
        assert!((annotations[1].distance - 0.9).abs() < 1e-6);

        let ops = h.overlay.ops();
        assert_eq!(
            &ops[..6],
            &[
                "resize 64x48",
                "clear",
                "rect #10b981",
                "text Alice",
                "rect #ef4444",
                "text Unknown",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_registry_refuses_start() {
        let h = harness(FakeEngine::new(vec![]), FakeMedia::default(), vec![]);
        assert!(!h.recognition.can_start());
        let err = h.recognition.start().await.unwrap_err();
        assert!(matches!(err, RecognitionError::NoRegisteredFaces));
        assert_eq!(h.recognition.state(), LoopState::Idle);
        assert_eq!(h.media.acquired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_models_not_loaded_refuses_start() {
        let h = harness(FakeEngine::new(vec![]).unloaded(), FakeMedia::default(), alice());
        assert!(!h.recognition.can_start());
        let err = h.recognition.start().await.unwrap_err();
        assert!(matches!(err, RecognitionError::ModelsNotLoaded));
        assert_eq!(h.recognition.state(), LoopState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_denied_stays_idle() {
        let h = harness(FakeEngine::new(vec![]), FakeMedia::denying(), alice());
        let err = h.recognition.start().await.unwrap_err();
        assert!(matches!(err, RecognitionError::Stream(StreamError::PermissionDenied(_))));
        assert_eq!(h.recognition.state(), LoopState::Idle);
        advance(500).await;
        assert_eq!(h.engine.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_releases_stream_and_timer() {
        let h = harness(FakeEngine::new(vec![detection(vec![0.0, 0.0])]), FakeMedia::default(), alice());
        h.recognition.start().await.unwrap();
        advance(350).await;
        assert!(h.engine.calls() >= 3);

        h.recognition.stop();
        assert_eq!(h.recognition.state(), LoopState::Idle);
        assert!(h.media.all_stopped());
        assert!(h.recognition.recognized_names().is_empty());

        let calls = h.engine.calls();
        advance(1_000).await;
        assert_eq!(h.engine.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_sequence_tracks_last_transition() {
        let h = harness(FakeEngine::new(vec![]), FakeMedia::default(), alice());
        for _ in 0..3 {
            h.recognition.start().await.unwrap();
            h.recognition.start().await.unwrap();
            assert_eq!(h.recognition.state(), LoopState::Active);
            h.recognition.stop();
            h.recognition.stop();
            assert_eq!(h.recognition.state(), LoopState::Idle);
            assert!(h.media.all_stopped());
        }
        // Repeated starts while active did not open extra streams.
        assert_eq!(h.media.acquired.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_tick_discarded_after_stop() {
        let h = harness(
            FakeEngine::new(vec![detection(vec![0.0, 0.0])]).with_delay(Duration::from_millis(500)),
            FakeMedia::default(),
            alice(),
        );
        h.recognition.start().await.unwrap();
        advance(50).await;
        assert_eq!(h.engine.in_flight.load(Ordering::SeqCst), 1);

        h.recognition.stop();
        advance(1_000).await;
        assert!(h.recognition.recognized_names().is_empty());
        assert!(!h.overlay.ops().iter().any(|op| op.starts_with("rect")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ticks_never_overlap() {
        let h = harness(
            FakeEngine::new(vec![detection(vec![0.0, 0.0])]).with_delay(Duration::from_millis(250)),
            FakeMedia::default(),
            alice(),
        );
        h.recognition.start().await.unwrap();
        advance(2_000).await;
        assert!(h.engine.calls() >= 4);
        assert_eq!(h.engine.max_in_flight.load(Ordering::SeqCst), 1);
        h.recognition.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_failure_keeps_loop_running() {
        let engine = FakeEngine::new(vec![detection(vec![0.0, 0.0])]);
        engine.push(Err(VisionError::Inference("boom".into())));
        let h = harness(engine, FakeMedia::default(), alice());

        h.recognition.start().await.unwrap();
        advance(50).await;
        assert_eq!(h.recognition.state(), LoopState::Active);
        assert!(h.recognition.recognized_names().is_empty());

        advance(200).await;
        assert_eq!(h.recognition.state(), LoopState::Active);
        assert_eq!(h.recognition.recognized_names(), vec!["Alice".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_change_applies_on_next_tick() {
        let h = harness(FakeEngine::new(vec![detection(vec![0.0, 0.0])]), FakeMedia::default(), alice());
        h.recognition.start().await.unwrap();
        advance(50).await;
        assert_eq!(h.recognition.recognized_names(), vec!["Alice".to_string()]);

        h.registry.replace(vec![face("2", "Bob", vec![0.0, 0.0])]);
        advance(100).await;
        assert_eq!(h.recognition.recognized_names(), vec!["Bob".to_string()]);
        assert_eq!(h.recognition.state(), LoopState::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emptied_registry_stops_loop() {
        let h = harness(FakeEngine::new(vec![detection(vec![0.0, 0.0])]), FakeMedia::default(), alice());
        h.recognition.start().await.unwrap();
        advance(150).await;

        h.registry.replace(vec![]);
        advance(10).await;
        assert_eq!(h.recognition.state(), LoopState::Idle);
        assert!(h.media.all_stopped());

        let calls = h.engine.calls();
        advance(1_000).await;
        assert_eq!(h.engine.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registry_emptied_before_first_poll_stops_loop() {
        let h = harness(FakeEngine::new(vec![detection(vec![0.0, 0.0])]), FakeMedia::default(), alice());
        h.recognition.start().await.unwrap();
        // No await between start returning and the set emptying, so the
        // periodic task has not run yet.
        h.registry.replace(vec![]);

        advance(1_000).await;
        assert_eq!(h.recognition.state(), LoopState::Idle);
        assert!(h.media.all_stopped());
        assert_eq!(h.engine.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_raster_overlay_is_exported_as_png() {
        let engine = Arc::new(FakeEngine::new(vec![detection(vec![0.0, 0.0])]));
        let registry = FaceRegistry::new();
        registry.replace(alice());
        let recognition = RecognitionLoop::new(
            engine,
            Arc::new(FakeMedia::default()),
            registry,
            Box::new(frs_core::RasterOverlay::new()),
            RecognitionSettings::default(),
        );
        recognition.start().await.unwrap();
        advance(50).await;

        let png = recognition.overlay_png().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        recognition.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_recording_overlay_has_no_png() {
        let h = harness(FakeEngine::new(vec![]), FakeMedia::default(), alice());
        assert!(h.recognition.overlay_png().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_stream() {
        let h = harness(FakeEngine::new(vec![]), FakeMedia::default(), alice());
        h.recognition.start().await.unwrap();
        let media = h.media.clone();
        let engine = h.engine.clone();
        drop(h);
        assert!(media.all_stopped());
        let calls = engine.calls();
        advance(1_000).await;
        assert_eq!(engine.calls(), calls);
    }
}
