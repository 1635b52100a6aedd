//! Registration: capture one frame from the preview camera, detect the single
//! most confident face, and store its descriptor under a name.

use crate::registry::FaceRegistry;
use frs_core::{Detection, MediaSource, RegisteredFace, SharedStream, StreamError, VisionEngine, VisionError};
use frs_store::{DescriptorStore, StoreError};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("a name is required")]
    EmptyName,
    #[error("the camera is not active")]
    CameraInactive,
    #[error("face detection models are not loaded")]
    ModelsNotLoaded,
    #[error("camera: {0}")]
    Stream(#[from] StreamError),
    #[error("vision engine: {0}")]
    Vision(#[from] VisionError),
    #[error("no face detected in the captured frame")]
    NoFaceDetected,
    #[error("could not store descriptor: {0}")]
    StoreWriteFailed(StoreError),
}

pub struct RegistrationFlow {
    engine: Arc<dyn VisionEngine>,
    media: Arc<dyn MediaSource>,
    store: Arc<dyn DescriptorStore>,
    registry: FaceRegistry,
    stream: Mutex<Option<SharedStream>>,
    name: Mutex<String>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl RegistrationFlow {
    pub fn new(
        engine: Arc<dyn VisionEngine>,
        media: Arc<dyn MediaSource>,
        store: Arc<dyn DescriptorStore>,
        registry: FaceRegistry,
    ) -> Self {
        Self {
            engine,
            media,
            store,
            registry,
            stream: Mutex::new(None),
            name: Mutex::new(String::new()),
        }
    }

    pub fn camera_active(&self) -> bool {
        lock(&self.stream).as_ref().is_some_and(|s| !s.is_stopped())
    }

    /// Open the preview camera. A no-op when it is already open.
    pub async fn start_camera(&self) -> Result<(), RegistrationError> {
        if self.camera_active() {
            return Ok(());
        }
        let stream = SharedStream::new(self.media.acquire().await?);

        let mut slot = lock(&self.stream);
        if slot.as_ref().is_some_and(|s| !s.is_stopped()) {
            // Lost a race with a concurrent start; keep the first stream.
            stream.stop();
            return Ok(());
        }
        *slot = Some(stream);
        tracing::info!("registration camera started");
        Ok(())
    }

    pub fn stop_camera(&self) {
        if let Some(stream) = lock(&self.stream).take() {
            stream.stop();
            tracing::info!("registration camera stopped");
        }
    }

    pub fn set_name(&self, name: &str) {
        *lock(&self.name) = name.to_string();
    }

    /// The pending name; cleared after a successful registration.
    pub fn name(&self) -> String {
        lock(&self.name).clone()
    }

    /// Capture a frame and detect the single most confident face in it.
    async fn capture(&self) -> Result<Detection, RegistrationError> {
        let stream = lock(&self.stream)
            .as_ref()
            .filter(|s| !s.is_stopped())
            .cloned()
            .ok_or(RegistrationError::CameraInactive)?;
        let frame = match stream.capture().await {
            Err(StreamError::Stopped) => return Err(RegistrationError::CameraInactive),
            other => other?,
        };
        self.engine
            .detect_single(&frame)
            .await?
            .ok_or(RegistrationError::NoFaceDetected)
    }

    /// Register the face currently in front of the camera under `name`.
    ///
    /// Nothing is written unless a face was detected. On success the pending
    /// name is cleared and the registered set is reloaded from the store.
    pub async fn register(&self, name: &str) -> Result<RegisteredFace, RegistrationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RegistrationError::EmptyName);
        }
        self.set_name(name);
        if !self.camera_active() {
            return Err(RegistrationError::CameraInactive);
        }
        if !self.engine.models_loaded() {
            return Err(RegistrationError::ModelsNotLoaded);
        }

        let detection = self.capture().await?;
        let record = self
            .store
            .insert_face(name, &detection.embedding)
            .await
            .map_err(RegistrationError::StoreWriteFailed)?;
        tracing::info!(id = %record.id, name = %record.name, "face registered");

        self.set_name("");
        if let Err(e) = self.registry.refresh(self.store.as_ref()).await {
            tracing::warn!(error = %e, "registered set not refreshed after registration");
        }
        Ok(record)
    }
}

impl Drop for RegistrationFlow {
    fn drop(&mut self) {
        self.stop_camera();
    }
}
