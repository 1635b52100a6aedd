//! Wiring of the daemon's flows around one store client holder.
//!
//! Every user-facing operation goes through here. Failures are reported as
//! a notification at this boundary and then returned to the caller.

use crate::manage::ManageView;
use crate::notify::{Notification, Notifier};
use crate::recognition::{LoopState, RecognitionError, RecognitionLoop, RecognitionSettings};
use crate::registration::{RegistrationError, RegistrationFlow};
use crate::registry::FaceRegistry;
use frs_core::{Annotation, FaceSummary, MediaSource, OverlaySurface, RegisteredFace, VisionEngine};
use frs_store::{ClientHolder, ConfigError, DescriptorStore, StoreConfig, StoreError};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("the face store is not configured")]
    NotConfigured,
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub struct App {
    engine: Arc<dyn VisionEngine>,
    holder: Arc<ClientHolder>,
    registry: FaceRegistry,
    recognition: RecognitionLoop,
    registration: RegistrationFlow,
    manage: ManageView,
    notifier: Notifier,
}

impl App {
    pub fn new(
        engine: Arc<dyn VisionEngine>,
        media: Arc<dyn MediaSource>,
        holder: Arc<ClientHolder>,
        overlay: Box<dyn OverlaySurface>,
        settings: RecognitionSettings,
    ) -> Self {
        let registry = FaceRegistry::new();
        let store: Arc<dyn DescriptorStore> = holder.clone();
        Self {
            recognition: RecognitionLoop::new(engine.clone(), media.clone(), registry.clone(), overlay, settings),
            registration: RegistrationFlow::new(engine.clone(), media, store.clone(), registry.clone()),
            manage: ManageView::new(store, registry.clone()),
            notifier: Notifier::new(32),
            engine,
            holder,
            registry,
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Turn a flow failure into a notification, then hand it back.
    fn report<T, E>(&self, result: Result<T, E>) -> Result<T, AppError>
    where
        for<'a> Notification: From<&'a E>,
        AppError: From<E>,
    {
        result.map_err(|e| {
            self.notifier.notify(Notification::from(&e));
            AppError::from(e)
        })
    }

    fn ensure_configured(&self) -> Result<(), AppError> {
        if self.holder.is_configured() {
            return Ok(());
        }
        self.notifier.notify(Notification::error(
            "Configuration Required",
            "Please configure the face store connection first.",
        ));
        Err(AppError::NotConfigured)
    }

    /// Startup load of the registered set; skipped while unconfigured.
    pub async fn load_registry(&self) {
        if !self.holder.is_configured() {
            tracing::info!("store not configured; registered set left empty");
            return;
        }
        let _ = self.report(self.registry.refresh(self.holder.as_ref()).await);
    }

    pub async fn start_camera(&self) -> Result<(), AppError> {
        self.ensure_configured()?;
        self.report(self.registration.start_camera().await)
    }

    pub fn stop_camera(&self) {
        self.registration.stop_camera();
    }

    pub async fn register(&self, name: &str) -> Result<RegisteredFace, AppError> {
        self.ensure_configured()?;
        let record = self.report(self.registration.register(name).await)?;
        self.notifier
            .notify(Notification::info("Success", format!("Face registered for {}", record.name)));
        Ok(record)
    }

    pub async fn start_recognition(&self) -> Result<(), AppError> {
        self.ensure_configured()?;
        self.report(self.recognition.start().await)
    }

    pub fn stop_recognition(&self) {
        self.recognition.stop();
    }

    pub fn recognized_names(&self) -> Vec<String> {
        self.recognition.recognized_names()
    }

    pub fn annotations(&self) -> Vec<Annotation> {
        self.recognition.annotations()
    }

    /// PNG of the current overlay canvas, when the surface keeps one.
    pub fn overlay_png(&self) -> Option<Vec<u8>> {
        self.recognition.overlay_png()
    }

    pub async fn list_faces(&self) -> Result<Vec<FaceSummary>, AppError> {
        self.ensure_configured()?;
        self.report(self.manage.list().await)
    }

    pub async fn delete_face(&self, id: &str) -> Result<(), AppError> {
        self.ensure_configured()?;
        self.report(self.manage.delete(id).await)?;
        self.notifier.notify(Notification::info("Face deleted", "The face was removed."));
        Ok(())
    }

    pub async fn refresh_faces(&self) -> Result<usize, AppError> {
        self.ensure_configured()?;
        self.report(self.manage.refresh().await)
    }

    /// Persist a new store connection and switch every flow over to it.
    ///
    /// Invalid input leaves the slot, the cached client and the running
    /// flows untouched. On success recognition and the registration camera
    /// are stopped, and the registered set is reloaded from the new store.
    pub async fn save_config(&self, endpoint_url: &str, access_key: &str) -> Result<(), AppError> {
        let config = self.report(StoreConfig::new(endpoint_url, access_key))?;
        self.report(self.holder.save_config(&config))?;

        self.recognition.stop();
        self.registration.stop_camera();
        self.registry.replace(Vec::new());
        self.notifier
            .notify(Notification::info("Configuration saved", "The face store connection was updated."));

        let _ = self.report(self.registry.refresh(self.holder.as_ref()).await);
        Ok(())
    }

    pub fn stored_config(&self) -> Option<StoreConfig> {
        self.holder.slot().load()
    }

    pub fn status(&self) -> serde_json::Value {
        let state = match self.recognition.state() {
            LoopState::Idle => "idle",
            LoopState::Active => "active",
            LoopState::Stopping => "stopping",
        };
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "models_loaded": self.engine.models_loaded(),
            "configured": self.holder.is_configured(),
            "store_generation": self.holder.generation(),
            "registered_faces": self.registry.len(),
            "camera_active": self.registration.camera_active(),
            "recognition": state,
            "can_start_recognition": self.recognition.can_start(),
            "recognized": self.recognition.recognized_names(),
        })
    }

    /// Release every camera stream before exit.
    pub fn shutdown(&self) {
        self.recognition.stop();
        self.registration.stop_camera();
    }
}
