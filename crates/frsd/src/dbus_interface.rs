use crate::app::{App, AppError};
use std::sync::Arc;
use zbus::interface;
use zbus::object_server::SignalEmitter;

pub const BUS_NAME: &str = "org.frs.Recognition1";
pub const OBJECT_PATH: &str = "/org/frs/Recognition1";

/// D-Bus interface for the face recognition daemon.
///
/// Bus name: org.frs.Recognition1
/// Object path: /org/frs/Recognition1
///
/// Structured results are returned as JSON strings.
pub struct FrsService {
    app: Arc<App>,
}

impl FrsService {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }
}

fn failed(e: AppError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.frs.Recognition1")]
impl FrsService {
    /// Open the registration preview camera.
    async fn start_camera(&self) -> zbus::fdo::Result<()> {
        self.app.start_camera().await.map_err(failed)
    }

    async fn stop_camera(&self) {
        self.app.stop_camera();
    }

    /// Register the face in front of the camera; returns the stored record summary.
    async fn register(&self, name: &str) -> zbus::fdo::Result<String> {
        tracing::info!(name, "register requested");
        let record = self.app.register(name).await.map_err(failed)?;
        to_json(&frs_core::FaceSummary::from(&record))
    }

    async fn start_recognition(&self) -> zbus::fdo::Result<()> {
        tracing::info!("recognition start requested");
        self.app.start_recognition().await.map_err(failed)
    }

    async fn stop_recognition(&self) {
        tracing::info!("recognition stop requested");
        self.app.stop_recognition();
    }

    /// Names recognized by the most recent tick.
    async fn recognized_names(&self) -> Vec<String> {
        self.app.recognized_names()
    }

    /// Boxes and labels drawn by the most recent tick.
    async fn annotations(&self) -> zbus::fdo::Result<String> {
        to_json(&self.app.annotations())
    }

    /// The overlay canvas as PNG bytes.
    async fn overlay(&self) -> zbus::fdo::Result<Vec<u8>> {
        self.app
            .overlay_png()
            .ok_or_else(|| zbus::fdo::Error::Failed("no overlay has been drawn".into()))
    }

    async fn list_faces(&self) -> zbus::fdo::Result<String> {
        let faces = self.app.list_faces().await.map_err(failed)?;
        to_json(&faces)
    }

    async fn delete_face(&self, id: &str) -> zbus::fdo::Result<()> {
        tracing::info!(id, "delete requested");
        self.app.delete_face(id).await.map_err(failed)
    }

    /// Reload the registered set; returns its size.
    async fn refresh_faces(&self) -> zbus::fdo::Result<u32> {
        let count = self.app.refresh_faces().await.map_err(failed)?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn save_config(&self, endpoint_url: &str, access_key: &str) -> zbus::fdo::Result<()> {
        tracing::info!(endpoint_url, "save config requested");
        self.app.save_config(endpoint_url, access_key).await.map_err(failed)
    }

    /// The persisted endpoint, with the access key masked.
    async fn show_config(&self) -> zbus::fdo::Result<String> {
        let value = match self.app.stored_config() {
            Some(config) => serde_json::json!({
                "configured": true,
                "endpointUrl": config.endpoint_url,
                "accessKey": mask(&config.access_key),
            }),
            None => serde_json::json!({ "configured": false }),
        };
        Ok(value.to_string())
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(self.app.status().to_string())
    }

    /// Emitted for every user-facing notification.
    #[zbus(signal)]
    pub async fn notification(
        emitter: &SignalEmitter<'_>,
        level: &str,
        title: &str,
        description: &str,
    ) -> zbus::Result<()>;
}

fn mask(key: &str) -> String {
    let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{tail}")
}
