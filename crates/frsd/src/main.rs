use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use zbus::object_server::SignalEmitter;

mod app;
mod config;
mod dbus_interface;
mod manage;
mod notify;
mod recognition;
mod registration;
mod registry;
#[cfg(test)]
mod testing;

use app::App;
use dbus_interface::{FrsService, BUS_NAME, OBJECT_PATH};
use frs_core::{RasterOverlay, RemoteVisionEngine};
use frs_hw::CameraSource;
use frs_store::{ClientHolder, ConfigSlot};
use notify::Notification;
use recognition::RecognitionSettings;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("frsd starting");

    let config = config::Config::from_env();
    let engine = Arc::new(RemoteVisionEngine::new(&config.vision_url, &config.model_uri)?);
    let media = Arc::new(CameraSource::new(config.camera_device.clone()));
    let holder = Arc::new(ClientHolder::new(
        ConfigSlot::new(config.store_config_path.clone()),
        config.descriptor_dim,
    ));
    tracing::info!(
        camera = %config.camera_device,
        vision = %config.vision_url,
        store_config = %config.store_config_path.display(),
        configured = holder.is_configured(),
        "configuration loaded"
    );

    let app = Arc::new(App::new(
        engine.clone(),
        media,
        holder,
        Box::new(RasterOverlay::new()),
        RecognitionSettings {
            threshold: config.match_threshold,
            tick_interval: config.tick_interval,
        },
    ));

    let connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, FrsService::new(app.clone()))?
        .build()
        .await?;
    tracing::info!(bus_name = BUS_NAME, path = OBJECT_PATH, "D-Bus interface registered");

    let emitter = SignalEmitter::new(&connection, OBJECT_PATH)?.into_owned();
    let mut notifications = app.notifier().subscribe();
    let forwarder = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(n) => {
                    if let Err(e) =
                        FrsService::notification(&emitter, n.level.as_str(), &n.title, &n.description).await
                    {
                        tracing::warn!(error = %e, "failed to emit notification signal");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification forwarder lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    match engine.load_models().await {
        Ok(()) => app
            .notifier()
            .notify(Notification::info("Models loaded", "Face detection models are ready!")),
        Err(e) => app.notifier().notify(Notification::from(&e)),
    }
    app.load_registry().await;

    tracing::info!("frsd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("frsd shutting down");

    app.shutdown();
    forwarder.abort();
    Ok(())
}
