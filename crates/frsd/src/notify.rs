//! Transient user-facing notifications.
//!
//! Every flow catches its own failures; what the user sees is one of these,
//! broadcast to whoever listens (the D-Bus signal forwarder, tests).

use crate::recognition::RecognitionError;
use crate::registration::RegistrationError;
use frs_core::VisionError;
use frs_store::{ConfigError, StoreError};
use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Error,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub level: Level,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: Level::Info,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            title: title.into(),
            description: description.into(),
        }
    }
}

impl From<&RecognitionError> for Notification {
    fn from(e: &RecognitionError) -> Self {
        match e {
            RecognitionError::Stream(_) => Notification::error(
                "Webcam Error",
                "Could not access webcam. Please check permissions.",
            ),
            RecognitionError::ModelsNotLoaded => {
                Notification::error("Models not loaded", "Face detection models are not available.")
            }
            RecognitionError::NoRegisteredFaces => Notification::error(
                "No registered faces",
                "Register some faces first to enable recognition.",
            ),
        }
    }
}

impl From<&RegistrationError> for Notification {
    fn from(e: &RegistrationError) -> Self {
        match e {
            RegistrationError::EmptyName | RegistrationError::CameraInactive => Notification::error(
                "Missing information",
                "Please enter a name and ensure webcam is active.",
            ),
            RegistrationError::NoFaceDetected => Notification::error(
                "No face detected",
                "Please ensure your face is clearly visible in the camera.",
            ),
            RegistrationError::Stream(_) => {
                Notification::error("Webcam Error", "Could not access webcam. Please check permissions.")
            }
            _ => Notification::error("Registration failed", "Could not register face. Please try again."),
        }
    }
}

impl From<&StoreError> for Notification {
    fn from(e: &StoreError) -> Self {
        match e {
            StoreError::ReadFailed(_) => {
                Notification::error("Error loading faces", "Could not load registered faces.")
            }
            StoreError::DeleteFailed(_) => Notification::error("Error deleting face", "Could not delete face."),
            StoreError::WriteFailed(_) => {
                Notification::error("Registration failed", "Could not register face. Please try again.")
            }
            StoreError::Client(msg) => Notification::error("Configuration Error", msg.clone()),
        }
    }
}

impl From<&ConfigError> for Notification {
    fn from(e: &ConfigError) -> Self {
        match e {
            ConfigError::MissingField(_) => Notification::error(
                "Missing Information",
                "Please enter both the project URL and the access key.",
            ),
            ConfigError::InvalidUrl { .. } => {
                Notification::error("Invalid URL", "Please enter a valid project URL.")
            }
            ConfigError::UnexpectedHost(_) => Notification::error(
                "Invalid project URL",
                "URL should be in format: https://your-project.supabase.co",
            ),
            ConfigError::Io(_) | ConfigError::Encoding(_) => Notification::error(
                "Configuration Error",
                "Failed to save configuration. Please try again.",
            ),
        }
    }
}

impl From<&VisionError> for Notification {
    fn from(e: &VisionError) -> Self {
        Notification::error("Error loading models", e.to_string())
    }
}

/// Fan-out of notifications. Sending never blocks; slow listeners lose the
/// oldest entries.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn notify(&self, notification: Notification) {
        match notification.level {
            Level::Info => tracing::info!(title = %notification.title, "{}", notification.description),
            Level::Error => tracing::warn!(title = %notification.title, "{}", notification.description),
        }
        let _ = self.tx.send(notification);
    }
}
