//! Vision engine seam.
//!
//! Face detection, landmarking and descriptor extraction are performed by an
//! external engine loaded with three pretrained bundles. Nothing here runs
//! inference; it only describes what the rest of the system may ask for.

use crate::matcher::DistanceFn;
use crate::media::Frame;
use crate::types::{Detection, Embedding};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum VisionError {
    #[error("failed to load model bundle {bundle}: {reason}")]
    ModelLoad { bundle: ModelBundle, reason: String },
    #[error("vision models are not loaded")]
    ModelsNotLoaded,
    #[error("frame encoding failed: {0}")]
    Encode(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

/// The pretrained bundles the engine needs before any capture is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelBundle {
    TinyFaceDetector,
    FaceLandmark68,
    FaceRecognition,
}

impl ModelBundle {
    pub const ALL: [ModelBundle; 3] = [
        ModelBundle::TinyFaceDetector,
        ModelBundle::FaceLandmark68,
        ModelBundle::FaceRecognition,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelBundle::TinyFaceDetector => "tiny_face_detector",
            ModelBundle::FaceLandmark68 => "face_landmark_68",
            ModelBundle::FaceRecognition => "face_recognition",
        }
    }
}

impl fmt::Display for ModelBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[async_trait]
pub trait VisionEngine: Send + Sync {
    /// True once every bundle in [`ModelBundle::ALL`] has loaded.
    fn models_loaded(&self) -> bool;

    /// Detect every face in the frame, with landmarks and descriptors.
    async fn detect_all(&self, frame: &Frame) -> Result<Vec<Detection>, VisionError>;

    /// Detect the single most confident face, if any.
    async fn detect_single(&self, frame: &Frame) -> Result<Option<Detection>, VisionError>;

    /// Descriptor distance the engine's embeddings are meant to be compared with.
    fn distance_fn(&self) -> DistanceFn {
        Embedding::euclidean_distance
    }
}
