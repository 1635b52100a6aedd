//! frs-core — Face types, nearest-label matching, and the seams to the
//! external vision engine, the camera, and the overlay surface.
//!
//! Detection and descriptor extraction are delegated to an external vision
//! engine; this crate only classifies the descriptors it hands back.

pub mod matcher;
pub mod media;
pub mod overlay;
pub mod remote;
pub mod types;
pub mod vision;

pub use matcher::{FaceMatcher, DEFAULT_MATCH_THRESHOLD};
pub use media::{Frame, MediaSource, SharedStream, StreamError, VideoStream};
pub use overlay::{Annotation, OverlayStyle, OverlaySurface, RasterOverlay};
pub use remote::RemoteVisionEngine;
pub use types::{BoundingBox, Detection, Embedding, FaceSummary, MatchLabel, MatchResult, RegisteredFace};
pub use vision::{ModelBundle, VisionEngine, VisionError};
