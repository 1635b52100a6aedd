//! frs-hw — V4L2 camera access.
//!
//! Opens a capture device, negotiates a format, and exposes it to the rest of
//! the system as a [`frs_core::MediaSource`] producing RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, CameraSource, CameraStream, PixelFormat};
