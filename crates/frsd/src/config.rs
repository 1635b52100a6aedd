use frs_store::ConfigSlot;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
///
/// The store endpoint is not configured here; it lives in the persisted
/// [`ConfigSlot`] and can be changed at runtime.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Base URL of the vision engine sidecar.
    pub vision_url: String,
    /// Where the sidecar loads model bundles from.
    pub model_uri: String,
    /// Path of the persisted store configuration.
    pub store_config_path: PathBuf,
    /// Maximum descriptor distance that still counts as a match.
    pub match_threshold: f32,
    /// Recognition sampling period.
    pub tick_interval: Duration,
    /// Descriptor length; malformed stored descriptors are coerced to zeros of this size.
    pub descriptor_dim: usize,
}

impl Config {
    /// Load configuration from `FRS_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let store_config_path = std::env::var("FRS_STORE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| ConfigSlot::default_path());

        Self {
            camera_device: std::env::var("FRS_CAMERA_DEVICE").unwrap_or_else(|_| "/dev/video0".to_string()),
            vision_url: std::env::var("FRS_VISION_URL").unwrap_or_else(|_| "http://127.0.0.1:8765".to_string()),
            model_uri: std::env::var("FRS_MODEL_URI").unwrap_or_else(|_| "/models".to_string()),
            store_config_path,
            match_threshold: env_f32("FRS_MATCH_THRESHOLD", frs_core::DEFAULT_MATCH_THRESHOLD),
            tick_interval: Duration::from_millis(env_u64("FRS_TICK_INTERVAL_MS", 100).max(1)),
            descriptor_dim: env_usize("FRS_DESCRIPTOR_DIM", 128),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
