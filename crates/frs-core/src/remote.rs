//! HTTP client for an out-of-process vision engine.
//!
//! The engine sidecar owns the pretrained networks. This client asks it to
//! load the three bundles from a model path, then posts PNG-encoded frames
//! and decodes the detections it returns.

use crate::media::Frame;
use crate::types::{BoundingBox, Detection, Embedding};
use crate::vision::{ModelBundle, VisionEngine, VisionError};
use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use serde::Deserialize;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct WireBox {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    #[serde(rename = "box")]
    bbox: WireBox,
    score: f32,
    #[serde(default)]
    landmarks: Vec<[f32; 2]>,
    descriptor: Vec<f32>,
}

impl From<WireDetection> for Detection {
    fn from(d: WireDetection) -> Self {
        Detection {
            bounding_box: BoundingBox {
                x: d.bbox.x,
                y: d.bbox.y,
                width: d.bbox.width,
                height: d.bbox.height,
                confidence: d.score,
            },
            embedding: Embedding::new(d.descriptor),
            landmarks: d.landmarks.into_iter().map(|[x, y]| (x, y)).collect(),
        }
    }
}

/// Vision engine reached over HTTP.
pub struct RemoteVisionEngine {
    client: reqwest::Client,
    base_url: String,
    model_uri: String,
    loaded: AtomicBool,
}

impl RemoteVisionEngine {
    pub fn new(base_url: &str, model_uri: &str) -> Result<Self, VisionError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| VisionError::Inference(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model_uri: model_uri.to_string(),
            loaded: AtomicBool::new(false),
        })
    }

    /// Load every bundle from the model path. Any failure leaves the engine
    /// unusable until the next successful call.
    pub async fn load_models(&self) -> Result<(), VisionError> {
        self.loaded.store(false, Ordering::SeqCst);

        for bundle in ModelBundle::ALL {
            let url = format!("{}/models/{}/load", self.base_url, bundle.name());
            let response = self
                .client
                .post(&url)
                .json(&serde_json::json!({ "uri": self.model_uri }))
                .send()
                .await
                .map_err(|e| VisionError::ModelLoad {
                    bundle,
                    reason: e.to_string(),
                })?;

            if !response.status().is_success() {
                return Err(VisionError::ModelLoad {
                    bundle,
                    reason: format!("HTTP {}", response.status()),
                });
            }
            tracing::info!(bundle = %bundle, uri = %self.model_uri, "model bundle loaded");
        }

        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn post_frame(&self, frame: &Frame, mode: &str) -> Result<reqwest::Response, VisionError> {
        if !self.models_loaded() {
            return Err(VisionError::ModelsNotLoaded);
        }

        let png = encode_png(frame)?;
        let url = format!("{}/detect", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("mode", mode), ("landmarks", "true"), ("descriptors", "true")])
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(png)
            .send()
            .await
            .map_err(|e| VisionError::Inference(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VisionError::Inference(format!(
                "detect returned HTTP {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl VisionEngine for RemoteVisionEngine {
    fn models_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    async fn detect_all(&self, frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        let wire: Vec<WireDetection> = self
            .post_frame(frame, "all")
            .await?
            .json()
            .await
            .map_err(|e| VisionError::Inference(format!("decoding detections: {e}")))?;
        Ok(wire.into_iter().map(Detection::from).collect())
    }

    async fn detect_single(&self, frame: &Frame) -> Result<Option<Detection>, VisionError> {
        let wire: Option<WireDetection> = self
            .post_frame(frame, "single")
            .await?
            .json()
            .await
            .map_err(|e| VisionError::Inference(format!("decoding detection: {e}")))?;
        Ok(wire.map(Detection::from))
    }
}

/// Encode an RGB frame as PNG for transport.
pub fn encode_png(frame: &Frame) -> Result<Vec<u8>, VisionError> {
    let img = RgbImage::from_raw(frame.width, frame.height, frame.data.clone()).ok_or_else(|| {
        VisionError::Encode(format!(
            "buffer of {} bytes does not fit {}x{} RGB",
            frame.data.len(),
            frame.width,
            frame.height
        ))
    })?;

    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .map_err(|e| VisionError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}
