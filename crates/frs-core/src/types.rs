use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounding box for a detected face, in the frame's native pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Face descriptor vector (128-dimensional for the default recognition net).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// A zero vector of the given dimensionality.
    pub fn zeros(dim: usize) -> Self {
        Self { values: vec![0.0; dim] }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Vectors of different length are not comparable and sit at infinite
    /// distance, so they can never win a match.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One face found in one frame. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub embedding: Embedding,
    /// Landmark points as returned by the engine (68 for the default net).
    #[serde(default)]
    pub landmarks: Vec<(f32, f32)>,
}

/// A stored, named face descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredFace {
    pub id: String,
    pub name: String,
    pub descriptor: Embedding,
    pub created_at: DateTime<Utc>,
}

/// The columns the manage view lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceSummary {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<&RegisteredFace> for FaceSummary {
    fn from(face: &RegisteredFace) -> Self {
        Self {
            id: face.id.clone(),
            name: face.name.clone(),
            created_at: face.created_at,
        }
    }
}

/// Outcome label of a match: a registered name, or unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchLabel {
    Known(String),
    Unknown,
}

impl MatchLabel {
    pub fn is_known(&self) -> bool {
        matches!(self, MatchLabel::Known(_))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            MatchLabel::Known(name) => Some(name),
            MatchLabel::Unknown => None,
        }
    }
}

impl fmt::Display for MatchLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchLabel::Known(name) => f.write_str(name),
            MatchLabel::Unknown => f.write_str(crate::matcher::UNKNOWN_LABEL),
        }
    }
}

/// Result of matching a query embedding against the registered set.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub label: MatchLabel,
    /// Distance to the closest registered descriptor; infinite when the set is empty.
    pub distance: f32,
}
