//! PostgREST client for the `faces` table.

use crate::config::StoreConfig;
use crate::store::{DescriptorStore, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use frs_core::{Embedding, FaceSummary, RegisteredFace};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const TABLE: &str = "faces";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct FaceRow {
    id: String,
    name: String,
    #[serde(default)]
    descriptor: Value,
    created_at: DateTime<Utc>,
}

/// Coerce a stored descriptor into a usable vector.
///
/// Non-numeric elements become `0.0`. A descriptor that is not an array, is
/// empty, or does not have `dim` elements becomes a zero vector of `dim`.
pub fn sanitize_descriptor(raw: &Value, dim: usize) -> Embedding {
    let values: Vec<f32> = match raw {
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32).filter(|f| f.is_finite()).unwrap_or(0.0))
            .collect(),
        _ => Vec::new(),
    };

    if values.len() != dim {
        tracing::warn!(expected = dim, actual = values.len(), "malformed descriptor coerced to zeros");
        return Embedding::zeros(dim);
    }
    Embedding::new(values)
}

/// Client for a hosted PostgREST `faces` table.
pub struct RestStore {
    client: reqwest::Client,
    table_url: String,
    descriptor_dim: usize,
}

impl RestStore {
    pub fn new(config: &StoreConfig, descriptor_dim: usize) -> Result<Self, StoreError> {
        let key = HeaderValue::from_str(&config.access_key)
            .map_err(|e| StoreError::Client(format!("access key: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.access_key))
            .map_err(|e| StoreError::Client(format!("access key: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Client(e.to_string()))?;

        Ok(Self {
            client,
            table_url: format!("{}/rest/v1/{TABLE}", config.endpoint_url.trim_end_matches('/')),
            descriptor_dim,
        })
    }

    pub fn table_url(&self) -> &str {
        &self.table_url
    }

    fn decode(&self, row: FaceRow) -> RegisteredFace {
        RegisteredFace {
            descriptor: sanitize_descriptor(&row.descriptor, self.descriptor_dim),
            id: row.id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

/// Turn a non-2xx response into an error message carrying the body.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, String> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(format!("HTTP {status}: {body}"))
}

#[async_trait]
impl DescriptorStore for RestStore {
    async fn list_faces(&self) -> Result<Vec<RegisteredFace>, StoreError> {
        let response = self
            .client
            .get(&self.table_url)
            .query(&[("select", "*")])
            .send()
            .await
            .map_err(|e| StoreError::ReadFailed(e.to_string()))?;
        let rows: Vec<FaceRow> = check(response)
            .await
            .map_err(StoreError::ReadFailed)?
            .json()
            .await
            .map_err(|e| StoreError::ReadFailed(e.to_string()))?;

        tracing::debug!(count = rows.len(), "loaded registered faces");
        Ok(rows.into_iter().map(|r| self.decode(r)).collect())
    }

    async fn list_summaries(&self) -> Result<Vec<FaceSummary>, StoreError> {
        let response = self
            .client
            .get(&self.table_url)
            .query(&[("select", "id,name,created_at"), ("order", "created_at.desc")])
            .send()
            .await
            .map_err(|e| StoreError::ReadFailed(e.to_string()))?;
        check(response)
            .await
            .map_err(StoreError::ReadFailed)?
            .json()
            .await
            .map_err(|e| StoreError::ReadFailed(e.to_string()))
    }

    async fn insert_face(&self, name: &str, descriptor: &Embedding) -> Result<RegisteredFace, StoreError> {
        let response = self
            .client
            .post(&self.table_url)
            .header("Prefer", "return=representation")
            .json(&serde_json::json!([{ "name": name, "descriptor": descriptor }]))
            .send()
            .await
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;
        let rows: Vec<FaceRow> = check(response)
            .await
            .map_err(StoreError::WriteFailed)?
            .json()
            .await
            .map_err(|e| StoreError::WriteFailed(e.to_string()))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::WriteFailed("insert returned no row".into()))?;
        tracing::info!(id = %row.id, name = %row.name, "face stored");
        Ok(self.decode(row))
    }

    async fn delete_face(&self, id: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(&self.table_url)
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await
            .map_err(|e| StoreError::DeleteFailed(e.to_string()))?;
        check(response).await.map_err(StoreError::DeleteFailed)?;
        tracing::info!(id, "face deleted");
        Ok(())
    }
}
