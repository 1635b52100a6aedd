//! Lazily built, explicitly invalidated store client.

use crate::config::{ConfigError, ConfigSlot, StoreConfig};
use crate::rest::RestStore;
use crate::store::{DescriptorStore, StoreError};
use async_trait::async_trait;
use frs_core::{Embedding, FaceSummary, RegisteredFace};
use std::sync::{Arc, Mutex, MutexGuard};

struct HolderState {
    generation: u64,
    client: Option<Arc<RestStore>>,
}

/// Owns the configuration slot and the one live client built from it.
///
/// The client is built on first use from the persisted configuration (or the
/// placeholder when nothing is persisted) and reused until the configuration
/// changes. Every change bumps the generation; a client is never reused
/// across generations.
pub struct ClientHolder {
    slot: ConfigSlot,
    descriptor_dim: usize,
    state: Mutex<HolderState>,
}

impl ClientHolder {
    pub fn new(slot: ConfigSlot, descriptor_dim: usize) -> Self {
        Self {
            slot,
            descriptor_dim,
            state: Mutex::new(HolderState {
                generation: 0,
                client: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HolderState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn slot(&self) -> &ConfigSlot {
        &self.slot
    }

    pub fn is_configured(&self) -> bool {
        self.slot.is_configured()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// The client for the current configuration generation.
    pub fn client(&self) -> Result<Arc<RestStore>, StoreError> {
        let mut state = self.lock();
        if let Some(client) = &state.client {
            return Ok(Arc::clone(client));
        }

        let config = self.slot.load().unwrap_or_else(|| {
            tracing::warn!("store is not configured; using placeholder endpoint");
            StoreConfig::placeholder()
        });
        let client = Arc::new(RestStore::new(&config, self.descriptor_dim)?);
        tracing::info!(
            generation = state.generation,
            table = client.table_url(),
            "store client built"
        );
        state.client = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Drop the cached client; the next [`client`](Self::client) call rebuilds it.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        state.client = None;
        state.generation += 1;
        tracing::debug!(generation = state.generation, "store client invalidated");
    }

    /// Validate and persist a new configuration, then invalidate the client.
    /// Invalid input leaves both the slot and the cached client untouched.
    pub fn save_config(&self, config: &StoreConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.slot.save(config)?;
        self.invalidate();
        tracing::info!(endpoint = %config.endpoint_url, "store configuration saved");
        Ok(())
    }
}

#[async_trait]
impl DescriptorStore for ClientHolder {
    async fn list_faces(&self) -> Result<Vec<RegisteredFace>, StoreError> {
        self.client()?.list_faces().await
    }

    async fn list_summaries(&self) -> Result<Vec<FaceSummary>, StoreError> {
        self.client()?.list_summaries().await
    }

    async fn insert_face(&self, name: &str, descriptor: &Embedding) -> Result<RegisteredFace, StoreError> {
        self.client()?.insert_face(name, descriptor).await
    }

    async fn delete_face(&self, id: &str) -> Result<(), StoreError> {
        self.client()?.delete_face(id).await
    }

    fn generation(&self) -> u64 {
        ClientHolder::generation(self)
    }
}
