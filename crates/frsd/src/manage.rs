//! Face management: list and delete stored records.

use crate::registry::FaceRegistry;
use frs_core::FaceSummary;
use frs_store::{DescriptorStore, StoreError};
use std::sync::Arc;

pub struct ManageView {
    store: Arc<dyn DescriptorStore>,
    registry: FaceRegistry,
}

impl ManageView {
    pub fn new(store: Arc<dyn DescriptorStore>, registry: FaceRegistry) -> Self {
        Self { store, registry }
    }

    /// Stored records, newest first, without descriptors.
    pub async fn list(&self) -> Result<Vec<FaceSummary>, StoreError> {
        self.store.list_summaries().await
    }

    /// Delete one record and reload the registered set. A failed reload
    /// leaves the previous set in place and is only logged.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete_face(id).await?;
        tracing::info!(id, "face deleted");
        if let Err(e) = self.registry.refresh(self.store.as_ref()).await {
            tracing::warn!(error = %e, "registered set not refreshed after delete");
        }
        Ok(())
    }

    pub async fn refresh(&self) -> Result<usize, StoreError> {
        self.registry.refresh(self.store.as_ref()).await
    }
}
