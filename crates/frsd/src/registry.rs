//! The process-wide registered set.

use frs_core::RegisteredFace;
use frs_store::{DescriptorStore, StoreError};
use std::sync::Arc;
use tokio::sync::watch;

/// Immutable snapshot of the registered set.
pub type FaceSet = Arc<Vec<RegisteredFace>>;

/// Shared handle to the registered set.
///
/// Writers replace the whole list; readers take an `Arc` snapshot, so a
/// reader never observes a partially updated list. Subscribers are woken on
/// every replacement.
#[derive(Clone)]
pub struct FaceRegistry {
    tx: Arc<watch::Sender<FaceSet>>,
}

impl Default for FaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceRegistry {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Vec::new()));
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> FaceSet {
        Arc::clone(&self.tx.borrow())
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    pub fn subscribe(&self) -> watch::Receiver<FaceSet> {
        self.tx.subscribe()
    }

    pub fn replace(&self, faces: Vec<RegisteredFace>) {
        self.tx.send_replace(Arc::new(faces));
    }

    /// Reload the set from the store. On failure the previous set is kept.
    ///
    /// Rows read under a store generation that has since changed are
    /// dropped; the check and the replacement happen under the channel lock,
    /// so a later [`replace`](Self::replace) always wins. Returns the size of
    /// the set now held.
    pub async fn refresh(&self, store: &dyn DescriptorStore) -> Result<usize, StoreError> {
        let generation = store.generation();
        let faces = store.list_faces().await?;
        let count = faces.len();
        let applied = self.tx.send_if_modified(|set| {
            if store.generation() != generation {
                return false;
            }
            *set = Arc::new(faces);
            true
        });
        if applied {
            tracing::info!(count, generation, "registered set refreshed");
            Ok(count)
        } else {
            tracing::debug!(generation, "dropping registered set read from a replaced store");
            Ok(self.len())
        }
    }
}
