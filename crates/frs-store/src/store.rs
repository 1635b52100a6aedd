use async_trait::async_trait;
use frs_core::{Embedding, FaceSummary, RegisteredFace};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("could not load registered faces: {0}")]
    ReadFailed(String),
    #[error("could not save face: {0}")]
    WriteFailed(String),
    #[error("could not delete face: {0}")]
    DeleteFailed(String),
    #[error("store client: {0}")]
    Client(String),
}

/// The remote `faces` table.
#[async_trait]
pub trait DescriptorStore: Send + Sync {
    /// Every record with its descriptor, in table order.
    async fn list_faces(&self) -> Result<Vec<RegisteredFace>, StoreError>;

    /// `{id, name, created_at}` of every record, newest first.
    async fn list_summaries(&self) -> Result<Vec<FaceSummary>, StoreError>;

    /// Insert a new record and return it as stored.
    async fn insert_face(&self, name: &str, descriptor: &Embedding) -> Result<RegisteredFace, StoreError>;

    async fn delete_face(&self, id: &str) -> Result<(), StoreError>;

    /// Configuration generation the store is currently bound to. Results read
    /// under one generation must not be applied after it changed.
    fn generation(&self) -> u64 {
        0
    }
}
