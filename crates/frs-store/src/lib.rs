//! frs-store — Persistence of named face descriptors in a remote table.
//!
//! The table lives in a hosted PostgREST service. This crate holds the
//! endpoint configuration, builds the client from it, and rebuilds the
//! client whenever the configuration changes.

pub mod config;
pub mod holder;
pub mod rest;
pub mod store;

pub use config::{ConfigError, ConfigSlot, StoreConfig};
pub use holder::ClientHolder;
pub use rest::{sanitize_descriptor, RestStore};
pub use store::{DescriptorStore, StoreError};
