//! Error types for the entity model.

use thiserror::Error;

/// Errors raised while wiring or querying a [`Topology`](crate::Topology).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A referenced farm, coordinator or tower does not exist.
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// Crop name not present in the catalogue.
    #[error("Unknown crop type: {0}")]
    UnknownCrop(String),
}
