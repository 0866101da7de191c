//! Error taxonomy for the segmentation pipeline

use crate::store::StoreError;

/// Errors raised by the pipeline stages and the algorithmic components
#[derive(Debug, thiserror::Error)]
pub enum SegmentationError {
    /// Fewer data points than requested clusters
    #[error("not enough customers ({available}) for {requested} clusters")]
    InsufficientData { available: usize, requested: usize },

    /// Malformed upstream record
    #[error("data integrity error: {0}")]
    DataIntegrity(String),

    /// Transactional write or delete failure
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The clustering backend rejected the fit
    #[error("clustering failed: {0}")]
    Clustering(String),
}
