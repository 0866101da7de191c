//! rfmseg: RFM customer segmentation
//!
//! Computes Recency, Frequency and Monetary features per customer from order
//! history, clusters them with K-Means and labels each cluster with a
//! marketing segment. Snapshots are persisted per calculation date.

pub mod cli;
pub mod data;
pub mod error;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod rfm;
pub mod segment;
pub mod store;

// Re-export public items for easier access
pub use cli::Args;
pub use data::{CentroidInfo, ClusterAssignment, Customer, Order, OrderStatus, RfmFeature};
pub use error::SegmentationError;
pub use ingest::{CsvSource, OrderSource};
pub use model::{fit_kmeans, ClusterModel, ClusterParams};
pub use pipeline::{Pipeline, PipelineDefaults, RunParams, RunRequest, RunResult, RunState, RunStatus};
pub use rfm::compute_features;
pub use segment::Segment;
pub use store::{MemoryStore, SnapshotStore, SqliteStore, StoreError};

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
