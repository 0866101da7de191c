//! K-Means clustering of standardized RFM features

use linfa::prelude::*;
use linfa_clustering::KMeans;
use linfa_nn::distance::L2Dist;
use log::debug;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::prelude::ToPrimitive;

use crate::data::{CentroidInfo, RfmFeature};
use crate::error::SegmentationError;

/// Number of feature columns: recency, frequency, monetary
pub const N_FEATURES: usize = 3;

/// Tuning knobs for the K-Means fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClusterParams {
    /// Number of clusters
    pub n_clusters: usize,
    /// Seed for centroid initialization
    pub seed: u64,
    /// Maximum Lloyd iterations per initialization
    pub max_iters: u64,
    /// Convergence tolerance on centroid movement
    pub tolerance: f64,
    /// Independent initializations; the lowest-inertia run is kept
    pub n_runs: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            n_clusters: 5,
            seed: 42,
            max_iters: 300,
            tolerance: 1e-4,
            n_runs: 10,
        }
    }
}

impl ClusterParams {
    pub fn with_clusters(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Self::default()
        }
    }
}

/// Per-column zero-mean, unit-variance scaler.
///
/// Uses the population standard deviation. Zero-variance columns keep a
/// scale of 1 so their standardized values are all 0.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub mean: Array1<f64>,
    pub scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(records: &Array2<f64>) -> Self {
        let n_cols = records.ncols();
        let mean = records
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_cols));
        let scale = records
            .std_axis(Axis(0), 0.0)
            .mapv(|std| if std > f64::EPSILON { std } else { 1.0 });
        Self { mean, scale }
    }

    pub fn transform(&self, records: &Array2<f64>) -> Array2<f64> {
        (records - &self.mean) / &self.scale
    }

    pub fn inverse_transform(&self, records: &Array2<f64>) -> Array2<f64> {
        records * &self.scale + &self.mean
    }
}

/// Fitted clustering of one RFM snapshot
#[derive(Debug)]
pub struct ClusterModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Customer id of each row, in input order
    pub customer_ids: Vec<String>,
    /// Cluster id of each row
    pub labels: Array1<usize>,
    /// Standardized feature matrix the model was fitted on
    pub features: Array2<f64>,
    /// Scaler fitted on the raw features
    pub scaler: StandardScaler,
    /// Cluster centroids in standardized space (k x 3)
    pub centroids: Array2<f64>,
    /// Cluster centroids in original units (k x 3)
    pub centroids_original: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
}

impl ClusterModel {
    /// `(customer_id, cluster_id)` pair for every input row
    pub fn assignments(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.customer_ids
            .iter()
            .map(String::as_str)
            .zip(self.labels.iter().copied())
    }

    /// Centroid of `cluster_id` in original units
    pub fn centroid_info(&self, cluster_id: usize) -> Option<CentroidInfo> {
        if cluster_id >= self.centroids_original.nrows() {
            return None;
        }
        let row = self.centroids_original.row(cluster_id);
        Some(CentroidInfo {
            recency_days: row[0],
            frequency: row[1],
            monetary: row[2],
        })
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            if label < self.n_clusters {
                sizes[label] += 1;
            }
        }
        sizes
    }

    /// Mean silhouette coefficient over the first `sample_size` rows
    pub fn compute_silhouette_sample(&self, sample_size: usize) -> f64 {
        let n_samples = self.features.nrows().min(sample_size);
        if n_samples < 2 {
            return 0.0;
        }

        let mut silhouette_sum = 0.0;

        for i in 0..n_samples {
            let point = self.features.row(i);
            let cluster_label = self.labels[i];

            let mut same_cluster_distances = Vec::new();
            let mut other_cluster_distances: Vec<Vec<f64>> = vec![Vec::new(); self.n_clusters];

            for j in 0..n_samples {
                if i == j {
                    continue;
                }

                let distance = euclidean_distance(&point, &self.features.row(j));
                let other_label = self.labels[j];

                if other_label == cluster_label {
                    same_cluster_distances.push(distance);
                } else if other_label < self.n_clusters {
                    other_cluster_distances[other_label].push(distance);
                }
            }

            let a_i = mean(&same_cluster_distances).unwrap_or(0.0);
            let b_i = other_cluster_distances
                .iter()
                .filter_map(|distances| mean(distances))
                .fold(f64::INFINITY, f64::min);

            let silhouette_i = if b_i.is_infinite() || (a_i == 0.0 && b_i == 0.0) {
                0.0
            } else {
                (b_i - a_i) / a_i.max(b_i)
            };

            silhouette_sum += silhouette_i;
        }

        silhouette_sum / n_samples as f64
    }
}

/// Build the `[recency_days, frequency, monetary]` matrix, one row per feature
pub fn feature_matrix(features: &[RfmFeature]) -> Array2<f64> {
    let mut matrix = Array2::zeros((features.len(), N_FEATURES));
    for (mut row, feature) in matrix.outer_iter_mut().zip(features) {
        row[0] = f64::from(feature.recency_days);
        row[1] = f64::from(feature.frequency);
        row[2] = feature.monetary.to_f64().unwrap_or(0.0);
    }
    matrix
}

/// Fit K-Means on an RFM snapshot
///
/// # Arguments
/// * `features` - RFM records of one calculation date
/// * `params` - Cluster count, seed and iteration limits
///
/// # Returns
/// * Fitted `ClusterModel` with one label per input record. Cluster ids
///   follow initialization order and carry no meaning across runs.
pub fn fit_kmeans(
    features: &[RfmFeature],
    params: &ClusterParams,
) -> Result<ClusterModel, SegmentationError> {
    if params.n_clusters == 0 {
        return Err(SegmentationError::InvalidParameter(
            "number of clusters must be at least 1".to_string(),
        ));
    }

    if features.len() < params.n_clusters {
        return Err(SegmentationError::InsufficientData {
            available: features.len(),
            requested: params.n_clusters,
        });
    }

    let raw = feature_matrix(features);
    let scaler = StandardScaler::fit(&raw);
    let standardized = scaler.transform(&raw);

    let n_samples = standardized.nrows();
    let targets: Array1<usize> = Array1::zeros(n_samples);
    let dataset = Dataset::new(standardized.clone(), targets);

    let rng = StdRng::seed_from_u64(params.seed);
    let model = KMeans::params_with(params.n_clusters, rng, L2Dist)
        .n_runs(params.n_runs.max(1))
        .max_n_iterations(params.max_iters)
        .tolerance(params.tolerance)
        .fit(&dataset)
        .map_err(|e| SegmentationError::Clustering(e.to_string()))?;

    let labels: Array1<usize> = model.predict(&standardized);
    let centroids = model.centroids().clone();
    let centroids_original = scaler.inverse_transform(&centroids);
    let inertia = compute_inertia(&standardized, &labels, &centroids);

    debug!(
        "K-Means fitted {} customers into {} clusters (inertia {:.4})",
        n_samples, params.n_clusters, inertia
    );

    Ok(ClusterModel {
        n_clusters: params.n_clusters,
        customer_ids: features.iter().map(|f| f.customer_id.clone()).collect(),
        labels,
        features: standardized,
        scaler,
        centroids,
        centroids_original,
        inertia,
    })
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .filter(|(_, &cluster)| cluster < centroids.nrows())
        .map(|(i, &cluster)| {
            let distance = euclidean_distance(&features.row(i), &centroids.row(cluster));
            distance * distance
        })
        .sum()
}

fn euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
