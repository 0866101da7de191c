//! Pipeline orchestration: ingest -> RFM -> clustering.
//!
//! Each stage is recorded in its own `StageReport`. A failing stage does not
//! abort the run, but clustering is skipped when the RFM stage of the same
//! run did not succeed so it never runs over a stale snapshot.
//!
//! Two runs for the same calc_date must not execute concurrently; callers
//! serialize them. Runs for different dates touch disjoint rows.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Duration, NaiveDateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;

use crate::data::ClusterAssignment;
use crate::error::SegmentationError;
use crate::ingest::OrderSource;
use crate::model::{fit_kmeans, ClusterParams};
use crate::rfm::compute_features;
use crate::segment::{self, Segment};
use crate::store::SnapshotStore;

/// Rows sampled for the silhouette diagnostic
const SILHOUETTE_SAMPLE: usize = 500;

/// Configured defaults applied when a run request leaves a value unset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineDefaults {
    pub window_days: u32,
    pub k: usize,
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        Self {
            window_days: 365,
            k: 5,
        }
    }
}

/// Run parameters as requested by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunRequest {
    pub calc_date: Option<NaiveDateTime>,
    pub window_days: Option<u32>,
    pub k: Option<usize>,
}

impl RunRequest {
    /// Explicit values win over configured defaults. A missing calc_date
    /// resolves to the start of the day of `now`.
    pub fn resolve(&self, defaults: &PipelineDefaults, now: NaiveDateTime) -> RunParams {
        RunParams {
            calc_date: self
                .calc_date
                .unwrap_or_else(|| now.date().and_hms_opt(0, 0, 0).unwrap_or(now)),
            window_days: self.window_days.unwrap_or(defaults.window_days),
            k: self.k.unwrap_or(defaults.k),
        }
    }

    pub fn resolve_now(&self, defaults: &PipelineDefaults) -> RunParams {
        self.resolve(defaults, Utc::now().naive_utc())
    }
}

/// Fully resolved parameters of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunParams {
    pub calc_date: NaiveDateTime,
    pub window_days: u32,
    pub k: usize,
}

impl RunParams {
    fn validate(&self) -> Result<(), SegmentationError> {
        if self.k == 0 {
            return Err(SegmentationError::InvalidParameter(
                "k must be at least 1".to_string(),
            ));
        }
        if self
            .calc_date
            .checked_sub_signed(Duration::days(i64::from(self.window_days)))
            .is_none()
        {
            return Err(SegmentationError::InvalidParameter(format!(
                "window of {} days reaches before the earliest representable date",
                self.window_days
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Parameter validation before any stage starts
    Setup,
    Ingestion,
    Rfm,
    Clustering,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Setup => "Setup",
            Self::Ingestion => "Ingestion",
            Self::Rfm => "RFM calculation",
            Self::Clustering => "Clustering",
        })
    }
}

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "stage")]
pub enum RunState {
    Idle,
    Ingesting,
    ComputingRfm,
    Clustering,
    Done,
    Failed(Stage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No stage failed
    Success,
    /// At least one stage failed but the run completed
    PartialSuccess,
    /// An error escaped stage handling
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Succeeded,
    Failed,
    Skipped,
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport<T> {
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl<T> Default for StageReport<T> {
    fn default() -> Self {
        Self {
            status: StageStatus::Pending,
            summary: None,
            error: None,
            reason: None,
        }
    }
}

impl<T> StageReport<T> {
    fn succeeded(summary: T) -> Self {
        Self {
            status: StageStatus::Succeeded,
            summary: Some(summary),
            ..Self::default()
        }
    }

    fn failed(summary: Option<T>, error: String) -> Self {
        Self {
            status: StageStatus::Failed,
            summary,
            error: Some(error),
            reason: None,
        }
    }

    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Skipped,
            reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Succeeded
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestSummary {
    pub customers_loaded: usize,
    pub orders_loaded: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RfmSummary {
    pub customers_processed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub customers_clustered: usize,
    pub clusters_created: usize,
    pub inertia: f64,
    pub silhouette: f64,
    /// Customers per cluster id
    pub sizes: Vec<usize>,
    /// Customers per segment name
    pub segments: BTreeMap<String, usize>,
}

/// Structured result of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub state: RunState,
    pub calc_date: NaiveDateTime,
    pub window_days: u32,
    pub k: usize,
    pub ingestion: StageReport<IngestSummary>,
    pub rfm: StageReport<RfmSummary>,
    pub clustering: StageReport<ClusterSummary>,
    pub errors: Vec<String>,
}

impl RunResult {
    fn new(params: &RunParams) -> Self {
        Self {
            status: RunStatus::Success,
            state: RunState::Idle,
            calc_date: params.calc_date,
            window_days: params.window_days,
            k: params.k,
            ingestion: StageReport::default(),
            rfm: StageReport::default(),
            clustering: StageReport::default(),
            errors: Vec::new(),
        }
    }

    fn record_error(&mut self, stage: Stage, err: &impl fmt::Display) -> String {
        let message = err.to_string();
        error!("{} error: {}", stage, message);
        self.errors.push(format!("{} error: {}", stage, message));
        message
    }
}

/// Sequences the stages of one run over a store
pub struct Pipeline<'a, S: SnapshotStore> {
    store: &'a mut S,
    source: Option<&'a dyn OrderSource>,
    cluster_params: ClusterParams,
}

impl<'a, S: SnapshotStore> Pipeline<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        Self {
            store,
            source: None,
            cluster_params: ClusterParams::default(),
        }
    }

    /// Ingest from `source` before computing features
    pub fn with_source(mut self, source: &'a dyn OrderSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Seed and iteration limits for clustering; the cluster count comes from each run
    pub fn with_cluster_params(mut self, params: ClusterParams) -> Self {
        self.cluster_params = params;
        self
    }

    /// Run the full pipeline for `params`. Never fails: every error is
    /// reported through the returned `RunResult`.
    pub fn run(&mut self, params: &RunParams) -> RunResult {
        let mut result = RunResult::new(params);
        info!(
            "Starting pipeline run: calc_date={}, window_days={}, k={}",
            params.calc_date, params.window_days, params.k
        );

        if let Err(e) = params.validate() {
            result.status = RunStatus::Error;
            result.state = RunState::Failed(Stage::Setup);
            result.errors.push(format!("Pipeline error: {}", e));
            error!("Pipeline aborted: {}", e);
            return result;
        }

        self.transition(&mut result, RunState::Ingesting);
        result.ingestion = self.ingest(&mut result);

        self.transition(&mut result, RunState::ComputingRfm);
        result.rfm = self.compute_rfm(params, &mut result);

        self.transition(&mut result, RunState::Clustering);
        result.clustering = if result.rfm.is_success() {
            self.cluster(params, &mut result)
        } else {
            warn!("Skipping clustering: RFM stage did not succeed");
            StageReport::skipped("RFM stage did not succeed in this run")
        };

        self.transition(&mut result, RunState::Done);
        if !result.errors.is_empty() {
            result.status = RunStatus::PartialSuccess;
        }

        info!(
            "Pipeline finished with status {:?} ({} errors)",
            result.status,
            result.errors.len()
        );
        result
    }

    fn transition(&self, result: &mut RunResult, next: RunState) {
        info!("Pipeline state {:?} -> {:?}", result.state, next);
        result.state = next;
    }

    fn ingest(&mut self, result: &mut RunResult) -> StageReport<IngestSummary> {
        let Some(source) = self.source else {
            info!("No ingestion source configured");
            return StageReport::skipped("no ingestion source configured");
        };

        let mut summary = IngestSummary::default();
        let mut failures = Vec::new();

        match source
            .load_customers()
            .and_then(|customers| Ok(self.store.upsert_customers(&customers)?))
        {
            Ok(count) => summary.customers_loaded = count,
            Err(e) => failures.push(result.record_error(Stage::Ingestion, &format!("customers: {}", e))),
        }

        match source
            .load_orders()
            .and_then(|orders| Ok(self.store.upsert_orders(&orders)?))
        {
            Ok(count) => summary.orders_loaded = count,
            Err(e) => failures.push(result.record_error(Stage::Ingestion, &format!("orders: {}", e))),
        }

        info!(
            "Ingested {} customers and {} orders",
            summary.customers_loaded, summary.orders_loaded
        );

        if failures.is_empty() {
            StageReport::succeeded(summary)
        } else {
            StageReport::failed(Some(summary), failures.join("; "))
        }
    }

    fn compute_rfm(&mut self, params: &RunParams, result: &mut RunResult) -> StageReport<RfmSummary> {
        match self.try_compute_rfm(params) {
            Ok(summary) => {
                info!("Computed RFM for {} customers", summary.customers_processed);
                StageReport::succeeded(summary)
            }
            Err(e) => {
                let message = result.record_error(Stage::Rfm, &e);
                StageReport::failed(None, message)
            }
        }
    }

    fn try_compute_rfm(&mut self, params: &RunParams) -> Result<RfmSummary, SegmentationError> {
        let customers = self.store.list_customers()?;
        let orders = self.store.list_orders()?;

        let features = compute_features(&customers, &orders, params.calc_date, params.window_days);
        let written = self
            .store
            .replace_rfm_features(params.calc_date, &features)?;

        Ok(RfmSummary {
            customers_processed: written,
        })
    }

    fn cluster(&mut self, params: &RunParams, result: &mut RunResult) -> StageReport<ClusterSummary> {
        match self.try_cluster(params) {
            Ok(summary) => {
                info!(
                    "Clustered {} customers into {} clusters",
                    summary.customers_clustered, summary.clusters_created
                );
                StageReport::succeeded(summary)
            }
            Err(e) => {
                let message = result.record_error(Stage::Clustering, &e);
                StageReport::failed(None, message)
            }
        }
    }

    fn try_cluster(&mut self, params: &RunParams) -> Result<ClusterSummary, SegmentationError> {
        let features = self.store.rfm_features(params.calc_date)?;

        let cluster_params = ClusterParams {
            n_clusters: params.k,
            ..self.cluster_params
        };
        let model = fit_kmeans(&features, &cluster_params)?;

        let labels: Vec<Segment> = (0..model.n_clusters)
            .map(|cluster_id| {
                segment::label(cluster_id, &model.centroids).ok_or_else(|| {
                    SegmentationError::Clustering(format!("no centroid for cluster {}", cluster_id))
                })
            })
            .collect::<Result<_, _>>()?;

        let assignments: Vec<ClusterAssignment> = model
            .assignments()
            .map(|(customer_id, cluster_id)| ClusterAssignment {
                customer_id: customer_id.to_string(),
                calc_date: params.calc_date,
                cluster_id,
                segment: labels[cluster_id],
                centroid: model.centroid_info(cluster_id),
            })
            .collect();

        let written = self
            .store
            .replace_cluster_assignments(params.calc_date, &assignments)?;

        let mut segments = BTreeMap::new();
        for assignment in &assignments {
            *segments
                .entry(assignment.segment.as_str().to_string())
                .or_insert(0) += 1;
        }

        Ok(ClusterSummary {
            customers_clustered: written,
            clusters_created: model.n_clusters,
            inertia: model.inertia,
            silhouette: model.compute_silhouette_sample(SILHOUETTE_SAMPLE),
            sizes: model.cluster_sizes(),
            segments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Customer, Order, OrderStatus, RfmFeature};
    use crate::store::{MemoryStore, StoreError};
    use chrono::{Duration, NaiveDate};
    use rust_decimal::Decimal;

    fn calc_date() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn params(k: usize) -> RunParams {
        RunParams {
            calc_date: calc_date(),
            window_days: 365,
            k,
        }
    }

    /// In-memory source with customers C000.. and a spread of order histories
    struct FixtureSource {
        customers: Vec<Customer>,
        orders: Vec<Order>,
    }

    impl FixtureSource {
        fn new(n_customers: usize) -> Self {
            let customers: Vec<Customer> = (0..n_customers)
                .map(|i| Customer::new(format!("C{:03}", i)))
                .collect();
            let mut orders = Vec::new();
            for i in 0..n_customers {
                // Every fourth customer never orders
                if i % 4 == 3 {
                    continue;
                }
                for j in 0..=(i % 5) {
                    orders.push(Order {
                        order_id: format!("O{:03}-{}", i, j),
                        customer_id: format!("C{:03}", i),
                        order_date: calc_date() - Duration::days((i * 13 + j * 7) as i64 % 300),
                        amount: Decimal::new(((i + 1) * 1000 + j * 250) as i64, 2),
                        currency: "EUR".to_string(),
                        status: OrderStatus::Completed,
                    });
                }
            }
            Self { customers, orders }
        }
    }

    impl OrderSource for FixtureSource {
        fn load_customers(&self) -> Result<Vec<Customer>, SegmentationError> {
            Ok(self.customers.clone())
        }

        fn load_orders(&self) -> Result<Vec<Order>, SegmentationError> {
            Ok(self.orders.clone())
        }
    }

    struct BrokenOrders(FixtureSource);

    impl OrderSource for BrokenOrders {
        fn load_customers(&self) -> Result<Vec<Customer>, SegmentationError> {
            self.0.load_customers()
        }

        fn load_orders(&self) -> Result<Vec<Order>, SegmentationError> {
            Err(SegmentationError::DataIntegrity(
                "invalid order_date for order O1".to_string(),
            ))
        }
    }

    /// Memory store whose RFM writes always fail
    #[derive(Default)]
    struct FailingRfmStore(MemoryStore);

    impl SnapshotStore for FailingRfmStore {
        fn upsert_customers(&mut self, c: &[Customer]) -> Result<usize, StoreError> {
            self.0.upsert_customers(c)
        }
        fn upsert_orders(&mut self, o: &[Order]) -> Result<usize, StoreError> {
            self.0.upsert_orders(o)
        }
        fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
            self.0.list_customers()
        }
        fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
            self.0.list_orders()
        }
        fn customer(&self, id: &str) -> Result<Option<Customer>, StoreError> {
            self.0.customer(id)
        }
        fn replace_rfm_features(
            &mut self,
            _calc_date: NaiveDateTime,
            _rows: &[RfmFeature],
        ) -> Result<usize, StoreError> {
            Err(StoreError::Integrity("disk full".to_string()))
        }
        fn rfm_features(&self, calc_date: NaiveDateTime) -> Result<Vec<RfmFeature>, StoreError> {
            self.0.rfm_features(calc_date)
        }
        fn replace_cluster_assignments(
            &mut self,
            calc_date: NaiveDateTime,
            rows: &[ClusterAssignment],
        ) -> Result<usize, StoreError> {
            self.0.replace_cluster_assignments(calc_date, rows)
        }
        fn cluster_assignments(
            &self,
            calc_date: NaiveDateTime,
        ) -> Result<Vec<ClusterAssignment>, StoreError> {
            self.0.cluster_assignments(calc_date)
        }
        fn latest_cluster_date(&self) -> Result<Option<NaiveDateTime>, StoreError> {
            self.0.latest_cluster_date()
        }
        fn latest_rfm_date_for(&self, id: &str) -> Result<Option<NaiveDateTime>, StoreError> {
            self.0.latest_rfm_date_for(id)
        }
    }

    #[test]
    fn test_successful_run() {
        let source = FixtureSource::new(20);
        let mut store = MemoryStore::new();

        let result = Pipeline::new(&mut store).with_source(&source).run(&params(4));

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.state, RunState::Done);
        assert!(result.errors.is_empty());
        assert_eq!(result.ingestion.summary.as_ref().unwrap().customers_loaded, 20);
        assert_eq!(result.rfm.summary.as_ref().unwrap().customers_processed, 20);

        let clustering = result.clustering.summary.as_ref().unwrap();
        assert_eq!(clustering.customers_clustered, 20);
        assert_eq!(clustering.clusters_created, 4);
        assert_eq!(clustering.segments.values().sum::<usize>(), 20);
        assert_eq!(clustering.sizes.len(), 4);
        assert_eq!(clustering.sizes.iter().sum::<usize>(), 20);
        assert!(clustering.sizes.iter().all(|&size| size > 0));

        let rfm = store.rfm_features(calc_date()).unwrap();
        let assignments = store.cluster_assignments(calc_date()).unwrap();
        assert_eq!(rfm.len(), assignments.len());
        assert!(assignments.iter().all(|a| a.cluster_id < 4));
        assert!(assignments.iter().all(|a| a.centroid.is_some()));
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let source = FixtureSource::new(20);
        let mut store = MemoryStore::new();

        let first = Pipeline::new(&mut store).with_source(&source).run(&params(4));
        let first_rows = store.cluster_assignments(calc_date()).unwrap();
        let second = Pipeline::new(&mut store).with_source(&source).run(&params(4));
        let second_rows = store.cluster_assignments(calc_date()).unwrap();

        assert_eq!(first.status, RunStatus::Success);
        assert_eq!(second.status, RunStatus::Success);
        assert_eq!(store.rfm_features(calc_date()).unwrap().len(), 20);
        assert_eq!(first_rows.len(), second_rows.len());
        assert_eq!(
            first.clustering.summary.unwrap().segments,
            second.clustering.summary.unwrap().segments
        );
    }

    #[test]
    fn test_insufficient_customers_is_partial_success() {
        let source = FixtureSource::new(3);
        let mut store = MemoryStore::new();

        let result = Pipeline::new(&mut store).with_source(&source).run(&params(5));

        assert_eq!(result.status, RunStatus::PartialSuccess);
        assert_eq!(result.state, RunState::Done);
        assert!(result.rfm.is_success());
        assert_eq!(result.clustering.status, StageStatus::Failed);
        assert_eq!(
            result.errors,
            vec!["Clustering error: not enough customers (3) for 5 clusters".to_string()]
        );
        assert!(store.cluster_assignments(calc_date()).unwrap().is_empty());
    }

    #[test]
    fn test_empty_store_reports_zero_count() {
        let mut store = MemoryStore::new();
        let result = Pipeline::new(&mut store).run(&params(2));

        assert_eq!(result.ingestion.status, StageStatus::Skipped);
        assert_eq!(result.rfm.summary.as_ref().unwrap().customers_processed, 0);
        assert_eq!(
            result.clustering.error.as_deref(),
            Some("not enough customers (0) for 2 clusters")
        );
        assert_eq!(result.status, RunStatus::PartialSuccess);
    }

    #[test]
    fn test_ingestion_failure_does_not_block_later_stages() {
        let mut store = MemoryStore::new();
        let first = Pipeline::new(&mut store)
            .with_source(&FixtureSource::new(8))
            .run(&params(3));
        assert_eq!(first.status, RunStatus::Success);

        // Orders from the earlier ingestion are still in the store
        let source = BrokenOrders(FixtureSource::new(8));
        let result = Pipeline::new(&mut store).with_source(&source).run(&params(3));

        assert_eq!(result.status, RunStatus::PartialSuccess);
        assert_eq!(result.ingestion.status, StageStatus::Failed);
        assert_eq!(result.ingestion.summary.as_ref().unwrap().customers_loaded, 8);
        assert!(result.rfm.is_success());
        assert!(result.clustering.is_success());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Ingestion error: orders:"));
    }

    #[test]
    fn test_rfm_failure_skips_clustering() {
        let source = FixtureSource::new(10);
        let mut store = FailingRfmStore::default();

        let result = Pipeline::new(&mut store).with_source(&source).run(&params(3));

        assert_eq!(result.status, RunStatus::PartialSuccess);
        assert_eq!(result.rfm.status, StageStatus::Failed);
        assert_eq!(
            result.rfm.error.as_deref(),
            Some("persistence error: integrity violation: disk full")
        );
        assert_eq!(result.clustering.status, StageStatus::Skipped);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_invalid_parameters_are_errors() {
        let mut store = MemoryStore::new();
        let result = Pipeline::new(&mut store).run(&params(0));

        assert_eq!(result.status, RunStatus::Error);
        assert_eq!(result.state, RunState::Failed(Stage::Setup));
        assert_eq!(result.ingestion.status, StageStatus::Pending);
        assert_eq!(result.rfm.status, StageStatus::Pending);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Pipeline error:"));
    }

    #[test]
    fn test_window_beyond_date_range_is_error() {
        let source = FixtureSource::new(8);
        let mut store = MemoryStore::new();
        let params = RunParams {
            calc_date: calc_date(),
            window_days: 200_000_000,
            k: 2,
        };

        let result = Pipeline::new(&mut store).with_source(&source).run(&params);

        assert_eq!(result.status, RunStatus::Error);
        assert_eq!(result.state, RunState::Failed(Stage::Setup));
        assert!(result.errors[0].contains("200000000"));
        assert!(store.list_customers().unwrap().is_empty());
        assert!(store.rfm_features(calc_date()).unwrap().is_empty());
    }

    #[test]
    fn test_request_resolution_prefers_explicit_values() {
        let defaults = PipelineDefaults {
            window_days: 180,
            k: 4,
        };
        let now = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(17, 45, 0)
            .unwrap();

        let resolved = RunRequest::default().resolve(&defaults, now);
        assert_eq!(resolved.window_days, 180);
        assert_eq!(resolved.k, 4);
        assert_eq!(
            resolved.calc_date,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );

        let request = RunRequest {
            calc_date: Some(calc_date()),
            window_days: Some(30),
            k: Some(6),
        };
        assert_eq!(
            request.resolve(&defaults, now),
            RunParams {
                calc_date: calc_date(),
                window_days: 30,
                k: 6,
            }
        );
    }

    #[test]
    fn test_run_result_serializes() {
        let source = FixtureSource::new(12);
        let mut store = MemoryStore::new();
        let result = Pipeline::new(&mut store).with_source(&source).run(&params(3));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["state"]["state"], "done");
        assert_eq!(json["rfm"]["status"], "succeeded");
        assert_eq!(json["rfm"]["summary"]["customers_processed"], 12);
        assert!(json["clustering"].get("error").is_none());
    }
}
