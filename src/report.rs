//! Read-side queries over stored snapshots

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::data::{ClusterAssignment, Customer, RfmFeature};
use crate::segment::Segment;
use crate::store::{SnapshotStore, StoreError};

/// Aggregate statistics of one cluster at one calculation date
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentStats {
    pub cluster_id: usize,
    pub segment: Segment,
    pub customer_count: usize,
    /// Fraction of the clustered population
    pub share: f64,
    pub avg_recency_days: f64,
    pub avg_frequency: f64,
    pub avg_monetary: Decimal,
}

/// One customer of a segment with its RFM triple
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentMember {
    pub customer_id: String,
    pub cluster_id: usize,
    pub recency_days: u32,
    pub frequency: u32,
    pub monetary: Decimal,
}

/// Customer record with its snapshot at one calculation date
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerProfile {
    pub customer: Customer,
    pub calc_date: Option<NaiveDateTime>,
    pub rfm: Option<RfmFeature>,
    pub assignment: Option<ClusterAssignment>,
}

#[derive(Default)]
struct Accumulator {
    segment: Option<Segment>,
    count: usize,
    recency: u64,
    frequency: u64,
    monetary: Decimal,
}

/// Per-cluster statistics, ordered by cluster id.
///
/// Assignments without a matching RFM row are ignored.
pub fn summarize_segments(
    rfm: &[RfmFeature],
    assignments: &[ClusterAssignment],
) -> Vec<SegmentStats> {
    let by_customer: HashMap<&str, &RfmFeature> =
        rfm.iter().map(|r| (r.customer_id.as_str(), r)).collect();

    let mut clusters: BTreeMap<usize, Accumulator> = BTreeMap::new();
    for assignment in assignments {
        let Some(feature) = by_customer.get(assignment.customer_id.as_str()) else {
            continue;
        };
        let acc = clusters.entry(assignment.cluster_id).or_default();
        acc.segment = Some(assignment.segment);
        acc.count += 1;
        acc.recency += u64::from(feature.recency_days);
        acc.frequency += u64::from(feature.frequency);
        acc.monetary += feature.monetary;
    }

    let total: usize = clusters.values().map(|acc| acc.count).sum();
    clusters
        .into_iter()
        .filter_map(|(cluster_id, acc)| {
            let segment = acc.segment?;
            let n = acc.count as f64;
            Some(SegmentStats {
                cluster_id,
                segment,
                customer_count: acc.count,
                share: n / total as f64,
                avg_recency_days: acc.recency as f64 / n,
                avg_frequency: acc.frequency as f64 / n,
                avg_monetary: (acc.monetary / Decimal::from(acc.count)).round_dp(2),
            })
        })
        .collect()
}

/// Members of `segment`, ordered by customer id
pub fn segment_members(
    rfm: &[RfmFeature],
    assignments: &[ClusterAssignment],
    segment: Segment,
) -> Vec<SegmentMember> {
    let by_customer: HashMap<&str, &RfmFeature> =
        rfm.iter().map(|r| (r.customer_id.as_str(), r)).collect();

    let mut members: Vec<SegmentMember> = assignments
        .iter()
        .filter(|a| a.segment == segment)
        .filter_map(|a| {
            by_customer
                .get(a.customer_id.as_str())
                .map(|feature| SegmentMember {
                    customer_id: a.customer_id.clone(),
                    cluster_id: a.cluster_id,
                    recency_days: feature.recency_days,
                    frequency: feature.frequency,
                    monetary: feature.monetary,
                })
        })
        .collect();
    members.sort_by(|a, b| a.customer_id.cmp(&b.customer_id));
    members
}

/// Load RFM rows and assignments of `calc_date`, or of the latest clustered date
pub fn load_snapshot<S: SnapshotStore + ?Sized>(
    store: &S,
    calc_date: Option<NaiveDateTime>,
) -> Result<Option<(NaiveDateTime, Vec<RfmFeature>, Vec<ClusterAssignment>)>, StoreError> {
    let calc_date = match calc_date {
        Some(date) => date,
        None => match store.latest_cluster_date()? {
            Some(date) => date,
            None => return Ok(None),
        },
    };
    let rfm = store.rfm_features(calc_date)?;
    let assignments = store.cluster_assignments(calc_date)?;
    Ok(Some((calc_date, rfm, assignments)))
}

/// Profile of `customer_id` at `calc_date`, or at its latest RFM date.
///
/// Returns `None` for an unknown customer.
pub fn customer_profile<S: SnapshotStore + ?Sized>(
    store: &S,
    customer_id: &str,
    calc_date: Option<NaiveDateTime>,
) -> Result<Option<CustomerProfile>, StoreError> {
    let Some(customer) = store.customer(customer_id)? else {
        return Ok(None);
    };

    let calc_date = match calc_date {
        Some(date) => Some(date),
        None => store.latest_rfm_date_for(customer_id)?,
    };

    let (rfm, assignment) = match calc_date {
        Some(date) => (
            store
                .rfm_features(date)?
                .into_iter()
                .find(|r| r.customer_id == customer_id),
            store
                .cluster_assignments(date)?
                .into_iter()
                .find(|a| a.customer_id == customer_id),
        ),
        None => (None, None),
    };

    Ok(Some(CustomerProfile {
        customer,
        calc_date,
        rfm,
        assignment,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;

    fn date(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn rfm(id: &str, recency: u32, frequency: u32, cents: i64) -> RfmFeature {
        RfmFeature {
            customer_id: id.to_string(),
            calc_date: date(15),
            recency_days: recency,
            frequency,
            monetary: Decimal::new(cents, 2),
        }
    }

    fn assign(id: &str, cluster_id: usize, segment: Segment) -> ClusterAssignment {
        ClusterAssignment {
            customer_id: id.to_string(),
            calc_date: date(15),
            cluster_id,
            segment,
            centroid: None,
        }
    }

    fn snapshot() -> (Vec<RfmFeature>, Vec<ClusterAssignment>) {
        (
            vec![
                rfm("A", 5, 2, 25000),
                rfm("B", 7, 4, 10000),
                rfm("C", 200, 1, 2000),
                rfm("D", 366, 0, 0),
            ],
            vec![
                assign("B", 0, Segment::Champions),
                assign("A", 0, Segment::Champions),
                assign("C", 1, Segment::AtRisk),
                assign("D", 1, Segment::AtRisk),
            ],
        )
    }

    #[test]
    fn test_summarize_segments() {
        let (rfm, assignments) = snapshot();
        let stats = summarize_segments(&rfm, &assignments);

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].segment, Segment::Champions);
        assert_eq!(stats[0].customer_count, 2);
        assert_eq!(stats[0].share, 0.5);
        assert_eq!(stats[0].avg_recency_days, 6.0);
        assert_eq!(stats[0].avg_frequency, 3.0);
        assert_eq!(stats[0].avg_monetary, Decimal::new(17500, 2));
        assert_eq!(stats[1].avg_monetary, Decimal::new(1000, 2));
    }

    #[test]
    fn test_segment_members_sorted() {
        let (rfm, assignments) = snapshot();
        let members = segment_members(&rfm, &assignments, Segment::Champions);

        let ids: Vec<&str> = members.iter().map(|m| m.customer_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(members[0].monetary, Decimal::new(25000, 2));
        assert!(segment_members(&rfm, &assignments, Segment::Lost).is_empty());
    }

    #[test]
    fn test_customer_profile_uses_latest_date() {
        let mut store = MemoryStore::new();
        store
            .upsert_customers(&[Customer::new("A"), Customer::new("Z")])
            .unwrap();
        let (rfm, assignments) = snapshot();
        store.replace_rfm_features(date(15), &rfm).unwrap();
        store.replace_cluster_assignments(date(15), &assignments).unwrap();

        let profile = customer_profile(&store, "A", None).unwrap().unwrap();
        assert_eq!(profile.calc_date, Some(date(15)));
        assert_eq!(profile.rfm.unwrap().frequency, 2);
        assert_eq!(profile.assignment.unwrap().segment, Segment::Champions);

        let empty = customer_profile(&store, "Z", None).unwrap().unwrap();
        assert!(empty.rfm.is_none() && empty.assignment.is_none());

        assert!(customer_profile(&store, "missing", None).unwrap().is_none());
    }

    #[test]
    fn test_load_snapshot_defaults_to_latest() {
        let mut store = MemoryStore::new();
        assert!(load_snapshot(&store, None).unwrap().is_none());

        let (rfm, assignments) = snapshot();
        store.replace_rfm_features(date(15), &rfm).unwrap();
        store.replace_cluster_assignments(date(15), &assignments).unwrap();

        let (calc_date, rfm, assignments) = load_snapshot(&store, None).unwrap().unwrap();
        assert_eq!(calc_date, date(15));
        assert_eq!(rfm.len(), 4);
        assert_eq!(assignments.len(), 4);
    }
}
