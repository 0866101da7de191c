//! Customer, order and snapshot records shared by every stage

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::segment::Segment;

/// Date formats accepted for order and customer timestamps
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y"];

/// A customer known to the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    /// Business identifier
    pub customer_id: String,
    pub email: Option<String>,
    pub country: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl Customer {
    pub fn new(customer_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            email: None,
            country: None,
            created_at: None,
        }
    }
}

/// Order lifecycle status. Only completed orders count toward RFM.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum OrderStatus {
    Completed,
    Cancelled,
    Refunded,
    Other(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Other(s) => s,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl From<&str> for OrderStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "completed" => Self::Completed,
            "cancelled" => Self::Cancelled,
            "refunded" => Self::Refunded,
            _ => Self::Other(s.trim().to_string()),
        }
    }
}

impl From<String> for OrderStatus {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single order placed by a customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub customer_id: String,
    pub order_date: NaiveDateTime,
    /// Non-negative amount in fixed precision
    pub amount: Decimal,
    pub currency: String,
    pub status: OrderStatus,
}

/// RFM feature triple for one customer at one calculation date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfmFeature {
    pub customer_id: String,
    pub calc_date: NaiveDateTime,
    /// Days since the most recent qualifying order, or `window_days + 1` if none
    pub recency_days: u32,
    /// Number of qualifying orders in the window
    pub frequency: u32,
    /// Sum of qualifying order amounts in the window
    pub monetary: Decimal,
}

/// Centroid of the assigned cluster in original units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CentroidInfo {
    pub recency_days: f64,
    pub frequency: f64,
    pub monetary: f64,
}

/// Cluster membership of one customer at one calculation date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub customer_id: String,
    pub calc_date: NaiveDateTime,
    pub cluster_id: usize,
    pub segment: Segment,
    pub centroid: Option<CentroidInfo>,
}

/// Parse a timestamp in any of the accepted formats.
///
/// Date-only values resolve to midnight. Values with a UTC offset
/// (RFC 3339) are converted to UTC.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(ts);
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.naive_utc());
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
