//! Rule table mapping standardized cluster centroids to segment names

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Threshold separating a clearly above/below average dimension
const STRONG: f64 = 0.5;

/// Human-readable behavioral segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Segment {
    Champions,
    #[serde(rename = "Loyal Customers")]
    LoyalCustomers,
    #[serde(rename = "Big Spenders")]
    BigSpenders,
    #[serde(rename = "Potential Loyalists")]
    PotentialLoyalists,
    #[serde(rename = "At Risk")]
    AtRisk,
    Lost,
    Hibernating,
    #[serde(rename = "Need Attention")]
    NeedAttention,
}

impl Segment {
    pub const ALL: [Segment; 8] = [
        Segment::Champions,
        Segment::LoyalCustomers,
        Segment::BigSpenders,
        Segment::PotentialLoyalists,
        Segment::AtRisk,
        Segment::Lost,
        Segment::Hibernating,
        Segment::NeedAttention,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Champions => "Champions",
            Self::LoyalCustomers => "Loyal Customers",
            Self::BigSpenders => "Big Spenders",
            Self::PotentialLoyalists => "Potential Loyalists",
            Self::AtRisk => "At Risk",
            Self::Lost => "Lost",
            Self::Hibernating => "Hibernating",
            Self::NeedAttention => "Need Attention",
        }
    }

    /// Classify a standardized `(recency, frequency, monetary)` centroid.
    ///
    /// Negative recency means more recent than average. Rules are evaluated
    /// in order and the first match wins.
    pub fn classify(recency: f64, frequency: f64, monetary: f64) -> Self {
        let recent = recency < -STRONG;
        if recent && frequency > STRONG && monetary > STRONG {
            Self::Champions
        } else if recent && frequency > STRONG {
            Self::LoyalCustomers
        } else if recent && monetary > STRONG {
            Self::BigSpenders
        } else if recency < 0.0 && frequency > 0.0 {
            Self::PotentialLoyalists
        } else if recency > STRONG && frequency < -STRONG {
            Self::AtRisk
        } else if recency > STRONG {
            Self::Lost
        } else if frequency < -STRONG && monetary < -STRONG {
            Self::Hibernating
        } else {
            Self::NeedAttention
        }
    }

    /// Classify a centroid row laid out as `[recency, frequency, monetary]`
    pub fn from_centroid(centroid: ArrayView1<f64>) -> Self {
        Self::classify(centroid[0], centroid[1], centroid[2])
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Segment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Segment::ALL
            .into_iter()
            .find(|segment| segment.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown segment: {}", s))
    }
}

/// Label cluster `cluster_id` from its row in the standardized centroid matrix.
///
/// Returns `None` when the cluster id has no centroid.
pub fn label(cluster_id: usize, standardized_centroids: &Array2<f64>) -> Option<Segment> {
    if cluster_id >= standardized_centroids.nrows() || standardized_centroids.ncols() != 3 {
        return None;
    }
    Some(Segment::from_centroid(standardized_centroids.row(cluster_id)))
}
