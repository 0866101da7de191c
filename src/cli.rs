//! Command-line interface definitions and argument parsing

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};

use crate::data::parse_timestamp;
use crate::model::ClusterParams;
use crate::pipeline::{PipelineDefaults, RunRequest};

/// RFM customer segmentation backed by a SQLite snapshot store
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Directory holding customers.csv and orders.csv
    #[arg(long, env = "RFM_DATA_DIR", default_value = "./data/input", global = true)]
    pub data_dir: String,

    /// Path to the SQLite database
    #[arg(long, env = "RFM_DATABASE", default_value = "rfm.db", global = true)]
    pub database: String,

    /// Default look-back window in days
    #[arg(long, env = "RFM_WINDOW_DAYS", default_value = "365", global = true)]
    pub default_window_days: u32,

    /// Default number of clusters
    #[arg(long, env = "DEFAULT_K", default_value = "5", global = true)]
    pub default_k: usize,

    /// Seed for centroid initialization
    #[arg(long, env = "RFM_SEED", default_value = "42", global = true)]
    pub seed: u64,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "300", global = true)]
    pub max_iters: u64,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4", global = true)]
    pub tolerance: f64,

    /// Independent K-Means initializations
    #[arg(long, default_value = "10", global = true)]
    pub n_runs: usize,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Ingest, compute RFM features and cluster customers
    Run {
        /// Calculation date (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS)
        #[arg(long, value_parser = parse_calc_date)]
        calc_date: Option<NaiveDateTime>,

        /// Look-back window in days
        #[arg(long)]
        window_days: Option<u32>,

        /// Number of clusters
        #[arg(short = 'k', long)]
        clusters: Option<usize>,

        /// Skip CSV ingestion and use the data already stored
        #[arg(long)]
        no_ingest: bool,
    },
    /// Per-segment statistics of a snapshot
    Segments {
        #[arg(long, value_parser = parse_calc_date)]
        calc_date: Option<NaiveDateTime>,
    },
    /// Customers assigned to a segment
    Members {
        /// Segment name, e.g. "Champions"
        segment: String,

        #[arg(long, value_parser = parse_calc_date)]
        calc_date: Option<NaiveDateTime>,
    },
    /// RFM features and segment of one customer
    Customer {
        customer_id: String,

        #[arg(long, value_parser = parse_calc_date)]
        calc_date: Option<NaiveDateTime>,
    },
}

impl Args {
    pub fn defaults(&self) -> PipelineDefaults {
        PipelineDefaults {
            window_days: self.default_window_days,
            k: self.default_k,
        }
    }

    pub fn cluster_params(&self) -> ClusterParams {
        ClusterParams {
            n_clusters: self.default_k,
            seed: self.seed,
            max_iters: self.max_iters,
            tolerance: self.tolerance,
            n_runs: self.n_runs,
        }
    }
}

impl Command {
    /// Run request of a `run` command
    pub fn run_request(&self) -> Option<RunRequest> {
        match self {
            Command::Run {
                calc_date,
                window_days,
                clusters,
                ..
            } => Some(RunRequest {
                calc_date: *calc_date,
                window_days: *window_days,
                k: *clusters,
            }),
            _ => None,
        }
    }
}

/// Parse a calculation date given on the command line
pub fn parse_calc_date(value: &str) -> Result<NaiveDateTime, String> {
    parse_timestamp(value).ok_or_else(|| format!("invalid date '{}'", value))
}
