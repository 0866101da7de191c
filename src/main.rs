//! rfmseg: RFM feature computation and K-Means customer segmentation
//!
//! Entry point that wires configuration, the SQLite store and the pipeline.

use anyhow::{anyhow, Context};
use chrono::NaiveDateTime;
use clap::Parser;
use log::{debug, info};
use rfmseg::cli::{Args, Command};
use rfmseg::report::{self, SegmentStats};
use rfmseg::{CsvSource, Pipeline, Result, RunStatus, Segment, SnapshotStore, SqliteStore};
use std::process;
use std::time::Instant;

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut store = SqliteStore::open(&args.database)
        .with_context(|| format!("failed to open database {}", args.database))?;

    match &args.command {
        Command::Run { no_ingest, .. } => {
            let succeeded = run_pipeline(&args, &mut store, *no_ingest)?;
            if !succeeded {
                process::exit(1);
            }
        }
        Command::Segments { calc_date } => {
            let Some((calc_date, rfm, assignments)) = report::load_snapshot(&store, *calc_date)?
            else {
                println!("No cluster assignments stored yet");
                return Ok(());
            };
            print_segments(calc_date, &report::summarize_segments(&rfm, &assignments));
        }
        Command::Members { segment, calc_date } => {
            let segment: Segment = segment.parse().map_err(|e: String| anyhow!(e))?;
            let Some((_, rfm, assignments)) = report::load_snapshot(&store, *calc_date)? else {
                println!("No cluster assignments stored yet");
                return Ok(());
            };
            let members = report::segment_members(&rfm, &assignments, segment);
            println!("{}", serde_json::to_string_pretty(&members)?);
        }
        Command::Customer {
            customer_id,
            calc_date,
        } => match report::customer_profile(&store, customer_id, *calc_date)? {
            Some(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
            None => {
                eprintln!("Unknown customer: {}", customer_id);
                process::exit(1);
            }
        },
    }

    Ok(())
}

/// Run the pipeline and print its result. Returns false when the run errored.
fn run_pipeline(args: &Args, store: &mut SqliteStore, no_ingest: bool) -> Result<bool> {
    let request = args
        .command
        .run_request()
        .ok_or_else(|| anyhow!("not a run command"))?;
    let params = request.resolve_now(&args.defaults());
    let source = CsvSource::from_dir(&args.data_dir);

    let start_time = Instant::now();
    let mut pipeline = Pipeline::new(store).with_cluster_params(args.cluster_params());
    if !no_ingest {
        debug!("Ingesting from {}", args.data_dir);
        pipeline = pipeline.with_source(&source);
    }
    let result = pipeline.run(&params);
    info!(
        "Pipeline finished in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.clustering.is_success() {
        let rfm = store.rfm_features(params.calc_date)?;
        let assignments = store.cluster_assignments(params.calc_date)?;
        print_segments(
            params.calc_date,
            &report::summarize_segments(&rfm, &assignments),
        );
    }

    Ok(result.status != RunStatus::Error)
}

fn print_segments(calc_date: NaiveDateTime, stats: &[SegmentStats]) {
    println!("\n=== Segments at {} ===", calc_date);
    println!(
        "{:>7}  {:<20} {:>8} {:>7} {:>9} {:>9} {:>12}",
        "cluster", "segment", "count", "share", "recency", "freq", "monetary"
    );
    for s in stats {
        println!(
            "{:>7}  {:<20} {:>8} {:>6.1}% {:>9.1} {:>9.2} {:>12}",
            s.cluster_id,
            s.segment.as_str(),
            s.customer_count,
            s.share * 100.0,
            s.avg_recency_days,
            s.avg_frequency,
            s.avg_monetary
        );
    }
}
