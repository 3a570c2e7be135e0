//! sightline-bench: load driver for observation lifecycles and context
//! propagation.
//!
//! Runs nested observations on OS threads and tokio tasks, handing the
//! current observation to each worker through a context snapshot, and
//! reports throughput plus whether every worker left its context clean.

mod config;
mod workload;

use anyhow::{bail, Result};

use config::{Config, OutputFormat};
use workload::Report;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse_args();

    sightline::observability::tracing::init_tracing(&config.log_level);

    let report = workload::run(&config).await?;
    print_report(&report, config.output)?;

    if !report.is_consistent() {
        bail!(
            "context leaked: {} misparented tree(s), {} unclean worker(s)",
            report.misparented,
            report.leaked_workers
        );
    }

    Ok(())
}

fn print_report(report: &Report, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{:<24} {:>16}", "METRIC", "VALUE");
            println!("{}", "-".repeat(41));
            println!("{:<24} {:>16}", "handlers", report.handlers.join(","));
            println!("{:<24} {:>16}", "threads", report.threads);
            println!("{:<24} {:>16}", "tasks", report.tasks);
            println!("{:<24} {:>16}", "iterations", report.iterations);
            println!("{:<24} {:>16}", "depth", report.depth);
            println!("{:<24} {:>16}", "observations", report.observations);
            println!("{:<24} {:>16.3}", "elapsed (s)", report.elapsed_secs);
            println!("{:<24} {:>16.0}", "observations/s", report.observations_per_sec);
            println!("{:<24} {:>16}", "misparented trees", report.misparented);
            println!("{:<24} {:>16}", "unclean workers", report.leaked_workers);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }

    Ok(())
}
