use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::Core;
use crate::harness::{ConcurrencyHarness, HarnessReport};
use crate::transport::Request;

/// Fetch each URL in turn and print status and body size
pub async fn cmd_get(core: &Core, urls: &[String]) -> Result<()> {
    let mut failures = 0usize;

    for url in urls {
        match core.get(url).await {
            Ok(response) => {
                println!(
                    "{} {} {}",
                    response.status.as_u16(),
                    format_bytes(response.body.len() as u64),
                    url
                );
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Request failed");
                println!("ERR {} ({})", url, e);
                failures += 1;
            }
        }
    }

    print_pool_stats(core);

    if failures > 0 {
        anyhow::bail!("{} of {} request(s) failed", failures, urls.len());
    }
    Ok(())
}

/// Run the concurrency harness against one URL
pub async fn cmd_bench(core: &Core, url: &str, units: usize, requests: usize) -> Result<()> {
    let request = Request::get(url).with_context(|| format!("Invalid URL: {}", url))?;

    println!(
        "Running {} unit(s) x {} request(s) against {}",
        units, requests, url
    );
    println!();

    let harness = ConcurrencyHarness::new(units, requests);
    let report = harness
        .run(Arc::clone(core.executor()), move |_, _| request.clone())
        .await;

    print_report(&report);
    print_pool_stats(core);

    info!(
        succeeded = report.succeeded,
        failed = report.failed,
        "Benchmark complete"
    );
    Ok(())
}

/// Print the effective configuration as YAML
pub fn cmd_config(core: &Core) -> Result<()> {
    let yaml = serde_yaml::to_string(core.config.as_ref())
        .context("Failed to serialise configuration")?;
    print!("{}", yaml);
    Ok(())
}

fn print_report(report: &HarnessReport) {
    println!(
        "Requests: {} total, {} succeeded, {} failed ({:.1}% success)",
        report.total(),
        report.succeeded,
        report.failed,
        success_rate(report.succeeded, report.total())
    );
    println!(
        "Elapsed:  {:.2}s ({:.1} req/s)",
        report.elapsed.as_secs_f64(),
        report.throughput()
    );
    if report.lost_units > 0 {
        println!("Lost units: {}", report.lost_units);
    }

    let mut statuses = std::collections::BTreeMap::new();
    for unit in &report.units {
        for (status, count) in &unit.statuses {
            *statuses.entry(*status).or_insert(0usize) += count;
        }
    }
    for (status, count) in statuses {
        println!("  {}: {}", status, count);
    }
}

fn print_pool_stats(core: &Core) {
    let stats = core.pool().stats();
    println!();
    println!(
        "Pool: {} created, {} reused, {} closed, {} idle, {} leased (max {})",
        stats.total_created,
        stats.total_reused,
        stats.total_closed,
        stats.idle,
        stats.leased,
        stats.max_total
    );
}

// ============================================================================
// Utility functions
// ============================================================================

/// Format bytes in human-readable form (B, KB, MB, GB, TB)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let exponent = (bytes_f64.ln() / 1024_f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);

    let value = bytes_f64 / 1024_f64.powi(exponent as i32);

    if exponent == 0 {
        format!("{} {}", bytes, UNITS[exponent])
    } else {
        format!("{:.2} {}", value, UNITS[exponent])
    }
}

/// Percentage of successful requests
pub fn success_rate(succeeded: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (succeeded as f64 / total as f64) * 100.0
    }
}
