//! Concurrent load driver for a request executor
//!
//! Spawns a fixed number of units, each issuing its requests one after
//! another through the shared executor. Units share nothing except the
//! executor (and therefore the pool); each reports its own tallies, which
//! are summed once every unit has been joined.

use crate::executor::RequestExecutor;
use crate::transport::{Request, Transport};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Outcome of one unit of work
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitReport {
    pub unit: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Response counts by HTTP status code
    pub statuses: BTreeMap<u16, usize>,
}

/// Aggregated outcome of a harness run
#[derive(Debug, Clone, Default)]
pub struct HarnessReport {
    pub units: Vec<UnitReport>,
    pub succeeded: usize,
    pub failed: usize,
    /// Units that ended without reporting (panicked or cancelled)
    pub lost_units: usize,
    pub elapsed: Duration,
}

impl HarnessReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Completed requests per second
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total() as f64 / secs
        } else {
            0.0
        }
    }
}

/// Runs `units` concurrent workers of `requests_per_unit` requests each
#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyHarness {
    units: usize,
    requests_per_unit: usize,
}

impl ConcurrencyHarness {
    pub fn new(units: usize, requests_per_unit: usize) -> Self {
        Self {
            units,
            requests_per_unit,
        }
    }

    /// Drive the executor and wait for every unit to finish
    ///
    /// `make_request(unit, index)` builds each request; it is shared by all
    /// units and must not need mutable state.
    pub async fn run<T, F>(&self, executor: Arc<RequestExecutor<T>>, make_request: F) -> HarnessReport
    where
        T: Transport,
        F: Fn(usize, usize) -> Request + Send + Sync + 'static,
    {
        let make_request = Arc::new(make_request);
        let started = Instant::now();
        let mut tasks = JoinSet::new();

        info!(
            units = self.units,
            requests_per_unit = self.requests_per_unit,
            "Starting harness run"
        );

        for unit in 0..self.units {
            let executor = executor.clone();
            let make_request = make_request.clone();
            let count = self.requests_per_unit;

            tasks.spawn(async move {
                let mut report = UnitReport {
                    unit,
                    ..UnitReport::default()
                };
                for index in 0..count {
                    let request = make_request(unit, index);
                    match executor.execute(&request).await {
                        Ok(response) => {
                            report.succeeded += 1;
                            *report.statuses.entry(response.status.as_u16()).or_default() += 1;
                        }
                        Err(e) => {
                            debug!(unit, index, error = %e, "Harness request failed");
                            report.failed += 1;
                        }
                    }
                }
                report
            });
        }

        let mut report = HarnessReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(unit) => {
                    report.succeeded += unit.succeeded;
                    report.failed += unit.failed;
                    report.units.push(unit);
                }
                Err(e) => {
                    error!(error = %e, "Harness unit did not complete");
                    report.lost_units += 1;
                }
            }
        }
        report.units.sort_by_key(|unit| unit.unit);
        report.elapsed = started.elapsed();

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Harness run finished"
        );

        report
    }
}
