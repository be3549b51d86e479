//! Background sweeper for idle connections
//!
//! The evictor wakes every `sweep_interval` and asks the pool to close idle
//! connections older than `idle_threshold`. It can be stopped at any time;
//! `stop` interrupts the current sleep instead of waiting it out.

use super::connection::ConnectionPool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Configuration for idle eviction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictorConfig {
    /// How long to sleep between sweeps
    pub sweep_interval: Duration,

    /// Idle connections unused for longer than this are closed
    pub idle_threshold: Duration,
}

impl Default for EvictorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(3),
            idle_threshold: Duration::from_secs(30),
        }
    }
}

/// Stop signal shared with one run of the sweep task
struct StopSignal {
    stopped: AtomicBool,
    wake: Notify,
}

impl StopSignal {
    fn raise(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        // notify_one keeps a permit if the task is between its flag check
        // and its wait.
        self.wake.notify_one();
    }

    fn is_raised(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

struct Running {
    handle: JoinHandle<()>,
    signal: Arc<StopSignal>,
}

/// Periodically closes expired idle connections of one pool
pub struct IdleEvictor<C> {
    pool: Arc<ConnectionPool<C>>,
    config: EvictorConfig,
    running: Mutex<Option<Running>>,
}

impl<C: Send + 'static> IdleEvictor<C> {
    /// Create a stopped evictor for `pool`
    pub fn new(pool: Arc<ConnectionPool<C>>, config: EvictorConfig) -> Self {
        Self {
            pool,
            config,
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &EvictorConfig {
        &self.config
    }

    /// Whether the sweep task is currently running
    pub fn is_running(&self) -> bool {
        let running = self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        running.as_ref().is_some_and(|run| !run.handle.is_finished())
    }

    /// Start the sweep task. Must be called within a tokio runtime.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if running.as_ref().is_some_and(|run| !run.handle.is_finished()) {
            warn!("Idle evictor already running");
            return;
        }

        let signal = Arc::new(StopSignal {
            stopped: AtomicBool::new(false),
            wake: Notify::new(),
        });
        let pool = Arc::clone(&self.pool);
        let config = self.config.clone();

        info!(
            sweep_interval_ms = config.sweep_interval.as_millis() as u64,
            idle_threshold_ms = config.idle_threshold.as_millis() as u64,
            "Idle evictor started"
        );

        let task_signal = Arc::clone(&signal);
        let handle = tokio::spawn(async move {
            let signal = task_signal;
            loop {
                if signal.is_raised() {
                    break;
                }

                tokio::select! {
                    _ = tokio::time::sleep(config.sweep_interval) => {}
                    _ = signal.wake.notified() => {}
                }

                if signal.is_raised() {
                    break;
                }

                let closed = pool.close_expired(config.idle_threshold);
                let stats = pool.stats();
                debug!(
                    closed = closed,
                    idle = stats.idle,
                    leased = stats.leased,
                    "Idle eviction sweep finished"
                );
            }
            debug!("Idle evictor task exiting");
        });

        *running = Some(Running { handle, signal });
    }

    /// Stop the sweep task and wait for it to exit
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some(Running { handle, signal }) = running {
            signal.raise();
            if let Err(e) = handle.await {
                warn!(error = %e, "Idle evictor task ended abnormally");
            }
            info!("Idle evictor stopped");
        }
    }
}

impl<C> Drop for IdleEvictor<C> {
    fn drop(&mut self) {
        let running = self
            .running
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(run) = running.take() {
            run.signal.raise();
        }
    }
}
