//! Sequential polling scheduler.
//!
//! Drives periodic poll passes over the device registry and records every
//! attempt in the reading log. Within a pass devices are polled one at a
//! time, so at most one TCP connection is ever open; a failure on one device
//! never aborts or delays the rest beyond its own timeout budget.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use modsight_common::reading::{Reading, ReadingLog, current_timestamp_millis};

use crate::exchange;
use crate::protocol::ReadRequest;
use crate::registry::DeviceRegistry;

/// Periodic, strictly sequential poller for all registered devices.
///
/// State machine: Stopped -> `start()` -> Running -> `stop()` -> Stopped.
/// Starting runs one pass immediately and then one per interval; stopping
/// cancels future passes but lets an in-flight pass drain to completion.
pub struct RegisterPoller {
    inner: Arc<PollerInner>,
    runner: parking_lot::Mutex<Option<Runner>>,
}

/// State shared between the poller handle and its scheduling task.
struct PollerInner {
    registry: Arc<DeviceRegistry>,
    log: Arc<ReadingLog>,
    request: ReadRequest,
    poll_interval: Duration,
    attempt_timeout: Duration,
    /// Serializes passes so no two ever run concurrently, even across
    /// stop()/start() cycles while an old pass is still draining.
    pass_guard: Mutex<()>,
}

struct Runner {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RegisterPoller {
    /// Create a poller over the given registry and log.
    pub fn new(
        registry: Arc<DeviceRegistry>,
        log: Arc<ReadingLog>,
        request: ReadRequest,
        poll_interval: Duration,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                registry,
                log,
                request,
                poll_interval,
                attempt_timeout,
                pass_guard: Mutex::new(()),
            }),
            runner: parking_lot::Mutex::new(None),
        }
    }

    /// Whether the recurring schedule is active.
    pub fn is_running(&self) -> bool {
        self.runner
            .lock()
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    /// Start polling: one pass immediately, then one per interval.
    ///
    /// A no-op when already running.
    pub fn start(&self) {
        let mut runner = self.runner.lock();
        if runner.as_ref().is_some_and(|r| !r.task.is_finished()) {
            debug!("poller already running");
            return;
        }

        let (shutdown, mut stopped) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let mut ticker = interval(inner.poll_interval);
            // A pass that overruns the interval delays the next tick rather
            // than bursting to catch up; passes never overlap.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = stopped.changed() => break,
                    _ = ticker.tick() => inner.run_pass().await,
                }
            }
            debug!("poller task exiting");
        });

        info!(
            interval_secs = self.inner.poll_interval.as_secs(),
            timeout_ms = self.inner.attempt_timeout.as_millis() as u64,
            "polling started"
        );
        *runner = Some(Runner { shutdown, task });
    }

    /// Stop scheduling new passes.
    ///
    /// A pass already in flight drains to completion and its readings are
    /// still recorded. A no-op when already stopped.
    pub fn stop(&self) {
        match self.runner.lock().take() {
            Some(runner) => {
                let _ = runner.shutdown.send(true);
                info!("polling stopped");
            }
            None => debug!("poller already stopped"),
        }
    }

    /// Run one complete pass over a snapshot of the device list.
    ///
    /// Exposed for one-shot use; the scheduling task calls the same logic
    /// on every tick.
    pub async fn run_pass(&self) {
        self.inner.run_pass().await;
    }
}

impl PollerInner {
    /// One pass: poll every device in snapshot order, one at a time. Each
    /// attempt appends exactly one reading, success or failure, timestamped
    /// from before its exchange began.
    async fn run_pass(&self) {
        let _pass = self.pass_guard.lock().await;
        let devices = self.registry.snapshot();
        debug!(devices = devices.len(), "poll pass starting");

        for device in devices {
            let timestamp = current_timestamp_millis();
            let reading = match exchange::read_holding_registers(
                &device,
                self.request,
                self.attempt_timeout,
            )
            .await
            {
                Ok(registers) => {
                    debug!(
                        device = %device.name,
                        registers = registers.len(),
                        "read complete"
                    );
                    Reading::success(
                        timestamp,
                        &device.name,
                        &device.host,
                        device.port,
                        device.unit_id,
                        registers,
                    )
                }
                Err(e) => {
                    warn!(
                        device = %device.name,
                        endpoint = %device.endpoint(),
                        unit_id = device.unit_id,
                        error = %e,
                        "read failed"
                    );
                    Reading::failure(
                        timestamp,
                        &device.name,
                        &device.host,
                        device.port,
                        device.unit_id,
                        format!("{} unit {}: {}", device.endpoint(), device.unit_id, e),
                    )
                }
            };
            self.log.push(reading);
        }
    }
}
