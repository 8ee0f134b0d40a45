use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

/// Capacity of the reading notification channel. Slow subscribers that fall
/// further behind than this miss readings rather than stalling the poller.
const NOTIFY_CAPACITY: usize = 256;

/// The outcome of one poll attempt: register data or a diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingOutcome {
    /// Registers returned by the device, in request order.
    Success { registers: Vec<u16> },
    /// Why the attempt failed, including the failure kind and the device
    /// addressing.
    Failure { error: String },
}

/// Immutable record of one poll attempt against one device.
///
/// The device fields are a snapshot taken when the attempt started, so a
/// reading stays meaningful even after the device list is edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Unix epoch milliseconds, taken before the exchange began.
    pub timestamp: i64,

    /// Device display name.
    pub device: String,

    /// Device host (IP or hostname).
    pub host: String,

    /// Device TCP port.
    pub port: u16,

    /// Modbus unit/slave id.
    pub unit_id: u8,

    /// Register values or an error description.
    #[serde(flatten)]
    pub outcome: ReadingOutcome,
}

impl Reading {
    /// Create a successful reading.
    pub fn success(
        timestamp: i64,
        device: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        unit_id: u8,
        registers: Vec<u16>,
    ) -> Self {
        Self {
            timestamp,
            device: device.into(),
            host: host.into(),
            port,
            unit_id,
            outcome: ReadingOutcome::Success { registers },
        }
    }

    /// Create a failed reading.
    pub fn failure(
        timestamp: i64,
        device: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        unit_id: u8,
        error: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            device: device.into(),
            host: host.into(),
            port,
            unit_id,
            outcome: ReadingOutcome::Failure {
                error: error.into(),
            },
        }
    }

    /// Whether this attempt produced register data.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ReadingOutcome::Success { .. })
    }

    /// Register values, if the attempt succeeded.
    pub fn registers(&self) -> Option<&[u16]> {
        match &self.outcome {
            ReadingOutcome::Success { registers } => Some(registers),
            ReadingOutcome::Failure { .. } => None,
        }
    }

    /// Error description, if the attempt failed.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ReadingOutcome::Success { .. } => None,
            ReadingOutcome::Failure { error } => Some(error),
        }
    }
}

/// Newest-first, append-only log of poll outcomes.
///
/// The poller is the only writer: one insertion at the front per attempt.
/// Readers take snapshots and may do so concurrently with insertion;
/// `clear` is the only removal operation.
#[derive(Debug)]
pub struct ReadingLog {
    readings: RwLock<VecDeque<Reading>>,
    notify: broadcast::Sender<Reading>,
}

impl ReadingLog {
    /// Create an empty log.
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            readings: RwLock::new(VecDeque::new()),
            notify,
        }
    }

    /// Insert a reading at the front and notify subscribers.
    pub fn push(&self, reading: Reading) {
        self.readings.write().push_front(reading.clone());
        // No receivers is fine; notification is best-effort.
        let _ = self.notify.send(reading);
    }

    /// Copy of the current log, newest first.
    pub fn snapshot(&self) -> Vec<Reading> {
        self.readings.read().iter().cloned().collect()
    }

    /// Number of recorded readings.
    pub fn len(&self) -> usize {
        self.readings.read().len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.readings.read().is_empty()
    }

    /// Remove all readings.
    pub fn clear(&self) {
        self.readings.write().clear();
    }

    /// Subscribe to reading insertions, one notification per reading.
    pub fn subscribe(&self) -> broadcast::Receiver<Reading> {
        self.notify.subscribe()
    }
}

impl Default for ReadingLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Get the current timestamp in milliseconds since Unix epoch.
///
/// Returns 0 if system time is before Unix epoch (should never happen in
/// practice).
pub fn current_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
