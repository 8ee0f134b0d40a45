//! Transaction id authority.

use std::sync::atomic::{AtomicU16, Ordering};

/// Monotonically wrapping 16-bit transaction id counter.
///
/// One process-wide instance serves every exchange, so simultaneous Modbus
/// traffic from the same installation never reuses an id for concurrent
/// requests on the same stream. Sequential polling means wraparound is the
/// only collision handling required.
#[derive(Debug, Default)]
pub struct TransactionIdGenerator {
    next: AtomicU16,
}

impl TransactionIdGenerator {
    /// Create a generator starting at id 0.
    pub const fn new() -> Self {
        Self {
            next: AtomicU16::new(0),
        }
    }

    /// Return the current id and advance, wrapping 65535 back to 0.
    pub fn next_id(&self) -> u16 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

static GLOBAL: TransactionIdGenerator = TransactionIdGenerator::new();

/// Next transaction id from the process-wide generator.
pub fn next_transaction_id() -> u16 {
    GLOBAL.next_id()
}
