//! Cross-thread reference-frame reset protocol.
//!
//! An asynchronous trigger (service call, operator command) can request that
//! the next visual frame be promoted to a new reference. The request is a
//! single flag behind a lock: set idempotently from any thread, consumed
//! exactly once when the next measurement is handled, never applied
//! retroactively to a measurement already in flight.

use parking_lot::Mutex;

/// Shared reset-request flag. Clone the surrounding `Arc` to hand one side
/// to the trigger and the other to the filter core.
#[derive(Debug, Default)]
pub struct ReferenceResetController {
    next_is_reference_requested: Mutex<bool>,
}

impl ReferenceResetController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the next visual frame become the reference. Idempotent:
    /// repeated calls before consumption collapse to one pending reset.
    /// Returns the acknowledgment sent back to the trigger.
    pub fn request(&self) -> bool {
        *self.next_is_reference_requested.lock() = true;
        true
    }

    /// Read and clear the pending flag, returning its prior value. Called
    /// exactly once per incoming visual measurement.
    pub fn consume_if_pending(&self) -> bool {
        std::mem::take(&mut *self.next_is_reference_requested.lock())
    }

    /// Non-consuming peek, for diagnostics only.
    pub fn is_pending(&self) -> bool {
        *self.next_is_reference_requested.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_request_then_consume() {
        let ctl = ReferenceResetController::new();
        assert!(!ctl.consume_if_pending());

        assert!(ctl.request());
        assert!(ctl.is_pending());
        assert!(ctl.consume_if_pending());
        assert!(!ctl.consume_if_pending());
    }

    #[test]
    fn test_requests_collapse_to_one_pending_reset() {
        let ctl = ReferenceResetController::new();
        ctl.request();
        ctl.request();
        ctl.request();

        assert!(ctl.consume_if_pending());
        assert!(!ctl.consume_if_pending());
    }

    #[test]
    fn test_concurrent_requests_consumed_once() {
        let ctl = Arc::new(ReferenceResetController::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ctl = ctl.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        ctl.request();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert!(ctl.consume_if_pending());
        assert!(!ctl.consume_if_pending());
    }
}
