//! [`FailureGuard`] – consecutive-failure detector for the I/O cycle.
//!
//! A single dropped sample or rejected command is tolerated: the adapter
//! reports it and carries on with last-known data.  A run of failures is not.
//! The guard counts failures in a row and trips once that run exceeds the
//! configured threshold, at which point the adapter halts all motion.
//!
//! # Example
//!
//! ```rust
//! use marsha_hal::fault_guard::FailureGuard;
//!
//! let mut guard = FailureGuard::new(2);
//!
//! assert!(!guard.record_failure());
//! assert!(!guard.record_failure());
//! assert!(guard.record_failure()); // third in a row → trip
//!
//! // A clean cycle before the trip would have cleared the run; after the
//! // trip only an explicit reset does.
//! guard.record_success();
//! assert!(guard.is_tripped());
//! guard.reset();
//! assert!(!guard.is_tripped());
//! ```

// ─────────────────────────────────────────────────────────────────────────────
// FailureGuard
// ─────────────────────────────────────────────────────────────────────────────

/// Counts consecutive I/O failures and latches once they exceed a threshold.
#[derive(Debug, Clone)]
pub struct FailureGuard {
    /// Largest number of consecutive failures that is still tolerated.
    threshold: u32,
    /// Length of the current failure run.
    consecutive: u32,
    /// Failures recorded since construction.
    total: u64,
    tripped: bool,
}

impl FailureGuard {
    /// Create a guard that tolerates up to `threshold` consecutive failures.
    ///
    /// A `threshold` of 0 trips on the very first failure.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive: 0,
            total: 0,
            tripped: false,
        }
    }

    /// Record a failed cycle.
    ///
    /// Returns `true` when this failure makes the run exceed the threshold,
    /// or when the guard had already tripped.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.total += 1;
        if self.consecutive > self.threshold {
            self.tripped = true;
        }
        self.tripped
    }

    /// Record a clean cycle.  Ends the current failure run unless the guard
    /// has already tripped.
    pub fn record_success(&mut self) {
        if !self.tripped {
            self.consecutive = 0;
        }
    }

    /// `true` once the threshold has been exceeded and until [`reset`](Self::reset).
    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Clear the latch and the current run.  The lifetime total is kept.
    pub fn reset(&mut self) {
        self.consecutive = 0;
        self.tripped = false;
    }
}
