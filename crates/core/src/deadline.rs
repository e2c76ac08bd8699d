//! Cooperative per-event deadlines.
//!
//! Every detector invocation carries a [`Deadline`] and checks it at its own
//! checkpoints (per simulated hop, per position batch). Exceeding the budget
//! abandons the invocation; there is no forced preemption.

use std::time::{Duration, Instant};

use crate::error::DetectError;

/// Deadline token threaded through a detector invocation.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    /// A deadline that never fires (tests and offline replays).
    pub fn unbounded() -> Self {
        Self {
            at: Instant::now() + Duration::from_secs(3_600),
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Checkpoint: `Err(DeadlineExceeded)` once the budget is spent.
    pub fn check(&self) -> Result<(), DetectError> {
        if self.expired() {
            Err(DetectError::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    /// Remaining budget, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_deadline_passes() {
        let deadline = Deadline::after(Duration::from_secs(10));
        assert!(!deadline.expired());
        assert!(deadline.check().is_ok());
        assert!(deadline.remaining() > Duration::from_secs(9));
    }

    #[test]
    fn test_expired_deadline_fails_checkpoint() {
        let deadline = Deadline::after(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(deadline.expired());
        assert!(matches!(
            deadline.check(),
            Err(DetectError::DeadlineExceeded)
        ));
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }
}
