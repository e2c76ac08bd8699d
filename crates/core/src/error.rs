//! Detector-side error taxonomy.

use thiserror::Error;

use mevscan_state::StateError;

/// Errors raised inside a detector invocation. Every variant is isolated to
/// the invocation that produced it; none propagates past the orchestrator.
#[derive(Debug, Error)]
pub enum DetectError {
    /// Cooperative deadline fired at a checkpoint.
    #[error("detection deadline exceeded")]
    DeadlineExceeded,

    /// Required price missing from the snapshot.
    #[error("no price for asset {0}")]
    MissingPrice(String),

    /// Underlying state/pricing fault (zero reserve, unknown pool, ...).
    #[error(transparent)]
    State(#[from] StateError),
}
