//! OS-boundary ports.
//!
//! The engine drives two host capabilities it does not own: a wake-up timer
//! and the device-wide interruption filter. Both are narrow traits so the
//! host supplies the real OS bindings and tests supply fakes.

use thiserror::Error;

use crate::trigger::TriggerId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// The OS refused exact wake-up scheduling. The engine degrades to
    /// periodic-tick-only correction.
    #[error("exact wake-up scheduling unavailable")]
    ExactUnavailable,

    /// The OS rejected this particular registration.
    #[error("timer registration rejected: {0}")]
    Rejected(String),
}

/// One-shot wake-up timer. Registrations must survive device sleep
/// (exact wake semantics) where the platform allows it.
pub trait TimerPort {
    /// Register (or overwrite) a wake-up for `id` at `epoch_ms`.
    fn schedule_at(&self, id: TriggerId, epoch_ms: i64) -> Result<(), TimerError>;

    /// Remove the wake-up for `id`, if any. Cancelling an unknown id is a
    /// no-op; callers cancel whole recomputed id spaces.
    fn cancel(&self, id: TriggerId);
}

/// The device-wide "mute notifications" capability.
pub trait InterruptionFilterPort {
    /// Set the filter. Returns whether the change was applied; always
    /// `false` (and a no-op) when the capability is not granted.
    fn set_filter(&self, on: bool) -> bool;

    /// The live filter state, regardless of who set it.
    fn filter_on(&self) -> bool;

    /// Whether the host granted access to the filter capability.
    fn capability_granted(&self) -> bool;
}
