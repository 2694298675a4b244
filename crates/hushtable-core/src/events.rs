use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timetable::CompensationRule;

/// Why the engine touched the interruption filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterCause {
    /// A planned trigger fired.
    Trigger,
    /// The periodic tick (or an equivalent re-evaluation) corrected drift.
    Reconcile,
    /// Scheduling was just enabled inside a slot.
    Enable,
    /// Scheduling was disabled while the engine owned the filter.
    Disable,
}

/// Every externally observable engine action produces an Event.
/// The host subscribes to them; nothing in the core consumes its own events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    FilterApplied {
        on: bool,
        cause: FilterCause,
        at: DateTime<Utc>,
    },
    SchedulingEnabled {
        trigger_count: usize,
        initially_on: bool,
        at: DateTime<Utc>,
    },
    SchedulingDisabled {
        at: DateTime<Utc>,
    },
    ScheduleReplaced {
        slot_count: usize,
        at: DateTime<Utc>,
    },
    CompensationChanged {
        rule: CompensationRule,
        at: DateTime<Utc>,
    },
    /// A full replan completed (schedule change, rule change, clock change).
    TriggersPlanned {
        count: usize,
        at: DateTime<Utc>,
    },
    /// A fired trigger no longer belongs to the current plan and was
    /// dropped instead of applied.
    StaleTriggerDropped {
        id: u32,
        at: DateTime<Utc>,
    },
    /// The filter capability is missing; the host should ask the user.
    PermissionRequired {
        at: DateTime<Utc>,
    },
}
