mod planner;

pub use planner::{effective_slots, next_occurrence, plan};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::timetable::{ClassDay, MINUTES_PER_DAY};

/// Which way a trigger drives the interruption filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    On,
    Off,
}

impl TriggerKind {
    fn code(self) -> u32 {
        match self {
            TriggerKind::Off => 0,
            TriggerKind::On => 1,
        }
    }

    fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(TriggerKind::Off),
            1 => Some(TriggerKind::On),
            _ => None,
        }
    }
}

/// Stable trigger identity, a pure function of `(day, minute, kind)`.
///
/// Packed decimally -- `day * 100_000 + minute * 10 + kind` -- so the id
/// space for any persisted schedule can be recomputed at will: cancelling
/// a plan never needs a live registry of what was scheduled, and replanning
/// an unchanged schedule reproduces identical ids.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TriggerId(u32);

impl TriggerId {
    pub fn new(day: ClassDay, minute: u16, kind: TriggerKind) -> Self {
        Self(day.index() as u32 * 100_000 + minute as u32 * 10 + kind.code())
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// Recover `(day, minute, kind)`. `None` for ids outside the packed
    /// space (a foreign or corrupted id).
    pub fn decode(self) -> Option<(ClassDay, u16, TriggerKind)> {
        let day = ClassDay::from_index((self.0 / 100_000) as u8)?;
        let minute = (self.0 / 10) % 10_000;
        if minute >= MINUTES_PER_DAY as u32 {
            return None;
        }
        let kind = TriggerKind::from_code(self.0 % 10)?;
        Some((day, minute as u16, kind))
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single scheduled future point-in-time filter action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: TriggerId,
    /// Epoch milliseconds of the next occurrence of `(day, minute)`.
    pub fire_at_epoch_ms: i64,
    pub kind: TriggerKind,
    pub day: ClassDay,
    pub minute: u16,
}
