use std::fmt;
use std::str::FromStr;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// Minutes in a day; slot boundaries live in `[0, MINUTES_PER_DAY)`.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// A class-bearing day of the week. Sunday carries no classes and is
/// deliberately unrepresentable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ClassDay {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
}

impl ClassDay {
    pub const ALL: [ClassDay; 6] = [
        ClassDay::Mon,
        ClassDay::Tue,
        ClassDay::Wed,
        ClassDay::Thu,
        ClassDay::Fri,
        ClassDay::Sat,
    ];

    /// Monday = 0 .. Saturday = 5. Stable; trigger ids are packed from it.
    pub fn index(self) -> u8 {
        match self {
            ClassDay::Mon => 0,
            ClassDay::Tue => 1,
            ClassDay::Wed => 2,
            ClassDay::Thu => 3,
            ClassDay::Fri => 4,
            ClassDay::Sat => 5,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// `None` for Sunday.
    pub fn from_weekday(weekday: Weekday) -> Option<Self> {
        match weekday {
            Weekday::Mon => Some(ClassDay::Mon),
            Weekday::Tue => Some(ClassDay::Tue),
            Weekday::Wed => Some(ClassDay::Wed),
            Weekday::Thu => Some(ClassDay::Thu),
            Weekday::Fri => Some(ClassDay::Fri),
            Weekday::Sat => Some(ClassDay::Sat),
            Weekday::Sun => None,
        }
    }

    pub fn weekday(self) -> Weekday {
        match self {
            ClassDay::Mon => Weekday::Mon,
            ClassDay::Tue => Weekday::Tue,
            ClassDay::Wed => Weekday::Wed,
            ClassDay::Thu => Weekday::Thu,
            ClassDay::Fri => Weekday::Fri,
            ClassDay::Sat => Weekday::Sat,
        }
    }

    /// The short name used by timetable row headers ("Mon" .. "Sat").
    pub fn short_name(self) -> &'static str {
        match self {
            ClassDay::Mon => "Mon",
            ClassDay::Tue => "Tue",
            ClassDay::Wed => "Wed",
            ClassDay::Thu => "Thu",
            ClassDay::Fri => "Fri",
            ClassDay::Sat => "Sat",
        }
    }
}

impl fmt::Display for ClassDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for ClassDay {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClassDay::ALL
            .iter()
            .copied()
            .find(|d| s.eq_ignore_ascii_case(d.short_name()))
            .ok_or(())
    }
}

/// One recurring weekly class occurrence.
///
/// Produced in bulk by the timetable parser; the whole set is replaced
/// atomically on every fresh parse and individual slots are never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSlot {
    pub day: ClassDay,
    /// Minute of day the class starts, in `[0, 1440)`.
    pub start_min: u16,
    /// Minute of day the class ends; always greater than `start_min`.
    pub end_min: u16,
    /// Opaque subject code, display-only. Non-empty.
    pub label: String,
}

impl ClassSlot {
    /// Boundaries in range, non-inverted, non-empty label.
    pub fn is_valid(&self) -> bool {
        self.start_min < self.end_min
            && self.end_min <= MINUTES_PER_DAY
            && !self.label.is_empty()
    }

    /// Whether `minute` falls inside the half-open interval `[start, end)`.
    pub fn covers(&self, minute: u16) -> bool {
        minute >= self.start_min && minute < self.end_min
    }

    /// A copy of this slot moved to another day. Used for Saturday
    /// compensation; the copy gets its own trigger identities because
    /// the day participates in the id.
    pub fn redated(&self, day: ClassDay) -> Self {
        Self {
            day,
            ..self.clone()
        }
    }
}

impl fmt::Display for ClassSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02}:{:02}-{:02}:{:02} {}",
            self.day,
            self.start_min / 60,
            self.start_min % 60,
            self.end_min / 60,
            self.end_min % 60,
            self.label
        )
    }
}

/// How Saturday is treated: a holiday, or a copy of one weekday's schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "day", rename_all = "snake_case")]
pub enum CompensationRule {
    #[default]
    None,
    /// Saturday runs the named weekday's slots, re-dated to Saturday.
    /// Only Mon..Fri are meaningful here; `Sat` is rejected at the API edge.
    FollowsDay(ClassDay),
}
