//! Trigger planning.
//!
//! Pure functions from `(slots, compensation rule, now)` to the concrete
//! set of future triggers. Planning is idempotent: identical inputs and an
//! identical `now` produce an identical, deterministically ordered set, so
//! replanning is always safe and cancel-by-id always finds its targets.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDateTime, NaiveTime, TimeZone};
use tracing::warn;

use super::{Trigger, TriggerId, TriggerKind};
use crate::timetable::{ClassDay, ClassSlot, CompensationRule};

/// The slot set the engine actually runs: the parsed slots plus, when a
/// compensation rule is active, Saturday re-dated copies of the followed
/// weekday. The copies carry independent trigger identities, so cancelling
/// the weekday's triggers never touches Saturday's.
pub fn effective_slots(slots: &[ClassSlot], rule: CompensationRule) -> Vec<ClassSlot> {
    let mut out = slots.to_vec();
    if let CompensationRule::FollowsDay(followed) = rule {
        if followed == ClassDay::Sat {
            warn!("compensation rule points at Saturday itself; ignoring");
        } else {
            out.extend(
                slots
                    .iter()
                    .filter(|s| s.day == followed)
                    .map(|s| s.redated(ClassDay::Sat)),
            );
        }
    }
    out.sort_by(|a, b| (a.day, a.start_min, a.end_min).cmp(&(b.day, b.start_min, b.end_min)));
    out
}

/// Compute the full trigger set for a schedule: one On trigger at each
/// slot start and one Off trigger at each slot end, anchored to the next
/// future occurrence of that weekday/time relative to `now`.
pub fn plan<Tz: TimeZone>(
    slots: &[ClassSlot],
    rule: CompensationRule,
    now: &DateTime<Tz>,
) -> Vec<Trigger> {
    let mut triggers = Vec::new();
    for slot in effective_slots(slots, rule) {
        if !slot.is_valid() {
            warn!(slot = %slot, "skipping invalid slot");
            continue;
        }
        for (minute, kind) in [
            (slot.start_min, TriggerKind::On),
            (slot.end_min, TriggerKind::Off),
        ] {
            let Some(fire_at_epoch_ms) = next_occurrence(slot.day, minute, now) else {
                warn!(slot = %slot, minute, "no resolvable local time; trigger skipped");
                continue;
            };
            triggers.push(Trigger {
                id: TriggerId::new(slot.day, minute, kind),
                fire_at_epoch_ms,
                kind,
                day: slot.day,
                minute,
            });
        }
    }
    triggers.sort_by_key(|t| (t.fire_at_epoch_ms, t.id));
    // Overlapping slots can share a boundary; one trigger per identity.
    triggers.dedup_by_key(|t| t.id);
    triggers
}

/// Epoch milliseconds of the next occurrence of `(day, minute)` strictly
/// after `now`. If the same weekday/time today has already passed, the
/// anchor moves a week ahead.
pub fn next_occurrence<Tz: TimeZone>(
    day: ClassDay,
    minute: u16,
    now: &DateTime<Tz>,
) -> Option<i64> {
    let time = NaiveTime::from_hms_opt(minute as u32 / 60, minute as u32 % 60, 0)?;
    let days_ahead = (day.weekday().num_days_from_monday() as i64
        - now.weekday().num_days_from_monday() as i64)
        .rem_euclid(7);
    let date = now.date_naive() + Duration::days(days_ahead);

    let tz = now.timezone();
    let candidate = resolve_local(&tz, date.and_time(time))?;
    let candidate = if candidate <= *now {
        resolve_local(&tz, (date + Duration::days(7)).and_time(time))?
    } else {
        candidate
    };
    Some(candidate.timestamp_millis())
}

/// Map a wall-clock time into `Tz`. A DST fold picks the earlier instant;
/// a spring-forward gap slides to the first valid instant after it.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => tz.from_local_datetime(&(naive + Duration::hours(1))).earliest(),
    }
}
