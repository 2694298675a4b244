//! Schedule reconciliation.
//!
//! The engine is the single owner of filter-state decisions while
//! scheduling is enabled. It is a small state machine invoked from several
//! asynchronous entry points -- trigger delivery, the periodic tick, user
//! actions -- all serialized by the caller (the service loop holds one
//! mutex around every pass).
//!
//! ## State Transitions
//!
//! ```text
//! Disabled -> (EnabledOff | EnabledOn) -> Disabled
//! ```
//!
//! Within one pass the desired state is always computed before it is
//! applied. Correction does not depend on triggers arriving on time: the
//! periodic tick re-derives "should the filter be on" from the store and
//! fixes drift, which also covers missed or delayed wake-ups.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ports::{InterruptionFilterPort, TimerError, TimerPort};
use crate::error::EngineError;
use crate::events::{Event, FilterCause};
use crate::storage::ScheduleStore;
use crate::timetable::{ClassDay, ClassSlot, CompensationRule};
use crate::trigger::{effective_slots, next_occurrence, plan, Trigger, TriggerId, TriggerKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Disabled,
    /// Scheduling on, filter currently off.
    EnabledOff,
    /// Scheduling on, filter currently on.
    EnabledOn,
}

/// Host-facing view of the engine at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: EngineState,
    pub filter_on: bool,
    /// Label of a slot covering "now", if any.
    pub current_class: Option<String>,
    /// The earliest planned transition.
    pub next_trigger: Option<Trigger>,
    pub at: DateTime<Utc>,
}

/// The reconciliation engine. Owns the store and the two OS ports;
/// constructed once at process start and shared behind a mutex.
pub struct ReconciliationEngine<T, F> {
    store: ScheduleStore,
    timer: T,
    filter: F,
    state: EngineState,
    exact_timer_warned: bool,
}

impl<T: TimerPort, F: InterruptionFilterPort> ReconciliationEngine<T, F> {
    /// Restore engine state from the persisted record.
    pub fn new(store: ScheduleStore, timer: T, filter: F) -> Self {
        let state = if store.scheduling_enabled() {
            if store.last_filter_on() {
                EngineState::EnabledOn
            } else {
                EngineState::EnabledOff
            }
        } else {
            EngineState::Disabled
        };
        Self {
            store,
            timer,
            filter,
            state,
            exact_timer_warned: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn store(&self) -> &ScheduleStore {
        &self.store
    }

    pub fn status<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> StatusSnapshot {
        let (slots, rule) = self.store.get();
        StatusSnapshot {
            state: self.state,
            filter_on: self.filter.filter_on(),
            current_class: covering_slot(&slots, rule, now).map(|s| s.label),
            next_trigger: plan(&slots, rule, now).into_iter().next(),
            at: Utc::now(),
        }
    }

    // ── User actions ─────────────────────────────────────────────────

    /// Turn scheduling on: plan the full trigger set, register it, and
    /// immediately evaluate whether "now" is inside a class.
    ///
    /// With no timetable data this is a logged no-op (the host explains
    /// why); without the filter capability it fails with
    /// [`EngineError::PermissionRequired`].
    pub fn enable<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<Vec<Event>, EngineError> {
        if !self.filter.capability_granted() {
            return Err(EngineError::PermissionRequired);
        }
        let (slots, rule) = self.store.get();
        if slots.is_empty() {
            warn!("no timetable data available; scheduling not enabled");
            return Ok(Vec::new());
        }

        // Cancel anything a previous run may have left behind, then plan
        // fresh. The id space is deterministic, so this needs no registry.
        self.cancel_id_space(&slots, rule);
        let triggers = plan(&slots, rule, now);
        self.register(&triggers);
        self.store.set_scheduling_enabled(true)?;

        let initially_on = covering_slot(&slots, rule, now).is_some();
        self.state = if initially_on {
            EngineState::EnabledOn
        } else {
            EngineState::EnabledOff
        };
        info!(trigger_count = triggers.len(), initially_on, "scheduling enabled");

        let mut events = vec![Event::SchedulingEnabled {
            trigger_count: triggers.len(),
            initially_on,
            at: Utc::now(),
        }];
        events.extend(self.reconcile(now, FilterCause::Enable)?);
        Ok(events)
    }

    /// Turn scheduling off and release the filter.
    ///
    /// Cancellation recomputes the deterministic id space from the
    /// persisted schedule, so it works even after a process restart with
    /// no in-memory trigger list. The filter is only forced off when the
    /// engine itself last set it.
    pub fn disable(&mut self) -> Result<Vec<Event>, EngineError> {
        let (slots, rule) = self.store.get();
        self.cancel_id_space(&slots, rule);

        let mut events = Vec::new();
        if self.store.last_set_by_engine() {
            events.extend(self.apply_filter(false, FilterCause::Disable)?);
        }
        self.store.set_scheduling_enabled(false)?;
        self.state = EngineState::Disabled;
        info!("scheduling disabled");
        events.push(Event::SchedulingDisabled { at: Utc::now() });
        Ok(events)
    }

    /// Atomically replace the slot set and replan everything.
    pub fn replace_schedule<Tz: TimeZone>(
        &mut self,
        slots: Vec<ClassSlot>,
        now: &DateTime<Tz>,
    ) -> Result<Vec<Event>, EngineError> {
        let (old_slots, rule) = self.store.get();
        self.cancel_id_space(&old_slots, rule);

        let slot_count = slots.len();
        self.store.replace(slots)?;
        let mut events = vec![Event::ScheduleReplaced {
            slot_count,
            at: Utc::now(),
        }];
        if self.store.scheduling_enabled() {
            events.extend(self.replan(now)?);
        }
        Ok(events)
    }

    /// Change how Saturday maps onto a weekday. Only Saturday's triggers
    /// are replanned; weekday identities are untouched, so a Saturday
    /// cancel can never take a weekday's triggers with it.
    pub fn set_compensation<Tz: TimeZone>(
        &mut self,
        rule: CompensationRule,
        now: &DateTime<Tz>,
    ) -> Result<Vec<Event>, EngineError> {
        if rule == CompensationRule::FollowsDay(ClassDay::Sat) {
            return Err(EngineError::InvalidCompensation);
        }

        let (slots, old_rule) = self.store.get();
        for id in id_space(&slots, old_rule) {
            if matches!(id.decode(), Some((ClassDay::Sat, _, _))) {
                self.timer.cancel(id);
            }
        }
        self.store.set_compensation(rule)?;

        let mut events = vec![Event::CompensationChanged {
            rule,
            at: Utc::now(),
        }];
        if self.store.scheduling_enabled() {
            let saturday: Vec<Trigger> = plan(&slots, rule, now)
                .into_iter()
                .filter(|t| t.day == ClassDay::Sat)
                .collect();
            self.register(&saturday);
            events.push(Event::TriggersPlanned {
                count: saturday.len(),
                at: Utc::now(),
            });
            if ClassDay::from_weekday(now.weekday()) == Some(ClassDay::Sat) {
                events.extend(self.reconcile(now, FilterCause::Reconcile)?);
            }
        }
        Ok(events)
    }

    // ── Wake sources ─────────────────────────────────────────────────

    /// A planned trigger fired. Applies the trigger's action and re-arms
    /// the same identity for its next weekly occurrence; a trigger no
    /// longer in the current plan is cancelled and dropped instead.
    pub fn handle_trigger<Tz: TimeZone>(
        &mut self,
        id: TriggerId,
        now: &DateTime<Tz>,
    ) -> Result<Vec<Event>, EngineError> {
        if !self.store.scheduling_enabled() {
            debug!(%id, "trigger fired while disabled; ignored");
            return Ok(Vec::new());
        }

        let (slots, rule) = self.store.get();
        let decoded = id.decode().filter(|_| id_space(&slots, rule).contains(&id));
        let Some((day, minute, kind)) = decoded else {
            warn!(%id, "stale trigger; cancelling");
            self.timer.cancel(id);
            return Ok(vec![Event::StaleTriggerDropped {
                id: id.raw(),
                at: Utc::now(),
            }]);
        };

        let on = kind == TriggerKind::On;
        let events = self.apply_filter(on, FilterCause::Trigger)?;
        self.state = if self.filter.filter_on() {
            EngineState::EnabledOn
        } else {
            EngineState::EnabledOff
        };

        // Weekly recurrence on a one-shot timer: re-arm from `now`, never
        // from the old fire time, so a delayed delivery cannot re-arm
        // into the past.
        match next_occurrence(day, minute, now) {
            Some(fire_at) => self.schedule_one(id, fire_at),
            None => warn!(%id, "no resolvable next occurrence; trigger not re-armed"),
        }
        Ok(events)
    }

    /// The periodic self-healing pass: recompute "should the filter be
    /// on" from first principles and correct the live state if it
    /// disagrees. Tolerates missed and delayed triggers.
    pub fn handle_tick<Tz: TimeZone>(
        &mut self,
        now: &DateTime<Tz>,
    ) -> Result<Vec<Event>, EngineError> {
        self.reconcile(now, FilterCause::Reconcile)
    }

    /// Wall clock or timezone moved: every planned fire time is invalid.
    pub fn handle_clock_changed<Tz: TimeZone>(
        &mut self,
        now: &DateTime<Tz>,
    ) -> Result<Vec<Event>, EngineError> {
        if !self.store.scheduling_enabled() {
            return Ok(Vec::new());
        }
        info!("clock or timezone changed; replanning all triggers");
        self.resync(now)
    }

    /// Cancel and rebuild the entire trigger set from the persisted
    /// schedule, then reconcile. No-op while disabled.
    pub fn resync<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<Vec<Event>, EngineError> {
        if !self.store.scheduling_enabled() {
            return Ok(Vec::new());
        }
        let (slots, rule) = self.store.get();
        self.cancel_id_space(&slots, rule);
        self.replan(now)
    }

    // ── Internal ─────────────────────────────────────────────────────

    /// Plan + register + reconcile for the current persisted schedule.
    fn replan<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<Vec<Event>, EngineError> {
        let (slots, rule) = self.store.get();
        let triggers = plan(&slots, rule, now);
        self.register(&triggers);
        let mut events = vec![Event::TriggersPlanned {
            count: triggers.len(),
            at: Utc::now(),
        }];
        events.extend(self.reconcile(now, FilterCause::Reconcile)?);
        Ok(events)
    }

    /// Compute desired state, then apply it. Never fights a filter the
    /// user set manually: an unwanted ON is only reverted when the engine
    /// was the one who set it.
    fn reconcile<Tz: TimeZone>(
        &mut self,
        now: &DateTime<Tz>,
        cause: FilterCause,
    ) -> Result<Vec<Event>, EngineError> {
        if !self.store.scheduling_enabled() {
            return Ok(Vec::new());
        }
        let (slots, rule) = self.store.get();
        let covering = covering_slot(&slots, rule, now);
        let desired_on = covering.is_some();
        let live_on = self.filter.filter_on();

        let events = if desired_on && !live_on {
            debug!(class = ?covering.as_ref().map(|s| &s.label), "inside a slot, filter off; correcting");
            self.apply_filter(true, cause)?
        } else if !desired_on && live_on && self.store.last_set_by_engine() {
            debug!("outside all slots, engine-owned filter on; correcting");
            self.apply_filter(false, cause)?
        } else {
            Vec::new()
        };

        self.state = if self.filter.filter_on() {
            EngineState::EnabledOn
        } else {
            EngineState::EnabledOff
        };
        Ok(events)
    }

    /// Drive the port and persist what we did. A missing capability
    /// surfaces as a `PermissionRequired` event (wake-source paths have
    /// no caller to return an error to).
    fn apply_filter(&mut self, on: bool, cause: FilterCause) -> Result<Vec<Event>, EngineError> {
        if !self.filter.set_filter(on) {
            warn!(on, "interruption filter change rejected; capability missing");
            return Ok(vec![Event::PermissionRequired { at: Utc::now() }]);
        }
        // Ownership follows the ON state: turning the filter off hands it
        // back to the user.
        self.store.set_filter_state(on, on)?;
        info!(on, ?cause, "interruption filter set");
        Ok(vec![Event::FilterApplied {
            on,
            cause,
            at: Utc::now(),
        }])
    }

    fn register(&mut self, triggers: &[Trigger]) {
        for t in triggers {
            self.schedule_one(t.id, t.fire_at_epoch_ms);
        }
    }

    fn schedule_one(&mut self, id: TriggerId, fire_at_epoch_ms: i64) {
        match self.timer.schedule_at(id, fire_at_epoch_ms) {
            Ok(()) => {}
            Err(TimerError::ExactUnavailable) => {
                if !self.exact_timer_warned {
                    warn!("exact wake-ups unavailable; relying on periodic reconciliation only");
                    self.exact_timer_warned = true;
                }
            }
            Err(e) => warn!(%id, error = %e, "trigger registration failed"),
        }
    }

    fn cancel_id_space(&mut self, slots: &[ClassSlot], rule: CompensationRule) {
        let ids = id_space(slots, rule);
        debug!(count = ids.len(), "cancelling trigger id space");
        for id in ids {
            self.timer.cancel(id);
        }
    }
}

/// The complete deterministic trigger identity space for a schedule.
fn id_space(slots: &[ClassSlot], rule: CompensationRule) -> HashSet<TriggerId> {
    let mut ids = HashSet::new();
    for slot in effective_slots(slots, rule) {
        if !slot.is_valid() {
            continue;
        }
        ids.insert(TriggerId::new(slot.day, slot.start_min, TriggerKind::On));
        ids.insert(TriggerId::new(slot.day, slot.end_min, TriggerKind::Off));
    }
    ids
}

/// The slot covering `now` under the effective schedule, if any.
/// Overlapping slots are fine: any cover means "on".
fn covering_slot<Tz: TimeZone>(
    slots: &[ClassSlot],
    rule: CompensationRule,
    now: &DateTime<Tz>,
) -> Option<ClassSlot> {
    let day = ClassDay::from_weekday(now.weekday())?;
    let minute = (now.hour() * 60 + now.minute()) as u16;
    effective_slots(slots, rule)
        .into_iter()
        .find(|s| s.day == day && s.covers(minute))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use chrono::TimeZone as _;
    use chrono::Utc;

    use crate::storage::PrefsDb;

    #[derive(Clone, Default)]
    struct FakeTimer {
        scheduled: Arc<Mutex<Vec<(TriggerId, i64)>>>,
        cancelled: Arc<Mutex<Vec<TriggerId>>>,
        exact_unavailable: bool,
    }

    impl TimerPort for FakeTimer {
        fn schedule_at(&self, id: TriggerId, epoch_ms: i64) -> Result<(), TimerError> {
            if self.exact_unavailable {
                return Err(TimerError::ExactUnavailable);
            }
            self.scheduled.lock().unwrap().push((id, epoch_ms));
            Ok(())
        }

        fn cancel(&self, id: TriggerId) {
            self.cancelled.lock().unwrap().push(id);
        }
    }

    #[derive(Clone)]
    struct FakeFilter {
        on: Arc<AtomicBool>,
        granted: bool,
    }

    impl FakeFilter {
        fn granted() -> Self {
            Self {
                on: Arc::new(AtomicBool::new(false)),
                granted: true,
            }
        }

        fn denied() -> Self {
            Self {
                on: Arc::new(AtomicBool::new(false)),
                granted: false,
            }
        }
    }

    impl InterruptionFilterPort for FakeFilter {
        fn set_filter(&self, on: bool) -> bool {
            if !self.granted {
                return false;
            }
            self.on.store(on, Ordering::SeqCst);
            true
        }

        fn filter_on(&self) -> bool {
            self.on.load(Ordering::SeqCst)
        }

        fn capability_granted(&self) -> bool {
            self.granted
        }
    }

    fn slot(day: ClassDay, start_min: u16, end_min: u16, label: &str) -> ClassSlot {
        ClassSlot {
            day,
            start_min,
            end_min,
            label: label.into(),
        }
    }

    fn engine_with(
        slots: Vec<ClassSlot>,
        filter: FakeFilter,
    ) -> ReconciliationEngine<FakeTimer, FakeFilter> {
        let store = ScheduleStore::with_db(PrefsDb::open_memory().unwrap()).unwrap();
        store.replace(slots).unwrap();
        ReconciliationEngine::new(store, FakeTimer::default(), filter)
    }

    // Wednesday 2025-09-03.
    fn wed(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 3, hour, minute, 0).unwrap()
    }

    #[test]
    fn enable_without_capability_is_an_error() {
        let mut engine = engine_with(
            vec![slot(ClassDay::Wed, 540, 600, "CS101")],
            FakeFilter::denied(),
        );
        let err = engine.enable(&wed(8, 0)).unwrap_err();
        assert!(matches!(err, EngineError::PermissionRequired));
        assert_eq!(engine.state(), EngineState::Disabled);
    }

    #[test]
    fn enable_with_empty_schedule_is_a_noop() {
        let mut engine = engine_with(Vec::new(), FakeFilter::granted());
        assert!(engine.enable(&wed(8, 0)).unwrap().is_empty());
        assert_eq!(engine.state(), EngineState::Disabled);
        assert!(!engine.store().scheduling_enabled());
    }

    #[test]
    fn enable_outside_slot_registers_triggers_and_stays_off() {
        let filter = FakeFilter::granted();
        let mut engine = engine_with(vec![slot(ClassDay::Wed, 540, 600, "CS101")], filter.clone());
        engine.enable(&wed(8, 0)).unwrap();
        assert_eq!(engine.state(), EngineState::EnabledOff);
        assert!(!filter.filter_on());
        assert_eq!(engine.timer.scheduled.lock().unwrap().len(), 2);
    }

    #[test]
    fn enable_inside_slot_turns_filter_on() {
        let filter = FakeFilter::granted();
        let mut engine = engine_with(vec![slot(ClassDay::Wed, 540, 600, "CS101")], filter.clone());
        engine.enable(&wed(9, 30)).unwrap();
        assert_eq!(engine.state(), EngineState::EnabledOn);
        assert!(filter.filter_on());
        assert!(engine.store().last_set_by_engine());
    }

    #[test]
    fn missed_trigger_is_corrected_by_tick_exactly_once() {
        let filter = FakeFilter::granted();
        let mut engine = engine_with(vec![slot(ClassDay::Wed, 540, 600, "CS101")], filter.clone());
        engine.enable(&wed(8, 0)).unwrap();
        assert!(!filter.filter_on());

        // The 09:00 trigger never arrives; a tick lands mid-class.
        let events = engine.handle_tick(&wed(9, 10)).unwrap();
        assert!(filter.filter_on());
        assert!(engine.store().last_set_by_engine());
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, Event::FilterApplied { on: true, .. }))
                .count(),
            1
        );

        // A second tick inside the same slot changes nothing.
        let events = engine.handle_tick(&wed(9, 20)).unwrap();
        assert!(events.is_empty());
        assert!(filter.filter_on());
    }

    #[test]
    fn tick_never_reverts_a_manual_filter() {
        let filter = FakeFilter::granted();
        let mut engine = engine_with(vec![slot(ClassDay::Wed, 540, 600, "CS101")], filter.clone());
        // Scheduling disabled; the user mutes manually.
        filter.set_filter(true);
        assert!(engine.handle_tick(&wed(11, 0)).unwrap().is_empty());
        assert!(filter.filter_on());

        // Even when enabled, a filter the engine did not set stays on.
        engine.enable(&wed(11, 0)).unwrap();
        assert!(engine.handle_tick(&wed(11, 5)).unwrap().is_empty());
        assert!(filter.filter_on());
    }

    #[test]
    fn trigger_fires_filter_and_rearms_a_week_out() {
        let filter = FakeFilter::granted();
        let mut engine = engine_with(vec![slot(ClassDay::Wed, 540, 600, "CS101")], filter.clone());
        engine.enable(&wed(8, 0)).unwrap();
        engine.timer.scheduled.lock().unwrap().clear();

        let id = TriggerId::new(ClassDay::Wed, 540, TriggerKind::On);
        let now = wed(9, 0);
        engine.handle_trigger(id, &now).unwrap();
        assert!(filter.filter_on());
        assert_eq!(engine.state(), EngineState::EnabledOn);

        let scheduled = engine.timer.scheduled.lock().unwrap().clone();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].0, id);
        let next_week = Utc.with_ymd_and_hms(2025, 9, 10, 9, 0, 0).unwrap();
        assert_eq!(scheduled[0].1, next_week.timestamp_millis());
    }

    #[test]
    fn stale_trigger_is_cancelled_not_applied() {
        let filter = FakeFilter::granted();
        let mut engine = engine_with(vec![slot(ClassDay::Wed, 540, 600, "CS101")], filter.clone());
        engine.enable(&wed(8, 0)).unwrap();

        let stale = TriggerId::new(ClassDay::Mon, 480, TriggerKind::On);
        let events = engine.handle_trigger(stale, &wed(8, 30)).unwrap();
        assert!(matches!(events[0], Event::StaleTriggerDropped { .. }));
        assert!(!filter.filter_on());
        assert!(engine.timer.cancelled.lock().unwrap().contains(&stale));
    }

    #[test]
    fn trigger_while_disabled_is_ignored() {
        let filter = FakeFilter::granted();
        let mut engine = engine_with(vec![slot(ClassDay::Wed, 540, 600, "CS101")], filter.clone());
        let id = TriggerId::new(ClassDay::Wed, 540, TriggerKind::On);
        assert!(engine.handle_trigger(id, &wed(9, 0)).unwrap().is_empty());
        assert!(!filter.filter_on());
    }

    #[test]
    fn disable_releases_engine_owned_filter() {
        let filter = FakeFilter::granted();
        let mut engine = engine_with(vec![slot(ClassDay::Wed, 540, 600, "CS101")], filter.clone());
        engine.enable(&wed(9, 30)).unwrap();
        assert!(filter.filter_on());

        engine.disable().unwrap();
        assert_eq!(engine.state(), EngineState::Disabled);
        assert!(!filter.filter_on());
        // Both trigger ids were cancelled by recomputation.
        let cancelled = engine.timer.cancelled.lock().unwrap().clone();
        assert!(cancelled.contains(&TriggerId::new(ClassDay::Wed, 540, TriggerKind::On)));
        assert!(cancelled.contains(&TriggerId::new(ClassDay::Wed, 600, TriggerKind::Off)));
    }

    #[test]
    fn disable_leaves_a_manual_filter_alone() {
        let filter = FakeFilter::granted();
        let mut engine = engine_with(vec![slot(ClassDay::Wed, 540, 600, "CS101")], filter.clone());
        engine.enable(&wed(8, 0)).unwrap();
        filter.set_filter(true); // user mutes manually; engine never did
        engine.disable().unwrap();
        assert!(filter.filter_on());
    }

    #[test]
    fn saturday_compensation_cancel_is_independent() {
        let filter = FakeFilter::granted();
        let mut engine = engine_with(vec![slot(ClassDay::Mon, 540, 600, "CS101")], filter.clone());
        engine.enable(&wed(8, 0)).unwrap();
        engine
            .set_compensation(CompensationRule::FollowsDay(ClassDay::Mon), &wed(8, 0))
            .unwrap();

        let scheduled: Vec<TriggerId> = engine
            .timer
            .scheduled
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| *id)
            .collect();
        assert!(scheduled.contains(&TriggerId::new(ClassDay::Sat, 540, TriggerKind::On)));

        // Dropping the rule cancels only Saturday identities.
        engine.timer.cancelled.lock().unwrap().clear();
        engine
            .set_compensation(CompensationRule::None, &wed(8, 0))
            .unwrap();
        let cancelled = engine.timer.cancelled.lock().unwrap().clone();
        assert!(!cancelled.is_empty());
        assert!(cancelled
            .iter()
            .all(|id| matches!(id.decode(), Some((ClassDay::Sat, _, _)))));
    }

    #[test]
    fn saturday_cannot_follow_itself() {
        let mut engine = engine_with(Vec::new(), FakeFilter::granted());
        let err = engine
            .set_compensation(CompensationRule::FollowsDay(ClassDay::Sat), &wed(8, 0))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidCompensation));
    }

    #[test]
    fn clock_change_replans_everything() {
        let filter = FakeFilter::granted();
        let mut engine = engine_with(vec![slot(ClassDay::Wed, 540, 600, "CS101")], filter.clone());
        engine.enable(&wed(8, 0)).unwrap();
        engine.timer.scheduled.lock().unwrap().clear();
        engine.timer.cancelled.lock().unwrap().clear();

        engine.handle_clock_changed(&wed(12, 0)).unwrap();
        assert_eq!(engine.timer.cancelled.lock().unwrap().len(), 2);
        assert_eq!(engine.timer.scheduled.lock().unwrap().len(), 2);
    }

    #[test]
    fn exact_timer_unavailable_degrades_to_tick_only() {
        let filter = FakeFilter::granted();
        let store = ScheduleStore::with_db(PrefsDb::open_memory().unwrap()).unwrap();
        store
            .replace(vec![slot(ClassDay::Wed, 540, 600, "CS101")])
            .unwrap();
        let timer = FakeTimer {
            exact_unavailable: true,
            ..FakeTimer::default()
        };
        let mut engine = ReconciliationEngine::new(store, timer, filter.clone());

        engine.enable(&wed(8, 0)).unwrap();
        assert!(engine.store().scheduling_enabled());
        // Correction still happens through the tick path.
        engine.handle_tick(&wed(9, 10)).unwrap();
        assert!(filter.filter_on());
    }

    #[test]
    fn status_reports_current_class_and_next_transition() {
        let filter = FakeFilter::granted();
        let mut engine = engine_with(vec![slot(ClassDay::Wed, 540, 600, "CS101")], filter.clone());
        engine.enable(&wed(9, 30)).unwrap();

        let status = engine.status(&wed(9, 30));
        assert_eq!(status.state, EngineState::EnabledOn);
        assert!(status.filter_on);
        assert_eq!(status.current_class.as_deref(), Some("CS101"));
        let next = status.next_trigger.unwrap();
        assert_eq!(next.kind, TriggerKind::Off);
        assert_eq!(next.minute, 600);
    }
}
