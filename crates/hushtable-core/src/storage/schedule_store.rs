//! The schedule store: the single writer of persisted schedule state.
//!
//! A cloneable handle over [`PrefsDb`] with an in-memory cache. Reads are
//! served from the cache; every mutation updates the cache first and then
//! persists the full snapshot in one transaction. A failed write keeps the
//! cached value (the next mutation re-persists everything), so persistence
//! failures are fatal only for that write.

use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::prefs::PrefsDb;
use crate::error::StoreError;
use crate::timetable::{ClassDay, ClassSlot, CompensationRule};

const KEY_SLOTS: &str = "slots_json";
const KEY_COMPENSATION: &str = "compensation_rule";
const KEY_ENABLED: &str = "scheduling_enabled";
const KEY_LAST_SET_BY_ENGINE: &str = "last_set_by_engine";
const KEY_LAST_FILTER_ON: &str = "last_filter_on";
const KEY_RAW_HTML: &str = "timetable_html";

/// Emitted on the optional change channel so a replan always follows a
/// schedule mutation, whoever performed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleChange {
    Replaced { slot_count: usize },
    CompensationChanged(CompensationRule),
    Cleared,
}

#[derive(Debug, Clone, Default)]
struct CachedState {
    slots: Vec<ClassSlot>,
    rule: CompensationRule,
    enabled: bool,
    last_filter_on: bool,
    last_set_by_engine: bool,
}

struct Inner {
    db: Mutex<PrefsDb>,
    cache: RwLock<CachedState>,
    changed_tx: Mutex<Option<UnboundedSender<ScheduleChange>>>,
}

/// Cloneable handle to the persisted schedule state.
#[derive(Clone)]
pub struct ScheduleStore {
    inner: Arc<Inner>,
}

impl ScheduleStore {
    /// Open over the default on-disk database.
    pub fn open() -> Result<Self, StoreError> {
        Self::with_db(PrefsDb::open()?)
    }

    /// Wrap an already opened database, loading the cache from it.
    /// Corrupt stored values are logged and fall back to defaults rather
    /// than blocking startup.
    pub fn with_db(db: PrefsDb) -> Result<Self, StoreError> {
        let cache = load_cache(&db)?;
        debug!(
            slot_count = cache.slots.len(),
            enabled = cache.enabled,
            "schedule store loaded"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                db: Mutex::new(db),
                cache: RwLock::new(cache),
                changed_tx: Mutex::new(None),
            }),
        })
    }

    /// Register the change channel. At most one; later calls replace it.
    pub fn set_change_notifier(&self, tx: UnboundedSender<ScheduleChange>) {
        *self.inner.changed_tx.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get(&self) -> (Vec<ClassSlot>, CompensationRule) {
        let cache = self.read_cache();
        (cache.slots.clone(), cache.rule)
    }

    pub fn slots(&self) -> Vec<ClassSlot> {
        self.read_cache().slots.clone()
    }

    pub fn slots_for_day(&self, day: ClassDay) -> Vec<ClassSlot> {
        self.read_cache()
            .slots
            .iter()
            .filter(|s| s.day == day)
            .cloned()
            .collect()
    }

    pub fn compensation(&self) -> CompensationRule {
        self.read_cache().rule
    }

    pub fn scheduling_enabled(&self) -> bool {
        self.read_cache().enabled
    }

    pub fn last_filter_on(&self) -> bool {
        self.read_cache().last_filter_on
    }

    pub fn last_set_by_engine(&self) -> bool {
        self.read_cache().last_set_by_engine
    }

    /// The last acquired raw timetable document, if any. Read on demand;
    /// the document can be large and is never needed on hot paths.
    pub fn raw_html(&self) -> Result<Option<String>, StoreError> {
        self.lock_db().get(KEY_RAW_HTML)
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Atomically replace the whole slot set. The previous set is
    /// discarded; there is no incremental merge.
    pub fn replace(&self, slots: Vec<ClassSlot>) -> Result<(), StoreError> {
        let slot_count = slots.len();
        self.mutate(|cache| cache.slots = slots)?;
        self.notify(ScheduleChange::Replaced { slot_count });
        Ok(())
    }

    pub fn set_compensation(&self, rule: CompensationRule) -> Result<(), StoreError> {
        self.mutate(|cache| cache.rule = rule)?;
        self.notify(ScheduleChange::CompensationChanged(rule));
        Ok(())
    }

    pub fn set_scheduling_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.mutate(|cache| cache.enabled = enabled)
    }

    /// Record the filter state the engine just applied, and whether the
    /// engine (as opposed to the user) is responsible for it.
    pub fn set_filter_state(&self, on: bool, by_engine: bool) -> Result<(), StoreError> {
        self.mutate(|cache| {
            cache.last_filter_on = on;
            cache.last_set_by_engine = by_engine;
        })
    }

    pub fn set_raw_html(&self, html: &str) -> Result<(), StoreError> {
        self.lock_db().set(KEY_RAW_HTML, html)
    }

    /// User-initiated wipe of all schedule data.
    pub fn clear(&self) -> Result<(), StoreError> {
        {
            let mut cache = self.write_cache();
            *cache = CachedState::default();
        }
        let result = self.lock_db().clear();
        self.notify(ScheduleChange::Cleared);
        result
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, CachedState> {
        self.inner.cache.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_cache(&self) -> std::sync::RwLockWriteGuard<'_, CachedState> {
        self.inner.cache.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_db(&self) -> std::sync::MutexGuard<'_, PrefsDb> {
        self.inner.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply `f` to the cache, then persist the full snapshot. The cache
    /// keeps the new value even when persistence fails.
    fn mutate(&self, f: impl FnOnce(&mut CachedState)) -> Result<(), StoreError> {
        let snapshot = {
            let mut cache = self.write_cache();
            f(&mut cache);
            cache.clone()
        };
        self.persist(&snapshot)
    }

    fn persist(&self, cache: &CachedState) -> Result<(), StoreError> {
        let slots_json = serde_json::to_string(&cache.slots)
            .map_err(|e| StoreError::Corrupt {
                key: KEY_SLOTS.into(),
                message: e.to_string(),
            })?;
        let rule_json = serde_json::to_string(&cache.rule)
            .map_err(|e| StoreError::Corrupt {
                key: KEY_COMPENSATION.into(),
                message: e.to_string(),
            })?;
        self.lock_db().set_many(&[
            (KEY_SLOTS, &slots_json),
            (KEY_COMPENSATION, &rule_json),
            (KEY_ENABLED, bool_str(cache.enabled)),
            (KEY_LAST_FILTER_ON, bool_str(cache.last_filter_on)),
            (KEY_LAST_SET_BY_ENGINE, bool_str(cache.last_set_by_engine)),
        ])
    }

    fn notify(&self, change: ScheduleChange) {
        let tx = self.inner.changed_tx.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(tx) = tx.as_ref() {
            if tx.send(change).is_err() {
                debug!("change notifier receiver dropped");
            }
        }
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn load_cache(db: &PrefsDb) -> Result<CachedState, StoreError> {
    let slots = match db.get(KEY_SLOTS)? {
        Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!(error = %e, "stored slot set unreadable; starting empty");
            Vec::new()
        }),
        None => Vec::new(),
    };
    let rule = match db.get(KEY_COMPENSATION)? {
        Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!(error = %e, "stored compensation rule unreadable; using none");
            CompensationRule::None
        }),
        None => CompensationRule::None,
    };
    Ok(CachedState {
        slots,
        rule,
        enabled: db.get(KEY_ENABLED)?.as_deref() == Some("true"),
        last_filter_on: db.get(KEY_LAST_FILTER_ON)?.as_deref() == Some("true"),
        last_set_by_engine: db.get(KEY_LAST_SET_BY_ENGINE)?.as_deref() == Some("true"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> ScheduleStore {
        ScheduleStore::with_db(PrefsDb::open_memory().unwrap()).unwrap()
    }

    fn slot(day: ClassDay, start_min: u16, end_min: u16, label: &str) -> ClassSlot {
        ClassSlot {
            day,
            start_min,
            end_min,
            label: label.into(),
        }
    }

    #[test]
    fn replace_swaps_the_whole_set() {
        let store = memory_store();
        store
            .replace(vec![slot(ClassDay::Mon, 540, 600, "CS101")])
            .unwrap();
        store
            .replace(vec![slot(ClassDay::Tue, 600, 660, "PHY201")])
            .unwrap();
        let slots = store.slots();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].label, "PHY201");
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.db");
        {
            let store = ScheduleStore::with_db(PrefsDb::open_at(&path).unwrap()).unwrap();
            store
                .replace(vec![slot(ClassDay::Fri, 780, 840, "MAT101")])
                .unwrap();
            store
                .set_compensation(CompensationRule::FollowsDay(ClassDay::Mon))
                .unwrap();
            store.set_scheduling_enabled(true).unwrap();
            store.set_filter_state(true, true).unwrap();
        }
        let store = ScheduleStore::with_db(PrefsDb::open_at(&path).unwrap()).unwrap();
        assert_eq!(store.slots(), vec![slot(ClassDay::Fri, 780, 840, "MAT101")]);
        assert_eq!(
            store.compensation(),
            CompensationRule::FollowsDay(ClassDay::Mon)
        );
        assert!(store.scheduling_enabled());
        assert!(store.last_filter_on());
        assert!(store.last_set_by_engine());
    }

    #[test]
    fn corrupt_slots_fall_back_to_empty() {
        let mut db = PrefsDb::open_memory().unwrap();
        db.set(KEY_SLOTS, "not json").unwrap();
        db.set(KEY_ENABLED, "true").unwrap();
        let store = ScheduleStore::with_db(db).unwrap();
        assert!(store.slots().is_empty());
        assert!(store.scheduling_enabled());
    }

    #[test]
    fn replace_notifies_change_channel() {
        let store = memory_store();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        store.set_change_notifier(tx);
        store
            .replace(vec![slot(ClassDay::Mon, 540, 600, "CS101")])
            .unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            ScheduleChange::Replaced { slot_count: 1 }
        );
    }

    #[test]
    fn clear_wipes_slots_and_flags() {
        let store = memory_store();
        store
            .replace(vec![slot(ClassDay::Mon, 540, 600, "CS101")])
            .unwrap();
        store.set_scheduling_enabled(true).unwrap();
        store.set_raw_html("<table></table>").unwrap();
        store.clear().unwrap();
        assert!(store.slots().is_empty());
        assert!(!store.scheduling_enabled());
        assert_eq!(store.raw_html().unwrap(), None);
    }

    #[test]
    fn slots_for_day_filters() {
        let store = memory_store();
        store
            .replace(vec![
                slot(ClassDay::Mon, 540, 600, "CS101"),
                slot(ClassDay::Tue, 540, 600, "PHY201"),
                slot(ClassDay::Mon, 660, 720, "MAT101"),
            ])
            .unwrap();
        let monday = store.slots_for_day(ClassDay::Mon);
        assert_eq!(monday.len(), 2);
        assert!(monday.iter().all(|s| s.day == ClassDay::Mon));
    }
}
