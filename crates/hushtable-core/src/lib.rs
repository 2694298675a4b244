//! # Hushtable Core Library
//!
//! This library keeps a device-wide interruption filter (do-not-disturb)
//! in lockstep with a recurring weekly class schedule recovered from a
//! loosely structured HTML timetable. It is a library/daemon: a host
//! application supplies the OS bindings (wake-up timers, the filter
//! capability, the acquired timetable document) and consumes events.
//!
//! ## Architecture
//!
//! - **Timetable parser**: a pure function from HTML text to normalized
//!   weekly class slots; tolerant of the source's ad hoc markup
//! - **Trigger planner**: pure, idempotent planning of On/Off wake-ups
//!   with deterministic identities
//! - **Reconciliation engine**: the single owner of filter-state
//!   decisions, self-healing through a periodic tick
//! - **Storage**: SQLite key/value persistence and TOML configuration
//! - **Service**: one serialized loop funneling every wake source
//!
//! ## Key Components
//!
//! - [`timetable::parse`]: HTML -> `Vec<ClassSlot>`
//! - [`ReconciliationEngine`]: the state machine
//! - [`Service`]: the daemon loop a host embeds
//! - [`ScheduleStore`]: persisted schedule state

pub mod engine;
pub mod error;
pub mod events;
pub mod service;
pub mod storage;
pub mod timetable;
pub mod trigger;

pub use engine::{
    EngineState, InterruptionFilterPort, ReconciliationEngine, StatusSnapshot, TimerPort,
};
pub use error::{ConfigError, CoreError, EngineError, StoreError, TimerError};
pub use events::{Event, FilterCause};
pub use service::{Command, Service, ServiceHandle};
pub use storage::{Config, EngineConfig, PrefsDb, ScheduleStore};
pub use timetable::{ClassDay, ClassSlot, CompensationRule};
pub use trigger::{Trigger, TriggerId, TriggerKind};
