//! The daemon surface: one serialized reconciliation loop.
//!
//! Every wake source -- fired triggers handed over by the host, the
//! periodic tick, user actions -- arrives as a [`Command`] on one mpsc
//! channel and is handled one at a time with the engine locked, so no two
//! entry points can interleave inside a reconciliation pass. Engine events
//! fan out to an unbounded subscriber channel the host can drain.
//!
//! The tick interval is jittered each round so a fleet of devices does not
//! wake in lockstep.

use std::sync::{Arc, Mutex};

use chrono::Local;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::engine::{InterruptionFilterPort, ReconciliationEngine, TimerPort};
use crate::error::EngineError;
use crate::events::Event;
use crate::storage::{EngineConfig, ScheduleChange};
use crate::timetable::{self, ClassSlot, CompensationRule};
use crate::trigger::TriggerId;

const COMMAND_BUFFER: usize = 32;

/// Inbound work for the reconciliation loop.
#[derive(Debug)]
pub enum Command {
    Enable,
    Disable,
    /// Replace the schedule with already-parsed slots.
    ReplaceSchedule(Vec<ClassSlot>),
    /// Persist a freshly acquired timetable document, parse it, and
    /// replace the schedule with the result.
    IngestHtml(String),
    SetCompensation(CompensationRule),
    /// The host observed a wall-clock or timezone change.
    ClockChanged,
    /// The OS delivered the wake-up registered for this id.
    TriggerFired(TriggerId),
    /// Disable scheduling and wipe all schedule data.
    ClearSchedule,
    Shutdown,
}

/// Cheap cloneable handle for submitting commands to a running service.
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::Sender<Command>,
}

impl ServiceHandle {
    /// Submit a command. Returns `false` when the service has shut down.
    pub async fn send(&self, command: Command) -> bool {
        self.tx.send(command).await.is_ok()
    }

    pub async fn trigger_fired(&self, id: TriggerId) -> bool {
        self.send(Command::TriggerFired(id)).await
    }
}

/// The reconciliation daemon. Constructed around an engine, then driven
/// to completion with [`Service::run`].
pub struct Service<T, F> {
    engine: Arc<Mutex<ReconciliationEngine<T, F>>>,
    config: EngineConfig,
    rx: mpsc::Receiver<Command>,
    store_rx: mpsc::UnboundedReceiver<ScheduleChange>,
    events_tx: mpsc::UnboundedSender<Event>,
}

impl<T: TimerPort, F: InterruptionFilterPort> Service<T, F> {
    /// Wire a service around `engine`. Returns the service itself, the
    /// command handle, and the event stream for the host.
    pub fn new(
        engine: ReconciliationEngine<T, F>,
        config: EngineConfig,
    ) -> (Self, ServiceHandle, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (store_tx, store_rx) = mpsc::unbounded_channel();
        engine.store().set_change_notifier(store_tx);

        let service = Self {
            engine: Arc::new(Mutex::new(engine)),
            config,
            rx,
            store_rx,
            events_tx,
        };
        (service, ServiceHandle { tx }, events_rx)
    }

    /// Shared engine access for host queries (status snapshots).
    pub fn engine(&self) -> Arc<Mutex<ReconciliationEngine<T, F>>> {
        Arc::clone(&self.engine)
    }

    /// Drive the loop until `Shutdown` or all handles are dropped.
    pub async fn run(mut self) {
        info!(
            tick_interval_secs = self.config.tick_interval().as_secs(),
            "reconciliation service started"
        );
        // Catch up immediately: the process may have slept through any
        // number of triggers.
        self.pass("startup", |engine| engine.handle_tick(&Local::now()));

        let mut store_notifications = true;
        loop {
            let tick_in = self.jittered_interval();
            tokio::select! {
                command = self.rx.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.handle(command),
                },
                change = self.store_rx.recv(), if store_notifications => match change {
                    // A writer mutated the store behind the engine's
                    // back; rebuild the plan from persisted state.
                    Some(change) => {
                        debug!(?change, "store changed; resyncing");
                        self.pass("store-change", |engine| engine.resync(&Local::now()));
                    }
                    // The notifier was replaced; stop polling this one.
                    None => store_notifications = false,
                },
                _ = time::sleep(tick_in) => {
                    self.pass("tick", |engine| engine.handle_tick(&Local::now()));
                }
            }
        }
        info!("reconciliation service stopped");
    }

    fn handle(&mut self, command: Command) {
        debug!(?command, "handling command");
        match command {
            Command::Enable => self.pass("enable", |engine| engine.enable(&Local::now())),
            Command::Disable => self.pass("disable", |engine| engine.disable()),
            Command::ReplaceSchedule(slots) => self.pass("replace", move |engine| {
                engine.replace_schedule(slots, &Local::now())
            }),
            Command::IngestHtml(html) => {
                let slots = timetable::parse(&html);
                self.pass("ingest", move |engine| {
                    if let Err(e) = engine.store().set_raw_html(&html) {
                        warn!(error = %e, "raw timetable document not persisted");
                    }
                    engine.replace_schedule(slots, &Local::now())
                });
            }
            Command::SetCompensation(rule) => self.pass("compensation", move |engine| {
                engine.set_compensation(rule, &Local::now())
            }),
            Command::ClockChanged => {
                self.pass("clock-change", |engine| {
                    engine.handle_clock_changed(&Local::now())
                });
            }
            Command::TriggerFired(id) => {
                self.pass("trigger", move |engine| {
                    engine.handle_trigger(id, &Local::now())
                });
            }
            Command::ClearSchedule => {
                self.pass("clear", |engine| {
                    let events = engine.disable()?;
                    engine.store().clear()?;
                    Ok(events)
                });
            }
            Command::Shutdown => unreachable!("handled by the run loop"),
        }
    }

    /// One serialized pass: lock, act, publish events.
    fn pass<G>(&self, label: &str, action: G)
    where
        G: FnOnce(&mut ReconciliationEngine<T, F>) -> Result<Vec<Event>, EngineError>,
    {
        let mut engine = self.engine.lock().unwrap_or_else(|e| e.into_inner());
        match action(&mut engine) {
            Ok(events) => {
                for event in events {
                    if self.events_tx.send(event).is_err() {
                        debug!("event subscriber dropped");
                    }
                }
            }
            Err(EngineError::PermissionRequired) => {
                warn!(label, "filter capability missing");
                let _ = self.events_tx.send(Event::PermissionRequired {
                    at: chrono::Utc::now(),
                });
            }
            Err(e) => error!(label, error = %e, "reconciliation pass failed"),
        }
    }

    fn jittered_interval(&self) -> std::time::Duration {
        let base = self.config.tick_interval().as_secs() as i64;
        let jitter = self.config.tick_jitter().as_secs() as i64;
        let offset = if jitter > 0 {
            rand::thread_rng().gen_range(-jitter..=jitter)
        } else {
            0
        };
        std::time::Duration::from_secs((base + offset).max(1) as u64)
    }
}
