mod ports;
mod reconcile;

pub use ports::{InterruptionFilterPort, TimerError, TimerPort};
pub use reconcile::{EngineState, ReconciliationEngine, StatusSnapshot};
