use std::sync::Arc;

use parking_lot::Mutex;

use crate::hw::{Celsius, PowerControl};
use crate::tracing::prelude::*;

/// One-way latch around the critical power-off.
///
/// Clones share the latch, so the controller tick and any other context
/// holding a guard race for the same lock and only the first trigger
/// reaches [`PowerControl::critical_shutdown`].
#[derive(Clone)]
pub struct ShutdownGuard {
    triggered: Arc<Mutex<bool>>,
    power: Arc<dyn PowerControl>,
}

impl ShutdownGuard {
    pub fn new(power: Arc<dyn PowerControl>) -> Self {
        Self {
            triggered: Arc::new(Mutex::new(false)),
            power,
        }
    }

    /// Power off unless already done. Returns whether this call did it.
    pub fn trigger(&self, temperature: Celsius) -> bool {
        let mut triggered = self.triggered.lock();
        if *triggered {
            return false;
        }

        warn!(temp_c = temperature, "Emergency shutdown!");
        self.power.critical_shutdown();
        *triggered = true;

        true
    }

    pub fn is_triggered(&self) -> bool {
        *self.triggered.lock()
    }
}
