// SensorLink - Periodic Housekeeping Task
//
// Wakes every `periodic_tick_ms` (re-read each cycle, so SET_PRD_TICK takes
// effect on the next sleep) and samples the battery.

use std::thread;
use std::time::Duration;

use crate::config::MIN_PERIODIC_SLEEP_MS;
use crate::drivers::BatteryMonitor;
use crate::state::BatteryWriter;

pub struct PeriodicTask<B> {
    battery: Option<B>,
    state: BatteryWriter,
    ticks: u32,
}

impl<B: BatteryMonitor> PeriodicTask<B> {
    /// `battery` is `None` when the ADC could not be brought up; the task
    /// still runs and keeps counting.
    pub fn new(battery: Option<B>, state: BatteryWriter) -> Self {
        Self { battery, state, ticks: 0 }
    }

    pub fn run(mut self) -> ! {
        log::info!("Periodic task started");

        loop {
            let period = self.step();
            thread::sleep(period);
        }
    }

    /// One cycle without the sleep.  Returns how long to sleep next.
    pub fn step(&mut self) -> Duration {
        self.ticks = self.ticks.wrapping_add(1);

        if let Some(battery) = self.battery.as_mut() {
            match battery.read_raw() {
                Ok(raw) => self.state.set_raw(raw),
                Err(e) => log::warn!("Battery read failed: {}", e),
            }
        }

        log::debug!("tick {} (battery raw {})", self.ticks, self.state.battery_raw());
        sleep_period(self.state.periodic_tick_ms())
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }
}

/// A tick of 0 would spin; the scheduler never sleeps less than 1 ms.
pub fn sleep_period(tick_ms: u16) -> Duration {
    Duration::from_millis(u64::from(tick_ms).max(MIN_PERIODIC_SLEEP_MS))
}
