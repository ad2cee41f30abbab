//! Periodic housekeeping task tests

use std::time::Duration;

use sensorlink::sim::SimBattery;
use sensorlink::tasks::periodic::PeriodicTask;
use sensorlink::DeviceState;

#[test]
fn test_step_samples_battery() {
    let state = DeviceState::new();
    let mut task = PeriodicTask::new(Some(SimBattery::new(2731)), state.battery_writer().unwrap());

    assert_eq!(task.step(), Duration::from_millis(1000));
    assert_eq!(state.battery_raw(), 2731);
    assert_eq!(task.ticks(), 1);
}

#[test]
fn test_period_follows_live_tick() {
    let state = DeviceState::new();
    let commands = state.command_writer().unwrap();
    let mut task = PeriodicTask::<SimBattery>::new(None, state.battery_writer().unwrap());

    commands.set_periodic_tick_ms(250);
    assert_eq!(task.step(), Duration::from_millis(250));

    // The stored value stays exact; only the sleep is floored.
    commands.set_periodic_tick_ms(0);
    assert_eq!(task.step(), Duration::from_millis(1));
    assert_eq!(state.periodic_tick_ms(), 0);
    assert_eq!(task.ticks(), 2);
}

#[test]
fn test_battery_failure_keeps_last_reading() {
    let state = DeviceState::new();
    let battery = SimBattery { fail: true, ..SimBattery::new(100) };
    let mut task = PeriodicTask::new(Some(battery), state.battery_writer().unwrap());

    task.step();
    assert_eq!(state.battery_raw(), 0);
}
