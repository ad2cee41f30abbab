//! Motion init sequence and sampling pipeline tests

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sensorlink::codec::CommandPacket;
use sensorlink::events::{ImuSample, MotionReading};
use sensorlink::protocol::Reply;
use sensorlink::signal::BinarySignal;
use sensorlink::sim::{MotionStep, RecordingTelemetry, ScriptedMotion, SimPin};
use sensorlink::tasks::motion::{init_motion, MotionConfig, MotionPipeline};
use sensorlink::{DeviceState, Error};

fn quick_config() -> MotionConfig {
    MotionConfig { power_settle: Duration::ZERO, ..MotionConfig::default() }
}

#[test]
fn test_init_runs_every_step_in_order() {
    let mut power = SimPin::default();
    let mut sensor = ScriptedMotion::new();
    let mut armed = false;

    init_motion(
        &mut power,
        &mut sensor,
        || {
            armed = true;
            Ok(())
        },
        &quick_config(),
    )
    .unwrap();

    assert!(power.high);
    assert!(armed);
    assert_eq!(
        sensor.steps,
        vec![
            MotionStep::Probe,
            MotionStep::EnableInterrupt,
            MotionStep::OutputDataRate(26),
            MotionStep::Threshold(500),
            MotionStep::Duration(1),
        ]
    );
}

#[test]
fn test_init_stops_at_first_failure() {
    let mut power = SimPin::default();
    let mut sensor = ScriptedMotion::new();
    sensor.fail_at = Some(MotionStep::Threshold(0));

    let result = init_motion(&mut power, &mut sensor, || Ok(()), &quick_config());
    assert!(result.is_err());
    assert_eq!(
        sensor.steps,
        vec![MotionStep::Probe, MotionStep::EnableInterrupt, MotionStep::OutputDataRate(26)]
    );
}

#[test]
fn test_probe_failure_skips_trigger() {
    let mut power = SimPin::default();
    let mut sensor = ScriptedMotion::new();
    sensor.fail_at = Some(MotionStep::Probe);
    let mut armed = false;

    let result = init_motion(
        &mut power,
        &mut sensor,
        || {
            armed = true;
            Ok(())
        },
        &quick_config(),
    );
    assert!(matches!(result, Err(Error::DeviceNotReady(_))));
    assert!(!armed);
    assert!(sensor.steps.is_empty());
}

#[test]
fn test_trigger_failure_aborts_before_interrupt_routing() {
    let mut power = SimPin::default();
    let mut sensor = ScriptedMotion::new();

    let result = init_motion(
        &mut power,
        &mut sensor,
        || Err(Error::DeviceNotReady("interrupt pin")),
        &quick_config(),
    );
    assert!(result.is_err());
    assert_eq!(sensor.steps, vec![MotionStep::Probe]);
}

#[test]
fn test_power_pin_failure() {
    let mut power = SimPin { fail: true, ..SimPin::default() };
    let mut sensor = ScriptedMotion::new();
    assert!(init_motion(&mut power, &mut sensor, || Ok(()), &quick_config()).is_err());
    assert!(sensor.steps.is_empty());
}

#[test]
fn test_sample_is_rescaled_stored_and_streamed() {
    let state = DeviceState::new();
    let telemetry = Arc::new(RecordingTelemetry::new());
    let mut sensor = ScriptedMotion::new();
    sensor.push_reading(MotionReading { ax: 0.12, ay: -0.05, az: 9.81, gx: 0.011, gy: -0.2, gz: 1.5 });

    let signal = BinarySignal::new();
    let mut pipeline = MotionPipeline::new(sensor, &signal, state.imu_writer().unwrap(), telemetry.clone());
    assert!(state.imu().initialized);

    let sample = pipeline.sample_once().unwrap();
    let expected = ImuSample { acc_x: 12, acc_y: -5, acc_z: 981, gyro_x: 1, gyro_y: -20, gyro_z: 150 };
    assert_eq!(sample, expected);
    assert_eq!(state.imu().sample, expected);

    let frames = telemetry.frames();
    assert_eq!(frames.len(), 1);
    let packet = CommandPacket::decode(&frames[0]).unwrap();
    assert_eq!(Reply::decode(&packet).unwrap(), Reply::NotifyImu(expected));
}

#[test]
fn test_out_of_range_values_saturate() {
    let state = DeviceState::new();
    let telemetry = Arc::new(RecordingTelemetry::new());
    let mut sensor = ScriptedMotion::new();
    sensor.push_reading(MotionReading { ax: 400.0, ay: -400.0, az: f32::NAN, gx: 0.0, gy: 0.0, gz: 0.0 });

    let signal = BinarySignal::new();
    let mut pipeline = MotionPipeline::new(sensor, &signal, state.imu_writer().unwrap(), telemetry);
    let sample = pipeline.sample_once().unwrap();
    assert_eq!((sample.acc_x, sample.acc_y, sample.acc_z), (i16::MAX, i16::MIN, 0));
}

#[test]
fn test_fetch_failure_keeps_previous_sample() {
    let state = DeviceState::new();
    let telemetry = Arc::new(RecordingTelemetry::new());
    let mut sensor = ScriptedMotion::new();
    sensor.push_reading(MotionReading { ax: 1.0, ..MotionReading::default() });
    sensor.push_failure();

    let signal = BinarySignal::new();
    let mut pipeline = MotionPipeline::new(sensor, &signal, state.imu_writer().unwrap(), telemetry.clone());
    pipeline.sample_once().unwrap();
    assert!(matches!(pipeline.sample_once(), Err(Error::SensorFetch(_))));

    assert_eq!(state.imu().sample.acc_x, 100);
    assert_eq!(telemetry.frames().len(), 1);
}

#[test]
fn test_run_loop_samples_on_each_trigger() {
    let state = DeviceState::new();
    let telemetry = Arc::new(RecordingTelemetry::new());
    let mut sensor = ScriptedMotion::new();
    sensor.push_reading(MotionReading { az: 9.81, ..MotionReading::default() });
    sensor.push_failure();
    sensor.push_reading(MotionReading { az: -9.81, ..MotionReading::default() });

    let signal = Arc::new(BinarySignal::new());
    let pipeline = MotionPipeline::new(
        sensor,
        Arc::clone(&signal),
        state.imu_writer().unwrap(),
        telemetry.clone(),
    );
    thread::spawn(move || pipeline.run());

    signal.post();
    wait_until(|| telemetry.frames().len() == 1);
    assert_eq!(state.imu().sample.acc_z, 981);

    // Each permit must be taken before the next post so none coalesce.
    // The second fetch fails and sends nothing; the third one streams.
    signal.post();
    wait_until(|| !signal.is_pending());
    signal.post();
    wait_until(|| telemetry.frames().len() == 2);

    assert_eq!(state.imu().sample.acc_z, -981);
}

/// Poll `done` until it holds, failing after two seconds.
fn wait_until(done: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}
