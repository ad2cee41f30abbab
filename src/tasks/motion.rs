// SensorLink - Motion Sampling Task
//
// The IMU raises its interrupt on motion; the handler only posts a trigger.
// This task waits on the trigger, fetches the sample, rescales it to the
// compact fixed-point form, records it in the device state and streams it
// as NOTIFY_IMU.
//
//   WaitingForTrigger -> Sampling -> WaitingForTrigger ...

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use embedded_hal::digital::OutputPin;

use crate::config::*;
use crate::drivers::MotionSensor;
use crate::error::{Error, Result};
use crate::events::ImuSample;
use crate::protocol::Reply;
use crate::signal::TriggerWait;
use crate::state::ImuWriter;
use crate::telemetry::{self, Telemetry};

#[derive(Debug, Clone, Copy)]
pub struct MotionConfig {
    pub output_data_rate_hz: u16,
    pub threshold_milli_g: u16,
    pub duration_samples: u8,
    pub power_settle: Duration,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            output_data_rate_hz: IMU_OUTPUT_DATA_RATE_HZ,
            threshold_milli_g: IMU_MOTION_THRESHOLD_MG,
            duration_samples: IMU_MOTION_DURATION,
            power_settle: Duration::from_millis(IMU_POWER_SETTLE_MS),
        }
    }
}

/// Bring the motion subsystem up, step by step:
///
/// 1. power the sensor through its supply GPIO
/// 2. confirm the sensor answers
/// 3. register the trigger callback (`arm_trigger`) and route the interrupt
/// 4. output data rate for accelerometer and gyroscope
/// 5. motion threshold
/// 6. debounce duration
///
/// The first failing step aborts the sequence.  The subsystem then stays
/// uninitialised; nothing else is affected.
pub fn init_motion<P, S, F>(
    power: &mut P,
    sensor: &mut S,
    arm_trigger: F,
    config: &MotionConfig,
) -> Result<()>
where
    P: OutputPin,
    S: MotionSensor,
    F: FnOnce() -> Result<()>,
{
    power
        .set_high()
        .map_err(|_| Error::DeviceNotReady("IMU power switch"))?;
    thread::sleep(config.power_settle);
    log::info!("IMU power ON");

    sensor.probe().map_err(|e| {
        log::error!("Sensor device not ready: {}", e);
        e
    })?;

    arm_trigger().map_err(|e| {
        log::error!("Could not set trigger: {}", e);
        e
    })?;
    sensor.enable_motion_interrupt()?;

    sensor.set_output_data_rate(config.output_data_rate_hz)?;

    sensor.set_motion_threshold(config.threshold_milli_g).map_err(|e| {
        log::error!("Cannot set motion threshold: {}", e);
        e
    })?;

    sensor.set_motion_duration(config.duration_samples)?;

    log::info!(
        "IMU (accel + gyro) running at {} Hz, waiting for motion",
        config.output_data_rate_hz
    );
    Ok(())
}

pub struct MotionPipeline<S, T> {
    sensor: S,
    trigger: T,
    state: ImuWriter,
    telemetry: Arc<dyn Telemetry>,
}

impl<S: MotionSensor, T: TriggerWait> MotionPipeline<S, T> {
    /// Marks the IMU initialised in the device state.  Call only after
    /// [`init_motion`] succeeded.
    pub fn new(sensor: S, trigger: T, state: ImuWriter, telemetry: Arc<dyn Telemetry>) -> Self {
        state.set_initialized(true);
        Self { sensor, trigger, state, telemetry }
    }

    /// Task body.  Never returns.
    pub fn run(mut self) -> ! {
        log::info!("Motion task started");

        loop {
            self.trigger.wait();

            if let Err(e) = self.sample_once() {
                log::warn!("Sample skipped: {}", e);
            }
        }
    }

    /// One Sampling step: fetch, rescale, store, stream.
    pub fn sample_once(&mut self) -> Result<ImuSample> {
        let reading = self.sensor.fetch()?;
        let sample = ImuSample::from_reading(&reading);

        self.state.set_sample(&sample);
        telemetry::send_reply(self.telemetry.as_ref(), &Reply::NotifyImu(sample));

        log::debug!(
            "MOTION | A: {} {} {} | G: {} {} {}",
            sample.acc_x,
            sample.acc_y,
            sample.acc_z,
            sample.gyro_x,
            sample.gyro_y,
            sample.gyro_z
        );
        Ok(sample)
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }
}
