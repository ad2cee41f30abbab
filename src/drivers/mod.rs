// SensorLink - Hardware Collaborators
//
// Traits the pipelines drive.  Register-level drivers are written against
// `embedded-hal` so the same code runs on the ESP-IDF I2C driver and on the
// host register-file bus.

use std::sync::Mutex;

use crate::error::Result;
use crate::events::{LedChannel, MotionReading, RtcTime};
use crate::pool::PcmBlock;

#[cfg(target_os = "espidf")]
pub mod board;
pub mod imu;
pub mod rtc;

/// Thread-safe handle to a shared I2C bus.
pub type SharedBus<B> = &'static Mutex<B>;

/// RGB status LEDs plus one dimmable LED.
pub trait LedActuator {
    fn set_led(&mut self, channel: LedChannel, on: bool) -> Result<()>;
    fn set_pwm_width_ns(&mut self, width_ns: u32) -> Result<()>;
}

pub trait RtcClock {
    fn set_time(&mut self, time: &RtcTime) -> Result<()>;
    fn get_time(&mut self) -> Result<RtcTime>;
}

/// 6-axis sensor with a motion-detect interrupt output.
pub trait MotionSensor {
    /// Confirm the device answers with the expected identity and wake it.
    fn probe(&mut self) -> Result<()>;
    /// Route motion events to the interrupt pin.
    fn enable_motion_interrupt(&mut self) -> Result<()>;
    /// Output data rate shared by accelerometer and gyroscope.
    fn set_output_data_rate(&mut self, hz: u16) -> Result<()>;
    fn set_motion_threshold(&mut self, milli_g: u16) -> Result<()>;
    /// Consecutive samples over threshold before the interrupt fires.
    fn set_motion_duration(&mut self, samples: u8) -> Result<()>;
    /// Latest sample in m/s² and rad/s.
    fn fetch(&mut self) -> Result<MotionReading>;
}

/// Blocking PCM capture, one block per call.
pub trait PcmSource {
    fn read_block(&mut self, block: &mut PcmBlock) -> Result<()>;
}

pub trait BatteryMonitor {
    fn read_raw(&mut self) -> Result<i32>;
}
