// SensorLink - Device State Store
//
// One record per process, shared through `Arc`.  Every field is written by
// exactly one task; that rule is enforced by handing out each writer handle
// once:
//
//   CommandWriter  led, pwm width, periodic tick, rtc cache, config cache
//   ImuWriter      imu sample, imu initialised flag
//   BatteryWriter  battery raw reading
//
// Readers may race a writer.  Each scalar field is eventually consistent on
// its own; there is no multi-field snapshot.  The RTC and config records are
// read and written as a unit.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicI16, AtomicI32, AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::DEFAULT_PERIODIC_TICK_MS;
use crate::config_store::ConfigRecord;
use crate::events::{ImuSample, LedChannel, RtcTime};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedState {
    pub red: bool,
    pub green: bool,
    pub blue: bool,
    pub pwm_width_ns: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImuState {
    pub sample: ImuSample,
    pub initialized: bool,
}

#[derive(Debug)]
pub struct DeviceState {
    periodic_tick_ms: AtomicU16,
    leds: [AtomicBool; 3],
    pwm_width_ns: AtomicU32,
    battery_raw: AtomicI32,
    imu: [AtomicI16; 6],
    imu_initialized: AtomicBool,
    rtc: Mutex<RtcTime>,
    config: Mutex<ConfigRecord>,

    command_claimed: AtomicBool,
    imu_claimed: AtomicBool,
    battery_claimed: AtomicBool,
}

impl DeviceState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            periodic_tick_ms: AtomicU16::new(DEFAULT_PERIODIC_TICK_MS),
            leds: Default::default(),
            pwm_width_ns: AtomicU32::new(0),
            battery_raw: AtomicI32::new(0),
            imu: Default::default(),
            imu_initialized: AtomicBool::new(false),
            rtc: Mutex::new(RtcTime::default()),
            config: Mutex::new(ConfigRecord::default()),
            command_claimed: AtomicBool::new(false),
            imu_claimed: AtomicBool::new(false),
            battery_claimed: AtomicBool::new(false),
        })
    }

    // ---- Writer handles (each issued once) --------------------------------

    pub fn command_writer(self: &Arc<Self>) -> Option<CommandWriter> {
        claim(&self.command_claimed).then(|| CommandWriter(Arc::clone(self)))
    }

    pub fn imu_writer(self: &Arc<Self>) -> Option<ImuWriter> {
        claim(&self.imu_claimed).then(|| ImuWriter(Arc::clone(self)))
    }

    pub fn battery_writer(self: &Arc<Self>) -> Option<BatteryWriter> {
        claim(&self.battery_claimed).then(|| BatteryWriter(Arc::clone(self)))
    }

    // ---- Readers -----------------------------------------------------------

    pub fn periodic_tick_ms(&self) -> u16 {
        self.periodic_tick_ms.load(Ordering::Relaxed)
    }

    pub fn led(&self, channel: LedChannel) -> bool {
        self.leds[channel.index()].load(Ordering::Relaxed)
    }

    pub fn pwm_width_ns(&self) -> u32 {
        self.pwm_width_ns.load(Ordering::Relaxed)
    }

    pub fn led_state(&self) -> LedState {
        LedState {
            red: self.led(LedChannel::Red),
            green: self.led(LedChannel::Green),
            blue: self.led(LedChannel::Blue),
            pwm_width_ns: self.pwm_width_ns(),
        }
    }

    pub fn battery_raw(&self) -> i32 {
        self.battery_raw.load(Ordering::Relaxed)
    }

    pub fn imu(&self) -> ImuState {
        let mut axes = [0i16; 6];
        for (dst, src) in axes.iter_mut().zip(&self.imu) {
            *dst = src.load(Ordering::Relaxed);
        }
        ImuState {
            sample: ImuSample::from_axes(axes),
            initialized: self.imu_initialized.load(Ordering::Acquire),
        }
    }

    pub fn rtc(&self) -> RtcTime {
        *self.rtc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> ConfigRecord {
        *self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn claim(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// Write access for the command-driven fields.  Owned by the dispatcher; the
/// config store borrows it at boot before the dispatcher starts.
#[derive(Debug)]
pub struct CommandWriter(Arc<DeviceState>);

impl CommandWriter {
    pub fn set_led(&self, channel: LedChannel, on: bool) {
        self.0.leds[channel.index()].store(on, Ordering::Relaxed);
    }

    pub fn set_pwm_width_ns(&self, width: u32) {
        self.0.pwm_width_ns.store(width, Ordering::Relaxed);
    }

    pub fn set_periodic_tick_ms(&self, tick: u16) {
        self.0.periodic_tick_ms.store(tick, Ordering::Relaxed);
    }

    pub fn set_rtc(&self, time: RtcTime) {
        *self.0.rtc.lock().unwrap_or_else(PoisonError::into_inner) = time;
    }

    pub fn set_config(&self, record: ConfigRecord) {
        *self.0.config.lock().unwrap_or_else(PoisonError::into_inner) = record;
    }

    pub fn state(&self) -> &Arc<DeviceState> {
        &self.0
    }
}

impl Deref for CommandWriter {
    type Target = DeviceState;

    fn deref(&self) -> &DeviceState {
        &self.0
    }
}

/// Write access for the IMU fields.  Owned by the motion sampling task.
#[derive(Debug)]
pub struct ImuWriter(Arc<DeviceState>);

impl ImuWriter {
    pub fn set_sample(&self, sample: &ImuSample) {
        for (dst, src) in self.0.imu.iter().zip(sample.axes()) {
            dst.store(src, Ordering::Relaxed);
        }
    }

    pub fn set_initialized(&self, initialized: bool) {
        self.0.imu_initialized.store(initialized, Ordering::Release);
    }
}

impl Deref for ImuWriter {
    type Target = DeviceState;

    fn deref(&self) -> &DeviceState {
        &self.0
    }
}

/// Write access for the battery reading.  Owned by the periodic task.
#[derive(Debug)]
pub struct BatteryWriter(Arc<DeviceState>);

impl BatteryWriter {
    pub fn set_raw(&self, raw: i32) {
        self.0.battery_raw.store(raw, Ordering::Relaxed);
    }
}

impl Deref for BatteryWriter {
    type Target = DeviceState;

    fn deref(&self) -> &DeviceState {
        &self.0
    }
}
