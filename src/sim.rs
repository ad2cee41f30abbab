// SensorLink - Simulated Devices
//
// Stand-ins for every hardware collaborator, used by the host simulator
// binary and by the tests.  Each one records what was asked of it and can be
// told to fail.

use std::collections::{BTreeMap, VecDeque};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use embedded_hal::digital;
use embedded_hal::i2c::{self, ErrorKind, NoAcknowledgeSource, Operation};

use crate::config::{AUDIO_SAMPLES_PER_BLOCK, AUDIO_SAMPLE_RATE_HZ};
use crate::drivers::{BatteryMonitor, LedActuator, MotionSensor, PcmSource, RtcClock};
use crate::error::{Error, Result};
use crate::events::{LedChannel, MotionReading, RtcTime};
use crate::pool::PcmBlock;
use crate::telemetry::Telemetry;

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// Keeps every frame sent, in order.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    frames: Mutex<Vec<Vec<u8>>>,
    pub fail: AtomicBool,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Drain the recorded frames.
    pub fn take(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.frames.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }
}

impl Telemetry for RecordingTelemetry {
    fn send(&self, frame: &[u8]) -> Result<()> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(Error::Transport("link down".into()));
        }
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LEDs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedCall {
    Led(LedChannel, bool),
    PwmWidth(u32),
}

#[derive(Debug, Default)]
pub struct RecordingLeds {
    pub calls: Vec<LedCall>,
    pub lit: [bool; 3],
    pub pwm_width_ns: u32,
    pub fail: bool,
}

impl RecordingLeds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_lit(&self, channel: LedChannel) -> bool {
        self.lit[channel.index()]
    }
}

impl LedActuator for RecordingLeds {
    fn set_led(&mut self, channel: LedChannel, on: bool) -> Result<()> {
        if self.fail {
            return Err(Error::DeviceNotReady("LED GPIO"));
        }
        self.calls.push(LedCall::Led(channel, on));
        self.lit[channel.index()] = on;
        Ok(())
    }

    fn set_pwm_width_ns(&mut self, width_ns: u32) -> Result<()> {
        if self.fail {
            return Err(Error::DeviceNotReady("LED PWM"));
        }
        self.calls.push(LedCall::PwmWidth(width_ns));
        self.pwm_width_ns = width_ns;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RTC
// ---------------------------------------------------------------------------

/// Clock that stands still at whatever it was last set to.
#[derive(Debug, Default)]
pub struct SimRtc {
    pub time: RtcTime,
    pub sets: u32,
    pub fail: bool,
}

impl SimRtc {
    pub fn new(time: RtcTime) -> Self {
        Self { time, ..Self::default() }
    }
}

impl RtcClock for SimRtc {
    fn set_time(&mut self, time: &RtcTime) -> Result<()> {
        if self.fail {
            return Err(Error::Bus(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)));
        }
        self.time = *time;
        self.sets += 1;
        Ok(())
    }

    fn get_time(&mut self) -> Result<RtcTime> {
        if self.fail {
            return Err(Error::Bus(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)));
        }
        Ok(self.time)
    }
}

// ---------------------------------------------------------------------------
// Motion sensor
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionStep {
    Probe,
    EnableInterrupt,
    OutputDataRate(u16),
    Threshold(u16),
    Duration(u8),
}

/// Motion sensor fed from a queue of readings.  `fail_at` makes the matching
/// configuration step fail (compared by variant only).  Once the queue is
/// empty, fetches return `idle` if set.
#[derive(Debug, Default)]
pub struct ScriptedMotion {
    readings: VecDeque<Option<MotionReading>>,
    pub idle: Option<MotionReading>,
    pub steps: Vec<MotionStep>,
    pub fail_at: Option<MotionStep>,
    pub fetches: u32,
}

impl ScriptedMotion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reading(&mut self, reading: MotionReading) {
        self.readings.push_back(Some(reading));
    }

    /// Queue a fetch that fails.
    pub fn push_failure(&mut self) {
        self.readings.push_back(None);
    }

    fn step(&mut self, step: MotionStep) -> Result<()> {
        let fails = self
            .fail_at
            .is_some_and(|f| std::mem::discriminant(&f) == std::mem::discriminant(&step));
        if fails {
            return Err(match step {
                MotionStep::Probe => Error::DeviceNotReady("scripted motion sensor"),
                _ => Error::Bus(ErrorKind::Other),
            });
        }
        self.steps.push(step);
        Ok(())
    }
}

impl MotionSensor for ScriptedMotion {
    fn probe(&mut self) -> Result<()> {
        self.step(MotionStep::Probe)
    }

    fn enable_motion_interrupt(&mut self) -> Result<()> {
        self.step(MotionStep::EnableInterrupt)
    }

    fn set_output_data_rate(&mut self, hz: u16) -> Result<()> {
        self.step(MotionStep::OutputDataRate(hz))
    }

    fn set_motion_threshold(&mut self, milli_g: u16) -> Result<()> {
        self.step(MotionStep::Threshold(milli_g))
    }

    fn set_motion_duration(&mut self, samples: u8) -> Result<()> {
        self.step(MotionStep::Duration(samples))
    }

    fn fetch(&mut self) -> Result<MotionReading> {
        self.fetches += 1;
        match self.readings.pop_front() {
            Some(Some(reading)) => Ok(reading),
            Some(None) => Err(Error::SensorFetch("scripted failure".into())),
            None => self
                .idle
                .ok_or_else(|| Error::SensorFetch("no sample queued".into())),
        }
    }
}

/// GPIO output that remembers its level.
#[derive(Debug, Default)]
pub struct SimPin {
    pub high: bool,
    pub fail: bool,
}

impl digital::ErrorType for SimPin {
    type Error = digital::ErrorKind;
}

impl digital::OutputPin for SimPin {
    fn set_low(&mut self) -> core::result::Result<(), Self::Error> {
        if self.fail {
            return Err(digital::ErrorKind::Other);
        }
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> core::result::Result<(), Self::Error> {
        if self.fail {
            return Err(digital::ErrorKind::Other);
        }
        self.high = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Microphone
// ---------------------------------------------------------------------------

/// Sine tone generator.  With `realtime` set each block takes as long as the
/// real microphone would (10 ms at 16 kHz).
#[derive(Debug)]
pub struct ToneSource {
    pub frequency_hz: f32,
    pub amplitude: i16,
    pub realtime: bool,
    /// Fail the next read, then clear.
    pub fail_next: bool,
    phase: f32,
    blocks: u32,
}

impl ToneSource {
    pub fn new(frequency_hz: f32, amplitude: i16) -> Self {
        Self {
            frequency_hz,
            amplitude,
            realtime: false,
            fail_next: false,
            phase: 0.0,
            blocks: 0,
        }
    }

    pub fn blocks(&self) -> u32 {
        self.blocks
    }
}

impl PcmSource for ToneSource {
    fn read_block(&mut self, block: &mut PcmBlock) -> Result<()> {
        if self.realtime {
            let us = AUDIO_SAMPLES_PER_BLOCK as u64 * 1_000_000 / AUDIO_SAMPLE_RATE_HZ as u64;
            thread::sleep(Duration::from_micros(us));
        }
        if std::mem::take(&mut self.fail_next) {
            return Err(Error::DeviceNotReady("I2S microphone"));
        }

        let step = 2.0 * PI * self.frequency_hz / AUDIO_SAMPLE_RATE_HZ as f32;
        for sample in block.iter_mut() {
            *sample = (self.phase.sin() * self.amplitude as f32) as i16;
            self.phase = (self.phase + step) % (2.0 * PI);
        }
        self.blocks += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Battery
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SimBattery {
    pub raw: i32,
    pub reads: u32,
    pub fail: bool,
}

impl SimBattery {
    pub fn new(raw: i32) -> Self {
        Self { raw, ..Self::default() }
    }
}

impl BatteryMonitor for SimBattery {
    fn read_raw(&mut self) -> Result<i32> {
        self.reads += 1;
        if self.fail {
            return Err(Error::DeviceNotReady("battery ADC"));
        }
        Ok(self.raw)
    }
}

// ---------------------------------------------------------------------------
// I2C register-file bus
// ---------------------------------------------------------------------------

/// Register-file I2C bus.  A write's first byte sets the register pointer and
/// any further bytes are stored from there on; reads continue from the
/// pointer.  Both auto-increment.  Addresses with no device NACK.
#[derive(Debug, Default)]
pub struct RegisterBus {
    devices: BTreeMap<u8, Device>,
    pub fail: bool,
    /// Every write transfer, as `(address, bytes)`.
    pub writes: Vec<(u8, Vec<u8>)>,
}

#[derive(Debug)]
struct Device {
    regs: [u8; 256],
    pointer: u8,
}

impl RegisterBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device with all registers zero.
    pub fn with_device(mut self, address: u8) -> Self {
        self.devices.insert(address, Device { regs: [0; 256], pointer: 0 });
        self
    }

    pub fn set_reg(&mut self, address: u8, reg: u8, value: u8) {
        if let Some(dev) = self.devices.get_mut(&address) {
            dev.regs[reg as usize] = value;
        }
    }

    pub fn set_regs(&mut self, address: u8, start: u8, values: &[u8]) {
        for (i, v) in values.iter().enumerate() {
            self.set_reg(address, start.wrapping_add(i as u8), *v);
        }
    }

    pub fn reg(&self, address: u8, reg: u8) -> Option<u8> {
        self.devices.get(&address).map(|d| d.regs[reg as usize])
    }

    /// Give the bus a `'static` home, as the firmware does with its I2C
    /// driver.
    pub fn leak(self) -> &'static Mutex<RegisterBus> {
        Box::leak(Box::new(Mutex::new(self)))
    }
}

impl i2c::ErrorType for RegisterBus {
    type Error = ErrorKind;
}

impl i2c::I2c for RegisterBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> core::result::Result<(), Self::Error> {
        if self.fail {
            return Err(ErrorKind::Bus);
        }
        let dev = self
            .devices
            .get_mut(&address)
            .ok_or(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))?;

        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => {
                    self.writes.push((address, bytes.to_vec()));
                    if let Some((&reg, data)) = bytes.split_first() {
                        dev.pointer = reg;
                        for &b in data {
                            dev.regs[dev.pointer as usize] = b;
                            dev.pointer = dev.pointer.wrapping_add(1);
                        }
                    }
                }
                Operation::Read(buf) => {
                    for b in buf.iter_mut() {
                        *b = dev.regs[dev.pointer as usize];
                        dev.pointer = dev.pointer.wrapping_add(1);
                    }
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Hex helpers
// ---------------------------------------------------------------------------

/// Parse `"01 00 06 00 00 01"` (whitespace optional) into bytes.
pub fn parse_hex(line: &str) -> Option<Vec<u8>> {
    let digits: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok())
        .collect()
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
