// SensorLink - MPU6050 IMU Driver
//
// Register-level driver over a shared I2C bus, with the motion-detect
// interrupt used as the sampling trigger.

use std::f32::consts::PI;
use std::sync::PoisonError;

use embedded_hal::i2c::{Error as _, I2c};

use super::{MotionSensor, SharedBus};
use crate::config::*;
use crate::error::{Error, Result};
use crate::events::MotionReading;

// MPU6050 register addresses
pub const REG_SMPLRT_DIV: u8 = 0x19;
pub const REG_CONFIG: u8 = 0x1A;
pub const REG_GYRO_CONFIG: u8 = 0x1B;
pub const REG_ACCEL_CONFIG: u8 = 0x1C;
pub const REG_MOT_THR: u8 = 0x1F;
pub const REG_MOT_DUR: u8 = 0x20;
pub const REG_INT_PIN_CFG: u8 = 0x37;
pub const REG_INT_ENABLE: u8 = 0x38;
pub const REG_ACCEL_XOUT_H: u8 = 0x3B; // Start of 14-byte sensor burst
pub const REG_PWR_MGMT_1: u8 = 0x6B;
pub const REG_WHO_AM_I: u8 = 0x75;
pub const WHO_AM_I_EXPECTED: u8 = 0x68;

const INT_MOT_EN: u8 = 0x40;
const GYRO_OUTPUT_RATE_HZ: u16 = 1000; // with DLPF enabled
const MOT_THR_MG_PER_LSB: u16 = 2;

pub struct Mpu6050<B: 'static> {
    bus: SharedBus<B>,
}

impl<B: I2c + 'static> Mpu6050<B> {
    pub fn new(bus: SharedBus<B>) -> Self {
        Self { bus }
    }

    /// Verify the device is reachable on the I2C bus.
    pub fn is_connected(&self) -> bool {
        matches!(self.read_reg(REG_WHO_AM_I), Ok(WHO_AM_I_EXPECTED))
    }

    /// Wake the sensor and configure accel (±8 g, 5 Hz high-pass for motion
    /// detection), gyro (±500 °/s), DLPF 21 Hz.
    pub fn init(&self) -> Result<()> {
        self.write_reg(REG_PWR_MGMT_1, 0x00)?;
        self.write_reg(REG_CONFIG, 0x04)?;
        self.write_reg(REG_GYRO_CONFIG, 0x08)?;
        self.write_reg(REG_ACCEL_CONFIG, 0x10 | 0x01)?;

        log::info!("MPU6050 initialised (±8g, ±500°/s, DLPF 21Hz)");
        Ok(())
    }

    /// Burst-read all 6 axes and convert to m/s² and rad/s.
    pub fn read_data(&self) -> Result<MotionReading> {
        let mut raw = [0u8; 14];
        {
            let mut bus = self.bus.lock().unwrap_or_else(PoisonError::into_inner);
            bus.write_read(I2C_ADDR_MPU6050, &[REG_ACCEL_XOUT_H], &mut raw)
                .map_err(|e| Error::SensorFetch(format!("{:?}", e.kind())))?;
        }

        let accel = |hi: u8, lo: u8| {
            i16::from_be_bytes([hi, lo]) as f32 / ACCEL_SCALE_8G * STANDARD_GRAVITY
        };
        let gyro = |hi: u8, lo: u8| i16::from_be_bytes([hi, lo]) as f32 / GYRO_SCALE_500 * PI / 180.0;

        Ok(MotionReading {
            ax: accel(raw[0], raw[1]),
            ay: accel(raw[2], raw[3]),
            az: accel(raw[4], raw[5]),
            // raw[6..8] = temperature, skipped
            gx: gyro(raw[8], raw[9]),
            gy: gyro(raw[10], raw[11]),
            gz: gyro(raw[12], raw[13]),
        })
    }

    fn read_reg(&self, reg: u8) -> Result<u8> {
        let mut bus = self.bus.lock().unwrap_or_else(PoisonError::into_inner);
        let mut buf = [0u8; 1];
        bus.write_read(I2C_ADDR_MPU6050, &[reg], &mut buf)
            .map_err(Error::bus)?;
        Ok(buf[0])
    }

    fn write_reg(&self, reg: u8, value: u8) -> Result<()> {
        let mut bus = self.bus.lock().unwrap_or_else(PoisonError::into_inner);
        bus.write(I2C_ADDR_MPU6050, &[reg, value]).map_err(Error::bus)
    }
}

impl<B: I2c + 'static> MotionSensor for Mpu6050<B> {
    fn probe(&mut self) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::DeviceNotReady("MPU6050"));
        }
        self.init()
    }

    fn enable_motion_interrupt(&mut self) -> Result<()> {
        // Active-high 50 µs pulse, cleared without a status read.
        self.write_reg(REG_INT_PIN_CFG, 0x00)?;
        self.write_reg(REG_INT_ENABLE, INT_MOT_EN)
    }

    fn set_output_data_rate(&mut self, hz: u16) -> Result<()> {
        let hz = hz.clamp(4, GYRO_OUTPUT_RATE_HZ);
        let div = (GYRO_OUTPUT_RATE_HZ / hz - 1) as u8;
        self.write_reg(REG_SMPLRT_DIV, div)?;
        log::info!("MPU6050 ODR {} Hz (SMPLRT_DIV {})", hz, div);
        Ok(())
    }

    fn set_motion_threshold(&mut self, milli_g: u16) -> Result<()> {
        let lsb = (milli_g / MOT_THR_MG_PER_LSB).min(u8::MAX as u16) as u8;
        self.write_reg(REG_MOT_THR, lsb)
    }

    fn set_motion_duration(&mut self, samples: u8) -> Result<()> {
        self.write_reg(REG_MOT_DUR, samples)
    }

    fn fetch(&mut self) -> Result<MotionReading> {
        self.read_data()
    }
}
