//! Register-level driver tests against the simulated I2C bus

use sensorlink::config::{I2C_ADDR_MPU6050, I2C_ADDR_PCF8563};
use sensorlink::drivers::imu::{self, Mpu6050};
use sensorlink::drivers::rtc::{self, Pcf8563};
use sensorlink::drivers::{MotionSensor, RtcClock};
use sensorlink::events::RtcTime;
use sensorlink::sim::RegisterBus;
use sensorlink::Error;

fn mpu_bus() -> RegisterBus {
    let mut bus = RegisterBus::new().with_device(I2C_ADDR_MPU6050);
    bus.set_reg(I2C_ADDR_MPU6050, imu::REG_WHO_AM_I, imu::WHO_AM_I_EXPECTED);
    bus
}

#[test]
fn test_mpu6050_probe_and_configure() {
    let bus = mpu_bus().leak();
    let mut sensor = Mpu6050::new(bus);

    sensor.probe().unwrap();
    sensor.enable_motion_interrupt().unwrap();
    sensor.set_output_data_rate(26).unwrap();
    sensor.set_motion_threshold(500).unwrap();
    sensor.set_motion_duration(1).unwrap();

    let bus = bus.lock().unwrap();
    let reg = |r| bus.reg(I2C_ADDR_MPU6050, r).unwrap();
    assert_eq!(reg(imu::REG_PWR_MGMT_1), 0x00);
    assert_eq!(reg(imu::REG_ACCEL_CONFIG), 0x11);
    assert_eq!(reg(imu::REG_GYRO_CONFIG), 0x08);
    assert_eq!(reg(imu::REG_INT_ENABLE), 0x40);
    assert_eq!(reg(imu::REG_SMPLRT_DIV), 37); // 1000 / 26 - 1
    assert_eq!(reg(imu::REG_MOT_THR), 250);
    assert_eq!(reg(imu::REG_MOT_DUR), 1);
}

#[test]
fn test_mpu6050_wrong_identity() {
    let mut bus = mpu_bus();
    bus.set_reg(I2C_ADDR_MPU6050, imu::REG_WHO_AM_I, 0x70);
    let mut sensor = Mpu6050::new(bus.leak());
    assert!(matches!(sensor.probe(), Err(Error::DeviceNotReady(_))));
}

#[test]
fn test_mpu6050_absent() {
    let mut sensor = Mpu6050::new(RegisterBus::new().leak());
    assert!(!sensor.is_connected());
    assert!(sensor.probe().is_err());
}

#[test]
fn test_mpu6050_fetch_converts_units() {
    let mut bus = mpu_bus();
    // ax = +1 g, az = -1 g at ±8 g; gx = 65.5 LSB = 1 °/s.
    let mut burst = [0u8; 14];
    burst[0..2].copy_from_slice(&4096i16.to_be_bytes());
    burst[4..6].copy_from_slice(&(-4096i16).to_be_bytes());
    burst[8..10].copy_from_slice(&655i16.to_be_bytes());
    bus.set_regs(I2C_ADDR_MPU6050, imu::REG_ACCEL_XOUT_H, &burst);

    let mut sensor = Mpu6050::new(bus.leak());
    let reading = sensor.fetch().unwrap();
    assert!((reading.ax - 9.80665).abs() < 1e-3);
    assert!(reading.ay.abs() < 1e-6);
    assert!((reading.az + 9.80665).abs() < 1e-3);
    assert!((reading.gx - 10.0f32.to_radians()).abs() < 1e-4);
}

#[test]
fn test_mpu6050_fetch_failure_is_sensor_fetch() {
    let mut bus = mpu_bus();
    bus.fail = true;
    let mut sensor = Mpu6050::new(bus.leak());
    assert!(matches!(sensor.fetch(), Err(Error::SensorFetch(_))));
}

#[test]
fn test_mpu6050_rate_is_clamped() {
    let bus = mpu_bus().leak();
    let mut sensor = Mpu6050::new(bus);
    sensor.set_output_data_rate(0).unwrap();
    assert_eq!(bus.lock().unwrap().reg(I2C_ADDR_MPU6050, imu::REG_SMPLRT_DIV), Some(249));
    sensor.set_output_data_rate(5000).unwrap();
    assert_eq!(bus.lock().unwrap().reg(I2C_ADDR_MPU6050, imu::REG_SMPLRT_DIV), Some(0));
}

#[test]
fn test_pcf8563_set_writes_bcd() {
    let bus = RegisterBus::new().with_device(I2C_ADDR_PCF8563).leak();
    let mut clock = Pcf8563::new(bus);
    let time = RtcTime { year: 24, month: 11, day: 30, weekday: 6, hour: 23, minute: 45, second: 59 };
    clock.set_time(&time).unwrap();

    let bus = bus.lock().unwrap();
    assert_eq!(
        bus.writes.last().unwrap(),
        &(I2C_ADDR_PCF8563, vec![rtc::REG_SECONDS, 0x59, 0x45, 0x23, 0x30, 0x06, 0x11, 0x24])
    );
}

#[test]
fn test_pcf8563_set_get_round_trip() {
    let bus = RegisterBus::new().with_device(I2C_ADDR_PCF8563).leak();
    let mut clock = Pcf8563::new(bus);
    let time = RtcTime { year: 99, month: 1, day: 1, weekday: 0, hour: 0, minute: 0, second: 0 };
    clock.set_time(&time).unwrap();
    assert_eq!(clock.get_time().unwrap(), time);
}

#[test]
fn test_pcf8563_masks_status_bits() {
    let mut bus = RegisterBus::new().with_device(I2C_ADDR_PCF8563);
    // VL flag in seconds, century flag in months, junk in unused bits.
    bus.set_regs(
        I2C_ADDR_PCF8563,
        rtc::REG_SECONDS,
        &[0x80 | 0x12, 0x80 | 0x34, 0xC0 | 0x08, 0xC0 | 0x15, 0xF8 | 0x03, 0x80 | 0x07, 0x25],
    );
    let mut clock = Pcf8563::new(bus.leak());
    assert_eq!(
        clock.get_time().unwrap(),
        RtcTime { year: 25, month: 7, day: 15, weekday: 3, hour: 8, minute: 34, second: 12 }
    );
}

#[test]
fn test_pcf8563_absent() {
    let mut clock = Pcf8563::new(RegisterBus::new().leak());
    assert!(matches!(clock.get_time(), Err(Error::Bus(_))));
}
