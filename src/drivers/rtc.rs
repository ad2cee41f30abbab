// SensorLink - PCF8563 Real-Time Clock Driver
//
// Seven sequential BCD registers, seconds first.  Status bits sharing those
// registers (VL in seconds, century in months) are masked on read.

use std::sync::PoisonError;

use embedded_hal::i2c::I2c;

use super::{RtcClock, SharedBus};
use crate::codec::{bcd_to_dec, dec_to_bcd};
use crate::config::I2C_ADDR_PCF8563;
use crate::error::{Error, Result};
use crate::events::RtcTime;

// PCF8563 register map
pub const REG_SECONDS: u8 = 0x02;
pub const REG_MINUTES: u8 = 0x03;
pub const REG_HOURS: u8 = 0x04;
pub const REG_DAYS: u8 = 0x05;
pub const REG_WEEKDAYS: u8 = 0x06;
pub const REG_MONTHS: u8 = 0x07;
pub const REG_YEARS: u8 = 0x08;

const VL_BIT: u8 = 0x80;

pub struct Pcf8563<B: 'static> {
    bus: SharedBus<B>,
}

impl<B: I2c + 'static> Pcf8563<B> {
    pub fn new(bus: SharedBus<B>) -> Self {
        Self { bus }
    }
}

impl<B: I2c + 'static> RtcClock for Pcf8563<B> {
    fn set_time(&mut self, time: &RtcTime) -> Result<()> {
        // Register address first, then seconds..years.  Writing the seconds
        // register with bit 7 clear also resets the VL flag.
        let buffer = [
            REG_SECONDS,
            dec_to_bcd(time.second) & !VL_BIT,
            dec_to_bcd(time.minute),
            dec_to_bcd(time.hour),
            dec_to_bcd(time.day),
            dec_to_bcd(time.weekday),
            dec_to_bcd(time.month),
            dec_to_bcd(time.year),
        ];
        let mut bus = self.bus.lock().unwrap_or_else(PoisonError::into_inner);
        bus.write(I2C_ADDR_PCF8563, &buffer).map_err(Error::bus)
    }

    fn get_time(&mut self) -> Result<RtcTime> {
        let mut regs = [0u8; 7];
        {
            let mut bus = self.bus.lock().unwrap_or_else(PoisonError::into_inner);
            bus.write_read(I2C_ADDR_PCF8563, &[REG_SECONDS], &mut regs)
                .map_err(Error::bus)?;
        }

        if regs[0] & VL_BIT != 0 {
            log::warn!("RTC voltage-low flag set, time may be invalid");
        }

        Ok(RtcTime {
            second: bcd_to_dec(regs[0] & 0x7F),
            minute: bcd_to_dec(regs[1] & 0x7F),
            hour: bcd_to_dec(regs[2] & 0x3F),
            day: bcd_to_dec(regs[3] & 0x3F),
            weekday: bcd_to_dec(regs[4] & 0x07),
            month: bcd_to_dec(regs[5] & 0x1F), // drops the century bit
            year: bcd_to_dec(regs[6]),
        })
    }
}
