// SensorLink - Shared Data Types

use crate::config::IMU_FIXED_POINT_SCALE;

// ---------------------------------------------------------------------------
// Motion Data (6-axis reading in physical units)
// ---------------------------------------------------------------------------

/// Accelerometer in m/s², gyroscope in rad/s.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionReading {
    pub ax: f32,
    pub ay: f32,
    pub az: f32,
    pub gx: f32,
    pub gy: f32,
    pub gz: f32,
}

/// Compact fixed-point sample as it goes on the wire (physical value × 100).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImuSample {
    pub acc_x: i16,
    pub acc_y: i16,
    pub acc_z: i16,
    pub gyro_x: i16,
    pub gyro_y: i16,
    pub gyro_z: i16,
}

impl ImuSample {
    pub fn from_reading(r: &MotionReading) -> Self {
        Self {
            acc_x: saturating_fixed_point(r.ax),
            acc_y: saturating_fixed_point(r.ay),
            acc_z: saturating_fixed_point(r.az),
            gyro_x: saturating_fixed_point(r.gx),
            gyro_y: saturating_fixed_point(r.gy),
            gyro_z: saturating_fixed_point(r.gz),
        }
    }

    pub fn axes(&self) -> [i16; 6] {
        [self.acc_x, self.acc_y, self.acc_z, self.gyro_x, self.gyro_y, self.gyro_z]
    }

    pub fn from_axes(a: [i16; 6]) -> Self {
        Self {
            acc_x: a[0],
            acc_y: a[1],
            acc_z: a[2],
            gyro_x: a[3],
            gyro_y: a[4],
            gyro_z: a[5],
        }
    }
}

/// Scale a physical value by 100 and round to the nearest integer, pinning
/// anything beyond ±327.67 to the i16 limits.  NaN maps to 0.
pub fn saturating_fixed_point(value: f32) -> i16 {
    let scaled = (value * IMU_FIXED_POINT_SCALE).round();
    if scaled.is_nan() {
        0
    } else if scaled >= i16::MAX as f32 {
        i16::MAX
    } else if scaled <= i16::MIN as f32 {
        i16::MIN
    } else {
        scaled as i16
    }
}

// ---------------------------------------------------------------------------
// LEDs
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedChannel {
    Red,
    Green,
    Blue,
}

impl LedChannel {
    pub const ALL: [LedChannel; 3] = [LedChannel::Red, LedChannel::Green, LedChannel::Blue];

    pub fn index(self) -> usize {
        match self {
            Self::Red => 0,
            Self::Green => 1,
            Self::Blue => 2,
        }
    }
}

impl TryFrom<u8> for LedChannel {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Red),
            1 => Ok(Self::Green),
            2 => Ok(Self::Blue),
            other => Err(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Real-time clock
// ---------------------------------------------------------------------------

/// Calendar time as plain decimals.  `year` is the offset from 2000.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RtcTime {
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl RtcTime {
    /// Field order used on the wire: year, month, day, weekday, hour, minute, second.
    pub fn to_bytes(&self) -> [u8; 7] {
        [
            self.year,
            self.month,
            self.day,
            self.weekday,
            self.hour,
            self.minute,
            self.second,
        ]
    }

    pub fn from_bytes(b: [u8; 7]) -> Self {
        Self {
            year: b[0],
            month: b[1],
            day: b[2],
            weekday: b[3],
            hour: b[4],
            minute: b[5],
            second: b[6],
        }
    }

    /// True when every field fits the PCF8563 calendar ranges.
    pub fn is_valid(&self) -> bool {
        self.year <= 99
            && (1..=12).contains(&self.month)
            && (1..=31).contains(&self.day)
            && self.weekday <= 6
            && self.hour <= 23
            && self.minute <= 59
            && self.second <= 59
    }
}

impl core::fmt::Display for RtcTime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "20{:02}-{:02}-{:02}, {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_point_rounds_to_nearest() {
        assert_eq!(saturating_fixed_point(9.806), 981);
        assert_eq!(saturating_fixed_point(-0.016), -2);
        assert_eq!(saturating_fixed_point(0.0), 0);
    }

    #[test]
    fn fixed_point_saturates_out_of_range() {
        assert_eq!(saturating_fixed_point(327.67), 32767);
        assert_eq!(saturating_fixed_point(400.0), i16::MAX);
        assert_eq!(saturating_fixed_point(-400.0), i16::MIN);
        assert_eq!(saturating_fixed_point(f32::INFINITY), i16::MAX);
        assert_eq!(saturating_fixed_point(f32::NAN), 0);
    }

    #[test]
    fn led_channel_rejects_unknown() {
        assert_eq!(LedChannel::try_from(2), Ok(LedChannel::Blue));
        assert_eq!(LedChannel::try_from(3), Err(3));
    }

    #[test]
    fn rtc_validity() {
        let t = RtcTime { year: 24, month: 1, day: 24, weekday: 3, hour: 15, minute: 23, second: 45 };
        assert!(t.is_valid());
        assert!(!RtcTime { month: 13, ..t }.is_valid());
        assert!(!RtcTime { second: 60, ..t }.is_valid());
        assert_eq!(t.to_string(), "2024-01-24, 15:23:45");
    }
}
