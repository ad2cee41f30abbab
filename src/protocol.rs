// SensorLink - Message Types
//
// Raw packets are turned into a `Command` exactly once, at the queue
// boundary.  Adding a message kind means adding a variant here, and the
// dispatcher's `match` will not compile until it is handled.

use crate::codec::{self, CommandPacket, Frame};
use crate::error::{Error, Result};
use crate::events::{ImuSample, LedChannel, RtcTime};

// ---------------------------------------------------------------------------
// Message ids
// ---------------------------------------------------------------------------
pub const MSG_LED_CTRL: u16 = 0x0001;
pub const MSG_GET_BATT_ADC: u16 = 0x0002;
pub const MSG_SET_PWM_LED_WIDTH: u16 = 0x0003;
pub const MSG_SET_PRD_TICK: u16 = 0x0004;
pub const MSG_SET_RTC: u16 = 0x0005;
pub const MSG_GET_RTC: u16 = 0x0006;
pub const MSG_NOTIFY_IMU: u16 = 0x0010;
pub const MSG_NOTIFY_RTC: u16 = 0x0011;

// ---------------------------------------------------------------------------
// Inbound commands
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    LedCtrl { channel: LedChannel, on: bool },
    /// Reserved for a future battery read; accepted and ignored.
    GetBattAdc,
    SetPwmLedWidth { pulse_width_ns: u32 },
    SetPeriodicTick { tick_ms: u16 },
    SetRtc(RtcTime),
    GetRtc,
    /// Not an error: logged by the dispatcher and skipped.
    Unknown { id: u16, len: u16 },
}

impl Command {
    pub fn decode(packet: &CommandPacket) -> Result<Self> {
        let p = packet.payload.as_slice();
        let command = match packet.id {
            MSG_LED_CTRL => {
                let b = take::<2>(p, "LED_CTRL needs 2 bytes")?;
                let channel = LedChannel::try_from(b[0])
                    .map_err(|_| Error::MalformedPacket("LED channel out of range"))?;
                Self::LedCtrl { channel, on: b[1] != 0 }
            }
            MSG_GET_BATT_ADC => Self::GetBattAdc,
            MSG_SET_PWM_LED_WIDTH => {
                let b = take::<4>(p, "SET_PWM_LED_WIDTH needs 4 bytes")?;
                Self::SetPwmLedWidth { pulse_width_ns: u32::from_be_bytes(b) }
            }
            MSG_SET_PRD_TICK => {
                let b = take::<2>(p, "SET_PRD_TICK needs 2 bytes")?;
                Self::SetPeriodicTick { tick_ms: u16::from_be_bytes(b) }
            }
            MSG_SET_RTC => {
                let time = RtcTime::from_bytes(take::<7>(p, "SET_RTC needs 7 bytes")?);
                if !time.is_valid() {
                    return Err(Error::MalformedPacket("SET_RTC field out of range"));
                }
                Self::SetRtc(time)
            }
            MSG_GET_RTC => Self::GetRtc,
            id => Self::Unknown { id, len: packet.len() },
        };
        Ok(command)
    }

    /// Build the wire packet for this command.  Used by host-side tooling and
    /// tests; `Unknown` has no payload to rebuild.
    pub fn to_packet(&self) -> Result<CommandPacket> {
        match *self {
            Self::LedCtrl { channel, on } => {
                CommandPacket::new(MSG_LED_CTRL, &[channel.index() as u8, on as u8])
            }
            Self::GetBattAdc => CommandPacket::new(MSG_GET_BATT_ADC, &[]),
            Self::SetPwmLedWidth { pulse_width_ns } => {
                CommandPacket::new(MSG_SET_PWM_LED_WIDTH, &pulse_width_ns.to_be_bytes())
            }
            Self::SetPeriodicTick { tick_ms } => {
                CommandPacket::new(MSG_SET_PRD_TICK, &tick_ms.to_be_bytes())
            }
            Self::SetRtc(time) => CommandPacket::new(MSG_SET_RTC, &time.to_bytes()),
            Self::GetRtc => CommandPacket::new(MSG_GET_RTC, &[]),
            Self::Unknown { id, .. } => CommandPacket::new(id, &[]),
        }
    }
}

/// Leading `N` bytes of the payload; extra bytes are tolerated.
fn take<const N: usize>(payload: &[u8], reason: &'static str) -> Result<[u8; N]> {
    payload
        .get(..N)
        .and_then(|s| s.try_into().ok())
        .ok_or(Error::MalformedPacket(reason))
}

// ---------------------------------------------------------------------------
// Outbound telemetry
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    NotifyImu(ImuSample),
    NotifyRtc(RtcTime),
}

impl Reply {
    pub fn id(&self) -> u16 {
        match self {
            Self::NotifyImu(_) => MSG_NOTIFY_IMU,
            Self::NotifyRtc(_) => MSG_NOTIFY_RTC,
        }
    }

    /// Header plus fields written byte by byte, so the layout does not depend
    /// on struct padding.  IMU axes are little-endian like the header.
    pub fn encode(&self) -> Frame {
        let mut payload = [0u8; 12];
        let used = match self {
            Self::NotifyImu(sample) => {
                for (chunk, axis) in payload.chunks_exact_mut(2).zip(sample.axes()) {
                    chunk.copy_from_slice(&axis.to_le_bytes());
                }
                12
            }
            Self::NotifyRtc(time) => {
                payload[..7].copy_from_slice(&time.to_bytes());
                7
            }
        };
        // At most 12 payload bytes, always within bounds.
        codec::encode_reply(self.id(), &payload[..used]).unwrap_or_default()
    }

    pub fn decode(packet: &CommandPacket) -> Result<Self> {
        let p = packet.payload.as_slice();
        match packet.id {
            MSG_NOTIFY_IMU => {
                let b = take::<12>(p, "NOTIFY_IMU needs 12 bytes")?;
                let mut axes = [0i16; 6];
                for (axis, chunk) in axes.iter_mut().zip(b.chunks_exact(2)) {
                    *axis = i16::from_le_bytes([chunk[0], chunk[1]]);
                }
                Ok(Self::NotifyImu(ImuSample::from_axes(axes)))
            }
            MSG_NOTIFY_RTC => Ok(Self::NotifyRtc(RtcTime::from_bytes(take::<7>(
                p,
                "NOTIFY_RTC needs 7 bytes",
            )?))),
            _ => Err(Error::MalformedPacket("not a reply id")),
        }
    }
}
