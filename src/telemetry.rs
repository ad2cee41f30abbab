// SensorLink - Telemetry Egress
//
// Outbound side of the wireless transport.  Implementations must tolerate
// concurrent callers: the dispatcher and the motion task both send, and
// frames from the two may interleave.

use crate::error::Result;
use crate::protocol::Reply;

pub trait Telemetry: Send + Sync {
    /// Send one complete frame (header included).
    fn send(&self, frame: &[u8]) -> Result<()>;
}

/// Encode and send a reply.  Failures are logged here and never propagate
/// into the calling task's loop.
pub fn send_reply(telemetry: &dyn Telemetry, reply: &Reply) -> bool {
    let frame = reply.encode();
    match telemetry.send(&frame) {
        Ok(()) => {
            log::debug!("sent 0x{:04x} ({} bytes)", reply.id(), frame.len());
            true
        }
        Err(e) => {
            log::warn!("dropping reply 0x{:04x}: {}", reply.id(), e);
            false
        }
    }
}
