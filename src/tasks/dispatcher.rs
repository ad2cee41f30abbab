// SensorLink - Command Queue & Dispatcher
//
// The transport receive callback decodes each packet and pushes it into a
// bounded queue, waiting at most 100 ms for room.  A single dispatcher task
// blocks on the other end and applies commands one at a time, in arrival
// order.  Nothing that goes wrong with one packet stops the loop.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::codec::CommandPacket;
use crate::config::{COMMAND_ENQUEUE_TIMEOUT_MS, COMMAND_QUEUE_DEPTH};
use crate::drivers::{LedActuator, RtcClock};
use crate::error::{Error, Result};
use crate::protocol::{Command, Reply};
use crate::state::CommandWriter;
use crate::telemetry::{self, Telemetry};

const ENQUEUE_RETRY_INTERVAL: Duration = Duration::from_millis(1);

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Producer handle, cloned into every receive path.
#[derive(Clone)]
pub struct CommandQueue {
    tx: SyncSender<CommandPacket>,
}

/// Consumer end, owned by the dispatcher task.
pub struct CommandReceiver {
    rx: Receiver<CommandPacket>,
}

pub fn command_queue() -> (CommandQueue, CommandReceiver) {
    let (tx, rx) = sync_channel(COMMAND_QUEUE_DEPTH);
    (CommandQueue { tx }, CommandReceiver { rx })
}

impl CommandQueue {
    /// Push with the standard 100 ms bound.
    pub fn enqueue(&self, packet: CommandPacket) -> Result<()> {
        self.enqueue_timeout(packet, Duration::from_millis(COMMAND_ENQUEUE_TIMEOUT_MS))
    }

    /// Push, waiting up to `timeout` for a free slot.  `QueueFull` on expiry;
    /// the packet is dropped, not retried.
    pub fn enqueue_timeout(&self, packet: CommandPacket, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let id = packet.id;
        let mut packet = packet;

        loop {
            match self.tx.try_send(packet) {
                Ok(()) => {
                    log::debug!("Message 0x{:04x} put in queue", id);
                    return Ok(());
                }
                Err(TrySendError::Full(p)) => {
                    if Instant::now() >= deadline {
                        log::error!("Command queue full, dropping 0x{:04x}", id);
                        return Err(Error::QueueFull);
                    }
                    packet = p;
                    thread::sleep(ENQUEUE_RETRY_INTERVAL);
                }
                Err(TrySendError::Disconnected(_)) => {
                    log::error!("Dispatcher gone, dropping 0x{:04x}", id);
                    return Err(Error::DeviceNotReady("command dispatcher"));
                }
            }
        }
    }

    /// Transport receive callback: decode the raw buffer and enqueue it.
    pub fn on_receive(&self, bytes: &[u8]) -> Result<()> {
        let packet = CommandPacket::decode(bytes).map_err(|e| {
            log::warn!("Dropping {} received bytes: {}", bytes.len(), e);
            e
        })?;
        log::info!("Received 0x{:04x}, len {}", packet.id, packet.len());
        self.enqueue(packet)
    }
}

impl CommandReceiver {
    /// Block until the next packet.  `None` once every producer is gone.
    pub fn recv(&self) -> Option<CommandPacket> {
        self.rx.recv().ok()
    }

    pub fn try_recv(&self) -> Option<CommandPacket> {
        self.rx.try_recv().ok()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher<L, R> {
    state: CommandWriter,
    leds: L,
    rtc: R,
    telemetry: Arc<dyn Telemetry>,
}

impl<L: LedActuator, R: RtcClock> Dispatcher<L, R> {
    pub fn new(state: CommandWriter, leds: L, rtc: R, telemetry: Arc<dyn Telemetry>) -> Self {
        Self { state, leds, rtc, telemetry }
    }

    /// Task body.  Runs until every `CommandQueue` clone is dropped, which on
    /// the device never happens.
    pub fn run(mut self, commands: CommandReceiver) {
        log::info!("Dispatcher task started");

        while let Some(packet) = commands.recv() {
            self.handle_packet(&packet);
        }

        log::warn!("Command queue closed, exiting dispatcher task");
    }

    /// Decode and apply one packet.  Errors are logged and swallowed.
    pub fn handle_packet(&mut self, packet: &CommandPacket) {
        log::debug!("0x{:04x}: {:02x?}", packet.id, packet.payload.as_slice());

        let command = match Command::decode(packet) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Dropping packet 0x{:04x}: {}", packet.id, e);
                return;
            }
        };

        if let Err(e) = self.dispatch(command) {
            log::error!("{:?} failed: {}", command, e);
        }
    }

    pub fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::LedCtrl { channel, on } => {
                self.state.set_led(channel, on);
                self.leds.set_led(channel, on)?;
                log::info!("LED[{}] {}", channel.index(), on as u8);
            }

            Command::GetBattAdc => {
                log::debug!("GET_BATT_ADC: not implemented");
            }

            Command::SetPwmLedWidth { pulse_width_ns } => {
                self.leds.set_pwm_width_ns(pulse_width_ns)?;
                self.state.set_pwm_width_ns(pulse_width_ns);
                log::info!("LED pulse width: {} ns", pulse_width_ns);
            }

            Command::SetPeriodicTick { tick_ms } => {
                self.state.set_periodic_tick_ms(tick_ms);
                log::info!("Periodic tick: {} ms", tick_ms);
            }

            Command::SetRtc(time) => {
                self.rtc.set_time(&time)?;
                self.state.set_rtc(time);
                log::info!("RTC set {}", time);
            }

            Command::GetRtc => {
                let time = self.rtc.get_time()?;
                self.state.set_rtc(time);
                telemetry::send_reply(self.telemetry.as_ref(), &Reply::NotifyRtc(time));
                log::info!("RTC get {}", time);
            }

            Command::Unknown { id, len } => {
                log::info!("Unknown message 0x{:04x}, len {}", id, len);
            }
        }
        Ok(())
    }

    pub fn state(&self) -> &CommandWriter {
        &self.state
    }

    pub fn leds(&self) -> &L {
        &self.leds
    }

    pub fn rtc(&self) -> &R {
        &self.rtc
    }
}
