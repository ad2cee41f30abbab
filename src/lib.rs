// SensorLink - Sensor Node Firmware Core
//
// Commands arrive as framed packets over a wireless serial link, are queued
// and applied by a dispatcher task.  Motion and audio samples flow the other
// way through their own pipelines.  Everything below `drivers::board` is
// target independent and runs on the host against the `sim` devices.

pub mod codec;
pub mod config;
pub mod config_store;
pub mod drivers;
pub mod error;
pub mod events;
pub mod pool;
pub mod protocol;
pub mod signal;
#[cfg(not(target_os = "espidf"))]
pub mod sim;
pub mod state;
pub mod storage;
pub mod tasks;
pub mod telemetry;

pub use codec::CommandPacket;
pub use config_store::{ConfigRecord, ConfigStore};
pub use error::{Error, Result, StorageError};
pub use protocol::{Command, Reply};
pub use state::DeviceState;
