// SensorLink - Error Taxonomy
//
// Every failure in the pipeline is local: callers log and continue.  Only the
// config store surfaces errors to its caller as recoverable values.

use embedded_hal::i2c::ErrorKind;

/// Crate-wide result alias.
pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad header length or payload that does not fit its message type.
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    /// Bounded queue stayed full past its wait budget.
    #[error("queue full")]
    QueueFull,

    /// A subsystem failed to come up; the rest of the firmware keeps running.
    #[error("{0} not ready")]
    DeviceNotReady(&'static str),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("sensor fetch failed: {0}")]
    SensorFetch(String),

    #[error("i2c transfer failed: {0:?}")]
    Bus(ErrorKind),

    #[error("transport send failed: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// `init` has not completed (or `reset` is in progress).
    #[error("storage not initialised")]
    NotReady,

    #[error("storage device unavailable")]
    DeviceUnavailable,

    #[error("mount failed: {0}")]
    Mount(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("erase failed: {0}")]
    Erase(String),
}

impl Error {
    /// Map a bus error from any `embedded-hal` I2C implementation.
    pub fn bus<E: embedded_hal::i2c::Error>(e: E) -> Self {
        Error::Bus(e.kind())
    }
}
