// SensorLink - Persistent Config Store
//
// One fixed record in non-volatile storage:
//
//   unique_id(2)  boot_count(4)  periodic_tick_ms(2)     little-endian, 8 bytes
//
// First read on an empty store writes the defaults.  Every later read bumps
// the boot counter and persists it.

use crate::config::{
    CONFIG_RECORD_KEY, DEFAULT_BOOT_COUNT, DEFAULT_PERIODIC_TICK_MS, DEFAULT_UNIQUE_ID,
};
use crate::error::StorageError;
use crate::state::CommandWriter;
use crate::storage::{RecordStorage, StorageGeometry};

pub const CONFIG_RECORD_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRecord {
    pub unique_id: u16,
    pub boot_count: u32,
    pub periodic_tick_ms: u16,
}

impl Default for ConfigRecord {
    fn default() -> Self {
        Self {
            unique_id: DEFAULT_UNIQUE_ID,
            boot_count: DEFAULT_BOOT_COUNT,
            periodic_tick_ms: DEFAULT_PERIODIC_TICK_MS,
        }
    }
}

impl ConfigRecord {
    pub fn to_bytes(&self) -> [u8; CONFIG_RECORD_LEN] {
        let mut out = [0u8; CONFIG_RECORD_LEN];
        out[0..2].copy_from_slice(&self.unique_id.to_le_bytes());
        out[2..6].copy_from_slice(&self.boot_count.to_le_bytes());
        out[6..8].copy_from_slice(&self.periodic_tick_ms.to_le_bytes());
        out
    }

    pub fn from_bytes(b: &[u8; CONFIG_RECORD_LEN]) -> Self {
        Self {
            unique_id: u16::from_le_bytes([b[0], b[1]]),
            boot_count: u32::from_le_bytes([b[2], b[3], b[4], b[5]]),
            periodic_tick_ms: u16::from_le_bytes([b[6], b[7]]),
        }
    }
}

pub struct ConfigStore<S: RecordStorage> {
    storage: S,
    geometry: Option<StorageGeometry>,
}

impl<S: RecordStorage> ConfigStore<S> {
    /// Wrap a backend.  Nothing is touched until [`init`](Self::init).
    pub fn new(storage: S) -> Self {
        Self { storage, geometry: None }
    }

    pub fn is_ready(&self) -> bool {
        self.geometry.is_some()
    }

    pub fn geometry(&self) -> Option<StorageGeometry> {
        self.geometry
    }

    /// Mount the storage area.  Must succeed before any read or write.
    pub fn init(&mut self) -> Result<(), StorageError> {
        match self.storage.mount() {
            Ok(geometry) => {
                log::info!(
                    "Config storage mounted ({} sectors x {} bytes)",
                    geometry.sector_count,
                    geometry.sector_size
                );
                self.geometry = Some(geometry);
                Ok(())
            }
            Err(e) => {
                log::error!("Config storage init failed: {}", e);
                self.geometry = None;
                Err(e)
            }
        }
    }

    /// Load the stored record without side effects.
    ///
    /// A record of the wrong size is reported as absent so the next
    /// [`read_and_track_boot`](Self::read_and_track_boot) rewrites defaults.
    pub fn peek(&mut self) -> Result<Option<ConfigRecord>, StorageError> {
        self.ensure_ready()?;
        let mut buf = [0u8; CONFIG_RECORD_LEN];
        match self.storage.read(CONFIG_RECORD_KEY, &mut buf)? {
            Some(CONFIG_RECORD_LEN) => Ok(Some(ConfigRecord::from_bytes(&buf))),
            Some(n) => {
                log::warn!("Stored config has {} bytes, expected {}; ignoring", n, CONFIG_RECORD_LEN);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Load the record, apply its tick to the device state and count this
    /// boot.  On an empty store the defaults are created and persisted.
    ///
    /// This is not a pure read: the incremented boot counter is written back.
    /// If that write fails the error is returned and the stored count stays
    /// where it was; the tick has already been applied.
    pub fn read_and_track_boot(
        &mut self,
        state: &CommandWriter,
    ) -> Result<ConfigRecord, StorageError> {
        match self.peek()? {
            Some(mut record) => {
                log::info!(
                    "Config found: unique_id 0x{:04x}, boot_count {}, tick {} ms",
                    record.unique_id,
                    record.boot_count,
                    record.periodic_tick_ms
                );
                state.set_periodic_tick_ms(record.periodic_tick_ms);
                record.boot_count = record.boot_count.wrapping_add(1);
                self.write(record, state)
            }
            None => {
                log::info!("No config stored, initialising defaults");
                let record = ConfigRecord::default();
                state.set_periodic_tick_ms(record.periodic_tick_ms);
                let record = self.write(record, state)?;
                log::info!("Default config stored");
                Ok(record)
            }
        }
    }

    /// Persist `record` with its tick replaced by the live device value.
    /// Returns what was written.
    pub fn write(
        &mut self,
        mut record: ConfigRecord,
        state: &CommandWriter,
    ) -> Result<ConfigRecord, StorageError> {
        self.ensure_ready()?;
        record.periodic_tick_ms = state.periodic_tick_ms();

        if let Err(e) = self.storage.write(CONFIG_RECORD_KEY, &record.to_bytes()) {
            log::error!("Failed to write config: {}", e);
            return Err(e);
        }

        state.set_config(record);
        log::info!(
            "Config stored: unique_id 0x{:04x}, boot_count {}, tick {} ms",
            record.unique_id,
            record.boot_count,
            record.periodic_tick_ms
        );
        Ok(record)
    }

    /// Erase the whole area and remount.  The next read recreates defaults.
    pub fn reset(&mut self) -> Result<(), StorageError> {
        self.ensure_ready()?;
        if let Err(e) = self.storage.clear() {
            log::error!("Failed to clear config storage: {}", e);
            return Err(e);
        }
        log::info!("Config storage cleared");
        self.geometry = None;
        self.init()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn ensure_ready(&self) -> Result<(), StorageError> {
        if self.is_ready() {
            Ok(())
        } else {
            log::error!("Config storage not ready");
            Err(StorageError::NotReady)
        }
    }
}
