// SensorLink - Record Storage Backends
//
// Key/value records in non-volatile memory.  The config store talks to this
// trait; the ESP-IDF NVS binding lives in `drivers::board`, the in-memory
// backend below serves the host simulator and the tests.

use std::collections::BTreeMap;

use crate::config::STORAGE_SECTOR_COUNT;
use crate::error::StorageError;

/// Sector layout reported by a backend at mount time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageGeometry {
    pub sector_size: u32,
    pub sector_count: u32,
}

pub trait RecordStorage: Send {
    /// Bind the partition, read its geometry and mount it.
    fn mount(&mut self) -> Result<StorageGeometry, StorageError>;

    /// Copy the record stored under `key` into `buf`.  `Ok(None)` when absent,
    /// otherwise the stored length.
    fn read(&mut self, key: u16, buf: &mut [u8]) -> Result<Option<usize>, StorageError>;

    fn write(&mut self, key: u16, data: &[u8]) -> Result<(), StorageError>;

    /// Erase every record in the area.
    fn clear(&mut self) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// RAM-backed storage with fault injection.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: BTreeMap<u16, Vec<u8>>,
    pub device_missing: bool,
    pub fail_mount: bool,
    pub fail_writes: bool,
    pub fail_erase: bool,
    mounts: u32,
    writes: u32,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes currently stored under `key`.
    pub fn raw(&self, key: u16) -> Option<&[u8]> {
        self.records.get(&key).map(Vec::as_slice)
    }

    /// Store bytes directly, bypassing the mount state.
    pub fn insert_raw(&mut self, key: u16, data: &[u8]) {
        self.records.insert(key, data.to_vec());
    }

    pub fn mount_count(&self) -> u32 {
        self.mounts
    }

    pub fn write_count(&self) -> u32 {
        self.writes
    }
}

impl RecordStorage for MemoryStorage {
    fn mount(&mut self) -> Result<StorageGeometry, StorageError> {
        if self.device_missing {
            return Err(StorageError::DeviceUnavailable);
        }
        if self.fail_mount {
            return Err(StorageError::Mount("injected failure".into()));
        }
        self.mounts += 1;
        Ok(StorageGeometry {
            sector_size: 4096,
            sector_count: STORAGE_SECTOR_COUNT,
        })
    }

    fn read(&mut self, key: u16, buf: &mut [u8]) -> Result<Option<usize>, StorageError> {
        Ok(self.records.get(&key).map(|data| {
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            data.len()
        }))
    }

    fn write(&mut self, key: u16, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Write("injected failure".into()));
        }
        self.writes += 1;
        self.records.insert(key, data.to_vec());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        if self.fail_erase {
            return Err(StorageError::Erase("injected failure".into()));
        }
        self.records.clear();
        Ok(())
    }
}

/// Lets a test keep a handle on the backend after giving it to the store.
impl<S: RecordStorage + ?Sized> RecordStorage for &mut S {
    fn mount(&mut self) -> Result<StorageGeometry, StorageError> {
        (**self).mount()
    }

    fn read(&mut self, key: u16, buf: &mut [u8]) -> Result<Option<usize>, StorageError> {
        (**self).read(key, buf)
    }

    fn write(&mut self, key: u16, data: &[u8]) -> Result<(), StorageError> {
        (**self).write(key, data)
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        (**self).clear()
    }
}
