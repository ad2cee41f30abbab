// SensorLink - Audio Buffer Pool
//
// Fixed set of PCM blocks handed out as owning handles.  A handle has exactly
// one owner at a time: moving it into a channel takes it away from the
// sender, and dropping it puts the block back.  There is no way to forget a
// free, and no way to touch a block after it has been queued.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::config::AUDIO_SAMPLES_PER_BLOCK;

/// 160 × 16-bit samples, 320 bytes.
pub type PcmBlock = [i16; AUDIO_SAMPLES_PER_BLOCK];

#[derive(Debug)]
struct PoolInner {
    free: Mutex<Vec<Box<PcmBlock>>>,
    available: Condvar,
    capacity: usize,
}

impl PoolInner {
    fn release(&self, block: Box<PcmBlock>) {
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        debug_assert!(free.len() < self.capacity, "pool slot returned twice");
        free.push(block);
        self.available.notify_one();
    }
}

#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Allocate every slot up front; nothing is allocated afterwards.
    pub fn new(capacity: usize) -> Self {
        let free = (0..capacity)
            .map(|_| Box::new([0i16; AUDIO_SAMPLES_PER_BLOCK]))
            .collect();
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(free),
                available: Condvar::new(),
                capacity,
            }),
        }
    }

    pub fn try_acquire(&self) -> Option<PooledBuffer> {
        let block = self
            .inner
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()?;
        Some(self.wrap(block))
    }

    /// Block until a slot is free.
    pub fn acquire(&self) -> PooledBuffer {
        let mut free = self.inner.free.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(block) = free.pop() {
                drop(free);
                return self.wrap(block);
            }
            free = self
                .inner
                .available
                .wait(free)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Slots sitting in the pool.
    pub fn free(&self) -> usize {
        self.inner.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Slots held by a producer, a queue or a consumer.
    pub fn in_flight(&self) -> usize {
        self.capacity() - self.free()
    }

    fn wrap(&self, block: Box<PcmBlock>) -> PooledBuffer {
        PooledBuffer {
            block: Some(block),
            pool: Arc::clone(&self.inner),
        }
    }
}

/// Exclusive handle to one pool slot.  Returned to the pool on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    /// `None` only while the handle is being dropped.
    block: Option<Box<PcmBlock>>,
    pool: Arc<PoolInner>,
}

impl PooledBuffer {
    /// Raw little-endian bytes, as the microphone delivers them.
    pub fn as_bytes(&self) -> [u8; AUDIO_SAMPLES_PER_BLOCK * 2] {
        let mut out = [0u8; AUDIO_SAMPLES_PER_BLOCK * 2];
        for (chunk, s) in out.chunks_exact_mut(2).zip(self.iter()) {
            chunk.copy_from_slice(&s.to_le_bytes());
        }
        out
    }
}

impl Deref for PooledBuffer {
    type Target = PcmBlock;

    fn deref(&self) -> &PcmBlock {
        match &self.block {
            Some(block) => &**block,
            None => unreachable!("pool slot used after release"),
        }
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut PcmBlock {
        match &mut self.block {
            Some(block) => &mut **block,
            None => unreachable!("pool slot used after release"),
        }
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            self.pool.release(block);
        }
    }
}
