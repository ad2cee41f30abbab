// SensorLink - Audio Capture Pipeline
//
// Producer: take a block from the pool, fill it from the microphone, push it
// to the consumer without waiting.  When the queue is full the block goes
// straight back to the pool and the drop is counted.  Capture never stalls
// on a slow consumer.
//
// Consumer: take the next block, hand the samples to a `BlockProcessor`,
// let the handle drop so the slot returns to the pool.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;

use crate::config::AUDIO_QUEUE_DEPTH;
use crate::drivers::PcmSource;
use crate::error::Result;
use crate::pool::{BufferPool, PcmBlock, PooledBuffer};

/// Per-block analysis run on the consumer side.
pub trait BlockProcessor {
    fn process(&mut self, block: &PcmBlock);
}

/// What happened to one captured block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    Queued,
    /// Queue was full; the block went back to the pool unread.
    Dropped,
    /// Consumer is gone; the block went back to the pool.
    Closed,
}

#[derive(Debug, Default)]
pub struct AudioStats {
    captured: AtomicU32,
    dropped: AtomicU32,
    processed: AtomicU32,
    read_errors: AtomicU32,
}

impl AudioStats {
    pub fn captured(&self) -> u32 {
        self.captured.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn processed(&self) -> u32 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn read_errors(&self) -> u32 {
        self.read_errors.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU32) -> u32 {
        counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Build both ends over a queue of [`AUDIO_QUEUE_DEPTH`] blocks.
pub fn audio_pipeline<S, P>(
    source: S,
    processor: P,
    pool: BufferPool,
) -> (AudioProducer<S>, AudioConsumer<P>)
where
    S: PcmSource,
    P: BlockProcessor,
{
    let (tx, rx) = sync_channel(AUDIO_QUEUE_DEPTH);
    let stats = Arc::new(AudioStats::default());
    (
        AudioProducer { source, pool, tx, stats: Arc::clone(&stats) },
        AudioConsumer { processor, rx, stats },
    )
}

pub struct AudioProducer<S> {
    source: S,
    pool: BufferPool,
    tx: SyncSender<PooledBuffer>,
    stats: Arc<AudioStats>,
}

impl<S: PcmSource> AudioProducer<S> {
    /// Capture one block and hand it off.  Blocks while the pool is empty
    /// and for the duration of the hardware read.
    pub fn step(&mut self) -> Result<Handoff> {
        let mut buffer = self.pool.acquire();

        if let Err(e) = self.source.read_block(&mut buffer) {
            AudioStats::bump(&self.stats.read_errors);
            return Err(e);
        }
        AudioStats::bump(&self.stats.captured);

        match self.tx.try_send(buffer) {
            Ok(()) => Ok(Handoff::Queued),
            Err(TrySendError::Full(buffer)) => {
                drop(buffer);
                let dropped = AudioStats::bump(&self.stats.dropped);
                log::warn!("Audio queue full, block dropped ({} so far)", dropped);
                Ok(Handoff::Dropped)
            }
            Err(TrySendError::Disconnected(_)) => Ok(Handoff::Closed),
        }
    }

    /// Task body.  Read errors are logged and capture carries on; returns
    /// only once the consumer is gone.
    pub fn run(mut self) {
        log::info!("Audio producer started");

        loop {
            match self.step() {
                Ok(Handoff::Closed) => {
                    log::warn!("Audio consumer closed, stopping audio producer");
                    return;
                }
                Ok(_) => {}
                Err(e) => log::error!("Microphone read failed: {}", e),
            }
        }
    }

    pub fn stats(&self) -> &Arc<AudioStats> {
        &self.stats
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }
}

pub struct AudioConsumer<P> {
    processor: P,
    rx: Receiver<PooledBuffer>,
    stats: Arc<AudioStats>,
}

impl<P: BlockProcessor> AudioConsumer<P> {
    /// Process the next block, waiting for one.  `false` once the producer
    /// is gone and the queue is drained.
    pub fn step(&mut self) -> bool {
        match self.rx.recv() {
            Ok(buffer) => {
                self.process(buffer);
                true
            }
            Err(_) => false,
        }
    }

    /// Process the next block only if one is already queued.
    pub fn try_step(&mut self) -> bool {
        match self.rx.try_recv() {
            Ok(buffer) => {
                self.process(buffer);
                true
            }
            Err(_) => false,
        }
    }

    pub fn run(mut self) {
        log::info!("Audio consumer started");
        while self.step() {}
        log::warn!("Audio producer gone, stopping consumer");
    }

    fn process(&mut self, buffer: PooledBuffer) {
        self.processor.process(&buffer);
        AudioStats::bump(&self.stats.processed);
        // `buffer` drops here and its slot goes back to the pool.
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn stats(&self) -> &Arc<AudioStats> {
        &self.stats
    }
}

// ---------------------------------------------------------------------------
// Level meter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlockLevel {
    pub peak: u16,
    pub rms: f32,
}

/// Default processor: peak and RMS of every block.
#[derive(Debug, Default)]
pub struct LevelMeter {
    last: Option<BlockLevel>,
    blocks: u32,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<BlockLevel> {
        self.last
    }

    pub fn blocks(&self) -> u32 {
        self.blocks
    }

    pub fn measure(block: &PcmBlock) -> BlockLevel {
        let peak = block.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
        let energy: f64 = block.iter().map(|&s| (s as f64) * (s as f64)).sum();
        let rms = (energy / block.len() as f64).sqrt() as f32;
        BlockLevel { peak, rms }
    }
}

impl BlockProcessor for LevelMeter {
    fn process(&mut self, block: &PcmBlock) {
        let level = Self::measure(block);
        log::debug!(
            "Audio block: first {}, peak {}, rms {:.1}",
            block[0],
            level.peak,
            level.rms
        );
        self.last = Some(level);
        self.blocks += 1;
    }
}
