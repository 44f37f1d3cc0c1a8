use std::cell::RefCell;
use std::rc::Weak;

use crate::error::SimError;
use crate::simulate::PhysicalAddress;

/// Narrow capability the pool notifies when a physical range loses its
/// contents. The coordinator registers the cache behind this trait; the pool
/// never names the cache type.
pub trait EvictionSink {
    fn invalidate_range(&mut self, base: PhysicalAddress, len: u64);
}

/// One page-sized slot of simulated physical memory.
#[derive(Default, Clone, Copy)]
pub struct Frame {
    pub(crate) pid: u16,
    pub(crate) vpn: u64,
    pub(crate) valid: bool,
    #[allow(dead_code)]
    pub(crate) dirty: bool,
    pub(crate) tick: u64,
}

#[derive(Default)]
pub struct PoolStats {
    /// Translations served; doubles as the monotonic LRU tick source.
    pub(crate) accesses: u64,
    /// Installs that filled a free or previously released frame.
    pub(crate) pages_from_free: u64,
    /// Installs that had to steal a live frame.
    pub(crate) evictions: u64,
}

/// The bounded pool of physical frames shared by every process.
pub struct FramePool {
    page_bytes: u64,
    total_frames: u64,
    usable_frames: u64,
    frames: Vec<Frame>,
    /// High-water mark of slot allocations, never exceeds `usable_frames`.
    used: u64,
    sink: Option<Weak<RefCell<dyn EvictionSink>>>,
    pub(crate) stats: PoolStats,
}

impl FramePool {
    /// `reserve` is the fraction of physical memory held back for the
    /// system; the remainder rounds up to whole frames.
    pub fn new(physical_bytes: u64, page_bytes: u64, reserve: f64) -> Result<Self, SimError> {
        if page_bytes == 0 || !page_bytes.is_power_of_two() {
            return Err(SimError::InvalidConfig(format!(
                "page size {} is not a positive power of two",
                page_bytes
            )));
        }
        let total_frames = physical_bytes / page_bytes;
        let usable_frames = (total_frames as f64 * (1.0 - reserve)).ceil() as u64;
        if usable_frames == 0 {
            return Err(SimError::InvalidConfig(
                "system reserve leaves no usable frames".to_string(),
            ));
        }
        Ok(FramePool {
            page_bytes,
            total_frames,
            usable_frames,
            frames: vec![Frame::default(); usable_frames as usize],
            used: 0,
            sink: None,
            stats: PoolStats::default(),
        })
    }

    /// Wires the pool → cache back-reference. Weak: the coordinator owns
    /// both ends.
    pub fn register_sink(&mut self, sink: Weak<RefCell<dyn EvictionSink>>) {
        self.sink = Some(sink);
    }

    /// Advances the translation counter and returns it as the current tick.
    pub fn tick(&mut self) -> u64 {
        self.stats.accesses += 1;
        self.stats.accesses
    }

    /// Finds a frame for `(pid, vpn)`: a never-used slot, then any released
    /// frame, then the LRU victim. Returns the frame index and whether a
    /// live frame was stolen (a true page fault).
    pub fn allocate_or_evict(&mut self, pid: u16, vpn: u64) -> (u64, bool) {
        if self.used < self.usable_frames {
            let index = self.used;
            self.used += 1;
            self.stats.pages_from_free += 1;
            debug_assert!(self.used <= self.usable_frames);
            return (index, false);
        }
        if let Some(index) = self.frames.iter().position(|f| !f.valid) {
            self.stats.pages_from_free += 1;
            return (index as u64, false);
        }
        let victim = self.lru_victim();
        let old = self.frames[victim as usize];
        debug!(
            "stealing frame {} from pid {} vpn {:#x} for pid {} vpn {:#x}",
            victim, old.pid, old.vpn, pid, vpn
        );
        self.frames[victim as usize].valid = false;
        self.stats.evictions += 1;
        self.notify_eviction(victim);
        (victim, true)
    }

    fn lru_victim(&self) -> u64 {
        let mut victim = 0u64;
        let mut oldest = u64::MAX;
        for (i, frame) in self.frames.iter().enumerate() {
            if frame.valid && frame.tick < oldest {
                oldest = frame.tick;
                victim = i as u64;
            }
        }
        victim
    }

    fn notify_eviction(&self, frame_index: u64) {
        if let Some(sink) = self.sink.as_ref().and_then(Weak::upgrade) {
            sink.borrow_mut()
                .invalidate_range(PhysicalAddress(frame_index * self.page_bytes), self.page_bytes);
        }
    }

    /// Releases every frame owned by `pid`, invalidating the cached contents
    /// of each. Called when the owning trace stream ends.
    pub fn free_for_process(&mut self, pid: u16) {
        for i in 0..self.frames.len() {
            if self.frames[i].valid && self.frames[i].pid == pid {
                self.frames[i].valid = false;
                self.notify_eviction(i as u64);
            }
        }
    }

    pub fn frame(&self, index: u64) -> &Frame {
        &self.frames[index as usize]
    }

    pub fn frame_mut(&mut self, index: u64) -> &mut Frame {
        &mut self.frames[index as usize]
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn usable_frames(&self) -> u64 {
        self.usable_frames
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn page_bytes(&self) -> u64 {
        self.page_bytes
    }

    /// Width of a page table entry: enough bits to name any frame, plus a
    /// valid bit.
    pub fn entry_bits(&self) -> u32 {
        let mut bits = 0;
        while (1u64 << bits) < self.total_frames {
            bits += 1;
        }
        bits + 1
    }
}
