use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::fmt::Debug;

use crate::constants::{BUS_CHUNK_BYTES, BUS_CHUNK_CYCLES, HIT_CYCLES, RNG_SEED};
use crate::error::SimError;
use crate::simulate::frame_pool::EvictionSink;
use crate::simulate::PhysicalAddress;

/// Which trace field produced an access; selects byte accounting and the
/// dirty bit on install.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    Instruction,
    Read,
    Write,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplacePolicy {
    RoundRobin,
    Random,
}

/// One cache line. `use_count` and `dirty` are bookkeeping the required
/// policies never consult; `use_count` feeds the unused-block report.
#[derive(Default, Clone, Copy)]
struct CacheLine {
    valid: bool,
    #[allow(dead_code)]
    dirty: bool,
    tag: u64,
    use_count: u64,
}

struct CacheSet {
    lines: Vec<CacheLine>,
    rr_next: usize,
}

#[derive(Default)]
pub struct CacheStats {
    /// Logical accesses, one per EIP/srcM/dstM field.
    pub(crate) addresses: u64,
    /// Block-level probes; a span access counts once per block base covered.
    pub(crate) block_accesses: u64,
    pub(crate) hits: u64,
    pub(crate) misses: u64,
    pub(crate) compulsory_misses: u64,
    pub(crate) conflict_misses: u64,
    pub(crate) instr_bytes: u64,
    pub(crate) src_dst_bytes: u64,
}

/// Set-associative block cache over physical addresses.
///
/// Fully associative is the degenerate geometry: one set holding every block.
pub struct BlockCache {
    data_bytes: u64,
    block_bytes: u64,
    associativity: u64,
    num_sets: u64,
    offset_bits: u32,
    index_bits: u32,
    tag_bits: u32,
    policy: ReplacePolicy,
    sets: Vec<CacheSet>,
    rng: SmallRng,
    pub(crate) stats: CacheStats,
}

impl Debug for BlockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BlockCache: {}-set {}-way {} B blocks ({:?})",
            self.num_sets, self.associativity, self.block_bytes, self.policy
        )
    }
}

impl BlockCache {
    pub fn new(
        data_bytes: u64,
        block_bytes: u64,
        associativity: u64,
        policy: ReplacePolicy,
        physical_address_bits: u32,
    ) -> Result<Self, SimError> {
        if block_bytes == 0 || !block_bytes.is_power_of_two() {
            return Err(SimError::InvalidConfig(format!(
                "block size {} is not a power of two",
                block_bytes
            )));
        }
        if data_bytes == 0 || data_bytes % block_bytes != 0 {
            return Err(SimError::InvalidConfig(format!(
                "cache size {} is not a multiple of the block size {}",
                data_bytes, block_bytes
            )));
        }
        let num_blocks = data_bytes / block_bytes;
        if associativity == 0 || num_blocks % associativity != 0 {
            return Err(SimError::InvalidConfig(format!(
                "associativity {} does not divide the {} cache blocks",
                associativity, num_blocks
            )));
        }
        let num_sets = num_blocks / associativity;
        if !num_sets.is_power_of_two() {
            return Err(SimError::InvalidConfig(format!(
                "derived set count {} is not a power of two",
                num_sets
            )));
        }
        let offset_bits = block_bytes.trailing_zeros();
        let index_bits = num_sets.trailing_zeros();
        if offset_bits + index_bits > physical_address_bits {
            return Err(SimError::InvalidConfig(format!(
                "offset ({}) and index ({}) bits exceed the {}-bit physical address",
                offset_bits, index_bits, physical_address_bits
            )));
        }
        let tag_bits = physical_address_bits - index_bits - offset_bits;
        let sets = (0..num_sets)
            .map(|_| CacheSet {
                lines: vec![CacheLine::default(); associativity as usize],
                rr_next: 0,
            })
            .collect();
        Ok(BlockCache {
            data_bytes,
            block_bytes,
            associativity,
            num_sets,
            offset_bits,
            index_bits,
            tag_bits,
            policy,
            sets,
            rng: SmallRng::seed_from_u64(RNG_SEED),
            stats: CacheStats::default(),
        })
    }

    fn decode(&self, block_base: u64) -> (u64, usize) {
        let tag = block_base >> (self.offset_bits + self.index_bits);
        let index = (block_base >> self.offset_bits) & (self.num_sets - 1);
        (tag, index as usize)
    }

    fn miss_cycles(&self) -> u64 {
        BUS_CHUNK_CYCLES * self.block_bytes.div_ceil(BUS_CHUNK_BYTES)
    }

    /// Simulates one logical access of `len` bytes at `addr`, probing every
    /// block the range covers, and returns the summed cycle cost.
    pub fn access(&mut self, addr: PhysicalAddress, len: u32, kind: AccessKind) -> u64 {
        self.stats.addresses += 1;
        match kind {
            AccessKind::Instruction => self.stats.instr_bytes += len as u64,
            AccessKind::Read | AccessKind::Write => self.stats.src_dst_bytes += len as u64,
        }
        if len == 0 {
            return 0;
        }
        let is_write = kind == AccessKind::Write;
        let end = addr.0 + len as u64 - 1;
        let mut base = addr.0 & !(self.block_bytes - 1);
        let mut cycles = 0;
        while base <= end {
            cycles += self.access_block(base, is_write);
            base += self.block_bytes;
        }
        cycles
    }

    fn access_block(&mut self, block_base: u64, is_write: bool) -> u64 {
        self.stats.block_accesses += 1;
        let (tag, index) = self.decode(block_base);
        let set = &mut self.sets[index];

        if let Some(line) = set.lines.iter_mut().find(|l| l.valid && l.tag == tag) {
            line.use_count += 1;
            if is_write {
                line.dirty = true;
            }
            self.stats.hits += 1;
            return HIT_CYCLES;
        }

        self.stats.misses += 1;
        // An untouched way means this set has never held the tag: compulsory.
        // A full set forces replacement of live data: conflict.
        let victim = match set.lines.iter().position(|l| !l.valid) {
            Some(way) => {
                self.stats.compulsory_misses += 1;
                way
            }
            None => {
                self.stats.conflict_misses += 1;
                match self.policy {
                    ReplacePolicy::RoundRobin => {
                        let way = set.rr_next;
                        set.rr_next = (set.rr_next + 1) % self.associativity as usize;
                        way
                    }
                    ReplacePolicy::Random => self.rng.gen_range(0..self.associativity as usize),
                }
            }
        };
        let line = &mut set.lines[victim];
        line.valid = true;
        line.dirty = is_write;
        line.tag = tag;
        line.use_count = 1;
        self.miss_cycles()
    }

    /// Drops every line whose block falls in `[base, base + len)`.
    /// Statistics are untouched; invalidating twice is a no-op.
    pub fn invalidate_range(&mut self, base: PhysicalAddress, len: u64) {
        if len == 0 {
            return;
        }
        let end = base.0 + len - 1;
        let mut block = base.0 & !(self.block_bytes - 1);
        while block <= end {
            let (tag, index) = self.decode(block);
            for line in &mut self.sets[index].lines {
                if line.valid && line.tag == tag {
                    line.valid = false;
                }
            }
            block += self.block_bytes;
        }
    }

    pub fn data_bytes(&self) -> u64 {
        self.data_bytes
    }

    pub fn block_bytes(&self) -> u64 {
        self.block_bytes
    }

    pub fn associativity(&self) -> u64 {
        self.associativity
    }

    pub fn num_sets(&self) -> u64 {
        self.num_sets
    }

    pub fn num_blocks(&self) -> u64 {
        self.num_sets * self.associativity
    }

    pub fn tag_bits(&self) -> u32 {
        self.tag_bits
    }

    pub fn index_bits(&self) -> u32 {
        self.index_bits
    }

    pub fn offset_bits(&self) -> u32 {
        self.offset_bits
    }

    /// Tag plus valid bit per line, as a fractional byte count.
    pub fn meta_bytes_per_block(&self) -> f64 {
        (self.tag_bits as f64 + 1.0) / 8.0
    }

    /// Tag/valid storage for the whole cache, rounded up to whole bytes.
    pub fn overhead_bytes(&self) -> u64 {
        (self.num_blocks() as f64 * self.meta_bytes_per_block()).ceil() as u64
    }

    pub fn implementation_bytes(&self) -> u64 {
        self.data_bytes + self.overhead_bytes()
    }

    /// Lines that have held data at least once since init.
    pub fn used_blocks(&self) -> u64 {
        self.sets
            .iter()
            .flat_map(|s| s.lines.iter())
            .filter(|l| l.use_count > 0)
            .count() as u64
    }

    #[cfg(test)]
    fn assert_distinct_tags(&self) {
        for set in &self.sets {
            for (i, a) in set.lines.iter().enumerate() {
                for b in &set.lines[i + 1..] {
                    if a.valid && b.valid {
                        assert_ne!(a.tag, b.tag, "duplicate tag within a set");
                    }
                }
            }
        }
    }
}

impl EvictionSink for BlockCache {
    fn invalidate_range(&mut self, base: PhysicalAddress, len: u64) {
        BlockCache::invalidate_range(self, base, len);
    }
}
