use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::cli::SimConfig;
use crate::constants::{PAGE_BYTES, PHYSICAL_ADDRESS_BITS, VIRTUAL_ADDRESS_BITS};
use crate::error::SimError;
use crate::trace::TraceReader;

pub mod cache;
pub mod frame_pool;
pub mod scheduler;
pub mod vm;

use cache::BlockCache;
use frame_pool::{EvictionSink, FramePool};
use scheduler::{Scheduler, TraceStream};
use vm::VirtMem;

/// A virtual address as seen by a traced process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VirtualAddress(pub u64);

/// A physical address after page-table translation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PhysicalAddress(pub u64);

/// Owns the whole hierarchy and wires the pool → cache eviction edge.
///
/// The pool only ever sees the cache as a `Weak` eviction sink, so ownership
/// stays acyclic: everything hangs off this struct.
pub struct Simulation {
    pub(crate) pool: Rc<RefCell<FramePool>>,
    pub(crate) cache: Rc<RefCell<BlockCache>>,
    pub(crate) scheduler: Scheduler,
    /// Trace files that could not be opened; echoed in the report.
    pub(crate) skipped: Vec<String>,
}

impl Simulation {
    pub fn new(cfg: &SimConfig) -> Result<Self, SimError> {
        let pool = Rc::new(RefCell::new(FramePool::new(
            cfg.physical_bytes,
            PAGE_BYTES,
            cfg.system_percent as f64 / 100.0,
        )?));
        let cache = Rc::new(RefCell::new(BlockCache::new(
            cfg.cache_bytes,
            cfg.block_bytes,
            cfg.associativity,
            cfg.policy,
            PHYSICAL_ADDRESS_BITS,
        )?));
        let cache_dyn: Rc<RefCell<dyn EvictionSink>> = cache.clone();
        let sink: Weak<RefCell<dyn EvictionSink>> = Rc::downgrade(&cache_dyn);
        pool.borrow_mut().register_sink(sink);

        let mut streams = Vec::new();
        let mut skipped = Vec::new();
        for (pid, path) in cfg.trace_files.iter().enumerate() {
            match TraceReader::open(path) {
                Ok(reader) => {
                    let vm = VirtMem::new(
                        pid as u16,
                        VIRTUAL_ADDRESS_BITS,
                        PAGE_BYTES,
                        Rc::clone(&pool),
                    );
                    streams.push(TraceStream::new(path.clone(), vm, Box::new(reader)));
                }
                Err(e) => {
                    warn!("skipping trace file {}: {}", path, e);
                    skipped.push(path.clone());
                }
            }
        }

        let scheduler = Scheduler::new(
            streams,
            cfg.time_slice,
            Rc::clone(&pool),
            Rc::clone(&cache),
        );
        Ok(Simulation {
            pool,
            cache,
            scheduler,
            skipped,
        })
    }

    pub fn run(&mut self) -> Result<(), SimError> {
        self.scheduler.run()
    }
}
