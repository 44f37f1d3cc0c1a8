use std::cell::RefCell;
use std::rc::Rc;

use crate::constants::{INSTRUCTION_CYCLES, OPERAND_BYTES, OPERAND_CYCLES};
use crate::error::SimError;
use crate::simulate::cache::{AccessKind, BlockCache};
use crate::simulate::frame_pool::FramePool;
use crate::simulate::vm::VirtMem;
use crate::simulate::VirtualAddress;
use crate::trace::{RecordSource, TraceRecord};

/// One trace file bound to its own translation context.
pub struct TraceStream {
    pub(crate) name: String,
    pub(crate) vm: VirtMem,
    source: Box<dyn RecordSource>,
    finished: bool,
    pub(crate) records: u64,
}

impl TraceStream {
    pub fn new(name: String, vm: VirtMem, source: Box<dyn RecordSource>) -> Self {
        TraceStream {
            name,
            vm,
            source,
            finished: false,
            records: 0,
        }
    }
}

#[derive(Default)]
pub struct SchedStats {
    pub(crate) cycles: u64,
    pub(crate) instructions: u64,
}

/// Round-robin executor over the live streams. Each stream runs at most
/// `time_slice` records per turn (−1 runs it to EOF); a stream that drains
/// releases its frames back to the pool before the rotation continues.
pub struct Scheduler {
    pub(crate) streams: Vec<TraceStream>,
    time_slice: i64,
    pool: Rc<RefCell<FramePool>>,
    cache: Rc<RefCell<BlockCache>>,
    pub(crate) stats: SchedStats,
}

impl Scheduler {
    pub fn new(
        streams: Vec<TraceStream>,
        time_slice: i64,
        pool: Rc<RefCell<FramePool>>,
        cache: Rc<RefCell<BlockCache>>,
    ) -> Self {
        Scheduler {
            streams,
            time_slice,
            pool,
            cache,
            stats: SchedStats::default(),
        }
    }

    pub fn run(&mut self) -> Result<(), SimError> {
        let mut active = self.streams.iter().filter(|s| !s.finished).count();
        while active > 0 {
            for i in 0..self.streams.len() {
                if self.streams[i].finished {
                    continue;
                }
                let mut consumed = 0i64;
                loop {
                    if self.time_slice >= 0 && consumed >= self.time_slice {
                        break;
                    }
                    match self.streams[i].source.next_record() {
                        Some(record) => {
                            self.dispatch(i, record)?;
                            consumed += 1;
                        }
                        None => {
                            self.retire(i);
                            active -= 1;
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Simulates one record: instruction fetch, then the source read, then
    /// the destination write.
    fn dispatch(&mut self, i: usize, record: TraceRecord) -> Result<(), SimError> {
        let stream = &mut self.streams[i];
        stream.records += 1;
        self.stats.instructions += 1;

        let pa = stream.vm.translate(VirtualAddress(record.eip), false)?;
        let cycles = self
            .cache
            .borrow_mut()
            .access(pa, record.instr_len, AccessKind::Instruction);
        self.stats.cycles += cycles + INSTRUCTION_CYCLES;

        if let Some(src) = record.src {
            let pa = stream.vm.translate(VirtualAddress(src), false)?;
            let cycles = self
                .cache
                .borrow_mut()
                .access(pa, OPERAND_BYTES, AccessKind::Read);
            self.stats.cycles += cycles + OPERAND_CYCLES;
        }
        if let Some(dst) = record.dst {
            let pa = stream.vm.translate(VirtualAddress(dst), true)?;
            let cycles = self
                .cache
                .borrow_mut()
                .access(pa, OPERAND_BYTES, AccessKind::Write);
            self.stats.cycles += cycles + OPERAND_CYCLES;
        }
        Ok(())
    }

    fn retire(&mut self, i: usize) {
        let stream = &mut self.streams[i];
        stream.finished = true;
        info!("{}: {} records", stream.name, stream.records);
        self.pool.borrow_mut().free_for_process(stream.vm.pid());
    }
}
