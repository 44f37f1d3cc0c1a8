#[macro_use]
extern crate log;

mod cli;
#[allow(dead_code)]
mod constants;
mod error;
mod report;
mod simulate;
mod trace;

pub use crate::cli::{Args, PolicyArg, SimConfig};
pub use crate::error::SimError;
pub use crate::report::print_report;
pub use crate::simulate::cache::{AccessKind, BlockCache, ReplacePolicy};
pub use crate::simulate::frame_pool::{EvictionSink, FramePool};
pub use crate::simulate::vm::VirtMem;
pub use crate::simulate::{PhysicalAddress, Simulation, VirtualAddress};
pub use crate::trace::{RecordSource, TraceReader, TraceRecord};
