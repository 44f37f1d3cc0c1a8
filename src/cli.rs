use clap::{Parser, ValueEnum};

use crate::constants::{BYTES_IN_KBYTE, BYTES_IN_MBYTE, MAX_TRACE_FILES};
use crate::error::SimError;
use crate::simulate::cache::ReplacePolicy;

/// Replacement policy codes accepted on the command line. Only round-robin
/// and random are modeled; the recency/frequency codes fall back to
/// round-robin.
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum, Debug)]
pub enum PolicyArg {
    #[value(name = "lr")]
    Lru,
    #[value(name = "lf")]
    Lfu,
    #[value(name = "rr")]
    RoundRobin,
    #[value(name = "ra")]
    Random,
    #[value(name = "mr")]
    Mru,
}

impl PolicyArg {
    pub fn long_name(self) -> &'static str {
        match self {
            PolicyArg::Lru => "Least Recently Used",
            PolicyArg::Lfu => "Least Frequently Used",
            PolicyArg::RoundRobin => "Round Robin",
            PolicyArg::Random => "Random",
            PolicyArg::Mru => "Most Recently Used",
        }
    }

    pub fn resolve(self) -> ReplacePolicy {
        match self {
            PolicyArg::Random => ReplacePolicy::Random,
            _ => ReplacePolicy::RoundRobin,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Cache size in KiB (8 - 8192).
    #[arg(short = 's', long = "cache-size")]
    pub cache_kib: u64,

    /// Block size in bytes (8 - 64, power of two).
    #[arg(short = 'b', long = "block-size")]
    pub block_bytes: u64,

    /// Associativity: 1, 2, 4, 8, 16, or -1 for fully associative.
    #[arg(short = 'a', long, allow_negative_numbers = true)]
    pub associativity: i64,

    /// Replacement policy.
    #[arg(short = 'r', long, value_enum)]
    pub policy: PolicyArg,

    /// Physical memory in MiB (128 - 4096).
    #[arg(short = 'p', long = "physical-memory")]
    pub physical_mib: u64,

    /// Percent of physical memory reserved for the system (0 - 100).
    #[arg(short = 'u', long = "system-percent")]
    pub system_percent: u64,

    /// Records per time slice; -1 runs each stream to EOF.
    #[arg(short = 'n', long = "time-slice", allow_negative_numbers = true)]
    pub time_slice: i64,

    /// Trace file to simulate (repeat for up to three concurrent streams).
    #[arg(short = 'f', long = "trace-file", required = true)]
    pub trace_files: Vec<String>,
}

/// Validated configuration with sizes in bytes and the fully-associative
/// case resolved to concrete geometry.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub cache_bytes: u64,
    pub block_bytes: u64,
    pub associativity: u64,
    /// Associativity exactly as given, for the input echo (-1 = fully).
    pub associativity_arg: i64,
    pub policy_arg: PolicyArg,
    pub policy: ReplacePolicy,
    pub physical_bytes: u64,
    pub system_percent: u64,
    pub time_slice: i64,
    pub trace_files: Vec<String>,
}

impl Args {
    pub fn validate(&self) -> Result<SimConfig, SimError> {
        if !(8..=8192).contains(&self.cache_kib) {
            return Err(SimError::InvalidConfig(format!(
                "cache size {} KiB outside 8 - 8192",
                self.cache_kib
            )));
        }
        if !(8..=64).contains(&self.block_bytes) || !self.block_bytes.is_power_of_two() {
            return Err(SimError::InvalidConfig(format!(
                "block size {} outside 8 - 64 or not a power of two",
                self.block_bytes
            )));
        }
        if !matches!(self.associativity, -1 | 1 | 2 | 4 | 8 | 16) {
            return Err(SimError::InvalidConfig(format!(
                "associativity {} not one of 1, 2, 4, 8, 16, -1",
                self.associativity
            )));
        }
        if !(128..=4096).contains(&self.physical_mib) {
            return Err(SimError::InvalidConfig(format!(
                "physical memory {} MiB outside 128 - 4096",
                self.physical_mib
            )));
        }
        if self.system_percent > 100 {
            return Err(SimError::InvalidConfig(format!(
                "system percent {} outside 0 - 100",
                self.system_percent
            )));
        }
        if self.time_slice != -1 && self.time_slice <= 0 {
            return Err(SimError::InvalidConfig(format!(
                "time slice {} must be positive or -1",
                self.time_slice
            )));
        }
        if self.trace_files.is_empty() || self.trace_files.len() > MAX_TRACE_FILES {
            return Err(SimError::InvalidConfig(format!(
                "between 1 and {} trace files required",
                MAX_TRACE_FILES
            )));
        }
        let cache_bytes = self.cache_kib * BYTES_IN_KBYTE;
        let associativity = if self.associativity == -1 {
            cache_bytes / self.block_bytes
        } else {
            self.associativity as u64
        };
        Ok(SimConfig {
            cache_bytes,
            block_bytes: self.block_bytes,
            associativity,
            associativity_arg: self.associativity,
            policy_arg: self.policy,
            policy: self.policy.resolve(),
            physical_bytes: self.physical_mib * BYTES_IN_MBYTE,
            system_percent: self.system_percent,
            time_slice: self.time_slice,
            trace_files: self.trace_files.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args {
            cache_kib: 1024,
            block_bytes: 32,
            associativity: 4,
            policy: PolicyArg::RoundRobin,
            physical_mib: 256,
            system_percent: 10,
            time_slice: 100,
            trace_files: vec!["a.trc".into()],
        }
    }

    #[test]
    fn accepts_in_range_values() {
        let cfg = args().validate().unwrap();
        assert_eq!(cfg.cache_bytes, 1024 * 1024);
        assert_eq!(cfg.physical_bytes, 256 * 1024 * 1024);
        assert_eq!(cfg.associativity, 4);
    }

    #[test]
    fn fully_associative_spans_all_blocks() {
        let mut a = args();
        a.associativity = -1;
        let cfg = a.validate().unwrap();
        assert_eq!(cfg.associativity, 1024 * 1024 / 32);
        assert_eq!(cfg.associativity_arg, -1);
    }

    #[test]
    fn recency_codes_fall_back_to_round_robin() {
        for p in [PolicyArg::Lru, PolicyArg::Lfu, PolicyArg::Mru] {
            assert_eq!(p.resolve(), ReplacePolicy::RoundRobin);
        }
        assert_eq!(PolicyArg::Random.resolve(), ReplacePolicy::Random);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut a = args();
        a.cache_kib = 4;
        assert!(a.validate().is_err());

        let mut a = args();
        a.block_bytes = 48;
        assert!(a.validate().is_err());

        let mut a = args();
        a.associativity = 3;
        assert!(a.validate().is_err());

        let mut a = args();
        a.physical_mib = 64;
        assert!(a.validate().is_err());

        let mut a = args();
        a.system_percent = 101;
        assert!(a.validate().is_err());

        let mut a = args();
        a.time_slice = 0;
        assert!(a.validate().is_err());

        let mut a = args();
        a.trace_files = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        assert!(a.validate().is_err());
    }

    #[test]
    fn parses_the_short_flag_surface() {
        let args = Args::parse_from([
            "memsim", "-s", "1024", "-b", "32", "-a", "-1", "-r", "rr", "-p", "512", "-u", "15",
            "-n", "-1", "-f", "one.trc", "-f", "two.trc",
        ]);
        assert_eq!(args.cache_kib, 1024);
        assert_eq!(args.associativity, -1);
        assert_eq!(args.time_slice, -1);
        assert_eq!(args.policy, PolicyArg::RoundRobin);
        assert_eq!(args.trace_files.len(), 2);
    }
}
