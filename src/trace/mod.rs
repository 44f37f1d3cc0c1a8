use lazy_static::lazy_static;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use crate::error::SimError;

/// One executed instruction: its fetch address and length, plus up to one
/// source read and one destination write effective address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRecord {
    pub eip: u64,
    pub instr_len: u32,
    pub src: Option<u64>,
    pub dst: Option<u64>,
}

/// Anything that can hand the scheduler a stream of records. Parse and read
/// failures are swallowed here: a stream that goes bad simply ends.
pub trait RecordSource {
    fn next_record(&mut self) -> Option<TraceRecord>;
}

lazy_static! {
    static ref EIP_LINE: Regex = Regex::new(r"^EIP \((\d+)\): ([0-9a-fA-F]+)").unwrap();
    static ref DATA_LINE: Regex =
        Regex::new(r"^dstM: ([0-9a-fA-F]+) (\S+)\s+srcM: ([0-9a-fA-F]+) (\S+)").unwrap();
}

/// An absent data slot in the capture.
const ABSENT: &str = "--------";

/// Line-oriented reader for the three-line trace record format:
///
/// ```text
/// EIP (07): 3004ddcb
/// dstM: 00000000 --------    srcM: 3004ddda 00aa00e0
///
/// ```
pub struct TraceReader<R: BufRead> {
    lines: Lines<R>,
    done: bool,
}

impl TraceReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        TraceReader {
            lines: reader.lines(),
            done: false,
        }
    }

    /// Next non-blank line, or None at EOF or on a read error.
    fn next_line(&mut self) -> Option<String> {
        for line in self.lines.by_ref() {
            match line {
                Ok(l) if l.trim().is_empty() => continue,
                Ok(l) => return Some(l),
                Err(e) => {
                    warn!("trace read failed, ending stream: {}", e);
                    return None;
                }
            }
        }
        None
    }

    fn parse_eip(line: &str) -> Result<(u32, u64), SimError> {
        let caps = EIP_LINE
            .captures(line)
            .ok_or_else(|| SimError::MalformedTrace(format!("expected EIP line, got {:?}", line)))?;
        let len = caps[1]
            .parse::<u32>()
            .map_err(|e| SimError::MalformedTrace(e.to_string()))?;
        let eip = u64::from_str_radix(&caps[2], 16)
            .map_err(|e| SimError::MalformedTrace(e.to_string()))?;
        Ok((len, eip))
    }

    /// Returns `(dst, src)`. A slot is absent when its value field is the
    /// `--------` sentinel or its address is zero.
    fn parse_data(line: &str) -> Result<(Option<u64>, Option<u64>), SimError> {
        let caps = DATA_LINE.captures(line).ok_or_else(|| {
            SimError::MalformedTrace(format!("expected dstM/srcM line, got {:?}", line))
        })?;
        let slot = |addr: &str, value: &str| -> Result<Option<u64>, SimError> {
            let addr = u64::from_str_radix(addr, 16)
                .map_err(|e| SimError::MalformedTrace(e.to_string()))?;
            Ok((value != ABSENT && addr != 0).then_some(addr))
        };
        Ok((slot(&caps[1], &caps[2])?, slot(&caps[3], &caps[4])?))
    }
}

impl<R: BufRead> RecordSource for TraceReader<R> {
    fn next_record(&mut self) -> Option<TraceRecord> {
        if self.done {
            return None;
        }
        let eip_line = match self.next_line() {
            Some(l) => l,
            None => {
                self.done = true;
                return None;
            }
        };
        let (instr_len, eip) = match Self::parse_eip(&eip_line) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("ending stream: {}", e);
                self.done = true;
                return None;
            }
        };
        // A missing or garbled second line still yields the instruction,
        // then the stream ends.
        let (dst, src) = match self.next_line().map(|l| Self::parse_data(&l)) {
            Some(Ok(slots)) => slots,
            Some(Err(e)) => {
                debug!("ending stream after bare EIP record: {}", e);
                self.done = true;
                (None, None)
            }
            None => {
                self.done = true;
                (None, None)
            }
        };
        Some(TraceRecord {
            eip,
            instr_len,
            src,
            dst,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;

    fn reader(text: &str) -> TraceReader<Cursor<&str>> {
        TraceReader::new(Cursor::new(text))
    }

    #[test]
    fn parses_a_full_record() {
        let mut r = reader(
            "EIP (07): 3004ddcb\n\
             dstM: 3004dd1c 00000002    srcM: 3004ddda 00aa00e0\n\
             \n",
        );
        assert_eq!(
            r.next_record(),
            Some(TraceRecord {
                eip: 0x3004ddcb,
                instr_len: 7,
                src: Some(0x3004ddda),
                dst: Some(0x3004dd1c),
            })
        );
        assert_eq!(r.next_record(), None);
    }

    #[test]
    fn sentinel_and_zero_address_mean_absent() {
        let mut r = reader(
            "EIP (02): 00001000\n\
             dstM: 00000000 --------    srcM: 0000afff --------\n\
             \n\
             EIP (03): 00001002\n\
             dstM: 00000000 01020304    srcM: 00002000 01020304\n\
             \n",
        );
        let first = r.next_record().unwrap();
        assert_eq!(first.dst, None);
        assert_eq!(first.src, None);
        let second = r.next_record().unwrap();
        assert_eq!(second.dst, None);
        assert_eq!(second.src, Some(0x2000));
    }

    #[test]
    fn missing_trailing_blank_is_tolerated() {
        let mut r = reader(
            "EIP (04): 00001000\n\
             dstM: 00000000 --------    srcM: 00000000 --------",
        );
        assert!(r.next_record().is_some());
        assert_eq!(r.next_record(), None);
    }

    #[test]
    fn garbage_eip_line_ends_the_stream() {
        let mut r = reader(
            "EIP (04): 00001000\n\
             dstM: 00000000 --------    srcM: 00000000 --------\n\
             \n\
             this is not a record\n\
             EIP (04): 00002000\n",
        );
        assert!(r.next_record().is_some());
        assert_eq!(r.next_record(), None);
        assert_eq!(r.next_record(), None);
    }

    #[test]
    fn truncated_record_yields_the_instruction_then_ends() {
        let mut r = reader("EIP (05): 0000beef\n");
        let rec = r.next_record().unwrap();
        assert_eq!(rec.eip, 0xbeef);
        assert_eq!(rec.instr_len, 5);
        assert_eq!(rec.src, None);
        assert_eq!(rec.dst, None);
        assert_eq!(r.next_record(), None);
    }

    #[test]
    fn opens_real_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "EIP (06): 00001000\n\
             dstM: 00003000 00000001    srcM: 00000000 --------\n\
             \n"
        )
        .unwrap();
        let mut r = TraceReader::open(file.path()).unwrap();
        let rec = r.next_record().unwrap();
        assert_eq!(rec.eip, 0x1000);
        assert_eq!(rec.dst, Some(0x3000));
        assert!(TraceReader::open("/nonexistent/trace.trc").is_err());
    }
}
