use thiserror::Error;

/// Failure modes of the simulator. Configuration problems abort before any
/// simulation state is built; trace problems are contained to their stream.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed trace record: {0}")]
    MalformedTrace(String),

    #[error("virtual page {vpn:#x} out of range for a {table_len}-entry page table")]
    OutOfRange { vpn: u64, table_len: u64 },
}
