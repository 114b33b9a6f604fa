//! Unaligned stream subsystem
//!
//! Lets a log writer append arbitrary byte ranges to a file whose handle
//! only accepts block-aligned transfers:
//! - Block-aligned accumulation buffer, reused across flushes
//! - Write-ahead flushing so the file always ends on a block boundary
//! - Logical reads through a separate ordinary handle

pub mod config;
pub mod error;
pub mod unaligned;

pub use config::{StreamConfig, DEFAULT_BUFFER_SIZE, DEFAULT_MIN_BLOCK_SIZE};
pub use error::{StreamError, StreamResult};
pub use unaligned::UnalignedStream;
