//! sectorlog - unaligned log writes over direct IO files
//!
//! Features:
//! - Arbitrary-offset, arbitrary-length writes on top of handles that only
//!   accept sector-aligned transfers
//! - `O_DIRECT` / `F_NOCACHE` on Unix, `FILE_FLAG_NO_BUFFERING` on Windows
//! - In-memory device that records every physical write, for tests

pub mod io;
pub mod stream;

pub use stream::{StreamConfig, StreamError, StreamResult, UnalignedStream};
