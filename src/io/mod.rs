//! Direct IO device layer
//!
//! This module provides the platform capabilities the unaligned stream is
//! built on:
//! - Unix: `O_DIRECT` / `F_NOCACHE` handles
//! - Windows: `FILE_FLAG_NO_BUFFERING` handles
//! - Any platform: an in-memory device that records physical writes
//!
//! Every physical write must use a buffer address, length and file offset
//! aligned to the device block size.

pub mod aligned_buffer;
pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod posix;

#[cfg(windows)]
pub mod windows;

pub use aligned_buffer::AlignedBuffer;
pub use error::{IoError, IoResult};
pub use memory::{MemoryIOFactory, WriteRecord};
pub use traits::{
    check_alignment, AccessMode, AlignedHandle, DirectIOFactory, HandleOptions, ReadHandle,
    ShareMode, DEFAULT_SECTOR_SIZE,
};

#[cfg(unix)]
pub use posix::{PosixAlignedHandle, PosixIOFactory, PosixReadHandle};

#[cfg(windows)]
pub use self::windows::{WindowsAlignedHandle, WindowsIOFactory, WindowsReadHandle};

/// Default IO factory for the current platform
#[cfg(unix)]
pub fn default_io_factory() -> PosixIOFactory {
    PosixIOFactory
}

/// Default IO factory for the current platform
#[cfg(windows)]
pub fn default_io_factory() -> WindowsIOFactory {
    WindowsIOFactory
}

/// Type alias for the default IO factory on this platform
#[cfg(unix)]
pub type DefaultIOFactory = PosixIOFactory;

/// Type alias for the default IO factory on this platform
#[cfg(windows)]
pub type DefaultIOFactory = WindowsIOFactory;
