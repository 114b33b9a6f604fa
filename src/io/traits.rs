//! Device capability traits for direct IO
//!
//! The unaligned stream never touches the operating system directly. It is
//! handed a [`DirectIOFactory`] that knows how to discover the device block
//! size and open the two handles the stream needs on the same file.

use std::path::Path;

use super::error::IoResult;

/// Default sector size assumed when a device does not report one
pub const DEFAULT_SECTOR_SIZE: usize = 512;

/// Access requested for a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    /// Whether handles opened with this mode may read
    pub fn can_read(self) -> bool {
        matches!(self, AccessMode::Read | AccessMode::ReadWrite)
    }

    /// Whether handles opened with this mode may write or resize
    pub fn can_write(self) -> bool {
        matches!(self, AccessMode::Write | AccessMode::ReadWrite)
    }
}

/// Sharing granted to other openers of the same file
///
/// Only enforced by platforms with mandatory share modes (Windows). Unix
/// backends accept and ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMode {
    None,
    Read,
    Write,
    ReadWrite,
}

/// Options used to open both handles of a stream
#[derive(Debug, Clone)]
pub struct HandleOptions {
    /// Access requested by the caller
    pub access: AccessMode,
    /// Sharing granted to other openers
    pub share: ShareMode,
    /// Hint that reads will be sequential
    pub sequential: bool,
    /// Ask the device to complete writes before returning
    pub write_through: bool,
    /// Create the file if it does not exist
    pub create: bool,
}

impl Default for HandleOptions {
    fn default() -> Self {
        Self {
            access: AccessMode::ReadWrite,
            share: ShareMode::Read,
            sequential: true,
            write_through: true,
            create: true,
        }
    }
}

/// A handle opened for unbuffered, alignment-sensitive IO
///
/// Implementations may reject any transfer whose buffer address, length or
/// file offset is not a multiple of the device block size.
pub trait AlignedHandle: Send {
    /// Move the handle's file pointer to `offset`
    fn seek(&mut self, offset: u64) -> IoResult<()>;

    /// Write `buf` at the current file pointer and advance it
    ///
    /// Returns the number of bytes the device accepted, which may be less
    /// than `buf.len()`.
    fn write(&mut self, buf: &[u8]) -> IoResult<usize>;

    /// Truncate or extend the file to `size`
    fn resize(&mut self, size: u64) -> IoResult<()>;

    /// Whether writes bypass the OS page cache
    fn is_direct(&self) -> bool {
        true
    }
}

/// A plain buffered handle used to service logical reads
pub trait ReadHandle: Send {
    /// Read up to `buf.len()` bytes at `offset`
    ///
    /// Returns the number of bytes read; 0 at end of file.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> IoResult<usize>;

    /// Current size of the underlying file
    fn len(&self) -> IoResult<u64>;

    /// Check if the underlying file is empty
    fn is_empty(&self) -> IoResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Factory for the handles backing an unaligned stream
pub trait DirectIOFactory {
    /// Aligned handle type produced by this factory
    type Aligned: AlignedHandle;
    /// Read handle type produced by this factory
    type Reader: ReadHandle;

    /// Discover the device's minimum IO alignment for `path`
    fn block_size(&self, path: &Path) -> IoResult<usize>;

    /// Open `path` with OS buffering disabled
    fn open_aligned(&self, path: &Path, options: &HandleOptions) -> IoResult<Self::Aligned>;

    /// Open a separate buffered handle on `path` for reads
    fn open_reader(&self, path: &Path, options: &HandleOptions) -> IoResult<Self::Reader>;
}

/// Verify that a transfer satisfies direct IO alignment rules
pub fn check_alignment(buf: &[u8], offset: u64, block_size: usize) -> IoResult<()> {
    use super::error::IoError;

    // Check buffer pointer alignment
    if !(buf.as_ptr() as usize).is_multiple_of(block_size) {
        return Err(IoError::Alignment {
            expected: block_size,
            actual: buf.as_ptr() as usize % block_size,
        });
    }

    // Check transfer length
    if !buf.len().is_multiple_of(block_size) {
        return Err(IoError::BufferSize {
            size: buf.len(),
            alignment: block_size,
        });
    }

    // Check offset alignment
    if !offset.is_multiple_of(block_size as u64) {
        return Err(IoError::OffsetAlignment {
            offset,
            alignment: block_size,
        });
    }

    Ok(())
}
