//! Block-aligned buffers for direct IO

use std::alloc::{self, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use super::error::{IoError, IoResult};

/// A buffer whose address and capacity are aligned to a device block size
///
/// Direct IO requires the memory address, the transfer length and the file
/// offset to be multiples of the device's sector size. The alignment is
/// chosen at runtime since it comes from the device, not from a constant.
///
/// The capacity is fixed for the buffer's lifetime; `len` tracks how many
/// leading bytes are valid.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    len: usize,
    capacity: usize,
    alignment: usize,
}

// Safety: AlignedBuffer owns its data and can be sent between threads
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    /// Create a new zeroed buffer aligned to `alignment`
    ///
    /// Capacity will be rounded up to the nearest `alignment` multiple.
    pub fn new(capacity: usize, alignment: usize) -> IoResult<Self> {
        if alignment == 0 || !alignment.is_power_of_two() {
            return Err(IoError::InvalidBlockSize(alignment));
        }

        let capacity = Self::round_up(capacity, alignment);
        if capacity == 0 {
            return Err(IoError::BufferSize { size: 0, alignment });
        }

        let layout = Layout::from_size_align(capacity, alignment).map_err(|_| {
            IoError::Alignment {
                expected: alignment,
                actual: 0,
            }
        })?;

        // Safety: layout has non-zero size
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            IoError::Io(std::io::Error::new(
                std::io::ErrorKind::OutOfMemory,
                "Failed to allocate aligned buffer",
            ))
        })?;

        Ok(Self {
            ptr,
            len: 0,
            capacity,
            alignment,
        })
    }

    /// Create a buffer holding `count` blocks of `block_size` bytes
    pub fn blocks(count: usize, block_size: usize) -> IoResult<Self> {
        Self::new(count * block_size, block_size)
    }

    /// Round up a size to the nearest `alignment` multiple
    #[inline]
    pub fn round_up(size: usize, alignment: usize) -> usize {
        (size + alignment - 1) & !(alignment - 1)
    }

    /// Round down a size to the nearest `alignment` multiple
    #[inline]
    pub fn round_down(size: usize, alignment: usize) -> usize {
        size & !(alignment - 1)
    }

    /// Get the buffer's alignment
    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Get the buffer's capacity
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the buffer's current length (valid data)
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes that can still be appended before the buffer is full
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity - self.len
    }

    /// Check if the buffer is full
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Set the buffer's length
    ///
    /// # Panics
    /// Panics if len > capacity
    pub fn set_len(&mut self, len: usize) {
        assert!(len <= self.capacity, "len exceeds capacity");
        self.len = len;
    }

    /// Get a pointer to the buffer data
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Get the buffer as a slice (up to len)
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        // Safety: ptr is valid for len bytes
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// Get the whole allocation as a slice (up to capacity)
    ///
    /// Bytes past `len` are whatever a previous use left there.
    #[inline]
    pub fn as_full_slice(&self) -> &[u8] {
        // Safety: ptr is valid for capacity bytes
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.capacity) }
    }

    /// Get the buffer as a mutable slice (up to capacity)
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // Safety: ptr is valid for capacity bytes
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.capacity) }
    }

    /// Clear the buffer (set len to 0)
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Append as much of `data` as fits, returning the number of bytes taken
    pub fn extend_from_slice(&mut self, data: &[u8]) -> usize {
        let take = data.len().min(self.remaining());
        let start = self.len;
        self.as_mut_slice()[start..start + take].copy_from_slice(&data[..take]);
        self.len += take;
        take
    }

    /// Move `count` bytes starting at `from` to the front of the buffer
    ///
    /// The buffer length becomes `count`. Everything before `from` is
    /// discarded; nothing is reallocated.
    ///
    /// # Panics
    /// Panics if `from + count` exceeds capacity
    pub fn shift_to_front(&mut self, from: usize, count: usize) {
        assert!(from + count <= self.capacity, "shift exceeds capacity");
        if from > 0 && count > 0 {
            self.as_mut_slice().copy_within(from..from + count, 0);
        }
        self.len = count;
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        let layout = Layout::from_size_align(self.capacity, self.alignment)
            .expect("layout was valid at allocation");
        // Safety: ptr was allocated with this layout
        unsafe {
            alloc::dealloc(self.ptr.as_ptr(), layout);
        }
    }
}

impl Deref for AlignedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl DerefMut for AlignedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        // Return slice up to len, not capacity
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("alignment", &self.alignment)
            .finish()
    }
}
