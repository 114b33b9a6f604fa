//! In-memory device for tests and instrumentation
//!
//! Every handle opened from a [`MemoryIOFactory`] shares one in-memory file.
//! Physical writes are validated with the same alignment rules as the real
//! backends and recorded so callers can inspect exactly what reached the
//! "device". Faults (errors, short writes) can be injected for the next
//! write.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::io::error::{IoError, IoResult};
use crate::io::traits::{
    check_alignment, AlignedHandle, DirectIOFactory, HandleOptions, ReadHandle,
};

/// One physical write observed by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRecord {
    pub offset: u64,
    pub len: usize,
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    Error(std::io::ErrorKind),
    Short(usize),
}

#[derive(Debug, Default)]
struct DeviceState {
    data: Vec<u8>,
    writes: Vec<WriteRecord>,
    resizes: Vec<u64>,
    fault: Option<Fault>,
}

/// Factory producing handles over a shared in-memory file
#[derive(Debug, Clone)]
pub struct MemoryIOFactory {
    block_size: usize,
    state: Arc<Mutex<DeviceState>>,
}

impl MemoryIOFactory {
    /// Create an empty device reporting `block_size` as its sector size
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            state: Arc::new(Mutex::new(DeviceState::default())),
        }
    }

    /// All physical writes issued so far, in order
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.lock().writes.clone()
    }

    /// All resize requests issued so far, in order
    pub fn resizes(&self) -> Vec<u64> {
        self.state.lock().resizes.clone()
    }

    /// Snapshot of the file contents
    pub fn contents(&self) -> Vec<u8> {
        self.state.lock().data.clone()
    }

    /// Current file length
    pub fn len(&self) -> u64 {
        self.state.lock().data.len() as u64
    }

    /// Check if the file is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the next physical write fail with `kind`
    pub fn fail_next_write(&self, kind: std::io::ErrorKind) {
        self.state.lock().fault = Some(Fault::Error(kind));
    }

    /// Make the next physical write accept only `accepted` bytes
    pub fn short_next_write(&self, accepted: usize) {
        self.state.lock().fault = Some(Fault::Short(accepted));
    }
}

impl DirectIOFactory for MemoryIOFactory {
    type Aligned = MemoryAlignedHandle;
    type Reader = MemoryReadHandle;

    fn block_size(&self, _path: &Path) -> IoResult<usize> {
        Ok(self.block_size)
    }

    fn open_aligned(&self, _path: &Path, _options: &HandleOptions) -> IoResult<Self::Aligned> {
        Ok(MemoryAlignedHandle {
            block_size: self.block_size,
            cursor: 0,
            state: self.state.clone(),
        })
    }

    fn open_reader(&self, _path: &Path, _options: &HandleOptions) -> IoResult<Self::Reader> {
        Ok(MemoryReadHandle {
            state: self.state.clone(),
        })
    }
}

/// Aligned handle over the in-memory file
pub struct MemoryAlignedHandle {
    block_size: usize,
    cursor: u64,
    state: Arc<Mutex<DeviceState>>,
}

impl AlignedHandle for MemoryAlignedHandle {
    fn seek(&mut self, offset: u64) -> IoResult<()> {
        if !offset.is_multiple_of(self.block_size as u64) {
            return Err(IoError::OffsetAlignment {
                offset,
                alignment: self.block_size,
            });
        }
        self.cursor = offset;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        check_alignment(buf, self.cursor, self.block_size)?;

        let mut state = self.state.lock();
        let accepted = match state.fault.take() {
            Some(Fault::Error(kind)) => {
                return Err(IoError::Io(std::io::Error::new(kind, "injected write fault")))
            }
            Some(Fault::Short(accepted)) => accepted.min(buf.len()),
            None => buf.len(),
        };

        let start = self.cursor as usize;
        let end = start + accepted;
        if state.data.len() < end {
            state.data.resize(end, 0);
        }
        state.data[start..end].copy_from_slice(&buf[..accepted]);
        state.writes.push(WriteRecord {
            offset: self.cursor,
            len: buf.len(),
        });

        self.cursor += accepted as u64;
        Ok(accepted)
    }

    fn resize(&mut self, size: u64) -> IoResult<()> {
        let mut state = self.state.lock();
        state.data.resize(size as usize, 0);
        state.resizes.push(size);
        Ok(())
    }
}

/// Read handle over the in-memory file
pub struct MemoryReadHandle {
    state: Arc<Mutex<DeviceState>>,
}

impl ReadHandle for MemoryReadHandle {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> IoResult<usize> {
        let state = self.state.lock();
        let len = state.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(state.data.len() - start);
        buf[..n].copy_from_slice(&state.data[start..start + n]);
        Ok(n)
    }

    fn len(&self) -> IoResult<u64> {
        Ok(self.state.lock().data.len() as u64)
    }
}
