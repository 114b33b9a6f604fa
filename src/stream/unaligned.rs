//! Unaligned write stream over a direct IO file
//!
//! Callers write arbitrary byte ranges; the device only ever sees whole
//! blocks at block-aligned offsets. Bytes accumulate in a block-aligned
//! buffer and are pushed out when the buffer fills or on an explicit flush.
//!
//! A flush that ends inside a block writes that whole block anyway
//! (write-ahead), so the file always ends on a block boundary. The valid
//! bytes of the partial block stay at the front of the buffer and are
//! rewritten by the next flush.
//!
//! Reads go through a second, ordinary handle and never see bytes that are
//! still buffered. Flush before reading back recent writes.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info, trace, warn};

use crate::io::{
    AccessMode, AlignedBuffer, AlignedHandle, DefaultIOFactory, DirectIOFactory, ReadHandle,
};
use crate::stream::config::StreamConfig;
use crate::stream::error::{StreamError, StreamResult};

/// Write stream that hides direct IO alignment from its caller
pub struct UnalignedStream<F: DirectIOFactory> {
    path: PathBuf,
    access: AccessMode,
    block_size: usize,
    /// Accumulation buffer; its length is the buffered byte count
    buffer: AlignedBuffer,
    /// Device offset reached by the last flush, write-ahead overhang excluded
    last_physical_position: u64,
    /// True when the aligned handle sits exactly at `last_physical_position`
    physically_aligned: bool,
    pending_flush: bool,
    aligned: F::Aligned,
    reader: F::Reader,
    closed: bool,
}

impl UnalignedStream<DefaultIOFactory> {
    /// Open `path` with the platform's direct IO backend
    pub fn open(path: impl AsRef<Path>, config: StreamConfig) -> StreamResult<Self> {
        Self::open_with(&crate::io::default_io_factory(), path, config)
    }
}

impl<F: DirectIOFactory> UnalignedStream<F> {
    /// Open `path` using handles produced by `factory`
    pub fn open_with(
        factory: &F,
        path: impl AsRef<Path>,
        config: StreamConfig,
    ) -> StreamResult<Self> {
        let path = path.as_ref();

        let sector_size = factory.block_size(path)?;
        let block_size = sector_size.max(config.min_block_size);
        if block_size == 0 || !block_size.is_power_of_two() {
            return Err(StreamError::InvalidBlockSize(block_size));
        }
        if config.buffer_size == 0 || !config.buffer_size.is_multiple_of(block_size) {
            return Err(StreamError::Config {
                buffer_size: config.buffer_size,
                block_size,
            });
        }

        let options = config.handle_options();
        let aligned = factory.open_aligned(path, &options)?;
        let reader = factory.open_reader(path, &options)?;
        let buffer = AlignedBuffer::new(config.buffer_size, block_size)?;

        info!(
            path = %path.display(),
            sector_size,
            block_size,
            buffer_size = config.buffer_size,
            write_through = config.write_through,
            direct_io = aligned.is_direct(),
            "Opened unaligned stream"
        );

        Ok(Self {
            path: path.to_path_buf(),
            access: config.access,
            block_size,
            buffer,
            last_physical_position: 0,
            physically_aligned: true,
            pending_flush: false,
            aligned,
            reader,
            closed: false,
        })
    }

    #[inline]
    fn align_down(&self, value: u64) -> u64 {
        value & !(self.block_size as u64 - 1)
    }

    #[inline]
    fn align_up(&self, value: u64) -> u64 {
        let down = self.align_down(value);
        if down == value {
            down
        } else {
            down + self.block_size as u64
        }
    }

    fn ensure_writable(&self) -> StreamResult<()> {
        if !self.access.can_write() {
            return Err(StreamError::NotSupported("stream opened without write access"));
        }
        Ok(())
    }

    fn ensure_readable(&self) -> StreamResult<()> {
        if !self.access.can_read() {
            return Err(StreamError::NotSupported("stream opened without read access"));
        }
        Ok(())
    }

    /// Append `data` at the current logical position
    ///
    /// Only touches the device when the buffer fills up; the remainder stays
    /// buffered until the next flush. If such a flush fails after some of
    /// `data` was taken, the error is [`StreamError::PartialWrite`] and the
    /// accepted prefix must not be written again.
    pub fn write(&mut self, data: &[u8]) -> StreamResult<()> {
        self.ensure_writable()?;

        match self.fill(data) {
            (_, Ok(())) => Ok(()),
            (0, Err(e)) => Err(e),
            (accepted, Err(e)) => Err(StreamError::PartialWrite {
                accepted,
                source: Box::new(e),
            }),
        }
    }

    /// Copy `data` into the buffer, flushing each time it fills
    ///
    /// Returns how many bytes were taken together with the flush error that
    /// stopped the copy, if any. A buffer left full by a failed flush is
    /// flushed again before anything else is taken.
    fn fill(&mut self, data: &[u8]) -> (usize, StreamResult<()>) {
        let mut accepted = 0;
        loop {
            if self.buffer.is_full() {
                if let Err(e) = self.flush() {
                    return (accepted, Err(e));
                }
            }
            if accepted == data.len() {
                break;
            }
            accepted += self.buffer.extend_from_slice(&data[accepted..]);
            self.pending_flush = true;
        }

        trace!(count = accepted, buffered = self.buffer.len(), "Buffered write");
        (accepted, Ok(()))
    }

    /// Push buffered bytes to the device
    ///
    /// A trailing partial block is written whole, padded with whatever the
    /// buffer holds past the valid bytes. Those valid bytes are kept at the
    /// front of the buffer for the next flush.
    pub fn flush(&mut self) -> StreamResult<()> {
        if !self.pending_flush {
            return Ok(());
        }

        let block_size = self.block_size;
        let buffered = self.buffer.len();
        let aligned_len = AlignedBuffer::round_down(buffered, block_size);
        let aligned_pos = self.align_down(self.last_physical_position);

        if !self.physically_aligned {
            self.aligned.seek(aligned_pos)?;
        }

        if buffered.is_multiple_of(block_size) {
            self.write_physical(aligned_pos, buffered)?;

            self.last_physical_position = aligned_pos + buffered as u64;
            self.buffer.clear();
            self.physically_aligned = true;

            debug!(offset = aligned_pos, len = buffered, "Flushed aligned buffer");
        } else {
            let len = aligned_len + block_size;
            self.write_physical(aligned_pos, len)?;

            let left = buffered - aligned_len;
            self.last_physical_position = aligned_pos + (aligned_len + left) as u64;
            self.buffer.shift_to_front(aligned_len, left);
            self.physically_aligned = false;

            debug!(
                offset = aligned_pos,
                len,
                retained = left,
                "Flushed buffer with write-ahead block"
            );
        }

        self.pending_flush = false;
        Ok(())
    }

    fn write_physical(&mut self, offset: u64, len: usize) -> StreamResult<()> {
        if len == 0 {
            return Ok(());
        }

        let result = self.aligned.write(&self.buffer.as_full_slice()[..len]);
        let written = match result {
            Ok(written) => written,
            Err(e) => {
                // Handle position is unknown now; reposition before retrying
                self.physically_aligned = false;
                return Err(e.into());
            }
        };

        if written != len {
            self.physically_aligned = false;
            return Err(StreamError::ShortWrite {
                offset,
                requested: len,
                written,
            });
        }
        Ok(())
    }

    /// Move the logical position to `offset`
    ///
    /// Pending bytes are flushed first. When `offset` is not block aligned,
    /// the first `offset % block_size` bytes of the buffer are taken to
    /// already hold the file's content before `offset`; the device is not
    /// read to fill them. Seek then write, never seek then read the buffer.
    pub fn seek(&mut self, offset: u64) -> StreamResult<u64> {
        let aligned_target = self.align_down(offset);
        let left = (offset - aligned_target) as usize;

        self.flush()?;

        self.last_physical_position = aligned_target;
        self.buffer.set_len(left);
        self.physically_aligned = false;

        debug!(offset, aligned_target, left, "Seek");
        Ok(offset)
    }

    /// Seek to `offset`, then load the block containing it from the file
    ///
    /// Unlike [`seek`](Self::seek) the buffer prefix comes from the file, so
    /// a later write keeps whatever is stored around `offset` in that block.
    /// Write-only streams cannot read and fall back to a plain seek.
    fn reposition(&mut self, offset: u64) -> StreamResult<u64> {
        self.seek(offset)?;
        if self.access.can_read() && !self.buffer.is_empty() {
            self.load_current_block()?;
        }
        Ok(offset)
    }

    fn load_current_block(&mut self) -> StreamResult<()> {
        let block_size = self.block_size;
        let offset = self.align_down(self.last_physical_position);
        let block = &mut self.buffer.as_mut_slice()[..block_size];

        let mut filled = 0;
        while filled < block_size {
            let n = self.reader.read_at(&mut block[filled..], offset + filled as u64)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        // Past the end of the file
        block[filled..].fill(0);

        trace!(offset, filled, "Loaded block from file");
        Ok(())
    }

    /// Resize the file to `value` rounded up to a whole block, then seek to 0
    pub fn set_len(&mut self, value: u64) -> StreamResult<()> {
        self.ensure_writable()?;

        let extent = self.align_up(value);
        self.aligned.resize(extent)?;
        debug!(requested = value, extent, "Resized file");

        self.seek(0)?;
        Ok(())
    }

    /// Read at the current logical position through the read handle
    ///
    /// Bytes still in the buffer are not visible here. The logical position
    /// does not move.
    pub fn read(&mut self, buf: &mut [u8]) -> StreamResult<usize> {
        let position = self.position();
        self.read_at(buf, position)
    }

    /// Read at an arbitrary file offset through the read handle
    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> StreamResult<usize> {
        self.ensure_readable()?;
        Ok(self.reader.read_at(buf, offset)?)
    }

    /// Current logical position
    pub fn position(&self) -> u64 {
        let buffered = self.buffer.len() as u64;
        if self.physically_aligned {
            self.last_physical_position + buffered
        } else {
            self.align_down(self.last_physical_position) + buffered
        }
    }

    /// Set the logical position; same as [`seek`](Self::seek)
    pub fn set_position(&mut self, position: u64) -> StreamResult<()> {
        self.seek(position)?;
        Ok(())
    }

    /// Current file size as seen by the read handle
    pub fn length(&self) -> StreamResult<u64> {
        Ok(self.reader.len()?)
    }

    /// Flush pending bytes and release both handles
    ///
    /// The handles are released even when the flush fails; the flush error
    /// is returned.
    pub fn close(mut self) -> StreamResult<()> {
        let result = self.flush();
        self.closed = true;

        match &result {
            Ok(()) => info!(path = %self.path.display(), "Closed unaligned stream"),
            Err(e) => error!(path = %self.path.display(), error = %e, "Flush on close failed"),
        }
        result
    }

    /// Alignment unit for every physical transfer
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Capacity of the accumulation buffer
    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Bytes currently held in the accumulation buffer
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Device offset reached by the last flush
    pub fn last_physical_position(&self) -> u64 {
        self.last_physical_position
    }

    /// False while the last flush left a write-ahead block past the logical end
    pub fn is_physically_aligned(&self) -> bool {
        self.physically_aligned
    }

    /// True when buffered bytes have not reached the device yet
    pub fn has_pending_flush(&self) -> bool {
        self.pending_flush
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn can_read(&self) -> bool {
        self.access.can_read()
    }

    pub fn can_write(&self) -> bool {
        self.access.can_write()
    }

    pub fn can_seek(&self) -> bool {
        true
    }
}

impl<F: DirectIOFactory> Drop for UnalignedStream<F> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "Flush on drop failed");
        }
    }
}

/// A flush failure after some bytes were taken is reported on the next call.
impl<F: DirectIOFactory> std::io::Write for UnalignedStream<F> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.ensure_writable()?;

        match self.fill(buf) {
            (accepted, Ok(())) => Ok(accepted),
            (0, Err(e)) => Err(e.into()),
            (accepted, Err(e)) => {
                debug!(accepted, error = %e, "Flush failed after buffering; reporting later");
                Ok(accepted)
            }
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        UnalignedStream::flush(self)?;
        Ok(())
    }
}

/// Reads advance the logical position past the bytes returned. The block
/// holding the new position is reloaded from the file, so writing after a
/// read appends without clobbering what was read.
impl<F: DirectIOFactory> std::io::Read for UnalignedStream<F> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let position = self.position();
        let n = self.read_at(buf, position)?;
        if n > 0 {
            self.reposition(position + n as u64)?;
        }
        Ok(n)
    }
}

impl<F: DirectIOFactory> std::io::Seek for UnalignedStream<F> {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        use std::io::SeekFrom;

        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position().checked_add_signed(delta),
            SeekFrom::End(delta) => self.length()?.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            )
        })?;

        Ok(self.reposition(target)?)
    }

    fn stream_position(&mut self) -> std::io::Result<u64> {
        Ok(self.position())
    }
}
