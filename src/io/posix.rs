//! POSIX direct IO backend
//!
//! The aligned handle is opened with `O_DIRECT` on Linux and `F_NOCACHE` on
//! macOS so writes bypass the page cache. Filesystems that refuse direct IO
//! (tmpfs on older kernels, some FUSE mounts) get a buffered handle instead;
//! alignment is still enforced so behavior does not change between them.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::Path;

use tracing::warn;

use crate::io::error::IoResult;
use crate::io::traits::{
    check_alignment, AlignedHandle, DirectIOFactory, HandleOptions, ReadHandle,
    DEFAULT_SECTOR_SIZE,
};

/// Largest block size reported by discovery
///
/// `st_blksize` is the filesystem's preferred IO size, which can be far
/// larger than the sector size direct IO actually requires.
pub const MAX_DISCOVERED_BLOCK_SIZE: usize = 4096;

/// Aligned handle over a file opened for direct IO
pub struct PosixAlignedHandle {
    file: File,
    block_size: usize,
    position: u64,
    direct: bool,
}

impl PosixAlignedHandle {
    /// Open `path` for direct IO, falling back to buffered IO when refused
    pub fn open(path: &Path, options: &HandleOptions, block_size: usize) -> IoResult<Self> {
        match Self::open_with(path, options, true) {
            Ok(file) => Ok(Self::from_file(file, block_size, true)),
            Err(e) if e.raw_os_error() == Some(libc::EINVAL) => {
                warn!(
                    path = %path.display(),
                    "Direct IO not supported by filesystem, using buffered handle"
                );
                let file = Self::open_with(path, options, false)?;
                Ok(Self::from_file(file, block_size, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn open_with(path: &Path, options: &HandleOptions, direct: bool) -> std::io::Result<File> {
        let mut opts = OpenOptions::new();
        opts.read(options.access.can_read())
            .write(options.access.can_write())
            .create(options.create && options.access.can_write());

        let mut flags = direct_flag(direct);
        if options.write_through {
            flags |= libc::O_DSYNC;
        }
        opts.custom_flags(flags);

        let file = opts.open(path)?;
        if direct {
            disable_page_cache(&file)?;
        }

        Ok(file)
    }

    fn from_file(file: File, block_size: usize, direct: bool) -> Self {
        Self {
            file,
            block_size,
            position: 0,
            direct,
        }
    }
}

impl AlignedHandle for PosixAlignedHandle {
    fn seek(&mut self, offset: u64) -> IoResult<()> {
        self.position = self.file.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        check_alignment(buf, self.position, self.block_size)?;

        let written = self.file.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn resize(&mut self, size: u64) -> IoResult<()> {
        self.file.set_len(size)?;
        Ok(())
    }

    fn is_direct(&self) -> bool {
        self.direct
    }
}

/// Plain handle used for logical reads
pub struct PosixReadHandle {
    file: File,
}

impl PosixReadHandle {
    /// Open `path` read-only
    pub fn open(path: &Path, options: &HandleOptions) -> IoResult<Self> {
        let file = OpenOptions::new().read(true).open(path)?;

        if options.sequential {
            advise_sequential(&file, path);
        }

        Ok(Self { file })
    }
}

impl ReadHandle for PosixReadHandle {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> IoResult<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(self.file.read(buf)?)
    }

    fn len(&self) -> IoResult<u64> {
        Ok(self.file.metadata()?.len())
    }
}

#[cfg(target_os = "linux")]
fn direct_flag(direct: bool) -> i32 {
    if direct {
        libc::O_DIRECT
    } else {
        0
    }
}

#[cfg(not(target_os = "linux"))]
fn direct_flag(_direct: bool) -> i32 {
    0
}

#[cfg(target_os = "macos")]
fn disable_page_cache(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    // Safety: fd is owned by `file` and valid for the duration of the call
    let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_NOCACHE, 1) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn disable_page_cache(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(target_os = "linux")]
fn advise_sequential(file: &File, path: &Path) {
    use std::os::unix::io::AsRawFd;

    // Safety: fd is owned by `file`; advice is only a hint
    let rc = unsafe { libc::posix_fadvise(file.as_raw_fd(), 0, 0, libc::POSIX_FADV_SEQUENTIAL) };
    if rc != 0 {
        warn!(path = %path.display(), rc, "posix_fadvise failed");
    }
}

#[cfg(not(target_os = "linux"))]
fn advise_sequential(_file: &File, _path: &Path) {}

/// Factory for POSIX handles
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixIOFactory;

impl DirectIOFactory for PosixIOFactory {
    type Aligned = PosixAlignedHandle;
    type Reader = PosixReadHandle;

    fn block_size(&self, path: &Path) -> IoResult<usize> {
        // The file may not exist yet; its directory lives on the same device
        let stat_path = if path.exists() {
            path
        } else {
            match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            }
        };

        let blksize = std::fs::metadata(stat_path)?.blksize() as usize;
        if blksize == 0 || !blksize.is_power_of_two() {
            return Ok(DEFAULT_SECTOR_SIZE);
        }
        Ok(blksize.clamp(DEFAULT_SECTOR_SIZE, MAX_DISCOVERED_BLOCK_SIZE))
    }

    fn open_aligned(&self, path: &Path, options: &HandleOptions) -> IoResult<Self::Aligned> {
        let block_size = self.block_size(path)?;
        PosixAlignedHandle::open(path, options, block_size)
    }

    fn open_reader(&self, path: &Path, options: &HandleOptions) -> IoResult<Self::Reader> {
        PosixReadHandle::open(path, options)
    }
}
