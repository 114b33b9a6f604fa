//! Unbuffered IO backend for Windows
//!
//! The aligned handle is opened with `FILE_FLAG_NO_BUFFERING` (and
//! optionally `FILE_FLAG_WRITE_THROUGH`). The sector size comes from the
//! volume the file lives on.

use std::ffi::OsStr;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::os::windows::ffi::OsStrExt;
use std::os::windows::fs::OpenOptionsExt;
use std::path::Path;

use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE, INVALID_HANDLE_VALUE};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, GetDiskFreeSpaceW, SetEndOfFile, SetFilePointerEx, WriteFile,
    FILE_ATTRIBUTE_NORMAL, FILE_BEGIN, FILE_FLAG_NO_BUFFERING, FILE_FLAG_SEQUENTIAL_SCAN,
    FILE_FLAG_WRITE_THROUGH, FILE_GENERIC_READ, FILE_GENERIC_WRITE, FILE_SHARE_MODE,
    FILE_SHARE_NONE, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_ALWAYS, OPEN_EXISTING,
};

use crate::io::error::{IoError, IoResult};
use crate::io::traits::{
    check_alignment, AccessMode, AlignedHandle, DirectIOFactory, HandleOptions, ReadHandle,
    ShareMode, DEFAULT_SECTOR_SIZE,
};

/// A Send-safe wrapper for Windows HANDLE
///
/// The windows crate marks HANDLE as !Send because it contains a raw
/// pointer, but file handles are kernel objects usable from any thread.
#[derive(Clone, Copy)]
struct SendableHandle(isize);

impl SendableHandle {
    fn new(handle: HANDLE) -> Self {
        Self(handle.0 as isize)
    }

    fn as_handle(self) -> HANDLE {
        HANDLE(self.0 as *mut std::ffi::c_void)
    }
}

// SAFETY: Windows file handles are kernel objects that can safely be used
// from any thread in the process.
unsafe impl Send for SendableHandle {}

fn wide(path: &Path) -> Vec<u16> {
    OsStr::new(path)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

fn share_flags(share: ShareMode) -> FILE_SHARE_MODE {
    match share {
        ShareMode::None => FILE_SHARE_NONE,
        ShareMode::Read => FILE_SHARE_READ,
        ShareMode::Write => FILE_SHARE_WRITE,
        ShareMode::ReadWrite => FILE_SHARE_READ | FILE_SHARE_WRITE,
    }
}

fn os_error(e: windows::core::Error) -> IoError {
    IoError::Io(std::io::Error::from_raw_os_error(e.code().0))
}

/// Aligned handle opened with `FILE_FLAG_NO_BUFFERING`
pub struct WindowsAlignedHandle {
    handle: SendableHandle,
    block_size: usize,
    position: u64,
}

impl WindowsAlignedHandle {
    /// Open `path` with OS buffering disabled
    pub fn open(path: &Path, options: &HandleOptions, block_size: usize) -> IoResult<Self> {
        let wide_path = wide(path);

        let access = match options.access {
            AccessMode::Read => FILE_GENERIC_READ.0,
            AccessMode::Write => FILE_GENERIC_WRITE.0,
            AccessMode::ReadWrite => (FILE_GENERIC_READ | FILE_GENERIC_WRITE).0,
        };
        let disposition = if options.create && options.access.can_write() {
            OPEN_ALWAYS
        } else {
            OPEN_EXISTING
        };

        let mut flags = FILE_ATTRIBUTE_NORMAL | FILE_FLAG_NO_BUFFERING;
        if options.write_through {
            flags |= FILE_FLAG_WRITE_THROUGH;
        }

        // The stream's own read handle must be able to open the file too
        let share = share_flags(options.share) | FILE_SHARE_READ;

        let handle = unsafe {
            CreateFileW(
                PCWSTR::from_raw(wide_path.as_ptr()),
                access,
                share,
                None, // No security attributes
                disposition,
                flags,
                None, // No template file
            )
        }
        .map_err(os_error)?;

        if handle == INVALID_HANDLE_VALUE {
            return Err(IoError::Io(std::io::Error::last_os_error()));
        }

        Ok(Self {
            handle: SendableHandle::new(handle),
            block_size,
            position: 0,
        })
    }
}

impl Drop for WindowsAlignedHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.handle.as_handle());
        }
    }
}

impl AlignedHandle for WindowsAlignedHandle {
    fn seek(&mut self, offset: u64) -> IoResult<()> {
        let mut new_pos: i64 = 0;
        unsafe {
            SetFilePointerEx(
                self.handle.as_handle(),
                offset as i64,
                Some(&mut new_pos),
                FILE_BEGIN,
            )
        }
        .map_err(os_error)?;
        self.position = new_pos as u64;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        check_alignment(buf, self.position, self.block_size)?;

        let mut written: u32 = 0;
        unsafe { WriteFile(self.handle.as_handle(), Some(buf), Some(&mut written), None) }
            .map_err(os_error)?;

        self.position += written as u64;
        Ok(written as usize)
    }

    fn resize(&mut self, size: u64) -> IoResult<()> {
        let handle = self.handle.as_handle();

        // Move file pointer to desired size, set end of file there
        unsafe { SetFilePointerEx(handle, size as i64, None, FILE_BEGIN) }.map_err(os_error)?;
        unsafe { SetEndOfFile(handle) }.map_err(os_error)?;

        // Restore the pointer so the next write lands where it was
        unsafe { SetFilePointerEx(handle, self.position as i64, None, FILE_BEGIN) }
            .map_err(os_error)?;
        Ok(())
    }
}

/// Buffered handle used for logical reads
pub struct WindowsReadHandle {
    file: File,
}

impl WindowsReadHandle {
    /// Open `path` for buffered reads alongside the aligned handle
    pub fn open(path: &Path, options: &HandleOptions) -> IoResult<Self> {
        let mut opts = OpenOptions::new();
        opts.read(true)
            .share_mode((FILE_SHARE_READ | FILE_SHARE_WRITE).0);
        if options.sequential {
            opts.custom_flags(FILE_FLAG_SEQUENTIAL_SCAN.0);
        }
        let file = opts.open(path)?;
        Ok(Self { file })
    }
}

impl ReadHandle for WindowsReadHandle {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> IoResult<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(self.file.read(buf)?)
    }

    fn len(&self) -> IoResult<u64> {
        Ok(self.file.metadata()?.len())
    }
}

/// Factory for Windows unbuffered handles
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsIOFactory;

impl DirectIOFactory for WindowsIOFactory {
    type Aligned = WindowsAlignedHandle;
    type Reader = WindowsReadHandle;

    fn block_size(&self, path: &Path) -> IoResult<usize> {
        let absolute = std::path::absolute(path)?;
        let root = absolute.ancestors().last().unwrap_or(absolute.as_path());
        let wide_root = wide(root);

        let mut bytes_per_sector: u32 = 0;
        unsafe {
            GetDiskFreeSpaceW(
                PCWSTR::from_raw(wide_root.as_ptr()),
                None,
                Some(&mut bytes_per_sector),
                None,
                None,
            )
        }
        .map_err(os_error)?;

        let size = bytes_per_sector as usize;
        if size == 0 || !size.is_power_of_two() {
            return Ok(DEFAULT_SECTOR_SIZE);
        }
        Ok(size)
    }

    fn open_aligned(&self, path: &Path, options: &HandleOptions) -> IoResult<Self::Aligned> {
        let block_size = self.block_size(path)?;
        WindowsAlignedHandle::open(path, options, block_size)
    }

    fn open_reader(&self, path: &Path, options: &HandleOptions) -> IoResult<Self::Reader> {
        WindowsReadHandle::open(path, options)
    }
}
