//! Unaligned stream configuration

use crate::io::{AccessMode, HandleOptions, ShareMode};

/// Default size of the accumulation buffer (256 KiB)
pub const DEFAULT_BUFFER_SIZE: usize = 256 * 1024;

/// Default lower bound on the block size (one classic sector)
pub const DEFAULT_MIN_BLOCK_SIZE: usize = 512;

/// Configuration for an unaligned stream
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Access requested for the file
    pub access: AccessMode,

    /// Sharing granted to other openers of the file
    pub share: ShareMode,

    /// Hint that logical reads are sequential
    pub sequential: bool,

    /// Size of the accumulation buffer; must be a multiple of the block size
    pub buffer_size: usize,

    /// Open the aligned handle with write-through semantics
    pub write_through: bool,

    /// Lower bound on the block size, applied on top of the device sector size
    pub min_block_size: usize,

    /// Create the file if it does not exist
    pub create: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            access: AccessMode::ReadWrite,
            share: ShareMode::Read,
            sequential: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
            write_through: true,
            min_block_size: DEFAULT_MIN_BLOCK_SIZE,
            create: true,
        }
    }
}

impl StreamConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the access mode
    pub fn with_access(mut self, access: AccessMode) -> Self {
        self.access = access;
        self
    }

    /// Set the share mode
    pub fn with_share(mut self, share: ShareMode) -> Self {
        self.share = share;
        self
    }

    /// Set the sequential-access hint
    pub fn with_sequential(mut self, sequential: bool) -> Self {
        self.sequential = sequential;
        self
    }

    /// Set the accumulation buffer size
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Enable or disable write-through
    pub fn with_write_through(mut self, write_through: bool) -> Self {
        self.write_through = write_through;
        self
    }

    /// Set the minimum block size
    pub fn with_min_block_size(mut self, size: usize) -> Self {
        self.min_block_size = size;
        self
    }

    /// Create the file if missing
    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Options passed to the IO factory when opening handles
    pub fn handle_options(&self) -> HandleOptions {
        HandleOptions {
            access: self.access,
            share: self.share,
            sequential: self.sequential,
            write_through: self.write_through,
            create: self.create,
        }
    }
}
