//! Stream error types

use thiserror::Error;

/// Unaligned stream errors
#[derive(Error, Debug)]
pub enum StreamError {
    /// Device IO error
    #[error("IO error: {0}")]
    Io(#[from] crate::io::IoError),

    /// Standard IO error
    #[error("IO error: {0}")]
    StdIo(#[from] std::io::Error),

    /// Internal buffer cannot be split into whole device blocks
    #[error("Buffer size {buffer_size} is not a multiple of block size {block_size}")]
    Config {
        buffer_size: usize,
        block_size: usize,
    },

    /// Block size is zero or not a power of two
    #[error("Invalid block size {0}: must be a non-zero power of two")]
    InvalidBlockSize(usize),

    /// Device accepted fewer bytes than requested
    #[error("Short write at offset {offset}: {written} of {requested} bytes")]
    ShortWrite {
        offset: u64,
        requested: usize,
        written: usize,
    },

    /// Flush failed after part of a write had been buffered
    ///
    /// The first `accepted` bytes are held by the stream and reach the device
    /// on the next successful flush; the caller still owns the rest.
    #[error("Write stopped after {accepted} bytes: {source}")]
    PartialWrite {
        accepted: usize,
        #[source]
        source: Box<StreamError>,
    },

    /// Operation not permitted by the stream's access mode
    #[error("Operation not supported: {0}")]
    NotSupported(&'static str),
}

/// Result type for stream operations
pub type StreamResult<T> = Result<T, StreamError>;

impl From<StreamError> for std::io::Error {
    fn from(e: StreamError) -> Self {
        use std::io::ErrorKind;

        match e {
            StreamError::StdIo(e) => e,
            StreamError::Io(crate::io::IoError::Io(e)) => e,
            StreamError::ShortWrite { .. } => std::io::Error::new(ErrorKind::WriteZero, e),
            StreamError::NotSupported(_) => std::io::Error::new(ErrorKind::Unsupported, e),
            StreamError::Config { .. } | StreamError::InvalidBlockSize(_) => {
                std::io::Error::new(ErrorKind::InvalidInput, e)
            }
            other => std::io::Error::other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_std_io_error() {
        let err: std::io::Error = StreamError::ShortWrite {
            offset: 0,
            requested: 4096,
            written: 512,
        }
        .into();
        assert_eq!(err.kind(), std::io::ErrorKind::WriteZero);

        let err: std::io::Error = StreamError::PartialWrite {
            accepted: 512,
            source: Box::new(StreamError::ShortWrite {
                offset: 0,
                requested: 1024,
                written: 0,
            }),
        }
        .into();
        assert_eq!(err.kind(), std::io::ErrorKind::Other);

        let err: std::io::Error = StreamError::NotSupported("write").into();
        assert_eq!(err.kind(), std::io::ErrorKind::Unsupported);

        let inner = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: std::io::Error = StreamError::Io(crate::io::IoError::Io(inner)).into();
        assert_eq!(err.kind(), std::io::ErrorKind::PermissionDenied);
    }
}
