//! Integration tests for the unaligned stream

mod common;

use std::io::{Read, Seek, SeekFrom, Write};

use sectorlog::io::{MemoryIOFactory, WriteRecord};
use sectorlog::{StreamConfig, StreamError, UnalignedStream};

fn memory_stream(
    block_size: usize,
    buffer_size: usize,
) -> (MemoryIOFactory, UnalignedStream<MemoryIOFactory>) {
    let factory = MemoryIOFactory::new(block_size);
    let config = StreamConfig::new().with_buffer_size(buffer_size);
    let stream = UnalignedStream::open_with(&factory, "segment.log", config).unwrap();
    (factory, stream)
}

const WRITE_SIZES: [usize; 12] = [1, 17, 511, 512, 513, 4095, 4096, 4097, 9000, 3, 12288, 700];

// ============ Instrumented device Tests ============

#[test]
fn test_every_physical_write_is_aligned() {
    common::init_tracing();
    let (factory, mut stream) = memory_stream(4096, 16384);

    for (i, &len) in WRITE_SIZES.iter().enumerate() {
        stream.write(&common::pattern(len, i as u8)).unwrap();
        if i % 3 == 0 {
            stream.flush().unwrap();
        }
    }
    stream.seek(1234).unwrap();
    stream.write(b"patched").unwrap();
    stream.flush().unwrap();

    let writes = factory.writes();
    assert!(!writes.is_empty());
    for WriteRecord { offset, len } in writes {
        assert_eq!(offset % 4096, 0, "unaligned offset {offset}");
        assert_eq!(len % 4096, 0, "unaligned length {len}");
    }
}

#[test]
fn test_position_advances_by_count() {
    let (_, mut stream) = memory_stream(512, 2048);
    let mut expected = 0u64;
    for (i, &len) in WRITE_SIZES.iter().enumerate() {
        let before = stream.position();
        stream.write(&common::pattern(len, i as u8)).unwrap();
        expected += len as u64;
        assert_eq!(stream.position(), before + len as u64);
        assert_eq!(stream.position(), expected);
    }
}

#[test]
fn test_file_length_is_block_multiple_after_flush() {
    let (factory, mut stream) = memory_stream(512, 4096);
    for (i, &len) in WRITE_SIZES.iter().enumerate() {
        stream.write(&common::pattern(len, i as u8)).unwrap();
        stream.flush().unwrap();
        assert_eq!(factory.len() % 512, 0);
        assert_eq!(stream.length().unwrap() % 512, 0);
        assert!(stream.length().unwrap() >= stream.position());
    }
}

#[test]
fn test_write_flush_read_roundtrip() {
    let (_, mut stream) = memory_stream(512, 2048);
    let mut expected = Vec::new();
    for (i, &len) in WRITE_SIZES.iter().enumerate() {
        let chunk = common::pattern(len, i as u8);
        stream.write(&chunk).unwrap();
        expected.extend_from_slice(&chunk);
    }
    stream.flush().unwrap();

    let mut actual = vec![0u8; expected.len()];
    let mut read = 0;
    while read < actual.len() {
        let n = stream.read_at(&mut actual[read..], read as u64).unwrap();
        assert!(n > 0);
        read += n;
    }
    assert_eq!(actual, expected);
}

#[test]
fn test_set_len_rounds_to_block() {
    let (factory, mut stream) = memory_stream(4096, 8192);
    let cases = [
        (0u64, 0u64),
        (1, 4096),
        (4096, 4096),
        (4097, 8192),
        (1 << 20, 1 << 20),
    ];
    for (value, extent) in cases {
        stream.set_len(value).unwrap();
        assert_eq!(factory.len(), extent, "set_len({value})");
        assert_eq!(stream.position(), 0);
    }
}

#[test]
fn test_flush_is_idempotent() {
    let (factory, mut stream) = memory_stream(4096, 8192);
    stream.write(&common::pattern(100, 1)).unwrap();
    stream.flush().unwrap();
    let after_first = factory.writes().len();
    stream.flush().unwrap();
    assert_eq!(factory.writes().len(), after_first);
}

#[test]
fn test_overflow_and_write_ahead_scenario() {
    let (factory, mut stream) = memory_stream(4096, 8192);

    stream.write(&common::pattern(5000, 1)).unwrap();
    assert_eq!(stream.buffered_len(), 5000);
    assert!(factory.writes().is_empty());

    stream.write(&common::pattern(4000, 2)).unwrap();
    assert_eq!(factory.writes(), vec![WriteRecord { offset: 0, len: 8192 }]);
    assert_eq!(stream.buffered_len(), 808);
    assert_eq!(stream.position(), 9000);

    stream.flush().unwrap();
    assert_eq!(
        factory.writes()[1],
        WriteRecord {
            offset: 8192,
            len: 4096
        }
    );
    assert_eq!(stream.last_physical_position(), 9000);
    assert_eq!(stream.buffered_len(), 808);
    assert!(!stream.is_physically_aligned());
}

#[test]
fn test_seek_scenario() {
    let (_, mut stream) = memory_stream(4096, 8192);
    stream.seek(100).unwrap();
    assert_eq!(stream.position(), 100);
    assert_eq!(stream.buffered_len(), 100);
    assert!(!stream.is_physically_aligned());
}

#[test]
fn test_short_write_surfaces_and_keeps_data() {
    let (factory, mut stream) = memory_stream(512, 1024);
    factory.short_next_write(0);

    let err = stream.write(&common::pattern(1500, 9)).unwrap_err();
    match err {
        StreamError::PartialWrite { accepted, source } => {
            assert_eq!(accepted, 1024);
            assert!(matches!(*source, StreamError::ShortWrite { written: 0, .. }));
        }
        other => panic!("expected a partial write, got {other:?}"),
    }

    // Retrying the flush completes what the failed write started
    stream.flush().unwrap();
    assert_eq!(stream.position(), 1024);
}

#[test]
fn test_write_all_survives_interrupted_flush() {
    common::init_tracing();
    let (factory, mut stream) = memory_stream(512, 1024);
    let data = common::pattern(1500, 10);

    factory.fail_next_write(std::io::ErrorKind::Interrupted);
    stream.write_all(&data).unwrap();
    Write::flush(&mut stream).unwrap();

    assert_eq!(stream.position(), 1500);
    assert_eq!(&factory.contents()[..1500], &data[..]);
}

#[test]
fn test_reopen_read_to_end_then_append() {
    common::init_tracing();
    let factory = MemoryIOFactory::new(512);
    let config = || StreamConfig::new().with_buffer_size(2048);
    let data = common::pattern(3000, 11);

    let mut stream = UnalignedStream::open_with(&factory, "segment.log", config()).unwrap();
    stream.write_all(&data).unwrap();
    stream.close().unwrap();

    // Recovery: replay what is on disk, then keep appending
    let mut stream = UnalignedStream::open_with(&factory, "segment.log", config()).unwrap();
    let mut replayed = vec![0u8; data.len()];
    stream.read_exact(&mut replayed).unwrap();
    assert_eq!(replayed, data);

    stream.write_all(b"next record").unwrap();
    stream.close().unwrap();

    let contents = factory.contents();
    assert_eq!(&contents[..3000], &data[..]);
    assert_eq!(&contents[3000..3011], b"next record");
    assert_eq!(contents.len() % 512, 0);
}

#[test]
fn test_std_io_traits() {
    let (_, mut stream) = memory_stream(512, 2048);
    let data = common::pattern(3000, 4);

    stream.write_all(&data).unwrap();
    Write::flush(&mut stream).unwrap();
    assert_eq!(stream.stream_position().unwrap(), 3000);

    stream.rewind().unwrap();
    let mut out = vec![0u8; 3000];
    stream.read_exact(&mut out).unwrap();
    assert_eq!(out, data);
    assert_eq!(stream.stream_position().unwrap(), 3000);

    assert_eq!(Seek::seek(&mut stream, SeekFrom::Current(-1000)).unwrap(), 2000);
    assert_eq!(Seek::seek(&mut stream, SeekFrom::End(0)).unwrap(), 3072);
    assert!(Seek::seek(&mut stream, SeekFrom::Current(-10_000)).is_err());
}

// ============ POSIX Tests ============

#[cfg(unix)]
fn posix_config() -> StreamConfig {
    // Pin the block size so results do not depend on the filesystem
    StreamConfig::new()
        .with_buffer_size(16384)
        .with_min_block_size(4096)
}

#[cfg(unix)]
#[test]
fn test_posix_roundtrip() {
    common::init_tracing();
    let dir = common::scratch_dir();
    let path = dir.path().join("wal_0001.log");

    let mut expected = Vec::new();
    {
        let mut stream = UnalignedStream::open(&path, posix_config()).unwrap();
        assert_eq!(stream.block_size(), 4096);

        for (i, &len) in WRITE_SIZES.iter().enumerate() {
            let chunk = common::pattern(len, i as u8);
            stream.write(&chunk).unwrap();
            expected.extend_from_slice(&chunk);
        }
        stream.flush().unwrap();
        assert_eq!(stream.position(), expected.len() as u64);
        assert_eq!(stream.length().unwrap() % 4096, 0);
        stream.close().unwrap();
    }

    let contents = std::fs::read(&path).unwrap();
    assert_eq!(contents.len() % 4096, 0);
    assert_eq!(&contents[..expected.len()], &expected[..]);
}

#[cfg(unix)]
#[test]
fn test_posix_preextend_then_write() {
    let dir = common::scratch_dir();
    let path = dir.path().join("wal_0002.log");

    let mut stream = UnalignedStream::open(&path, posix_config()).unwrap();
    stream.set_len(100_000).unwrap();
    assert_eq!(stream.length().unwrap(), 102_400);

    let data = common::pattern(5000, 7);
    stream.write(&data).unwrap();
    stream.flush().unwrap();

    // Pre-extended size is kept; write-ahead stays inside it
    assert_eq!(stream.length().unwrap(), 102_400);
    let mut out = vec![0u8; 5000];
    assert_eq!(stream.read_at(&mut out, 0).unwrap(), 5000);
    assert_eq!(out, data);
    stream.close().unwrap();
}

#[cfg(unix)]
#[test]
fn test_posix_reopen_read_then_append() {
    common::init_tracing();
    let dir = common::scratch_dir();
    let path = dir.path().join("wal_0004.log");
    let data = common::pattern(10_000, 12);

    let mut stream = UnalignedStream::open(&path, posix_config()).unwrap();
    stream.write_all(&data).unwrap();
    stream.close().unwrap();

    let mut stream = UnalignedStream::open(&path, posix_config()).unwrap();
    let mut replayed = vec![0u8; data.len()];
    stream.read_exact(&mut replayed).unwrap();
    assert_eq!(replayed, data);
    assert_eq!(stream.position(), 10_000);

    stream.write_all(b"tail").unwrap();
    stream.close().unwrap();

    let contents = std::fs::read(&path).unwrap();
    assert_eq!(&contents[..10_000], &data[..]);
    assert_eq!(&contents[10_000..10_004], b"tail");
}

#[cfg(unix)]
#[test]
fn test_posix_drop_flushes() {
    let dir = common::scratch_dir();
    let path = dir.path().join("wal_0003.log");

    {
        let mut stream = UnalignedStream::open(&path, posix_config()).unwrap();
        stream.write(b"checkpoint marker").unwrap();
    }

    let contents = std::fs::read(&path).unwrap();
    assert_eq!(contents.len(), 4096);
    assert_eq!(&contents[..17], b"checkpoint marker");
}
