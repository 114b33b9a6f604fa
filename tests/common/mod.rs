//! Shared test utilities
//!
//! Note: clippy reports false-positive dead_code warnings because it can't
//! trace usage across test binaries. These utilities are used by multiple tests.

#![allow(dead_code)]

use tempfile::TempDir;

/// Install a test-writer tracing subscriber (only first call succeeds)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sectorlog=debug")
        .with_test_writer()
        .try_init();
}

/// Scratch directory removed when dropped
pub fn scratch_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

/// Deterministic, non-repeating-per-block payload
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| ((i / 7) as u8).wrapping_mul(13) ^ (i as u8).wrapping_add(seed))
        .collect()
}
