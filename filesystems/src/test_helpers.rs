// Test helpers for volume testing

use crate::mfs::{MfsFormatter, MfsVolume};
use mfsutil_core::{FormatOptions, MemoryDisk};

pub const TEST_IMAGE_SIZE: u64 = 64 * 1024 * 1024;

/// Freshly formatted in-memory volume covering the whole disk
pub fn create_test_volume(size: u64) -> MfsVolume<MemoryDisk> {
    let disk = MemoryDisk::new(size, 512);
    let sectors = size / 512;
    MfsFormatter::new(FormatOptions::default())
        .format(disk, 0, sectors)
        .expect("format test volume")
}

/// Create a test volume with default size
pub fn create_default_test_volume() -> MfsVolume<MemoryDisk> {
    create_test_volume(TEST_IMAGE_SIZE)
}

/// Deterministic content of `len` bytes
pub fn patterned_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8).collect()
}
