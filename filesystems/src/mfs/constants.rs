// MFS on-disk constants
// Byte offsets are grouped per structure so the codecs never use bare numbers.

use static_assertions::const_assert;

pub const MFS_MAGIC: &[u8; 4] = b"MFS1";
pub const MFS_VERSION: u8 = 0x01;
pub const MFS_MEDIA_TYPE: u8 = 0x80;

/// Terminal link of a bucket chain; never a valid bucket index
pub const END_OF_CHAIN: u32 = 0xFFFF_FFFF;

pub const MAP_ENTRY_SIZE: u64 = 8;
pub const MASTER_RECORD_SIZE: usize = 512;
pub const RECORD_SIZE: usize = 0x400;

pub const PARTITION_NAME_LEN: usize = 64;
pub const RECORD_NAME_LEN: usize = 300;
/// Longest name that still leaves room for the terminating NUL
pub const MAX_NAME_BYTES: usize = RECORD_NAME_LEN - 1;

// Fixed allocations made at format time, in this order
pub const ROOT_DIRECTORY_BUCKETS: u32 = 8;
pub const JOURNAL_BUCKETS: u32 = 8;
pub const BAD_BUCKET_LIST_BUCKETS: u32 = 1;

/// Buckets added when a directory runs out of free slots
pub const DIRECTORY_EXPANSION_BUCKETS: u32 = 4;

pub const VALID_BUCKET_SIZES: [u16; 5] = [4, 8, 16, 32, 64];

pub const BOOT_FLAG_BOOTABLE: u8 = 0x01;

/// Span of the boot sector that survives a stage1 install
pub const BOOT_HEADER_START: usize = 3;
pub const BOOT_HEADER_LEN: usize = 41;

pub mod boot_offsets {
    pub const MAGIC: usize = 3;
    pub const VERSION: usize = 7;
    pub const FLAGS: usize = 8;
    pub const MEDIA_TYPE: usize = 9;
    pub const BYTES_PER_SECTOR: usize = 10;
    pub const SECTORS_PER_TRACK: usize = 12;
    pub const HEADS_PER_CYLINDER: usize = 14;
    pub const TOTAL_SECTORS: usize = 16;
    pub const RESERVED_SECTORS: usize = 24;
    pub const SECTORS_PER_BUCKET: usize = 26;
    pub const MASTER_RECORD_SECTOR: usize = 28;
    pub const MASTER_RECORD_MIRROR: usize = 36;
    pub const END: usize = 44;
}

pub mod master_offsets {
    pub const MAGIC: usize = 0;
    pub const FLAGS: usize = 4;
    pub const CHECKSUM: usize = 8;
    pub const PARTITION_NAME: usize = 12;
    pub const FREE_BUCKET: usize = 76;
    pub const ROOT_DIRECTORY: usize = 80;
    pub const BAD_BUCKET_LIST: usize = 84;
    pub const JOURNAL: usize = 88;
    pub const MAP_SECTOR: usize = 92;
    pub const MAP_SIZE: usize = 100;
    pub const END: usize = 108;
}

pub mod record_offsets {
    pub const FLAGS: usize = 0x00;
    pub const START_BUCKET: usize = 0x04;
    pub const START_LENGTH: usize = 0x08;
    pub const DATA_CHECKSUM: usize = 0x10;
    pub const SIZE: usize = 0x30;
    pub const ALLOCATED_SIZE: usize = 0x38;
    pub const SPARSE_MAP: usize = 0x40;
    pub const NAME: usize = 0x44;
}

const_assert!(master_offsets::PARTITION_NAME + PARTITION_NAME_LEN == master_offsets::FREE_BUCKET);
const_assert!(master_offsets::END <= MASTER_RECORD_SIZE);
const_assert!(record_offsets::NAME + RECORD_NAME_LEN <= RECORD_SIZE);
const_assert!(boot_offsets::END == BOOT_HEADER_START + BOOT_HEADER_LEN);

const KILOBYTE: u64 = 1024;
const MEGABYTE: u64 = KILOBYTE * 1024;
const GIGABYTE: u64 = MEGABYTE * 1024;

/// Sectors per bucket for a partition of `partition_bytes`
pub fn bucket_size_for(partition_bytes: u64) -> u16 {
    if partition_bytes <= GIGABYTE {
        8
    } else if partition_bytes <= 64 * GIGABYTE {
        16
    } else if partition_bytes <= 256 * GIGABYTE {
        32
    } else {
        64
    }
}
