// MFS boot sector and master record codecs
// Both structures are little-endian at fixed offsets; see constants.rs

use super::constants::*;
use byteorder::{ByteOrder, LittleEndian};
use mfsutil_core::{MfsError, MfsResult, PartitionFlags};
use std::ops::Range;

/// Wrapping byte sum over `data`, skipping the bytes in `skip`
pub fn checksum(data: &[u8], skip: Range<usize>) -> u32 {
    data.iter()
        .enumerate()
        .filter(|(i, _)| !skip.contains(i))
        .fold(0u32, |sum, (_, b)| sum.wrapping_add(*b as u32))
}

/// Wrapping byte sum of file content
pub fn data_checksum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |sum, b| sum.wrapping_add(*b as u32))
}

/// Volume boot record fields, sector 0 of the partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootRecord {
    pub version: u8,
    pub flags: u8,
    pub media_type: u8,
    pub bytes_per_sector: u16,
    pub sectors_per_track: u16,
    pub heads_per_cylinder: u16,
    pub total_sectors: u64,
    pub reserved_sectors: u16,
    pub sectors_per_bucket: u16,
    /// Partition-relative
    pub master_record_sector: u64,
    /// Partition-relative
    pub master_record_mirror: u64,
}

impl BootRecord {
    pub fn is_bootable(&self) -> bool {
        self.flags & BOOT_FLAG_BOOTABLE != 0
    }

    /// Write the header fields into an existing sector, leaving boot code intact
    pub fn encode_into(&self, sector: &mut [u8]) -> MfsResult<()> {
        if sector.len() < boot_offsets::END {
            return Err(MfsError::InvalidInput(format!(
                "boot sector buffer too small: {} bytes",
                sector.len()
            )));
        }

        sector[boot_offsets::MAGIC..boot_offsets::MAGIC + 4].copy_from_slice(MFS_MAGIC);
        sector[boot_offsets::VERSION] = self.version;
        sector[boot_offsets::FLAGS] = self.flags;
        sector[boot_offsets::MEDIA_TYPE] = self.media_type;
        LittleEndian::write_u16(&mut sector[boot_offsets::BYTES_PER_SECTOR..], self.bytes_per_sector);
        LittleEndian::write_u16(&mut sector[boot_offsets::SECTORS_PER_TRACK..], self.sectors_per_track);
        LittleEndian::write_u16(&mut sector[boot_offsets::HEADS_PER_CYLINDER..], self.heads_per_cylinder);
        LittleEndian::write_u64(&mut sector[boot_offsets::TOTAL_SECTORS..], self.total_sectors);
        LittleEndian::write_u16(&mut sector[boot_offsets::RESERVED_SECTORS..], self.reserved_sectors);
        LittleEndian::write_u16(&mut sector[boot_offsets::SECTORS_PER_BUCKET..], self.sectors_per_bucket);
        LittleEndian::write_u64(&mut sector[boot_offsets::MASTER_RECORD_SECTOR..], self.master_record_sector);
        LittleEndian::write_u64(&mut sector[boot_offsets::MASTER_RECORD_MIRROR..], self.master_record_mirror);
        Ok(())
    }

    /// Encode into a fresh zeroed sector
    pub fn encode(&self, sector_size: usize) -> MfsResult<Vec<u8>> {
        let mut sector = vec![0u8; sector_size];
        self.encode_into(&mut sector)?;
        Ok(sector)
    }

    pub fn decode(sector: &[u8]) -> MfsResult<Self> {
        if sector.len() < boot_offsets::END {
            return Err(MfsError::CorruptVolume("boot sector truncated".to_string()));
        }
        if &sector[boot_offsets::MAGIC..boot_offsets::MAGIC + 4] != MFS_MAGIC {
            return Err(MfsError::CorruptVolume(
                "boot sector does not carry the MFS signature".to_string(),
            ));
        }

        Ok(Self {
            version: sector[boot_offsets::VERSION],
            flags: sector[boot_offsets::FLAGS],
            media_type: sector[boot_offsets::MEDIA_TYPE],
            bytes_per_sector: LittleEndian::read_u16(&sector[boot_offsets::BYTES_PER_SECTOR..]),
            sectors_per_track: LittleEndian::read_u16(&sector[boot_offsets::SECTORS_PER_TRACK..]),
            heads_per_cylinder: LittleEndian::read_u16(&sector[boot_offsets::HEADS_PER_CYLINDER..]),
            total_sectors: LittleEndian::read_u64(&sector[boot_offsets::TOTAL_SECTORS..]),
            reserved_sectors: LittleEndian::read_u16(&sector[boot_offsets::RESERVED_SECTORS..]),
            sectors_per_bucket: LittleEndian::read_u16(&sector[boot_offsets::SECTORS_PER_BUCKET..]),
            master_record_sector: LittleEndian::read_u64(&sector[boot_offsets::MASTER_RECORD_SECTOR..]),
            master_record_mirror: LittleEndian::read_u64(&sector[boot_offsets::MASTER_RECORD_MIRROR..]),
        })
    }
}

/// Master record: partition name, well-known buckets and the map location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterRecord {
    pub flags: PartitionFlags,
    pub partition_name: String,
    pub free_bucket: u32,
    pub root_directory_bucket: u32,
    pub bad_bucket_list_bucket: u32,
    pub journal_bucket: u32,
    /// Partition-relative
    pub map_sector: u64,
    /// Map size in bytes
    pub map_size: u64,
}

impl MasterRecord {
    const CHECKSUM_FIELD: Range<usize> = master_offsets::CHECKSUM..master_offsets::CHECKSUM + 4;

    /// Encode to the 512-byte on-disk form; the checksum is recomputed every time
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; MASTER_RECORD_SIZE];

        buf[master_offsets::MAGIC..master_offsets::MAGIC + 4].copy_from_slice(MFS_MAGIC);
        LittleEndian::write_u32(&mut buf[master_offsets::FLAGS..], self.flags.0);

        let name = truncate_name(&self.partition_name, PARTITION_NAME_LEN);
        buf[master_offsets::PARTITION_NAME..master_offsets::PARTITION_NAME + name.len()]
            .copy_from_slice(name);

        LittleEndian::write_u32(&mut buf[master_offsets::FREE_BUCKET..], self.free_bucket);
        LittleEndian::write_u32(&mut buf[master_offsets::ROOT_DIRECTORY..], self.root_directory_bucket);
        LittleEndian::write_u32(&mut buf[master_offsets::BAD_BUCKET_LIST..], self.bad_bucket_list_bucket);
        LittleEndian::write_u32(&mut buf[master_offsets::JOURNAL..], self.journal_bucket);
        LittleEndian::write_u64(&mut buf[master_offsets::MAP_SECTOR..], self.map_sector);
        LittleEndian::write_u64(&mut buf[master_offsets::MAP_SIZE..], self.map_size);

        let sum = checksum(&buf, Self::CHECKSUM_FIELD);
        LittleEndian::write_u32(&mut buf[master_offsets::CHECKSUM..], sum);
        buf
    }

    pub fn decode(buf: &[u8]) -> MfsResult<Self> {
        if buf.len() < MASTER_RECORD_SIZE {
            return Err(MfsError::CorruptVolume("master record truncated".to_string()));
        }
        let buf = &buf[..MASTER_RECORD_SIZE];

        if &buf[master_offsets::MAGIC..master_offsets::MAGIC + 4] != MFS_MAGIC {
            return Err(MfsError::CorruptVolume("master record signature mismatch".to_string()));
        }

        let stored = LittleEndian::read_u32(&buf[master_offsets::CHECKSUM..]);
        let computed = checksum(buf, Self::CHECKSUM_FIELD);
        if stored != computed {
            return Err(MfsError::CorruptVolume(format!(
                "master record checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored, computed
            )));
        }

        let name_field =
            &buf[master_offsets::PARTITION_NAME..master_offsets::PARTITION_NAME + PARTITION_NAME_LEN];

        Ok(Self {
            flags: PartitionFlags(LittleEndian::read_u32(&buf[master_offsets::FLAGS..])),
            partition_name: decode_name(name_field),
            free_bucket: LittleEndian::read_u32(&buf[master_offsets::FREE_BUCKET..]),
            root_directory_bucket: LittleEndian::read_u32(&buf[master_offsets::ROOT_DIRECTORY..]),
            bad_bucket_list_bucket: LittleEndian::read_u32(&buf[master_offsets::BAD_BUCKET_LIST..]),
            journal_bucket: LittleEndian::read_u32(&buf[master_offsets::JOURNAL..]),
            map_sector: LittleEndian::read_u64(&buf[master_offsets::MAP_SECTOR..]),
            map_size: LittleEndian::read_u64(&buf[master_offsets::MAP_SIZE..]),
        })
    }
}

/// Longest prefix of `name` that fits in `max` bytes without splitting a character
pub(crate) fn truncate_name(name: &str, max: usize) -> &[u8] {
    if name.len() <= max {
        return name.as_bytes();
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name.as_bytes()[..end]
}

/// Read a NUL-terminated name from a fixed field
pub(crate) fn decode_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
