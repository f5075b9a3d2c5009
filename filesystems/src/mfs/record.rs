// MFS directory records
// A directory is a bucket chain of packed 1024-byte records.

use super::constants::*;
use super::structures::{decode_name, truncate_name};
use byteorder::{ByteOrder, LittleEndian};
use mfsutil_core::{FileFlags, MfsError, MfsResult};
use serde::Serialize;

/// On-disk record flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordFlags(pub u32);

impl RecordFlags {
    pub const DIRECTORY: u32 = 0x1;
    pub const LINK: u32 = 0x2;
    pub const SECURITY: u32 = 0x4;
    pub const SYSTEM: u32 = 0x8;
    pub const HIDDEN: u32 = 0x10;
    pub const CHAINED: u32 = 0x20;
    pub const LOCKED: u32 = 0x40;
    pub const VERSIONED: u32 = 0x1000_0000;
    pub const INLINE: u32 = 0x2000_0000;
    pub const SPARSE: u32 = 0x4000_0000;
    pub const IN_USE: u32 = 0x8000_0000;

    /// Flags for a freshly created entry
    pub fn for_new_entry(flags: FileFlags) -> Self {
        let mut bits = Self::IN_USE | Self::CHAINED;
        if flags.is_directory() {
            bits |= Self::DIRECTORY;
        }
        if flags.is_system() {
            bits |= Self::SYSTEM;
        }
        if flags.is_security() {
            bits |= Self::SECURITY;
        }
        Self(bits)
    }

    pub fn is_directory(&self) -> bool { self.0 & Self::DIRECTORY != 0 }
    pub fn is_link(&self) -> bool { self.0 & Self::LINK != 0 }
    pub fn is_security(&self) -> bool { self.0 & Self::SECURITY != 0 }
    pub fn is_system(&self) -> bool { self.0 & Self::SYSTEM != 0 }
    pub fn is_hidden(&self) -> bool { self.0 & Self::HIDDEN != 0 }
    pub fn is_chained(&self) -> bool { self.0 & Self::CHAINED != 0 }
    pub fn is_locked(&self) -> bool { self.0 & Self::LOCKED != 0 }
    pub fn is_in_use(&self) -> bool { self.0 & Self::IN_USE != 0 }
}

/// Decoded directory record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryRecord {
    pub flags: RecordFlags,
    pub start_bucket: u32,
    pub start_length: u32,
    pub data_checksum: u32,
    pub size: u64,
    pub allocated_size: u64,
    pub sparse_map_bucket: u32,
    pub name: String,
}

impl DirectoryRecord {
    /// A new in-use record with no data chain yet
    pub fn new(name: &str, flags: RecordFlags) -> MfsResult<Self> {
        validate_name(name)?;
        Ok(Self {
            flags,
            start_bucket: END_OF_CHAIN,
            start_length: 0,
            data_checksum: 0,
            size: 0,
            allocated_size: 0,
            sparse_map_bucket: END_OF_CHAIN,
            name: name.to_string(),
        })
    }

    pub fn is_directory(&self) -> bool {
        self.flags.is_directory()
    }

    pub fn has_data(&self) -> bool {
        self.start_bucket != END_OF_CHAIN
    }

    /// Write the known fields into `slot`; bytes outside them are left as they are
    pub fn encode_into(&self, slot: &mut [u8]) -> MfsResult<()> {
        if slot.len() < RECORD_SIZE {
            return Err(MfsError::InvalidInput(format!(
                "record slot holds {} bytes, need {}",
                slot.len(),
                RECORD_SIZE
            )));
        }
        validate_name(&self.name)?;

        LittleEndian::write_u32(&mut slot[record_offsets::FLAGS..], self.flags.0);
        LittleEndian::write_u32(&mut slot[record_offsets::START_BUCKET..], self.start_bucket);
        LittleEndian::write_u32(&mut slot[record_offsets::START_LENGTH..], self.start_length);
        LittleEndian::write_u32(&mut slot[record_offsets::DATA_CHECKSUM..], self.data_checksum);
        LittleEndian::write_u64(&mut slot[record_offsets::SIZE..], self.size);
        LittleEndian::write_u64(&mut slot[record_offsets::ALLOCATED_SIZE..], self.allocated_size);
        LittleEndian::write_u32(&mut slot[record_offsets::SPARSE_MAP..], self.sparse_map_bucket);

        let name_field = &mut slot[record_offsets::NAME..record_offsets::NAME + RECORD_NAME_LEN];
        name_field.fill(0);
        let name = truncate_name(&self.name, MAX_NAME_BYTES);
        name_field[..name.len()].copy_from_slice(name);
        Ok(())
    }

    /// Decode a slot; `None` for a free slot
    pub fn decode(slot: &[u8]) -> MfsResult<Option<Self>> {
        if slot.len() < RECORD_SIZE {
            return Err(MfsError::CorruptVolume("directory record truncated".to_string()));
        }
        if is_free_slot(slot) {
            return Ok(None);
        }

        Ok(Some(Self {
            flags: RecordFlags(LittleEndian::read_u32(&slot[record_offsets::FLAGS..])),
            start_bucket: LittleEndian::read_u32(&slot[record_offsets::START_BUCKET..]),
            start_length: LittleEndian::read_u32(&slot[record_offsets::START_LENGTH..]),
            data_checksum: LittleEndian::read_u32(&slot[record_offsets::DATA_CHECKSUM..]),
            size: LittleEndian::read_u64(&slot[record_offsets::SIZE..]),
            allocated_size: LittleEndian::read_u64(&slot[record_offsets::ALLOCATED_SIZE..]),
            sparse_map_bucket: LittleEndian::read_u32(&slot[record_offsets::SPARSE_MAP..]),
            name: decode_name(&slot[record_offsets::NAME..record_offsets::NAME + RECORD_NAME_LEN]),
        }))
    }
}

/// A slot is free when its first byte is zero
pub fn is_free_slot(slot: &[u8]) -> bool {
    slot.first().map_or(true, |&b| b == 0)
}

pub fn validate_name(name: &str) -> MfsResult<()> {
    if name.is_empty() {
        return Err(MfsError::InvalidInput("entry name is empty".to_string()));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(MfsError::InvalidInput(format!(
            "entry name is {} bytes, limit is {}",
            name.len(),
            MAX_NAME_BYTES
        )));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(MfsError::InvalidInput(format!(
            "entry name contains a reserved character: {:?}",
            name
        )));
    }
    Ok(())
}

/// Where a record lives: the directory run holding it and the byte offset inside that run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLocation {
    pub run_bucket: u32,
    pub run_length: u32,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedRecord {
    pub record: DirectoryRecord,
    pub location: RecordLocation,
}
