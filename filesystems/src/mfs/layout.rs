// Partition layout arithmetic
// Reserved area, master record placement, map placement and bucket addressing.

use super::constants::*;
use super::structures::{BootRecord, MasterRecord};
use mfsutil_core::{MfsError, MfsResult};

/// Resolved sector positions of one MFS partition. All sectors are absolute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeLayout {
    pub partition_start: u64,
    pub total_sectors: u64,
    pub bytes_per_sector: u64,
    pub sectors_per_bucket: u64,
    pub reserved_sectors: u64,
    pub master_record_sector: u64,
    pub mirror_record_sector: u64,
    pub map_sector: u64,
    pub map_size: u64,
    pub map_sectors: u64,
}

impl VolumeLayout {
    /// Plan a fresh partition. `boot_sectors` covers the boot sector and any stage2 image
    pub fn plan(
        partition_start: u64,
        total_sectors: u64,
        bytes_per_sector: u64,
        sectors_per_bucket: u16,
        boot_sectors: u64,
    ) -> MfsResult<Self> {
        if !VALID_BUCKET_SIZES.contains(&sectors_per_bucket) {
            return Err(MfsError::InvalidInput(format!(
                "unsupported bucket size: {} sectors",
                sectors_per_bucket
            )));
        }
        if bytes_per_sector == 0 || total_sectors == 0 {
            return Err(MfsError::InvalidInput("partition has no sectors".to_string()));
        }

        let spb = sectors_per_bucket as u64;
        let master_offset = boot_sectors;
        let reserved = ((boot_sectors + 1) / spb + 1) * spb;
        if reserved > u16::MAX as u64 {
            return Err(MfsError::InvalidInput(format!(
                "reserved area of {} sectors does not fit the boot record",
                reserved
            )));
        }

        let map_size = (total_sectors / spb) * MAP_ENTRY_SIZE;
        let map_sectors = map_size.div_ceil(bytes_per_sector);

        // Map, mirror record and the fixed allocations must all fit behind the reserved area
        let fixed = (ROOT_DIRECTORY_BUCKETS + JOURNAL_BUCKETS + BAD_BUCKET_LIST_BUCKETS) as u64;
        let needed = reserved + map_sectors + 1 + (fixed + 1) * spb;
        if total_sectors < needed {
            return Err(MfsError::InvalidInput(format!(
                "partition of {} sectors is too small, need at least {}",
                total_sectors, needed
            )));
        }

        let map_offset = total_sectors - 1 - map_sectors;
        Ok(Self {
            partition_start,
            total_sectors,
            bytes_per_sector,
            sectors_per_bucket: spb,
            reserved_sectors: reserved,
            master_record_sector: partition_start + master_offset,
            mirror_record_sector: partition_start + map_offset - 1,
            map_sector: partition_start + map_offset,
            map_size,
            map_sectors,
        })
    }

    /// Rebuild the layout of an existing partition from its records
    pub fn from_records(
        partition_start: u64,
        boot: &BootRecord,
        master: &MasterRecord,
    ) -> MfsResult<Self> {
        let bytes_per_sector = boot.bytes_per_sector as u64;
        let map_sectors = master.map_size.div_ceil(bytes_per_sector.max(1));
        let absolute = |offset: u64| {
            partition_start.checked_add(offset).ok_or_else(|| {
                MfsError::CorruptVolume(format!(
                    "sector {} at partition offset {} overflows the sector address space",
                    offset, partition_start
                ))
            })
        };
        absolute(boot.total_sectors)?;

        let map_fits = master
            .map_sector
            .checked_add(map_sectors)
            .is_some_and(|end| end <= boot.total_sectors);
        if !map_fits {
            return Err(MfsError::CorruptVolume(format!(
                "bucket map at sector {} ({} sectors) runs past the partition end",
                master.map_sector, map_sectors
            )));
        }
        for (offset, what) in [
            (boot.master_record_sector, "master record"),
            (boot.master_record_mirror, "master record mirror"),
        ] {
            if offset >= boot.total_sectors {
                return Err(MfsError::CorruptVolume(format!(
                    "{} at sector {} lies outside the partition",
                    what, offset
                )));
            }
        }
        if (boot.reserved_sectors as u64) >= master.map_sector {
            return Err(MfsError::CorruptVolume(
                "reserved area overlaps the bucket map".to_string(),
            ));
        }

        Ok(Self {
            partition_start,
            total_sectors: boot.total_sectors,
            bytes_per_sector,
            sectors_per_bucket: boot.sectors_per_bucket as u64,
            reserved_sectors: boot.reserved_sectors as u64,
            master_record_sector: absolute(boot.master_record_sector)?,
            mirror_record_sector: absolute(boot.master_record_mirror)?,
            map_sector: absolute(master.map_sector)?,
            map_size: master.map_size,
            map_sectors,
        })
    }

    pub fn bucket_sector(&self, bucket: u32) -> u64 {
        self.partition_start + self.reserved_sectors + bucket as u64 * self.sectors_per_bucket
    }

    pub fn bucket_bytes(&self) -> u64 {
        self.sectors_per_bucket * self.bytes_per_sector
    }

    /// Buckets needed to hold `bytes`, rounded up
    pub fn buckets_for(&self, bytes: u64) -> MfsResult<u32> {
        let buckets = bytes.div_ceil(self.bucket_bytes());
        u32::try_from(buckets)
            .ok()
            .filter(|&b| b != END_OF_CHAIN)
            .ok_or_else(|| MfsError::InvalidInput(format!("{} bytes exceeds the bucket address space", bytes)))
    }

    /// Buckets available for allocation on a freshly formatted partition
    pub fn data_buckets(&self) -> u32 {
        let data_sectors = self
            .total_sectors
            .saturating_sub(self.reserved_sectors)
            .saturating_sub(self.map_sectors);
        let buckets = (data_sectors / self.sectors_per_bucket).saturating_sub(1);
        buckets.min((END_OF_CHAIN - 1) as u64) as u32
    }

    pub fn map_entries(&self) -> u64 {
        self.map_size / MAP_ENTRY_SIZE
    }

    /// Partition-relative sector, the form stored on disk
    pub fn relative(&self, sector: u64) -> u64 {
        sector - self.partition_start
    }
}
