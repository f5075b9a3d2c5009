// MFS formatter
// Lays out a fresh partition: empty bucket map, root directory, journal and
// bad bucket list, master record pair and boot sector.

use super::bootloader::Bootloader;
use super::bucket_map::{Allocation, BucketMap, DiskMap};
use super::chain;
use super::constants::*;
use super::layout::VolumeLayout;
use super::structures::{BootRecord, MasterRecord};
use super::volume::{write_master, MfsVolume};
use log::{debug, info};
use mfsutil_core::{Disk, FormatOptions, MfsError, MfsResult};

pub struct MfsFormatter {
    options: FormatOptions,
}

impl MfsFormatter {
    pub fn new(options: FormatOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &FormatOptions {
        &self.options
    }

    fn sectors_per_bucket(&self, total_sectors: u64, bytes_per_sector: u64) -> MfsResult<u16> {
        match self.options.sectors_per_bucket {
            Some(spb) if VALID_BUCKET_SIZES.contains(&spb) => Ok(spb),
            Some(spb) => Err(MfsError::InvalidInput(format!(
                "bucket size must be one of {:?} sectors, got {}",
                VALID_BUCKET_SIZES, spb
            ))),
            None => Ok(bucket_size_for(total_sectors * bytes_per_sector)),
        }
    }

    fn load_bootloader(&self) -> MfsResult<Option<Bootloader>> {
        if !self.options.bootable {
            return Ok(None);
        }
        Bootloader::load(&self.options.stage1_path, &self.options.stage2_path).map(Some)
    }

    /// Compute the layout a format would produce, without writing anything
    pub fn plan(&self, bytes_per_sector: u64, partition_start: u64, sector_count: u64) -> MfsResult<VolumeLayout> {
        let boot_sectors = match self.load_bootloader()? {
            Some(bootloader) => bootloader.boot_sectors(bytes_per_sector),
            None => 1,
        };
        let spb = self.sectors_per_bucket(sector_count, bytes_per_sector)?;
        VolumeLayout::plan(partition_start, sector_count, bytes_per_sector, spb, boot_sectors)
    }

    /// Format `sector_count` sectors starting at `partition_start`
    pub fn format<D: Disk>(&self, mut disk: D, partition_start: u64, sector_count: u64) -> MfsResult<MfsVolume<D>> {
        let geometry = disk.geometry();
        let bps = geometry.bytes_per_sector as u64;
        if (bps as usize) < MASTER_RECORD_SIZE {
            return Err(MfsError::NotSupported(format!("{} byte sectors are too small for MFS", bps)));
        }
        let bytes_per_sector = u16::try_from(geometry.bytes_per_sector).map_err(|_| {
            MfsError::InvalidInput(format!(
                "{} byte sectors do not fit the boot record sector size field",
                bps
            ))
        })?;
        let fits = partition_start
            .checked_add(sector_count)
            .is_some_and(|end| end <= geometry.total_sectors);
        if !fits {
            return Err(MfsError::InvalidInput(format!(
                "partition of {} sectors at {} does not fit a disk of {} sectors",
                sector_count, partition_start, geometry.total_sectors
            )));
        }

        let bootloader = self.load_bootloader()?;
        let boot_sectors = bootloader.as_ref().map_or(1, |b| b.boot_sectors(bps));
        let spb = self.sectors_per_bucket(sector_count, bps)?;
        let layout = VolumeLayout::plan(partition_start, sector_count, bps, spb, boot_sectors)?;

        info!(
            "Formatting MFS partition '{}': {} sectors at {}, {} sectors per bucket, {} data buckets",
            self.options.partition_name,
            sector_count,
            partition_start,
            spb,
            layout.data_buckets()
        );

        let (bucket_map, [root, journal, bad], runs) = {
            let mut store = DiskMap::new(&mut disk, layout.map_sector, layout.map_size);
            let mut bucket_map = BucketMap::create(&mut store, layout.data_buckets())?;

            let mut allocations = [Allocation::empty(); 3];
            let mut runs = Vec::new();
            for (slot, count) in allocations
                .iter_mut()
                .zip([ROOT_DIRECTORY_BUCKETS, JOURNAL_BUCKETS, BAD_BUCKET_LIST_BUCKETS])
            {
                *slot = bucket_map.allocate(&mut store, count)?;
                runs.extend(chain::read_chain(&mut store, slot.start)?);
            }
            (bucket_map, allocations, runs)
        };
        debug!(
            "Root directory at {}, journal at {}, bad bucket list at {}",
            root.start, journal.start, bad.start
        );
        chain::wipe_chain(&mut disk, &layout, &runs)?;

        let master = MasterRecord {
            flags: self.options.partition_flags,
            partition_name: self.options.partition_name.clone(),
            free_bucket: bucket_map.next_free(),
            root_directory_bucket: root.start,
            bad_bucket_list_bucket: bad.start,
            journal_bucket: journal.start,
            map_sector: layout.relative(layout.map_sector),
            map_size: layout.map_size,
        };
        write_master(&mut disk, &layout, &master)?;

        let boot = BootRecord {
            version: MFS_VERSION,
            flags: if self.options.bootable { BOOT_FLAG_BOOTABLE } else { 0 },
            media_type: MFS_MEDIA_TYPE,
            bytes_per_sector,
            sectors_per_track: geometry.sectors_per_track.min(u16::MAX as u32) as u16,
            heads_per_cylinder: geometry.heads_per_cylinder.min(u16::MAX as u32) as u16,
            total_sectors: sector_count,
            reserved_sectors: layout.reserved_sectors as u16,
            sectors_per_bucket: spb,
            master_record_sector: layout.relative(layout.master_record_sector),
            master_record_mirror: layout.relative(layout.mirror_record_sector),
        };
        disk.write_sectors(partition_start, &boot.encode(bps as usize)?)?;

        let mut volume = MfsVolume::open(disk, partition_start)?;
        if let Some(bootloader) = bootloader {
            volume.install_bootloader(&bootloader)?;
        }
        volume.flush()?;

        info!("Format complete");
        Ok(volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfsutil_core::MemoryDisk;

    const SIZE_64MB: u64 = 64 * 1024 * 1024;

    #[test]
    fn test_format_fresh_volume() {
        let disk = MemoryDisk::new(SIZE_64MB, 512);
        let volume = MfsFormatter::new(FormatOptions::default()).format(disk, 0, 131072).unwrap();

        let master = volume.master_record();
        assert_eq!(master.root_directory_bucket, 0);
        assert_eq!(master.journal_bucket, 8);
        assert_eq!(master.bad_bucket_list_bucket, 16);
        assert_eq!(master.free_bucket, 17);
        assert_eq!(master.map_sector, 130815);
        assert_eq!(volume.boot_record().master_record_mirror, 130814);
        assert!(!volume.boot_record().is_bootable());
    }

    #[test]
    fn test_plan_matches_format() {
        let formatter = MfsFormatter::new(FormatOptions::default());
        let planned = formatter.plan(512, 0, 131072).unwrap();
        let volume = formatter.format(MemoryDisk::new(SIZE_64MB, 512), 0, 131072).unwrap();
        assert_eq!(&planned, volume.layout());
    }

    #[test]
    fn test_bucket_size_override() {
        let options = FormatOptions {
            sectors_per_bucket: Some(4),
            ..FormatOptions::default()
        };
        let volume = MfsFormatter::new(options).format(MemoryDisk::new(SIZE_64MB, 512), 0, 131072).unwrap();
        assert_eq!(volume.boot_record().sectors_per_bucket, 4);

        let options = FormatOptions {
            sectors_per_bucket: Some(5),
            ..FormatOptions::default()
        };
        assert!(MfsFormatter::new(options).format(MemoryDisk::new(SIZE_64MB, 512), 0, 131072).is_err());
    }

    #[test]
    fn test_oversized_sectors_rejected() {
        let disk = MemoryDisk::new(2 * 1024 * 1024, 65536);
        let result = MfsFormatter::new(FormatOptions::default()).format(disk, 0, 32);
        assert!(matches!(result, Err(MfsError::InvalidInput(_))));
    }

    #[test]
    fn test_partition_must_fit_disk() {
        let disk = MemoryDisk::new(SIZE_64MB, 512);
        let result = MfsFormatter::new(FormatOptions::default()).format(disk, 2048, 131072);
        assert!(matches!(result, Err(MfsError::InvalidInput(_))));
    }
}
