// MFS volume handle
// Owns the disk, the decoded records and the allocator state, and
// implements the create/update write paths on top of the path resolver.

use super::bucket_map::{Allocation, BucketMap, DiskMap};
use super::chain;
use super::constants::*;
use super::layout::VolumeLayout;
use super::path_resolver::split_path;
use super::record::{DirectoryRecord, LocatedRecord, RecordFlags, RecordLocation};
use super::structures::{data_checksum, BootRecord, MasterRecord};
use log::{debug, info, warn};
use mfsutil_core::{Disk, FileFlags, MfsError, MfsResult};
use serde::Serialize;

/// What a write did to the volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated { grown_buckets: u32 },
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeStatistics {
    pub partition_name: String,
    pub bootable: bool,
    pub bytes_per_sector: u64,
    pub sectors_per_bucket: u64,
    pub bucket_bytes: u64,
    pub total_sectors: u64,
    pub data_buckets: u32,
    pub free_buckets: u64,
    pub next_free_bucket: u32,
}

pub struct MfsVolume<D: Disk> {
    pub(crate) disk: D,
    pub(crate) layout: VolumeLayout,
    pub(crate) boot: BootRecord,
    pub(crate) master: MasterRecord,
    pub(crate) bucket_map: BucketMap,
}

impl<D: Disk> MfsVolume<D> {
    /// Open the MFS partition starting at `partition_start`
    pub fn open(mut disk: D, partition_start: u64) -> MfsResult<Self> {
        let bps = disk.bytes_per_sector();
        if (bps as usize) < MASTER_RECORD_SIZE {
            return Err(MfsError::NotSupported(format!(
                "{} byte sectors are too small for MFS",
                bps
            )));
        }

        let boot = BootRecord::decode(&disk.read_sectors(partition_start, 1)?)?;
        if boot.bytes_per_sector as u32 != bps {
            return Err(MfsError::CorruptVolume(format!(
                "volume uses {} byte sectors but the disk has {}",
                boot.bytes_per_sector, bps
            )));
        }
        if !VALID_BUCKET_SIZES.contains(&boot.sectors_per_bucket) {
            return Err(MfsError::CorruptVolume(format!(
                "invalid bucket size of {} sectors",
                boot.sectors_per_bucket
            )));
        }
        let disk_sectors = disk.geometry().total_sectors;
        let fits = partition_start
            .checked_add(boot.total_sectors)
            .is_some_and(|end| end <= disk_sectors);
        if !fits {
            return Err(MfsError::CorruptVolume(format!(
                "partition of {} sectors at {} exceeds the disk ({} sectors)",
                boot.total_sectors, partition_start, disk_sectors
            )));
        }
        if boot.version != MFS_VERSION {
            warn!("Unexpected MFS version {}", boot.version);
        }

        let master = read_master(&mut disk, partition_start, &boot)?;
        let layout = VolumeLayout::from_records(partition_start, &boot, &master)?;
        if master.root_directory_bucket == END_OF_CHAIN {
            return Err(MfsError::CorruptVolume("volume has no root directory".to_string()));
        }

        info!(
            "Opened MFS volume '{}' at sector {} ({} sectors, {} sectors per bucket)",
            master.partition_name, partition_start, boot.total_sectors, boot.sectors_per_bucket
        );

        Ok(Self {
            bucket_map: BucketMap::new(master.free_bucket),
            disk,
            layout,
            boot,
            master,
        })
    }

    pub fn boot_record(&self) -> &BootRecord {
        &self.boot
    }

    pub fn master_record(&self) -> &MasterRecord {
        &self.master
    }

    pub fn layout(&self) -> &VolumeLayout {
        &self.layout
    }

    pub fn next_free_bucket(&self) -> u32 {
        self.bucket_map.next_free()
    }

    pub fn flush(&mut self) -> MfsResult<()> {
        self.disk.flush()
    }

    pub fn into_disk(self) -> D {
        self.disk
    }

    pub(crate) fn map(&mut self) -> DiskMap<'_, D> {
        DiskMap::new(&mut self.disk, self.layout.map_sector, self.layout.map_size)
    }

    pub(crate) fn allocate(&mut self, count: u32) -> MfsResult<Allocation> {
        let mut store = DiskMap::new(&mut self.disk, self.layout.map_sector, self.layout.map_size);
        self.bucket_map.allocate(&mut store, count)
    }

    /// Write the master record, with the current free-list head, to both copies
    pub(crate) fn persist_master(&mut self) -> MfsResult<()> {
        self.master.free_bucket = self.bucket_map.next_free();
        write_master(&mut self.disk, &self.layout, &self.master)
    }

    pub(crate) fn read_runs(&mut self, start: u32) -> MfsResult<Vec<chain::Run>> {
        chain::read_chain(&mut self.map(), start)
    }

    fn slot_sectors(&self, location: &RecordLocation) -> (u64, u64, usize) {
        let bps = self.layout.bytes_per_sector;
        let first = self.layout.bucket_sector(location.run_bucket) + location.offset / bps;
        let within = (location.offset % bps) as usize;
        let count = (within + RECORD_SIZE).div_ceil(bps as usize) as u64;
        (first, count, within)
    }

    /// Rewrite the known fields of an existing record in place
    pub(crate) fn update_record(&mut self, location: &RecordLocation, record: &DirectoryRecord) -> MfsResult<()> {
        let (first, count, within) = self.slot_sectors(location);
        let mut buf = self.disk.read_sectors(first, count)?;
        record.encode_into(&mut buf[within..within + RECORD_SIZE])?;
        self.disk.write_sectors(first, &buf)
    }

    /// Write a record into a free slot, clearing whatever the slot held
    pub(crate) fn write_new_record(&mut self, location: &RecordLocation, record: &DirectoryRecord) -> MfsResult<()> {
        let (first, count, within) = self.slot_sectors(location);
        let mut buf = self.disk.read_sectors(first, count)?;
        let slot = &mut buf[within..within + RECORD_SIZE];
        slot.fill(0);
        record.encode_into(slot)?;
        self.disk.write_sectors(first, &buf)
    }

    /// Create or update the entry at `path`.
    ///
    /// A new entry gets buckets for the whole content. An existing entry keeps
    /// its chain, growing it when the content outgrows the allocated size.
    /// `None` content creates an entry without data and leaves existing entries alone.
    pub fn write_file(&mut self, path: &str, flags: FileFlags, data: Option<&[u8]>) -> MfsResult<WriteOutcome> {
        if flags.is_directory() && data.is_some() {
            return Err(MfsError::InvalidInput(format!(
                "directory {} cannot carry file content",
                path
            )));
        }

        match self.resolve(path)? {
            Some(existing) => self.update_entry(path, existing, flags, data),
            None => self.create_entry(path, flags, data),
        }
    }

    pub fn create_directory(&mut self, path: &str, flags: FileFlags) -> MfsResult<WriteOutcome> {
        self.write_file(path, flags.with(FileFlags::DIRECTORY), None)
    }

    fn update_entry(
        &mut self,
        path: &str,
        existing: LocatedRecord,
        flags: FileFlags,
        data: Option<&[u8]>,
    ) -> MfsResult<WriteOutcome> {
        let LocatedRecord { mut record, location } = existing;

        if flags.is_directory() && !record.is_directory() {
            return Err(MfsError::AlreadyExists(format!("{} exists as a file", path)));
        }
        let Some(data) = data else {
            debug!("{} already exists, nothing to write", path);
            return Ok(WriteOutcome::Unchanged);
        };
        if record.is_directory() {
            return Err(MfsError::InvalidInput(format!("{} is a directory", path)));
        }

        let length = data.len() as u64;
        let mut grown_buckets = 0;
        if length > record.allocated_size {
            let buckets = self.layout.buckets_for(length - record.allocated_size)?;
            let allocation = self.allocate(buckets)?;

            if record.has_data() {
                let tail = chain::chain_tail(&mut self.map(), record.start_bucket)?
                    .ok_or_else(|| MfsError::CorruptVolume(format!("{} has an empty chain", path)))?;
                BucketMap::set_link(&mut self.map(), tail, allocation.start)?;
            } else {
                record.start_bucket = allocation.start;
                record.start_length = allocation.first_run_length;
            }
            self.persist_master()?;

            record.allocated_size += buckets as u64 * self.layout.bucket_bytes();
            grown_buckets = buckets;
            debug!("Grew {} by {} buckets", path, buckets);
        }

        let runs = self.read_runs(record.start_bucket)?;
        chain::fill_chain(&mut self.disk, &self.layout, &runs, data)?;

        record.size = length;
        record.data_checksum = data_checksum(data);
        self.update_record(&location, &record)?;

        info!("Updated {} ({} bytes)", path, length);
        Ok(WriteOutcome::Updated { grown_buckets })
    }

    fn create_entry(&mut self, path: &str, flags: FileFlags, data: Option<&[u8]>) -> MfsResult<WriteOutcome> {
        let components = split_path(path);
        let Some((name, parents)) = components.split_last() else {
            return Err(MfsError::InvalidInput(format!("{:?} does not name an entry", path)));
        };

        let directory = self.resolve_parents(parents, flags)?;
        let slot = self.reserve_slot(directory, name)?;

        let mut record = DirectoryRecord::new(name, RecordFlags::for_new_entry(flags))?;
        if let Some(data) = data.filter(|d| !d.is_empty()) {
            let buckets = self.layout.buckets_for(data.len() as u64)?;
            let allocation = self.allocate(buckets)?;
            self.persist_master()?;

            record.start_bucket = allocation.start;
            record.start_length = allocation.first_run_length;
            record.allocated_size = buckets as u64 * self.layout.bucket_bytes();
            record.size = data.len() as u64;
            record.data_checksum = data_checksum(data);
        }

        self.write_new_record(&slot, &record)?;

        if let Some(data) = data.filter(|d| !d.is_empty()) {
            let runs = self.read_runs(record.start_bucket)?;
            chain::fill_chain(&mut self.disk, &self.layout, &runs, data)?;
        }

        info!(
            "Created {} {} ({} bytes)",
            if record.is_directory() { "directory" } else { "file" },
            path,
            record.size
        );
        Ok(WriteOutcome::Created)
    }

    /// Decoded record at `path`
    pub fn stat(&mut self, path: &str) -> MfsResult<DirectoryRecord> {
        self.resolve(path)?
            .map(|located| located.record)
            .ok_or_else(|| MfsError::NotFound(path.to_string()))
    }

    /// Entries of the directory at `path`, in on-disk order
    pub fn list_directory(&mut self, path: &str) -> MfsResult<Vec<DirectoryRecord>> {
        let directory = if split_path(path).is_empty() {
            self.master.root_directory_bucket
        } else {
            let record = self.stat(path)?;
            if !record.is_directory() {
                return Err(MfsError::NotADirectory(path.to_string()));
            }
            record.start_bucket
        };

        if directory == END_OF_CHAIN {
            return Ok(Vec::new());
        }
        let scan = self.scan_directory(directory)?;
        Ok(scan.entries.into_iter().map(|located| located.record).collect())
    }

    pub fn read_file(&mut self, path: &str) -> MfsResult<Vec<u8>> {
        let record = self.stat(path)?;
        if record.is_directory() {
            return Err(MfsError::InvalidInput(format!("{} is a directory", path)));
        }
        let runs = self.read_runs(record.start_bucket)?;
        let data = chain::read_chain_data(&mut self.disk, &self.layout, &runs, record.size)?;
        if data_checksum(&data) != record.data_checksum {
            warn!("Checksum mismatch reading {}", path);
        }
        Ok(data)
    }

    pub fn statistics(&mut self) -> MfsResult<VolumeStatistics> {
        let mut store = DiskMap::new(&mut self.disk, self.layout.map_sector, self.layout.map_size);
        let free_buckets = self.bucket_map.free_buckets(&mut store)?;
        Ok(VolumeStatistics {
            partition_name: self.master.partition_name.clone(),
            bootable: self.boot.is_bootable(),
            bytes_per_sector: self.layout.bytes_per_sector,
            sectors_per_bucket: self.layout.sectors_per_bucket,
            bucket_bytes: self.layout.bucket_bytes(),
            total_sectors: self.layout.total_sectors,
            data_buckets: self.layout.data_buckets(),
            free_buckets,
            next_free_bucket: self.bucket_map.next_free(),
        })
    }
}

/// Write `master` to its primary and mirror sectors
pub(crate) fn write_master<D: Disk + ?Sized>(
    disk: &mut D,
    layout: &VolumeLayout,
    master: &MasterRecord,
) -> MfsResult<()> {
    let mut sector = vec![0u8; layout.bytes_per_sector as usize];
    sector[..MASTER_RECORD_SIZE].copy_from_slice(&master.encode());
    disk.write_sectors(layout.master_record_sector, &sector)?;
    disk.write_sectors(layout.mirror_record_sector, &sector)?;
    debug!("Master record written (free bucket {:#x})", master.free_bucket);
    Ok(())
}

fn read_master_at<D: Disk + ?Sized>(disk: &mut D, sector: u64) -> MfsResult<MasterRecord> {
    MasterRecord::decode(&disk.read_sectors(sector, 1)?)
}

/// Absolute sector of `offset` within a partition already checked to fit the disk
fn partition_sector(partition_start: u64, boot: &BootRecord, offset: u64) -> MfsResult<u64> {
    if offset >= boot.total_sectors {
        return Err(MfsError::CorruptVolume(format!(
            "sector {} lies outside the {} sector partition",
            offset, boot.total_sectors
        )));
    }
    Ok(partition_start + offset)
}

/// Primary master record, falling back to the mirror
fn read_master<D: Disk + ?Sized>(disk: &mut D, partition_start: u64, boot: &BootRecord) -> MfsResult<MasterRecord> {
    let primary =
        partition_sector(partition_start, boot, boot.master_record_sector).and_then(|sector| read_master_at(disk, sector));
    let primary_err = match primary {
        Ok(master) => return Ok(master),
        Err(e) => e,
    };
    warn!("Primary master record unusable ({}), trying the mirror", primary_err);

    let mirror =
        partition_sector(partition_start, boot, boot.master_record_mirror).and_then(|sector| read_master_at(disk, sector));
    mirror.map_err(|mirror_err| {
        MfsError::CorruptVolume(format!(
            "primary master record: {}; mirror: {}",
            primary_err, mirror_err
        ))
    })
}
