// MFS path resolution
// Lookup walks directories without touching the disk; the create-mode helpers
// allocate intermediate directories and free slots as they go.

use super::bucket_map::BucketMap;
use super::chain;
use super::constants::*;
use super::record::{DirectoryRecord, LocatedRecord, RecordFlags, RecordLocation};
use super::volume::MfsVolume;
use log::{debug, info, trace};
use mfsutil_core::{Disk, FileFlags, MfsError, MfsResult};

/// Split a slash-separated path into components, ignoring empty ones
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|component| !component.is_empty()).collect()
}

/// Every record of one directory chain
#[derive(Debug, Default)]
pub(crate) struct DirectoryScan {
    pub entries: Vec<LocatedRecord>,
    pub first_free: Option<RecordLocation>,
    pub tail: Option<u32>,
}

impl DirectoryScan {
    /// First entry whose name matches, ignoring ASCII case
    pub fn find(&self, name: &str) -> Option<&LocatedRecord> {
        self.entries
            .iter()
            .find(|located| located.record.name.eq_ignore_ascii_case(name))
    }
}

impl<D: Disk> MfsVolume<D> {
    pub(crate) fn scan_directory(&mut self, start: u32) -> MfsResult<DirectoryScan> {
        let runs = self.read_runs(start)?;
        let mut scan = DirectoryScan {
            tail: runs.last().map(|run| run.bucket),
            ..DirectoryScan::default()
        };

        for run in &runs {
            let sectors = run.length as u64 * self.layout.sectors_per_bucket;
            let data = self.disk.read_sectors(self.layout.bucket_sector(run.bucket), sectors)?;

            for (index, slot) in data.chunks_exact(RECORD_SIZE).enumerate() {
                let location = RecordLocation {
                    run_bucket: run.bucket,
                    run_length: run.length,
                    offset: (index * RECORD_SIZE) as u64,
                };
                match DirectoryRecord::decode(slot)? {
                    Some(record) => scan.entries.push(LocatedRecord { record, location }),
                    None => {
                        scan.first_free.get_or_insert(location);
                    }
                }
            }
        }

        trace!("Directory at bucket {}: {} entries", start, scan.entries.len());
        Ok(scan)
    }

    /// Find the record at `path`. `Ok(None)` when any component is missing
    pub fn resolve(&mut self, path: &str) -> MfsResult<Option<LocatedRecord>> {
        let components = split_path(path);
        let Some((last, parents)) = components.split_last() else {
            return Err(MfsError::InvalidInput("the root directory has no record".to_string()));
        };

        let mut directory = self.master.root_directory_bucket;
        for (depth, component) in parents.iter().enumerate() {
            let scan = self.scan_directory(directory)?;
            let Some(found) = scan.find(component) else {
                return Ok(None);
            };
            if !found.record.is_directory() {
                return Err(MfsError::NotADirectory(components[..=depth].join("/")));
            }
            if !found.record.has_data() {
                return Ok(None);
            }
            directory = found.record.start_bucket;
        }

        let scan = self.scan_directory(directory)?;
        Ok(scan.find(last).cloned())
    }

    /// Walk `parents` from the root, creating and allocating directories as
    /// needed. Returns the first bucket of the innermost directory.
    pub(crate) fn resolve_parents(&mut self, parents: &[&str], flags: FileFlags) -> MfsResult<u32> {
        let directory_flags = RecordFlags::for_new_entry(flags.with(FileFlags::DIRECTORY));

        let mut directory = self.master.root_directory_bucket;
        for (depth, component) in parents.iter().enumerate() {
            let scan = self.scan_directory(directory)?;
            let located = match scan.find(component) {
                Some(found) if found.record.is_directory() => found.clone(),
                Some(_) => return Err(MfsError::NotADirectory(parents[..=depth].join("/"))),
                None => {
                    let record = DirectoryRecord::new(component, directory_flags)?;
                    let location = self.slot_from_scan(directory, &scan)?;
                    self.write_new_record(&location, &record)?;
                    info!("Created directory {}", parents[..=depth].join("/"));
                    LocatedRecord { record, location }
                }
            };
            directory = self.ensure_directory_allocated(located)?;
        }
        Ok(directory)
    }

    /// A free slot for `name` in the directory at `directory`
    pub(crate) fn reserve_slot(&mut self, directory: u32, name: &str) -> MfsResult<RecordLocation> {
        let scan = self.scan_directory(directory)?;
        if let Some(existing) = scan.find(name) {
            return Err(MfsError::AlreadyExists(existing.record.name.clone()));
        }
        self.slot_from_scan(directory, &scan)
    }

    fn slot_from_scan(&mut self, directory: u32, scan: &DirectoryScan) -> MfsResult<RecordLocation> {
        if let Some(location) = scan.first_free {
            return Ok(location);
        }
        let tail = scan.tail.ok_or_else(|| {
            MfsError::CorruptVolume(format!("directory at bucket {} has no chain", directory))
        })?;
        self.expand_directory(directory, tail)
    }

    /// Append a zeroed run to a full directory and return its first slot
    fn expand_directory(&mut self, directory: u32, tail: u32) -> MfsResult<RecordLocation> {
        let allocation = self.allocate(DIRECTORY_EXPANSION_BUCKETS)?;
        let runs = self.read_runs(allocation.start)?;
        chain::wipe_chain(&mut self.disk, &self.layout, &runs)?;

        BucketMap::set_link(&mut self.map(), tail, allocation.start)?;
        self.persist_master()?;

        debug!(
            "Expanded directory at bucket {} with {} buckets at {}",
            directory, DIRECTORY_EXPANSION_BUCKETS, allocation.start
        );
        Ok(RecordLocation {
            run_bucket: allocation.start,
            run_length: allocation.first_run_length,
            offset: 0,
        })
    }

    /// Give a directory without a chain its first buckets
    fn ensure_directory_allocated(&mut self, located: LocatedRecord) -> MfsResult<u32> {
        if located.record.has_data() {
            return Ok(located.record.start_bucket);
        }

        let allocation = self.allocate(DIRECTORY_EXPANSION_BUCKETS)?;
        let runs = self.read_runs(allocation.start)?;
        chain::wipe_chain(&mut self.disk, &self.layout, &runs)?;
        self.persist_master()?;

        let mut record = located.record;
        record.start_bucket = allocation.start;
        record.start_length = allocation.first_run_length;
        self.update_record(&located.location, &record)?;

        debug!("Allocated directory {} at bucket {}", record.name, allocation.start);
        Ok(allocation.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/system/boot.cfg"), vec!["system", "boot.cfg"]);
        assert_eq!(split_path("system//boot.cfg/"), vec!["system", "boot.cfg"]);
        assert!(split_path("/").is_empty());
        assert!(split_path("").is_empty());
    }

    #[test]
    fn test_find_ignores_ascii_case() {
        let record = DirectoryRecord::new("Kernel.MOS", RecordFlags(RecordFlags::IN_USE)).unwrap();
        let scan = DirectoryScan {
            entries: vec![LocatedRecord {
                record,
                location: RecordLocation { run_bucket: 0, run_length: 8, offset: 0 },
            }],
            ..DirectoryScan::default()
        };
        assert!(scan.find("kernel.mos").is_some());
        assert!(scan.find("kernel.mo").is_none());
    }
}
