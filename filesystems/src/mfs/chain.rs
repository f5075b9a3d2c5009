// MFS bucket chains
// Walking a chain through the map, and moving data in and out of its runs.

use super::bucket_map::{BucketMap, MapStore};
use super::constants::END_OF_CHAIN;
use super::layout::VolumeLayout;
use log::{trace, warn};
use mfsutil_core::{Disk, MfsError, MfsResult};
use std::collections::HashSet;

/// Largest single write issued while zero-filling
const ZERO_CHUNK_BYTES: u64 = 1024 * 1024;

/// One contiguous run of buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub bucket: u32,
    pub length: u32,
}

/// Read the runs of the chain starting at `start`
pub fn read_chain<S: MapStore + ?Sized>(store: &mut S, start: u32) -> MfsResult<Vec<Run>> {
    let mut runs = Vec::new();
    let mut visited = HashSet::new();
    let mut current = start;

    while current != END_OF_CHAIN {
        if !visited.insert(current) {
            return Err(MfsError::CorruptVolume(format!(
                "circular bucket chain detected at bucket {}",
                current
            )));
        }
        let entry = BucketMap::run_length(store, current)?;
        if entry.length == 0 {
            return Err(MfsError::CorruptVolume(format!(
                "run at bucket {} has zero length",
                current
            )));
        }
        runs.push(Run { bucket: current, length: entry.length });
        current = entry.link;
    }

    Ok(runs)
}

/// Head of the last run in the chain, `None` for an empty chain
pub fn chain_tail<S: MapStore + ?Sized>(store: &mut S, start: u32) -> MfsResult<Option<u32>> {
    Ok(read_chain(store, start)?.last().map(|run| run.bucket))
}

pub fn chain_buckets(runs: &[Run]) -> u64 {
    runs.iter().map(|run| run.length as u64).sum()
}

fn run_bytes(layout: &VolumeLayout, run: &Run) -> u64 {
    run.length as u64 * layout.bucket_bytes()
}

/// Zero `sectors` sectors starting at the absolute `sector`
pub fn write_zeroes<D: Disk + ?Sized>(
    disk: &mut D,
    layout: &VolumeLayout,
    sector: u64,
    sectors: u64,
) -> MfsResult<()> {
    let chunk_sectors = (ZERO_CHUNK_BYTES / layout.bytes_per_sector).max(1);
    let zeroes = vec![0u8; (chunk_sectors.min(sectors.max(1)) * layout.bytes_per_sector) as usize];

    let mut done = 0;
    while done < sectors {
        let count = chunk_sectors.min(sectors - done);
        let len = (count * layout.bytes_per_sector) as usize;
        disk.write_sectors(sector + done, &zeroes[..len])?;
        done += count;
    }
    Ok(())
}

/// Zero every run of a chain
pub fn wipe_chain<D: Disk + ?Sized>(disk: &mut D, layout: &VolumeLayout, runs: &[Run]) -> MfsResult<()> {
    for run in runs {
        trace!("Zeroing run at bucket {} ({} buckets)", run.bucket, run.length);
        write_zeroes(
            disk,
            layout,
            layout.bucket_sector(run.bucket),
            run.length as u64 * layout.sectors_per_bucket,
        )?;
    }
    Ok(())
}

/// Write `data` across the runs in order, zero-padding the rest of the final run.
/// Returns the number of bytes written.
pub fn fill_chain<D: Disk + ?Sized>(
    disk: &mut D,
    layout: &VolumeLayout,
    runs: &[Run],
    data: &[u8],
) -> MfsResult<u64> {
    let bps = layout.bytes_per_sector as usize;
    let mut offset = 0usize;

    for run in runs {
        if offset >= data.len() {
            break;
        }

        let capacity = run_bytes(layout, run);
        let take = (data.len() - offset).min(capacity as usize);
        let sector = layout.bucket_sector(run.bucket);

        let full_sectors = take / bps;
        if full_sectors > 0 {
            disk.write_sectors(sector, &data[offset..offset + full_sectors * bps])?;
        }

        let mut written_sectors = full_sectors as u64;
        let tail = take % bps;
        if tail > 0 {
            let mut last = vec![0u8; bps];
            last[..tail].copy_from_slice(&data[offset + full_sectors * bps..offset + take]);
            disk.write_sectors(sector + written_sectors, &last)?;
            written_sectors += 1;
        }

        let run_sectors = run.length as u64 * layout.sectors_per_bucket;
        if written_sectors < run_sectors {
            write_zeroes(disk, layout, sector + written_sectors, run_sectors - written_sectors)?;
        }

        trace!("Wrote {} bytes into run at bucket {}", take, run.bucket);
        offset += take;
    }

    if offset < data.len() {
        warn!(
            "Chain ended with {} of {} bytes unwritten",
            data.len() - offset,
            data.len()
        );
    }
    Ok(offset as u64)
}

/// Read `size` bytes from the front of a chain
pub fn read_chain_data<D: Disk + ?Sized>(
    disk: &mut D,
    layout: &VolumeLayout,
    runs: &[Run],
    size: u64,
) -> MfsResult<Vec<u8>> {
    let available = chain_buckets(runs) * layout.bucket_bytes();
    if size > available {
        return Err(MfsError::CorruptVolume(format!(
            "entry size {} exceeds its {} allocated bytes",
            size, available
        )));
    }

    let mut data = Vec::with_capacity(size as usize);
    for run in runs {
        let remaining = size - data.len() as u64;
        if remaining == 0 {
            break;
        }
        let sectors = remaining
            .min(run_bytes(layout, run))
            .div_ceil(layout.bytes_per_sector);
        let bytes = disk.read_sectors(layout.bucket_sector(run.bucket), sectors)?;
        let take = remaining.min(bytes.len() as u64) as usize;
        data.extend_from_slice(&bytes[..take]);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mfs::bucket_map::MapEntry;
    use mfsutil_core::MemoryDisk;

    fn small_layout() -> VolumeLayout {
        VolumeLayout::plan(0, 8192, 512, 4, 1).unwrap()
    }

    #[test]
    fn test_read_chain_follows_links() {
        let mut store = vec![MapEntry::new(0, 0); 16];
        store[1] = MapEntry::new(6, 2);
        store[6] = MapEntry::new(END_OF_CHAIN, 3);
        let runs = read_chain(&mut store, 1).unwrap();
        assert_eq!(runs, vec![Run { bucket: 1, length: 2 }, Run { bucket: 6, length: 3 }]);
        assert_eq!(chain_buckets(&runs), 5);
        assert_eq!(chain_tail(&mut store, 1).unwrap(), Some(6));
        assert_eq!(chain_tail(&mut store, END_OF_CHAIN).unwrap(), None);
    }

    #[test]
    fn test_read_chain_detects_cycle() {
        let mut store = vec![MapEntry::new(0, 0); 16];
        store[1] = MapEntry::new(6, 2);
        store[6] = MapEntry::new(1, 3);
        assert!(matches!(read_chain(&mut store, 1), Err(MfsError::CorruptVolume(_))));
    }

    #[test]
    fn test_fill_pads_final_run() {
        let layout = small_layout();
        let mut disk = MemoryDisk::new(8192 * 512, 512);
        let runs = [Run { bucket: 3, length: 1 }, Run { bucket: 9, length: 2 }];

        // Dirty the target area so padding is observable
        let start = layout.bucket_sector(9);
        disk.write_sectors(start, &vec![0xEE; 8 * 512]).unwrap();

        let data: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        let written = fill_chain(&mut disk, &layout, &runs, &data).unwrap();
        assert_eq!(written, 3000);

        let back = read_chain_data(&mut disk, &layout, &runs, 3000).unwrap();
        assert_eq!(back, data);

        let padding = disk.read_sectors(start, 8).unwrap();
        let used = 3000 - 2048;
        assert!(padding[used..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fill_stops_at_chain_end() {
        let layout = small_layout();
        let mut disk = MemoryDisk::new(8192 * 512, 512);
        let runs = [Run { bucket: 0, length: 1 }];
        let data = vec![0x5A; 5000];
        assert_eq!(fill_chain(&mut disk, &layout, &runs, &data).unwrap(), 2048);
    }

    #[test]
    fn test_wipe_chain() {
        let layout = small_layout();
        let mut disk = MemoryDisk::new(8192 * 512, 512);
        let sector = layout.bucket_sector(2);
        disk.write_sectors(sector, &vec![0xFF; 4 * 512]).unwrap();
        wipe_chain(&mut disk, &layout, &[Run { bucket: 2, length: 1 }]).unwrap();
        assert!(disk.read_sectors(sector, 4).unwrap().iter().all(|&b| b == 0));
    }
}
