// MFS bucket map
// One 8-byte entry per bucket: (link, run length). Only run heads carry
// meaningful entries; the free list is a chain of runs starting at next_free.

use super::constants::*;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, trace};
use mfsutil_core::{Disk, MfsError, MfsResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapEntry {
    /// Head of the next run, or END_OF_CHAIN
    pub link: u32,
    /// Buckets in the run starting here
    pub length: u32,
}

impl MapEntry {
    pub fn new(link: u32, length: u32) -> Self {
        Self { link, length }
    }

    pub fn decode(bytes: &[u8]) -> Self {
        Self {
            link: LittleEndian::read_u32(&bytes[0..4]),
            length: LittleEndian::read_u32(&bytes[4..8]),
        }
    }

    pub fn encode_into(&self, bytes: &mut [u8]) {
        LittleEndian::write_u32(&mut bytes[0..4], self.link);
        LittleEndian::write_u32(&mut bytes[4..8], self.length);
    }
}

/// Backing storage for map entries
pub trait MapStore {
    fn read_entry(&mut self, bucket: u32) -> MfsResult<MapEntry>;

    fn write_entry(&mut self, bucket: u32, entry: MapEntry) -> MfsResult<()>;

    /// Number of addressable entries
    fn entry_count(&self) -> u64;
}

/// In-memory map, used for planning and tests
impl MapStore for Vec<MapEntry> {
    fn read_entry(&mut self, bucket: u32) -> MfsResult<MapEntry> {
        self.get(bucket as usize)
            .copied()
            .ok_or_else(|| bucket_out_of_range(bucket, self.len() as u64))
    }

    fn write_entry(&mut self, bucket: u32, entry: MapEntry) -> MfsResult<()> {
        let count = self.len() as u64;
        let slot = self
            .get_mut(bucket as usize)
            .ok_or_else(|| bucket_out_of_range(bucket, count))?;
        *slot = entry;
        Ok(())
    }

    fn entry_count(&self) -> u64 {
        self.len() as u64
    }
}

fn bucket_out_of_range(bucket: u32, count: u64) -> MfsError {
    MfsError::CorruptVolume(format!(
        "bucket {} is outside the bucket map ({} entries)",
        bucket, count
    ))
}

/// Map entries stored on disk, read and written one sector at a time
pub struct DiskMap<'a, D: Disk + ?Sized> {
    disk: &'a mut D,
    map_sector: u64,
    entries: u64,
    entries_per_sector: u64,
}

impl<'a, D: Disk + ?Sized> DiskMap<'a, D> {
    /// `map_sector` is absolute; `map_size` in bytes
    pub fn new(disk: &'a mut D, map_sector: u64, map_size: u64) -> Self {
        let entries_per_sector = disk.bytes_per_sector() as u64 / MAP_ENTRY_SIZE;
        Self {
            disk,
            map_sector,
            entries: map_size / MAP_ENTRY_SIZE,
            entries_per_sector,
        }
    }

    fn locate(&self, bucket: u32) -> MfsResult<(u64, usize)> {
        if bucket as u64 >= self.entries {
            return Err(bucket_out_of_range(bucket, self.entries));
        }
        let sector = self.map_sector + bucket as u64 / self.entries_per_sector;
        let offset = (bucket as u64 % self.entries_per_sector * MAP_ENTRY_SIZE) as usize;
        Ok((sector, offset))
    }
}

impl<D: Disk + ?Sized> MapStore for DiskMap<'_, D> {
    fn read_entry(&mut self, bucket: u32) -> MfsResult<MapEntry> {
        let (sector, offset) = self.locate(bucket)?;
        let data = self.disk.read_sectors(sector, 1)?;
        Ok(MapEntry::decode(&data[offset..offset + MAP_ENTRY_SIZE as usize]))
    }

    fn write_entry(&mut self, bucket: u32, entry: MapEntry) -> MfsResult<()> {
        let (sector, offset) = self.locate(bucket)?;
        let mut data = self.disk.read_sectors(sector, 1)?;
        entry.encode_into(&mut data[offset..offset + MAP_ENTRY_SIZE as usize]);
        self.disk.write_sectors(sector, &data)
    }

    fn entry_count(&self) -> u64 {
        self.entries
    }
}

/// Result of an allocation: the chain head and the length of its first run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub start: u32,
    pub first_run_length: u32,
}

impl Allocation {
    pub fn empty() -> Self {
        Self {
            start: END_OF_CHAIN,
            first_run_length: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start == END_OF_CHAIN
    }
}

/// Free-list allocator over a map store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketMap {
    next_free: u32,
}

impl BucketMap {
    pub fn new(next_free: u32) -> Self {
        Self { next_free }
    }

    /// Initialize an empty map: one free run covering every data bucket
    pub fn create<S: MapStore + ?Sized>(store: &mut S, free_buckets: u32) -> MfsResult<Self> {
        if free_buckets as u64 > store.entry_count() {
            return Err(MfsError::InvalidInput(format!(
                "{} free buckets do not fit a map of {} entries",
                free_buckets,
                store.entry_count()
            )));
        }
        store.write_entry(0, MapEntry::new(END_OF_CHAIN, free_buckets))?;
        debug!("Bucket map initialized with {} free buckets", free_buckets);
        Ok(Self::new(0))
    }

    pub fn next_free(&self) -> u32 {
        self.next_free
    }

    /// Take `count` buckets from the head of the free list.
    /// The returned chain is terminated; the map is unchanged on failure.
    pub fn allocate<S: MapStore + ?Sized>(&mut self, store: &mut S, count: u32) -> MfsResult<Allocation> {
        if count == 0 {
            return Ok(Allocation::empty());
        }

        let start = self.next_free;
        let mut remaining = count;
        let mut current = self.next_free;
        let mut previous = END_OF_CHAIN;
        let mut first_run_length = 0;
        let mut runs_seen: u64 = 0;

        while remaining > 0 {
            if current == END_OF_CHAIN {
                return Err(MfsError::OutOfSpace {
                    requested: count,
                    allocated: count - remaining,
                });
            }
            runs_seen += 1;
            if runs_seen > store.entry_count() {
                return Err(MfsError::CorruptVolume("free bucket list is circular".to_string()));
            }

            let entry = store.read_entry(current)?;
            if entry.length == 0 {
                return Err(MfsError::CorruptVolume(format!(
                    "free run at bucket {} has zero length",
                    current
                )));
            }
            trace!("Free run at {}: length {}, link {:#x}", current, entry.length, entry.link);

            if entry.length > remaining {
                // Split: keep the head, return the tail to the free list
                let tail = current
                    .checked_add(remaining)
                    .ok_or_else(|| bucket_out_of_range(current, store.entry_count()))?;
                store.write_entry(tail, MapEntry::new(entry.link, entry.length - remaining))?;
                store.write_entry(current, MapEntry::new(END_OF_CHAIN, remaining))?;
                if first_run_length == 0 {
                    first_run_length = remaining;
                }
                self.next_free = tail;
                debug!(
                    "Allocated {} buckets starting at {} (split run, free list now at {})",
                    count, start, tail
                );
                return Ok(Allocation { start, first_run_length });
            }

            if first_run_length == 0 {
                first_run_length = entry.length;
            }
            remaining -= entry.length;
            previous = current;
            current = entry.link;
        }

        // Consumed whole runs; terminate the last one
        Self::set_link(store, previous, END_OF_CHAIN)?;
        self.next_free = current;
        debug!(
            "Allocated {} buckets starting at {} (free list now at {:#x})",
            count, start, current
        );
        Ok(Allocation { start, first_run_length })
    }

    /// Link and run length of the run starting at `bucket`
    pub fn run_length<S: MapStore + ?Sized>(store: &mut S, bucket: u32) -> MfsResult<MapEntry> {
        store.read_entry(bucket)
    }

    /// Rewrite the link of `bucket`, keeping its run length
    pub fn set_link<S: MapStore + ?Sized>(store: &mut S, bucket: u32, link: u32) -> MfsResult<()> {
        let entry = store.read_entry(bucket)?;
        store.write_entry(bucket, MapEntry::new(link, entry.length))
    }

    /// Total buckets on the free list
    pub fn free_buckets<S: MapStore + ?Sized>(&self, store: &mut S) -> MfsResult<u64> {
        let mut total = 0u64;
        let mut current = self.next_free;
        let mut runs_seen = 0u64;
        while current != END_OF_CHAIN {
            runs_seen += 1;
            if runs_seen > store.entry_count() {
                return Err(MfsError::CorruptVolume("free bucket list is circular".to_string()));
            }
            let entry = store.read_entry(current)?;
            total += entry.length as u64;
            current = entry.link;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_map(entries: usize, free: u32) -> (Vec<MapEntry>, BucketMap) {
        let mut store = vec![MapEntry::new(0, 0); entries];
        let map = BucketMap::create(&mut store, free).unwrap();
        (store, map)
    }

    #[test]
    fn test_create_single_free_run() {
        let (mut store, map) = fresh_map(64, 60);
        assert_eq!(map.next_free(), 0);
        assert_eq!(store[0], MapEntry::new(END_OF_CHAIN, 60));
        assert_eq!(map.free_buckets(&mut store).unwrap(), 60);
    }

    #[test]
    fn test_allocate_splits_run() {
        let (mut store, mut map) = fresh_map(64, 60);

        let root = map.allocate(&mut store, 8).unwrap();
        assert_eq!(root, Allocation { start: 0, first_run_length: 8 });
        assert_eq!(store[0], MapEntry::new(END_OF_CHAIN, 8));
        assert_eq!(store[8], MapEntry::new(END_OF_CHAIN, 52));
        assert_eq!(map.next_free(), 8);

        let journal = map.allocate(&mut store, 8).unwrap();
        let bad = map.allocate(&mut store, 1).unwrap();
        assert_eq!(journal.start, 8);
        assert_eq!(bad.start, 16);
        assert_eq!(map.next_free(), 17);
        assert_eq!(map.free_buckets(&mut store).unwrap(), 43);
    }

    #[test]
    fn test_allocate_zero_is_empty() {
        let (mut store, mut map) = fresh_map(16, 10);
        let allocation = map.allocate(&mut store, 0).unwrap();
        assert!(allocation.is_empty());
        assert_eq!(map.next_free(), 0);
    }

    #[test]
    fn test_allocate_consumes_whole_runs() {
        // Free list: 2 (len 3) -> 10 (len 4) -> 20 (len 5)
        let mut store = vec![MapEntry::new(0, 0); 32];
        store[2] = MapEntry::new(10, 3);
        store[10] = MapEntry::new(20, 4);
        store[20] = MapEntry::new(END_OF_CHAIN, 5);
        let mut map = BucketMap::new(2);

        let allocation = map.allocate(&mut store, 7).unwrap();
        assert_eq!(allocation, Allocation { start: 2, first_run_length: 3 });
        assert_eq!(store[2], MapEntry::new(10, 3));
        assert_eq!(store[10], MapEntry::new(END_OF_CHAIN, 4));
        assert_eq!(map.next_free(), 20);
    }

    #[test]
    fn test_allocate_spans_runs_and_splits_last() {
        let mut store = vec![MapEntry::new(0, 0); 32];
        store[2] = MapEntry::new(10, 3);
        store[10] = MapEntry::new(END_OF_CHAIN, 8);
        let mut map = BucketMap::new(2);

        let allocation = map.allocate(&mut store, 5).unwrap();
        assert_eq!(allocation, Allocation { start: 2, first_run_length: 3 });
        assert_eq!(store[2], MapEntry::new(10, 3));
        assert_eq!(store[10], MapEntry::new(END_OF_CHAIN, 2));
        assert_eq!(store[12], MapEntry::new(END_OF_CHAIN, 6));
        assert_eq!(map.next_free(), 12);
    }

    #[test]
    fn test_out_of_space_leaves_map_untouched() {
        let mut store = vec![MapEntry::new(0, 0); 32];
        store[2] = MapEntry::new(10, 3);
        store[10] = MapEntry::new(END_OF_CHAIN, 4);
        let mut map = BucketMap::new(2);
        let before = store.clone();

        let err = map.allocate(&mut store, 9).unwrap_err();
        assert!(matches!(err, MfsError::OutOfSpace { requested: 9, allocated: 7 }));
        assert_eq!(store, before);
        assert_eq!(map.next_free(), 2);
    }

    #[test]
    fn test_exhausting_free_list() {
        let (mut store, mut map) = fresh_map(16, 10);
        map.allocate(&mut store, 10).unwrap();
        assert_eq!(map.next_free(), END_OF_CHAIN);
        assert!(matches!(
            map.allocate(&mut store, 1),
            Err(MfsError::OutOfSpace { requested: 1, allocated: 0 })
        ));
    }

    #[test]
    fn test_set_link_keeps_length() {
        let (mut store, mut map) = fresh_map(32, 30);
        let a = map.allocate(&mut store, 4).unwrap();
        let b = map.allocate(&mut store, 4).unwrap();
        BucketMap::set_link(&mut store, a.start, b.start).unwrap();
        assert_eq!(BucketMap::run_length(&mut store, a.start).unwrap(), MapEntry::new(b.start, 4));
    }

    #[test]
    fn test_circular_free_list_detected() {
        let mut store = vec![MapEntry::new(0, 0); 8];
        store[0] = MapEntry::new(4, 1);
        store[4] = MapEntry::new(0, 1);
        let map = BucketMap::new(0);
        assert!(matches!(map.free_buckets(&mut store), Err(MfsError::CorruptVolume(_))));
    }
}
