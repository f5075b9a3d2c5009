// Sector-addressed disk access.
// The MFS engine only ever talks to storage through the Disk trait; image
// files and in-memory buffers are the two backends shipped here.

use crate::error::{MfsError, MfsResult};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const GIGABYTE: u64 = 1024 * 1024 * 1024;

/// Physical layout of a disk, fixed for the lifetime of an open handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskGeometry {
    pub bytes_per_sector: u32,
    pub sectors_per_track: u32,
    pub heads_per_cylinder: u32,
    pub total_sectors: u64,
}

impl DiskGeometry {
    /// Derive a CHS-style geometry for an image of `size_bytes`
    pub fn for_size(size_bytes: u64, bytes_per_sector: u32) -> Self {
        let (heads_per_cylinder, sectors_per_track) = if size_bytes < GIGABYTE {
            (64, 32)
        } else if size_bytes < 2 * GIGABYTE {
            (128, 32)
        } else {
            (255, 63)
        };

        Self {
            bytes_per_sector,
            sectors_per_track,
            heads_per_cylinder,
            total_sectors: size_bytes / bytes_per_sector as u64,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.total_sectors * self.bytes_per_sector as u64
    }

    fn check_range(&self, sector: u64, count: u64) -> MfsResult<()> {
        match sector.checked_add(count) {
            Some(end) if end <= self.total_sectors => Ok(()),
            _ => Err(MfsError::OutOfBounds {
                sector,
                count,
                total: self.total_sectors,
            }),
        }
    }

    fn sectors_in(&self, data: &[u8]) -> MfsResult<u64> {
        let bps = self.bytes_per_sector as usize;
        if data.len() % bps != 0 {
            return Err(MfsError::InvalidInput(format!(
                "write of {} bytes is not a multiple of the {} byte sector size",
                data.len(),
                bps
            )));
        }
        Ok((data.len() / bps) as u64)
    }
}

/// Block storage seen as a flat array of sectors
pub trait Disk {
    fn geometry(&self) -> DiskGeometry;

    /// Read `count` whole sectors starting at `sector`
    fn read_sectors(&mut self, sector: u64, count: u64) -> MfsResult<Vec<u8>>;

    /// Write `data` (a whole number of sectors) starting at `sector`
    fn write_sectors(&mut self, sector: u64, data: &[u8]) -> MfsResult<()>;

    fn flush(&mut self) -> MfsResult<()> {
        Ok(())
    }

    fn bytes_per_sector(&self) -> u32 {
        self.geometry().bytes_per_sector
    }
}

impl<D: Disk + ?Sized> Disk for &mut D {
    fn geometry(&self) -> DiskGeometry {
        (**self).geometry()
    }

    fn read_sectors(&mut self, sector: u64, count: u64) -> MfsResult<Vec<u8>> {
        (**self).read_sectors(sector, count)
    }

    fn write_sectors(&mut self, sector: u64, data: &[u8]) -> MfsResult<()> {
        (**self).write_sectors(sector, data)
    }

    fn flush(&mut self) -> MfsResult<()> {
        (**self).flush()
    }
}

/// Disk backed by a raw image file
pub struct FileDisk {
    path: PathBuf,
    file: File,
    geometry: DiskGeometry,
}

impl FileDisk {
    /// Open an existing image for read/write access
    pub fn open(path: impl AsRef<Path>, bytes_per_sector: u32) -> MfsResult<Self> {
        let path = path.as_ref().to_path_buf();
        if bytes_per_sector == 0 || !bytes_per_sector.is_power_of_two() {
            return Err(MfsError::InvalidInput(format!(
                "invalid sector size {}",
                bytes_per_sector
            )));
        }

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let size = file.metadata()?.len();
        if size < bytes_per_sector as u64 {
            return Err(MfsError::InvalidInput(format!(
                "{} is smaller than one sector",
                path.display()
            )));
        }

        let geometry = DiskGeometry::for_size(size, bytes_per_sector);
        debug!(
            "Opened disk image {} ({} sectors of {} bytes)",
            path.display(),
            geometry.total_sectors,
            bytes_per_sector
        );

        Ok(Self {
            path,
            file,
            geometry,
        })
    }

    /// Create (or truncate) a zero-filled image of `size_bytes`
    pub fn create(path: impl AsRef<Path>, size_bytes: u64, bytes_per_sector: u32) -> MfsResult<Self> {
        let path = path.as_ref();
        info!("Creating disk image {} ({} bytes)", path.display(), size_bytes);

        let file = File::create(path)?;
        file.set_len(size_bytes)?;
        drop(file);

        Self::open(path, bytes_per_sector)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Disk for FileDisk {
    fn geometry(&self) -> DiskGeometry {
        self.geometry
    }

    fn read_sectors(&mut self, sector: u64, count: u64) -> MfsResult<Vec<u8>> {
        self.geometry.check_range(sector, count)?;
        let bps = self.geometry.bytes_per_sector as u64;

        let mut buffer = vec![0u8; (count * bps) as usize];
        self.file.seek(SeekFrom::Start(sector * bps))?;
        self.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn write_sectors(&mut self, sector: u64, data: &[u8]) -> MfsResult<()> {
        let count = self.geometry.sectors_in(data)?;
        self.geometry.check_range(sector, count)?;

        self.file
            .seek(SeekFrom::Start(sector * self.geometry.bytes_per_sector as u64))?;
        self.file.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> MfsResult<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}

impl Drop for FileDisk {
    fn drop(&mut self) {
        let _ = self.file.flush();
    }
}

/// Disk held entirely in memory
#[derive(Debug, Clone)]
pub struct MemoryDisk {
    data: Vec<u8>,
    geometry: DiskGeometry,
}

impl MemoryDisk {
    pub fn new(size_bytes: u64, bytes_per_sector: u32) -> Self {
        let geometry = DiskGeometry::for_size(size_bytes, bytes_per_sector);
        Self {
            data: vec![0u8; geometry.size_bytes() as usize],
            geometry,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Disk for MemoryDisk {
    fn geometry(&self) -> DiskGeometry {
        self.geometry
    }

    fn read_sectors(&mut self, sector: u64, count: u64) -> MfsResult<Vec<u8>> {
        self.geometry.check_range(sector, count)?;
        let bps = self.geometry.bytes_per_sector as usize;
        let start = sector as usize * bps;
        Ok(self.data[start..start + count as usize * bps].to_vec())
    }

    fn write_sectors(&mut self, sector: u64, data: &[u8]) -> MfsResult<()> {
        let count = self.geometry.sectors_in(data)?;
        self.geometry.check_range(sector, count)?;
        let start = sector as usize * self.geometry.bytes_per_sector as usize;
        self.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_geometry_for_small_image() {
        let geometry = DiskGeometry::for_size(64 * 1024 * 1024, 512);
        assert_eq!(geometry.total_sectors, 131072);
        assert_eq!(geometry.heads_per_cylinder, 64);
        assert_eq!(geometry.sectors_per_track, 32);
    }

    #[test]
    fn test_geometry_for_large_image() {
        let geometry = DiskGeometry::for_size(4 * GIGABYTE, 512);
        assert_eq!(geometry.heads_per_cylinder, 255);
        assert_eq!(geometry.sectors_per_track, 63);
    }

    #[test]
    fn test_memory_disk_round_trip() {
        let mut disk = MemoryDisk::new(16 * 512, 512);
        let mut sector = vec![0u8; 1024];
        sector[0] = 0xAB;
        sector[1023] = 0xCD;
        disk.write_sectors(3, &sector).unwrap();

        let read = disk.read_sectors(3, 2).unwrap();
        assert_eq!(read, sector);
        assert_eq!(disk.as_bytes()[3 * 512], 0xAB);
    }

    #[test]
    fn test_out_of_bounds_access_is_rejected() {
        let mut disk = MemoryDisk::new(8 * 512, 512);
        assert!(matches!(
            disk.read_sectors(7, 2),
            Err(MfsError::OutOfBounds { sector: 7, count: 2, total: 8 })
        ));
        assert!(disk.write_sectors(8, &[0u8; 512]).is_err());
    }

    #[test]
    fn test_partial_sector_write_is_rejected() {
        let mut disk = MemoryDisk::new(8 * 512, 512);
        assert!(matches!(
            disk.write_sectors(0, &[0u8; 100]),
            Err(MfsError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_file_disk_persists_writes() {
        let image = NamedTempFile::new().unwrap();
        {
            let mut disk = FileDisk::create(image.path(), 32 * 512, 512).unwrap();
            disk.write_sectors(5, &[0x5Au8; 512]).unwrap();
            disk.flush().unwrap();
        }

        let mut disk = FileDisk::open(image.path(), 512).unwrap();
        assert_eq!(disk.geometry().total_sectors, 32);
        assert!(disk.read_sectors(5, 1).unwrap().iter().all(|&b| b == 0x5A));
        assert!(disk.read_sectors(4, 1).unwrap().iter().all(|&b| b == 0));
    }
}
