// Bootloader installation
// stage1 replaces the boot sector code around the MFS header; stage2 fills
// the reserved sectors that follow it.

use super::constants::*;
use super::volume::MfsVolume;
use log::info;
use mfsutil_core::{Disk, MfsError, MfsResult};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Bootloader {
    pub stage1: Vec<u8>,
    pub stage2: Vec<u8>,
}

impl Bootloader {
    pub fn new(stage1: Vec<u8>, stage2: Vec<u8>) -> Self {
        Self { stage1, stage2 }
    }

    pub fn load(stage1: &Path, stage2: &Path) -> MfsResult<Self> {
        Ok(Self {
            stage1: read_stage(stage1)?,
            stage2: read_stage(stage2)?,
        })
    }

    /// Sectors taken by stage2, always at least one
    pub fn stage2_sectors(&self, bytes_per_sector: u64) -> u64 {
        self.stage2.len() as u64 / bytes_per_sector + 1
    }

    /// Sectors in front of the master record: boot sector plus stage2
    pub fn boot_sectors(&self, bytes_per_sector: u64) -> u64 {
        1 + self.stage2_sectors(bytes_per_sector)
    }

    /// Write both stages at `partition_start`. The MFS header in the current
    /// boot sector is kept and the bootable flag set.
    pub fn write_to<D: Disk + ?Sized>(&self, disk: &mut D, partition_start: u64) -> MfsResult<()> {
        let bps = disk.bytes_per_sector() as usize;
        if self.stage1.len() > bps {
            return Err(MfsError::InvalidInput(format!(
                "stage1 is {} bytes, the boot sector holds {}",
                self.stage1.len(),
                bps
            )));
        }

        let current = disk.read_sectors(partition_start, 1)?;
        let mut sector = vec![0u8; bps];
        sector[..self.stage1.len()].copy_from_slice(&self.stage1);
        let header = BOOT_HEADER_START..BOOT_HEADER_START + BOOT_HEADER_LEN;
        sector[header.clone()].copy_from_slice(&current[header]);
        sector[boot_offsets::FLAGS] |= BOOT_FLAG_BOOTABLE;
        disk.write_sectors(partition_start, &sector)?;

        let stage2_len = self.stage2_sectors(bps as u64) as usize * bps;
        let mut stage2 = vec![0u8; stage2_len];
        stage2[..self.stage2.len()].copy_from_slice(&self.stage2);
        disk.write_sectors(partition_start + 1, &stage2)?;

        info!(
            "Installed bootloader: stage1 {} bytes, stage2 {} bytes",
            self.stage1.len(),
            self.stage2.len()
        );
        Ok(())
    }
}

fn read_stage(path: &Path) -> MfsResult<Vec<u8>> {
    if !path.is_file() {
        return Err(MfsError::BootloaderMissing(path.display().to_string()));
    }
    Ok(std::fs::read(path)?)
}

impl<D: Disk> MfsVolume<D> {
    /// Install a bootloader into the reserved area of this volume
    pub fn install_bootloader(&mut self, bootloader: &Bootloader) -> MfsResult<()> {
        let needed = bootloader.boot_sectors(self.layout.bytes_per_sector);
        let available = self.boot.master_record_sector;
        if needed > available {
            return Err(MfsError::InvalidInput(format!(
                "bootloader needs {} sectors before the master record, volume reserves {}",
                needed, available
            )));
        }

        bootloader.write_to(&mut self.disk, self.layout.partition_start)?;
        self.boot.flags |= BOOT_FLAG_BOOTABLE;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfsutil_core::MemoryDisk;

    #[test]
    fn test_stage2_sizing() {
        let loader = Bootloader::new(vec![0; 10], vec![0; 1024]);
        assert_eq!(loader.stage2_sectors(512), 3);
        assert_eq!(loader.boot_sectors(512), 4);

        let empty = Bootloader::new(vec![], vec![]);
        assert_eq!(empty.stage2_sectors(512), 1);
    }

    #[test]
    fn test_write_keeps_header() {
        let mut disk = MemoryDisk::new(1024 * 1024, 512);
        let mut boot = vec![0u8; 512];
        boot[3..7].copy_from_slice(MFS_MAGIC);
        boot[10] = 0x00;
        boot[11] = 0x02;
        disk.write_sectors(0, &boot).unwrap();

        let loader = Bootloader::new(vec![0xEB; 512], vec![0x90; 700]);
        loader.write_to(&mut disk, 0).unwrap();

        let sector = disk.read_sectors(0, 1).unwrap();
        assert_eq!(&sector[0..3], &[0xEB, 0xEB, 0xEB]);
        assert_eq!(&sector[3..7], MFS_MAGIC);
        assert_eq!(sector[8] & BOOT_FLAG_BOOTABLE, BOOT_FLAG_BOOTABLE);
        assert_eq!(sector[9], 0);
        assert_eq!(&sector[44..], &vec![0xEB; 512 - 44][..]);

        let stage2 = disk.read_sectors(1, 2).unwrap();
        assert!(stage2[..700].iter().all(|&b| b == 0x90));
        assert!(stage2[700..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_oversized_stage1_rejected() {
        let mut disk = MemoryDisk::new(1024 * 1024, 512);
        let loader = Bootloader::new(vec![0; 513], vec![]);
        assert!(matches!(loader.write_to(&mut disk, 0), Err(MfsError::InvalidInput(_))));
    }

    #[test]
    fn test_missing_stage_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = Bootloader::load(&dir.path().join("stage1.sys"), &dir.path().join("stage2.sys")).unwrap_err();
        assert!(matches!(err, MfsError::BootloaderMissing(_)));
    }
}
