use crate::disk::DiskGeometry;
use crate::error::MfsResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One entry of the numbered candidate-disk list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskInfo {
    pub index: usize,
    pub path: PathBuf,
    pub size: u64,
    pub geometry: DiskGeometry,
    pub read_only: bool,
}

/// Describe each candidate disk, numbering them in the order given
pub fn enumerate_disks(paths: &[PathBuf], bytes_per_sector: u32) -> MfsResult<Vec<DiskInfo>> {
    let mut disks = Vec::with_capacity(paths.len());

    for (index, path) in paths.iter().enumerate() {
        let metadata = std::fs::metadata(path)?;
        disks.push(DiskInfo {
            index,
            path: path.clone(),
            size: metadata.len(),
            geometry: DiskGeometry::for_size(metadata.len(), bytes_per_sector),
            read_only: metadata.permissions().readonly(),
        });
    }

    Ok(disks)
}

/// Raw images (`*.img`) in `dir`, sorted by name
pub fn discover_images(dir: &Path) -> MfsResult<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("img"))
            .unwrap_or(false);
        if is_image && path.is_file() {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}
