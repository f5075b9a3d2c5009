// Host directory tree installation
// Mirrors a host directory into the volume: all directories first, then files.

use super::volume::{MfsVolume, WriteOutcome};
use log::{debug, info};
use mfsutil_core::{Disk, FileFlags, MfsError, MfsResult};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub directories: usize,
    pub files: usize,
    pub bytes: u64,
}

/// Copy the tree under `host_root` into the volume root. Entries are flagged System
pub fn install_tree<D: Disk>(volume: &mut MfsVolume<D>, host_root: &Path) -> MfsResult<InstallReport> {
    if !host_root.is_dir() {
        return Err(MfsError::NotFound(host_root.display().to_string()));
    }

    let mut directories = Vec::new();
    let mut files = Vec::new();
    collect_tree(host_root, "", &mut directories, &mut files)?;

    let flags = FileFlags(FileFlags::SYSTEM);
    let mut report = InstallReport::default();

    for directory in &directories {
        if volume.create_directory(directory, flags)? == WriteOutcome::Created {
            report.directories += 1;
        }
    }

    for (target, host_path) in &files {
        let data = std::fs::read(host_path)?;
        debug!("Installing {} ({} bytes)", target, data.len());
        volume.write_file(target, flags, Some(&data))?;
        report.files += 1;
        report.bytes += data.len() as u64;
    }

    volume.flush()?;
    info!(
        "Installed {} files ({} bytes) and {} new directories from {}",
        report.files,
        report.bytes,
        report.directories,
        host_root.display()
    );
    Ok(report)
}

/// Walk `dir` depth first; entries are sorted by name so installs are reproducible
fn collect_tree(
    dir: &Path,
    prefix: &str,
    directories: &mut Vec<String>,
    files: &mut Vec<(String, PathBuf)>,
) -> MfsResult<()> {
    let mut entries = std::fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name().into_string().map_err(|raw| {
            MfsError::InvalidInput(format!("host file name is not UTF-8: {:?}", raw))
        })?;
        let target = format!("{}/{}", prefix, name);
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            directories.push(target.clone());
            collect_tree(&entry.path(), &target, directories, files)?;
        } else if file_type.is_file() {
            files.push((target, entry.path()));
        }
    }
    Ok(())
}
