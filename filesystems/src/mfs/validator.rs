// MFS volume verification
// Read-only consistency checks over the records, the free list and every
// chain reachable from the directory tree.

use super::chain::{self, Run};
use super::structures::{data_checksum, MasterRecord};
use super::volume::MfsVolume;
use log::debug;
use mfsutil_core::{Disk, MfsResult};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct VerificationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub data_buckets: u64,
    pub free_buckets: u64,
    pub used_buckets: u64,
    pub files: usize,
    pub directories: usize,
}

/// A claimed bucket range and who claims it
struct Extent {
    start: u64,
    length: u64,
    owner: String,
}

pub struct MfsVerifier;

impl MfsVerifier {
    pub fn verify<D: Disk>(volume: &mut MfsVolume<D>) -> MfsResult<VerificationResult> {
        let mut result = VerificationResult {
            data_buckets: volume.layout.data_buckets() as u64,
            ..VerificationResult::default()
        };
        let mut extents = Vec::new();

        Self::check_records(volume, &mut result)?;

        // Free list
        match volume.read_runs(volume.next_free_bucket()) {
            Ok(runs) => {
                result.free_buckets = chain::chain_buckets(&runs);
                push_extents(&mut extents, &runs, "free list");
            }
            Err(e) => result.errors.push(format!("Free list unreadable: {}", e)),
        }

        let master = volume.master.clone();
        for (bucket, owner) in [
            (master.journal_bucket, "journal"),
            (master.bad_bucket_list_bucket, "bad bucket list"),
        ] {
            match volume.read_runs(bucket) {
                Ok(runs) => {
                    result.used_buckets += chain::chain_buckets(&runs);
                    push_extents(&mut extents, &runs, owner);
                }
                Err(e) => result.errors.push(format!("{} chain unreadable: {}", owner, e)),
            }
        }

        let mut visited = HashSet::new();
        Self::walk_directory(
            volume,
            master.root_directory_bucket,
            "/",
            &mut visited,
            &mut extents,
            &mut result,
        )?;

        Self::check_extents(&mut extents, &mut result);

        result.is_valid = result.errors.is_empty();
        debug!(
            "Verification finished: {} errors, {} warnings",
            result.errors.len(),
            result.warnings.len()
        );
        Ok(result)
    }

    fn check_records<D: Disk>(volume: &mut MfsVolume<D>, result: &mut VerificationResult) -> MfsResult<()> {
        let layout = volume.layout;

        let expected_mirror = layout.map_sector - 1;
        if layout.mirror_record_sector != expected_mirror {
            result.errors.push(format!(
                "Boot record places the master mirror at sector {}, expected {}",
                layout.relative(layout.mirror_record_sector),
                layout.relative(expected_mirror)
            ));
        }

        match volume
            .disk
            .read_sectors(layout.mirror_record_sector, 1)
            .and_then(|sector| MasterRecord::decode(&sector))
        {
            Ok(mirror) if mirror == volume.master => {}
            Ok(_) => result.warnings.push("Master record mirror differs from the primary".to_string()),
            Err(e) => result.warnings.push(format!("Master record mirror unreadable: {}", e)),
        }

        let expected_map = layout.total_sectors - 1 - layout.map_sectors;
        if layout.relative(layout.map_sector) != expected_map {
            result.warnings.push(format!(
                "Bucket map at sector {}, expected {}",
                layout.relative(layout.map_sector),
                expected_map
            ));
        }
        if layout.map_entries() < layout.data_buckets() as u64 {
            result.errors.push(format!(
                "Bucket map has {} entries for {} data buckets",
                layout.map_entries(),
                layout.data_buckets()
            ));
        }
        Ok(())
    }

    fn walk_directory<D: Disk>(
        volume: &mut MfsVolume<D>,
        start: u32,
        path: &str,
        visited: &mut HashSet<u32>,
        extents: &mut Vec<Extent>,
        result: &mut VerificationResult,
    ) -> MfsResult<()> {
        if !visited.insert(start) {
            result.errors.push(format!("Directory {} is reachable twice", path));
            return Ok(());
        }

        let runs = match volume.read_runs(start) {
            Ok(runs) => runs,
            Err(e) => {
                result.errors.push(format!("Directory {} chain unreadable: {}", path, e));
                return Ok(());
            }
        };
        result.used_buckets += chain::chain_buckets(&runs);
        push_extents(extents, &runs, path);
        result.directories += 1;

        let scan = volume.scan_directory(start)?;
        for located in scan.entries {
            let record = located.record;
            let child = if path == "/" {
                format!("/{}", record.name)
            } else {
                format!("{}/{}", path, record.name)
            };

            if record.is_directory() {
                if record.has_data() {
                    Self::walk_directory(volume, record.start_bucket, &child, visited, extents, result)?;
                } else {
                    result.directories += 1;
                }
                continue;
            }

            result.files += 1;
            if record.size > record.allocated_size {
                result.errors.push(format!(
                    "{}: size {} exceeds allocated size {}",
                    child, record.size, record.allocated_size
                ));
            }
            if !record.has_data() {
                continue;
            }

            let runs = match volume.read_runs(record.start_bucket) {
                Ok(runs) => runs,
                Err(e) => {
                    result.errors.push(format!("{}: chain unreadable: {}", child, e));
                    continue;
                }
            };
            let chain_bytes = chain::chain_buckets(&runs) * volume.layout.bucket_bytes();
            if chain_bytes < record.allocated_size {
                result.errors.push(format!(
                    "{}: chain holds {} bytes, record claims {}",
                    child, chain_bytes, record.allocated_size
                ));
            } else if record.size > 0 && record.size <= chain_bytes {
                let data = chain::read_chain_data(&mut volume.disk, &volume.layout, &runs, record.size)?;
                if data_checksum(&data) != record.data_checksum {
                    result.warnings.push(format!("{}: data checksum mismatch", child));
                }
            }
            result.used_buckets += chain::chain_buckets(&runs);
            push_extents(extents, &runs, &child);
        }
        Ok(())
    }

    fn check_extents(extents: &mut [Extent], result: &mut VerificationResult) {
        extents.sort_by_key(|extent| extent.start);

        for extent in extents.iter() {
            if extent.start + extent.length > result.data_buckets {
                result.errors.push(format!(
                    "{} claims buckets {}..{} past the data area ({} buckets)",
                    extent.owner,
                    extent.start,
                    extent.start + extent.length,
                    result.data_buckets
                ));
            }
        }

        for pair in extents.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if a.start + a.length > b.start {
                result.errors.push(format!(
                    "Buckets {}..{} claimed by both {} and {}",
                    b.start,
                    (a.start + a.length).min(b.start + b.length),
                    a.owner,
                    b.owner
                ));
            }
        }

        if result.used_buckets + result.free_buckets > result.data_buckets {
            result.errors.push(format!(
                "{} used and {} free buckets exceed the {} data buckets",
                result.used_buckets, result.free_buckets, result.data_buckets
            ));
        }
    }

    pub fn generate_report(result: &VerificationResult) -> String {
        let mut report = String::new();

        report.push_str("MFS Verification Report\n");
        report.push_str("=======================\n\n");

        report.push_str(&format!(
            "Status: {}\n",
            if result.is_valid { "VALID" } else { "INVALID" }
        ));
        report.push_str(&format!("Directories: {}\n", result.directories));
        report.push_str(&format!("Files: {}\n", result.files));
        report.push_str(&format!(
            "Buckets: {} used, {} free, {} total\n\n",
            result.used_buckets, result.free_buckets, result.data_buckets
        ));

        if !result.errors.is_empty() {
            report.push_str("ERRORS:\n");
            for error in &result.errors {
                report.push_str(&format!("  ✗ {}\n", error));
            }
            report.push('\n');
        }

        if !result.warnings.is_empty() {
            report.push_str("WARNINGS:\n");
            for warning in &result.warnings {
                report.push_str(&format!("  ⚠ {}\n", warning));
            }
            report.push('\n');
        }

        report
    }
}

fn push_extents(extents: &mut Vec<Extent>, runs: &[Run], owner: &str) {
    extents.extend(runs.iter().map(|run| Extent {
        start: run.bucket as u64,
        length: run.length as u64,
        owner: owner.to_string(),
    }));
}

impl<D: Disk> MfsVolume<D> {
    pub fn verify(&mut self) -> MfsResult<VerificationResult> {
        MfsVerifier::verify(self)
    }
}
