// MFS filesystem engine
pub mod mfs;

#[cfg(test)]
pub mod test_helpers;

pub use mfs::{
    install_tree, Bootloader, DirectoryRecord, MfsFormatter, MfsVerifier, MfsVolume,
    RecordFlags, VerificationResult, VolumeStatistics, WriteOutcome,
};
