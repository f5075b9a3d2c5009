// MFS (MollenOS File System) implementation

pub mod bootloader;
pub mod bucket_map;
pub mod chain;
pub mod constants;
pub mod formatter;
pub mod install;
pub mod layout;
pub mod path_resolver;
pub mod record;
pub mod structures;
pub mod validator;
pub mod volume;

pub use bootloader::Bootloader;
pub use bucket_map::{Allocation, BucketMap, DiskMap, MapEntry, MapStore};
pub use formatter::MfsFormatter;
pub use install::{install_tree, InstallReport};
pub use layout::VolumeLayout;
pub use record::{DirectoryRecord, LocatedRecord, RecordFlags, RecordLocation};
pub use structures::{BootRecord, MasterRecord};
pub use validator::{MfsVerifier, VerificationResult};
pub use volume::{MfsVolume, VolumeStatistics, WriteOutcome};
