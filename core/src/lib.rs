pub mod device;
pub mod disk;
pub mod error;
pub mod format;

pub use device::{discover_images, enumerate_disks, DiskInfo};
pub use disk::{Disk, DiskGeometry, FileDisk, MemoryDisk};
pub use error::{MfsError, MfsResult};
pub use format::{FileFlags, FormatOptions, PartitionFlags};
