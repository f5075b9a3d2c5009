use crate::error::MfsResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Partition flags stored in the master record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionFlags(pub u32);

impl PartitionFlags {
    pub const SYSTEM_DRIVE: u32 = 0x1;
    pub const DATA_DRIVE: u32 = 0x2;
    pub const USER_DRIVE: u32 = 0x4;
    pub const HIDDEN_DRIVE: u32 = 0x8;

    pub fn is_system_drive(&self) -> bool { self.0 & Self::SYSTEM_DRIVE != 0 }
    pub fn is_data_drive(&self) -> bool { self.0 & Self::DATA_DRIVE != 0 }
    pub fn is_user_drive(&self) -> bool { self.0 & Self::USER_DRIVE != 0 }
    pub fn is_hidden_drive(&self) -> bool { self.0 & Self::HIDDEN_DRIVE != 0 }
}

/// Caller-facing flags for created entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFlags(pub u32);

impl FileFlags {
    pub const DIRECTORY: u32 = 0x1;
    pub const SYSTEM: u32 = 0x2;
    pub const SECURITY: u32 = 0x4;

    pub fn is_directory(&self) -> bool { self.0 & Self::DIRECTORY != 0 }
    pub fn is_system(&self) -> bool { self.0 & Self::SYSTEM != 0 }
    pub fn is_security(&self) -> bool { self.0 & Self::SECURITY != 0 }

    pub fn with(self, flag: u32) -> Self {
        Self(self.0 | flag)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatOptions {
    pub partition_name: String,
    pub bootable: bool,
    pub partition_flags: PartitionFlags,
    /// Overrides the size-derived bucket size when set
    pub sectors_per_bucket: Option<u16>,
    pub stage1_path: PathBuf,
    pub stage2_path: PathBuf,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            partition_name: "MFS Partition".to_string(),
            bootable: false,
            partition_flags: PartitionFlags::default(),
            sectors_per_bucket: None,
            stage1_path: PathBuf::from("deploy/stage1.sys"),
            stage2_path: PathBuf::from("deploy/stage2.sys"),
        }
    }
}

impl FormatOptions {
    pub fn from_json_file(path: &Path) -> MfsResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: FormatOptions =
            serde_json::from_str(r#"{ "partition_name": "Boot", "bootable": true }"#).unwrap();
        assert_eq!(options.partition_name, "Boot");
        assert!(options.bootable);
        assert_eq!(options.sectors_per_bucket, None);
        assert_eq!(options.stage2_path, PathBuf::from("deploy/stage2.sys"));
    }

    #[test]
    fn test_file_flags_compose() {
        let flags = FileFlags::default().with(FileFlags::DIRECTORY).with(FileFlags::SYSTEM);
        assert!(flags.is_directory());
        assert!(flags.is_system());
        assert!(!flags.is_security());
    }
}
