//! Inspection boundaries.
//!
//! Two external inspectors feed the pipeline: a file inspector that reads
//! size metadata out of a source disk file, and a disk inspector that
//! reports partition/boot facts about an inflated disk. Both are consumed
//! through traits; failures are tolerated or escalated by the caller, not
//! here.

use crate::errors::DiskliftResult;
use crate::osid::OsRelease;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Size metadata for a source disk file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Size the disk reports once uncompressed/expanded.
    pub virtual_size_gb: i64,
    /// Size of the artifact as stored.
    pub physical_size_gb: i64,
}

/// Inspects a source disk file for size metadata.
///
/// Callers bound the call with their own deadline and treat failure as
/// non-fatal (a fixed minimum size is used instead).
#[async_trait]
pub trait FileInspector: Send + Sync {
    async fn inspect(&self, source_path: &str, timeout: Duration) -> DiskliftResult<FileMetadata>;
}

/// Partition and boot facts about an inflated disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InspectionResult {
    /// Number of operating systems found on the disk.
    pub os_count: u32,
    /// Release identity when exactly one OS was found.
    pub os_release: Option<OsRelease>,
    pub bios_bootable: bool,
    pub uefi_bootable: bool,
}

/// Inspects an inflated disk for OS and bootability facts.
#[async_trait]
pub trait DiskInspector: Send + Sync {
    async fn inspect(&self, disk_uri: &str) -> DiskliftResult<InspectionResult>;
}
