//! Import source descriptor.

use crate::errors::{DiskliftError, DiskliftResult};
use serde::{Deserialize, Serialize};

/// What the import starts from: a disk image file in object storage, or
/// an existing cloud disk image. Created once from user input, read-only
/// thereafter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// A virtual disk file (raw/VMDK/VHD/qcow2) at a storage object path.
    File { object_path: String },
    /// An existing cloud disk image.
    Image { uri: String },
}

impl Source {
    /// Build a file source from a storage object path such as
    /// `gs://bucket/disk.vmdk`.
    pub fn file(object_path: impl Into<String>) -> DiskliftResult<Source> {
        let object_path = object_path.into();
        if !object_path.starts_with("gs://") {
            return Err(DiskliftError::Config(format!(
                "source file must be a storage object path (gs://bucket/object), got `{object_path}`"
            )));
        }
        Ok(Source::File { object_path })
    }

    /// Build an image source from an image reference.
    pub fn image(uri: impl Into<String>) -> DiskliftResult<Source> {
        let uri = uri.into();
        if uri.is_empty() {
            return Err(DiskliftError::Config("source image must not be empty".into()));
        }
        Ok(Source::Image { uri })
    }

    /// The storage path or image reference this source points at.
    pub fn path(&self) -> &str {
        match self {
            Source::File { object_path } => object_path,
            Source::Image { uri } => uri,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Source::Image { .. })
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::File { object_path } => write!(f, "file {object_path}"),
            Source::Image { uri } => write!(f, "image {uri}"),
        }
    }
}
