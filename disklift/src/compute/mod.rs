//! Compute API boundary.
//!
//! The cloud compute surface is consumed, never reimplemented: the
//! pipeline talks to it through the [`ComputeClient`] trait and the value
//! types below. Real transports live outside this crate; tests inject
//! mocks.

pub mod classify;

use crate::errors::DiskliftResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Guest OS features attached to a disk or image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuestOsFeature {
    UefiCompatible,
    Windows,
}

impl GuestOsFeature {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuestOsFeature::UefiCompatible => "UEFI_COMPATIBLE",
            GuestOsFeature::Windows => "WINDOWS",
        }
    }
}

impl std::fmt::Display for GuestOsFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persistent disk performance tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiskType {
    #[default]
    Ssd,
    Standard,
}

impl DiskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskType::Ssd => "pd-ssd",
            DiskType::Standard => "pd-standard",
        }
    }
}

/// Definition of a disk to create, either directly through the API or as
/// part of a workflow job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiskDefinition {
    pub name: String,
    #[serde(default)]
    pub disk_type: DiskType,
    /// Requested size; `None` lets the backend size the disk from its source.
    pub size_gb: Option<i64>,
    /// Storage object to populate the disk from (direct-API inflation).
    pub source_storage_object: Option<String>,
    #[serde(default)]
    pub guest_os_features: Vec<GuestOsFeature>,
    #[serde(default)]
    pub licenses: Vec<String>,
}

/// A disk as reported back by the compute API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskResource {
    pub name: String,
    pub zone: String,
    pub size_gb: i64,
    pub uri: String,
}

/// Definition of an image to create from a disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageDefinition {
    pub name: String,
    pub source_disk_uri: String,
    pub family: String,
    pub description: String,
    #[serde(default)]
    pub labels: Vec<(String, String)>,
    #[serde(default)]
    pub guest_os_features: Vec<GuestOsFeature>,
    #[serde(default)]
    pub licenses: Vec<String>,
}

/// Client for the cloud compute API.
///
/// Conventional CRUD surface; error values use
/// [`DiskliftError::Api`](crate::errors::DiskliftError::Api) so callers
/// can distinguish 404s during cleanup.
#[async_trait]
pub trait ComputeClient: Send + Sync {
    async fn create_disk(
        &self,
        project: &str,
        zone: &str,
        disk: &DiskDefinition,
    ) -> DiskliftResult<DiskResource>;

    async fn get_disk(&self, project: &str, zone: &str, name: &str) -> DiskliftResult<DiskResource>;

    async fn delete_disk(&self, project: &str, zone: &str, name: &str) -> DiskliftResult<()>;

    /// Attach licenses and guest OS features to an existing disk.
    async fn patch_disk_metadata(
        &self,
        project: &str,
        zone: &str,
        name: &str,
        licenses: &[String],
        features: &[GuestOsFeature],
    ) -> DiskliftResult<()>;

    async fn create_image(&self, project: &str, image: &ImageDefinition) -> DiskliftResult<()>;

    async fn delete_image(&self, project: &str, name: &str) -> DiskliftResult<()>;
}

/// Canonical URI for a zonal disk.
pub fn disk_uri(project: &str, zone: &str, name: &str) -> String {
    format!("projects/{project}/zones/{zone}/disks/{name}")
}

/// Canonical URI for a project image.
pub fn image_uri(project: &str, name: &str) -> String {
    format!("projects/{project}/global/images/{name}")
}

/// Split a zonal disk URI into `(project, zone, name)`.
///
/// Accepts the canonical relative form produced by [`disk_uri`] as well as
/// fully qualified `https://.../projects/...` URIs.
pub fn parse_disk_uri(uri: &str) -> Option<(String, String, String)> {
    let relative = match uri.find("projects/") {
        Some(idx) => &uri[idx..],
        None => return None,
    };
    let parts: Vec<&str> = relative.split('/').collect();
    match parts.as_slice() {
        ["projects", project, "zones", zone, "disks", name] => {
            Some((project.to_string(), zone.to_string(), name.to_string()))
        }
        _ => None,
    }
}
