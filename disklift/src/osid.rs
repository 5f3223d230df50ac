//! OS release identity.
//!
//! Minimal identity type for the OS identifiers the import surface deals
//! in (`rhel-8`, `ubuntu-2004`, `windows-2019`, plus `-byol` variants).
//! Version grammar beyond major/minor is out of scope; this module only
//! carries identity and import-compatibility comparison.

use serde::{Deserialize, Serialize};

const BYOL_SUFFIX: &str = "-byol";

/// Identity of an OS release as reported by inspection or named by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsRelease {
    pub distro: String,
    pub major: String,
    pub minor: String,
    pub architecture: String,
}

impl OsRelease {
    pub fn new(distro: impl Into<String>, major: impl Into<String>, minor: impl Into<String>) -> Self {
        Self {
            distro: distro.into(),
            major: major.into(),
            minor: minor.into(),
            architecture: String::new(),
        }
    }

    /// Parse an import OS identifier such as `rhel-8`, `ubuntu-2004` or
    /// `windows-2008r2-byol`. Returns `None` for identifiers that don't
    /// follow the `distro-version` shape.
    pub fn from_import_id(id: &str) -> Option<OsRelease> {
        let id = id.strip_suffix(BYOL_SUFFIX).unwrap_or(id);
        let (distro, version) = id.rsplit_once('-')?;
        if distro.is_empty() || version.is_empty() {
            return None;
        }
        // Ubuntu identifiers pack major and minor into one token: 2004 = 20.04.
        if distro == "ubuntu" && version.len() == 4 && version.chars().all(|c| c.is_ascii_digit()) {
            return Some(OsRelease::new(distro, &version[..2], &version[2..]));
        }
        Some(OsRelease::new(distro, version, ""))
    }

    /// Render this release as an import OS identifier (without BYOL suffix).
    pub fn as_import_id(&self) -> String {
        if self.distro == "ubuntu" && !self.minor.is_empty() {
            format!("{}-{}{:0>2}", self.distro, self.major, self.minor)
        } else {
            format!("{}-{}", self.distro, self.major)
        }
    }

    /// Whether two releases are interchangeable for import purposes.
    ///
    /// Same distro and same major version; minor version and BYOL
    /// licensing do not affect which translation applies.
    pub fn import_compatible(&self, other: &OsRelease) -> bool {
        self.distro == other.distro && self.major == other.major
    }

    pub fn is_windows(&self) -> bool {
        self.distro == "windows"
    }
}

impl std::fmt::Display for OsRelease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_import_id())
    }
}
