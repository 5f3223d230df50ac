//! Substring classification of remote API failures.
//!
//! The compute API reports some failure modes only through error message
//! text. The matching is brittle by nature, so every such predicate lives
//! here; if the API's wording changes, this is the only file to update.

use crate::errors::DiskliftError;

const UNSUPPORTED_FORMAT_MARKERS: &[&str] = &[
    "INVALID_IMAGE_FILE",
    "is not in a supported format",
    "unsupported virtual disk file format",
];

const ALPHA_ACCESS_MARKERS: &[&str] = &[
    "Required 'Alpha Access'",
    "alpha feature",
];

const SSD_QUOTA_MARKERS: &[&str] = &["SSD_TOTAL_GB"];

fn matches_any(err: &DiskliftError, markers: &[&str]) -> bool {
    let text = err.to_string();
    markers.iter().any(|m| text.contains(m))
}

/// The API rejected the source file because its disk format is not
/// supported by the direct disk-creation path.
pub fn is_caused_by_unsupported_format(err: &DiskliftError) -> bool {
    matches_any(err, UNSUPPORTED_FORMAT_MARKERS)
}

/// The API call requires alpha-track access that the project lacks.
pub fn is_caused_by_alpha_api_access(err: &DiskliftError) -> bool {
    matches_any(err, ALPHA_ACCESS_MARKERS)
}

/// The failure is an SSD disk quota exhaustion.
pub fn is_caused_by_ssd_quota(err: &DiskliftError) -> bool {
    matches_any(err, SSD_QUOTA_MARKERS)
}
