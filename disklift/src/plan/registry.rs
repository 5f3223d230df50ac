//! OS translation registry.
//!
//! Immutable table mapping import OS identifiers to the licenses a disk
//! must carry and the translation workflow that makes it bootable.
//! Constructed once at startup and injected; never mutated.

use std::collections::BTreeMap;

/// Translation settings for one import OS identifier.
#[derive(Debug, Clone)]
pub struct OsSettings {
    /// License URIs the final image must carry.
    pub licenses: Vec<String>,
    /// Translation workflow path, relative to the workflow directory.
    pub workflow_path: String,
    pub windows: bool,
}

impl OsSettings {
    fn linux(license: &str, workflow: &str) -> Self {
        Self {
            licenses: vec![license.to_string()],
            workflow_path: workflow.to_string(),
            windows: false,
        }
    }

    fn windows(license: &str, workflow: &str) -> Self {
        Self {
            licenses: vec![license.to_string()],
            workflow_path: workflow.to_string(),
            windows: true,
        }
    }
}

/// Immutable import-id → translation-settings table.
pub struct OsRegistry {
    settings: BTreeMap<String, OsSettings>,
}

impl OsRegistry {
    pub fn new(settings: BTreeMap<String, OsSettings>) -> Self {
        Self { settings }
    }

    pub fn get(&self, import_id: &str) -> Option<&OsSettings> {
        self.settings.get(import_id)
    }

    /// Supported identifiers in stable order, for error messages.
    pub fn supported_ids(&self) -> Vec<&str> {
        self.settings.keys().map(String::as_str).collect()
    }
}

impl Default for OsRegistry {
    fn default() -> Self {
        let lic = |name: &str| format!("projects/vm-images/global/licenses/{name}");
        let mut settings = BTreeMap::new();

        for major in ["7", "8", "9"] {
            settings.insert(
                format!("centos-{major}"),
                OsSettings::linux(&lic(&format!("centos-{major}")), &format!("enterprise_linux/translate_centos_{major}.wf.json")),
            );
            settings.insert(
                format!("rhel-{major}"),
                OsSettings::linux(&lic(&format!("rhel-{major}-server")), &format!("enterprise_linux/translate_rhel_{major}_licensed.wf.json")),
            );
            settings.insert(
                format!("rhel-{major}-byol"),
                OsSettings::linux(&lic(&format!("rhel-{major}-byol")), &format!("enterprise_linux/translate_rhel_{major}_byol.wf.json")),
            );
            settings.insert(
                format!("rocky-{major}"),
                OsSettings::linux(&lic(&format!("rocky-linux-{major}")), &format!("enterprise_linux/translate_rocky_{major}.wf.json")),
            );
        }

        for major in ["9", "10", "11", "12"] {
            settings.insert(
                format!("debian-{major}"),
                OsSettings::linux(&lic(&format!("debian-{major}")), &format!("debian/translate_debian_{major}.wf.json")),
            );
        }

        for version in ["1404", "1604", "1804", "2004", "2204"] {
            settings.insert(
                format!("ubuntu-{version}"),
                OsSettings::linux(&lic(&format!("ubuntu-{version}-lts")), &format!("ubuntu/translate_ubuntu_{version}.wf.json")),
            );
        }

        for major in ["12", "15"] {
            settings.insert(
                format!("opensuse-{major}"),
                OsSettings::linux(&lic(&format!("opensuse-leap-{major}")), &format!("suse/translate_opensuse_{major}.wf.json")),
            );
            settings.insert(
                format!("sles-{major}"),
                OsSettings::linux(&lic(&format!("sles-{major}")), &format!("suse/translate_sles_{major}.wf.json")),
            );
            settings.insert(
                format!("sles-{major}-byol"),
                OsSettings::linux(&lic(&format!("sles-{major}-byol")), &format!("suse/translate_sles_{major}_byol.wf.json")),
            );
        }

        for major in ["2008r2", "2012r2", "2016", "2019", "2022"] {
            settings.insert(
                format!("windows-{major}"),
                OsSettings::windows(&lic(&format!("windows-server-{major}-dc")), &format!("windows/translate_windows_{major}.wf.json")),
            );
            settings.insert(
                format!("windows-{major}-byol"),
                OsSettings::windows(&lic(&format!("windows-server-{major}-byol")), &format!("windows/translate_windows_{major}_byol.wf.json")),
            );
        }

        Self::new(settings)
    }
}
