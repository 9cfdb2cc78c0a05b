use super::RuntimeMajor;
use crate::error::ProvisioningError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One bundled runtime archive as listed in the manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundledRuntime {
    pub major: RuntimeMajor,
    /// Archive location, relative to the manifest file unless absolute
    pub archive: PathBuf,
    /// Expected SHA-256 of the archive
    pub sha256: String,
    /// Expected digest of the extracted tree, when the bundle ships one.
    /// Lets a pre-extracted runtime be verified without unpacking again.
    #[serde(default)]
    pub tree_sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestFile {
    runtimes: Vec<BundledRuntime>,
}

/// Bundled runtime manifest shipped next to the launcher
#[derive(Debug, Clone, Default)]
pub struct RuntimeManifest {
    entries: HashMap<RuntimeMajor, BundledRuntime>,
}

impl RuntimeManifest {
    pub fn load(path: &Path) -> Result<Self, ProvisioningError> {
        let data = std::fs::read_to_string(path).map_err(|e| ProvisioningError::io(path, e))?;
        Self::parse(&data, path.parent().unwrap_or(Path::new(".")), path)
    }

    fn parse(data: &str, base_dir: &Path, path: &Path) -> Result<Self, ProvisioningError> {
        let file: ManifestFile =
            serde_json::from_str(data).map_err(|e| ProvisioningError::Manifest {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let mut entries = HashMap::new();
        for mut runtime in file.runtimes {
            if runtime.sha256.trim().is_empty() {
                return Err(ProvisioningError::Manifest {
                    path: path.to_path_buf(),
                    reason: format!("Java {} has no sha256", runtime.major),
                });
            }
            if runtime.archive.is_relative() {
                runtime.archive = base_dir.join(&runtime.archive);
            }
            if entries.insert(runtime.major, runtime).is_some() {
                return Err(ProvisioningError::Manifest {
                    path: path.to_path_buf(),
                    reason: "duplicate runtime entry".to_string(),
                });
            }
        }

        log::debug!("Loaded runtime manifest {:?} with {} entries", path, entries.len());
        Ok(Self { entries })
    }

    pub fn get(&self, major: RuntimeMajor) -> Option<&BundledRuntime> {
        self.entries.get(&major)
    }

    pub fn majors(&self) -> Vec<RuntimeMajor> {
        let mut majors: Vec<_> = self.entries.keys().copied().collect();
        majors.sort();
        majors
    }
}
