//! Persisted per-runtime verification state (`runtimes.json`).
use super::RuntimeMajor;
use crate::error::ProvisioningError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    #[default]
    Unknown,
    Extracted,
    Verified,
    Stale,
    Corrupted,
    FailedPermanently,
}

impl RuntimeState {
    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: RuntimeState) -> bool {
        use RuntimeState::*;
        matches!(
            (self, next),
            (Unknown, Extracted)
                | (Unknown, FailedPermanently)
                | (Extracted, Verified)
                | (Extracted, Corrupted)
                | (Verified, Verified)
                | (Verified, Stale)
                | (Verified, Corrupted)
                | (Stale, Verified)
                | (Stale, Corrupted)
                | (Corrupted, Extracted)
                | (Corrupted, FailedPermanently)
                | (FailedPermanently, Unknown)
        )
    }
}

/// Everything known about one bundled runtime
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeRecord {
    pub state: RuntimeState,
    /// Java executable inside the extracted tree, relative to it
    pub executable_rel: Option<PathBuf>,
    pub full_version: Option<String>,
    /// Digest of the extracted tree recorded right after a verified extraction
    pub tree_sha256: Option<String>,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl RuntimeRecord {
    /// Move to `next`, logging the step. Returns false (and leaves the
    /// state alone) when the lifecycle does not allow it.
    pub fn transition(&mut self, major: RuntimeMajor, next: RuntimeState) -> bool {
        if !self.state.can_transition_to(next) {
            log::warn!(
                "Ignoring invalid runtime state change for Java {}: {:?} -> {:?}",
                major,
                self.state,
                next
            );
            return false;
        }
        if self.state != next {
            log::info!("Java {} runtime: {:?} -> {:?}", major, self.state, next);
        }
        self.state = next;
        true
    }

    /// Verified longer ago than `window`
    pub fn is_past_window(&self, window: chrono::Duration, now: DateTime<Utc>) -> bool {
        match self.last_verified_at {
            Some(at) => now.signed_duration_since(at) > window,
            None => true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StateEntry {
    major: RuntimeMajor,
    #[serde(flatten)]
    record: RuntimeRecord,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    runtimes: Vec<StateEntry>,
}

/// In-memory view of `runtimes.json`, written back atomically on every save
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    records: HashMap<RuntimeMajor, RuntimeRecord>,
}

impl StateStore {
    /// Load the state file. A missing or unreadable file starts from scratch,
    /// since every runtime can be re-derived from its bundled archive.
    pub fn load(path: &Path) -> Self {
        let records = match std::fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<StateFile>(&data) {
                Ok(file) => file
                    .runtimes
                    .into_iter()
                    .map(|entry| {
                        let mut record = entry.record;
                        // A permanent failure is retried after a restart
                        if record.state == RuntimeState::FailedPermanently {
                            record.state = RuntimeState::Unknown;
                        }
                        (entry.major, record)
                    })
                    .collect(),
                Err(e) => {
                    log::warn!("Discarding unreadable runtime state {:?}: {}", path, e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                log::warn!("Failed to read runtime state {:?}: {}", path, e);
                HashMap::new()
            }
        };

        Self {
            path: path.to_path_buf(),
            records,
        }
    }

    pub fn get(&self, major: RuntimeMajor) -> RuntimeRecord {
        self.records.get(&major).cloned().unwrap_or_default()
    }

    pub fn get_mut(&mut self, major: RuntimeMajor) -> &mut RuntimeRecord {
        self.records.entry(major).or_default()
    }

    pub fn set(&mut self, major: RuntimeMajor, record: RuntimeRecord) {
        self.records.insert(major, record);
    }

    /// Write the whole store through a temp file and rename.
    pub fn save(&self) -> Result<(), ProvisioningError> {
        let mut runtimes: Vec<StateEntry> = self
            .records
            .iter()
            .map(|(major, record)| StateEntry {
                major: *major,
                record: record.clone(),
            })
            .collect();
        runtimes.sort_by_key(|entry| entry.major);

        let data = serde_json::to_string_pretty(&StateFile { runtimes }).map_err(|e| {
            ProvisioningError::io(&self.path, std::io::Error::other(e.to_string()))
        })?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ProvisioningError::io(parent, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data).map_err(|e| ProvisioningError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| ProvisioningError::io(&self.path, e))?;
        Ok(())
    }
}
