//! Launcher settings.
//! Defaults live in constants; a JSON file can override any subset of them.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Verified runtimes are trusted for this long before a re-check is scheduled.
pub const DEFAULT_FRESHNESS_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;
/// A failing exit inside this window after spawn counts as a launch-time crash.
pub const DEFAULT_CRASH_GRACE_PERIOD_SECS: u64 = 10;
pub const DEFAULT_OUTPUT_TAIL_LINES: usize = 50;
pub const DEFAULT_TERMINATE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;
/// Archive signing directory; never payload.
pub const SIGNATURE_PREFIX: &str = "META-INF/";

pub const RUNTIME_MANIFEST_FILE: &str = "manifest.json";
pub const RUNTIME_STATE_FILE: &str = "runtimes.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub freshness_window_secs: u64,
    pub crash_grace_period_secs: u64,
    pub output_tail_lines: usize,
    pub terminate_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub signature_prefixes: Vec<String>,
    pub launcher_name: String,
    pub launcher_version: String,
    pub detach_processes: bool,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            freshness_window_secs: DEFAULT_FRESHNESS_WINDOW_SECS,
            crash_grace_period_secs: DEFAULT_CRASH_GRACE_PERIOD_SECS,
            output_tail_lines: DEFAULT_OUTPUT_TAIL_LINES,
            terminate_timeout_secs: DEFAULT_TERMINATE_TIMEOUT_SECS,
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT_SECS,
            signature_prefixes: vec![SIGNATURE_PREFIX.to_string()],
            launcher_name: "Launchpad".to_string(),
            launcher_version: env!("CARGO_PKG_VERSION").to_string(),
            detach_processes: true,
        }
    }
}

impl LauncherConfig {
    /// Load settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No launcher config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Read launcher config {:?}", path))?;
        let config: Self = serde_json::from_str(&data)
            .with_context(|| format!("Parse launcher config {:?}", path))?;
        Ok(config)
    }

    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.freshness_window_secs.min(i64::MAX as u64) as i64)
    }

    pub fn crash_grace_period(&self) -> Duration {
        Duration::from_secs(self.crash_grace_period_secs)
    }

    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_secs(self.terminate_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// On-disk layout of the runtime store
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    /// Root under which extracted runtimes live (`<runtimes_dir>/java-<major>`)
    pub runtimes_dir: PathBuf,

    /// Bundled runtime manifest (archive locations and digests)
    pub manifest_path: PathBuf,

    /// Persisted per-runtime verification state
    pub state_path: PathBuf,
}

impl RuntimePaths {
    /// Standard layout: manifest and bundled archives under `bundle_dir`,
    /// extracted trees and state under `data_dir/runtimes`.
    pub fn new(bundle_dir: &Path, data_dir: &Path) -> Self {
        let runtimes_dir = data_dir.join("runtimes");
        Self {
            manifest_path: bundle_dir.join(RUNTIME_MANIFEST_FILE),
            state_path: runtimes_dir.join(RUNTIME_STATE_FILE),
            runtimes_dir,
        }
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.runtimes_dir.join(".staging")
    }
}
