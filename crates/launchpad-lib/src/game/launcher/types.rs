//! Inputs and outputs of a game launch
use crate::error::LaunchError;
use crate::game::launcher::template::ArgumentTemplate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Per-instance launch settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    /// Unique identifier for this instance
    pub instance_id: String,

    /// Instance-specific game directory
    pub game_dir: PathBuf,

    /// Minimum memory in MB
    pub min_memory: Option<u32>,

    /// Maximum memory in MB
    pub max_memory: Option<u32>,

    /// Extra JVM flags (replace the default tuning flags)
    pub jvm_args: Vec<String>,

    /// Extra game arguments (appended after the template)
    pub game_args: Vec<String>,

    pub window_width: Option<u32>,
    pub window_height: Option<u32>,

    /// File that receives the game's output
    pub log_file: Option<PathBuf>,
}

/// Authenticated player
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthRecord {
    pub username: String,
    pub uuid: String,
    pub access_token: String,

    /// "msa" or "legacy"
    pub user_type: String,

    /// Xbox user id, only present for MSA accounts
    pub xuid: Option<String>,

    pub client_id: String,
}

/// Library artifact that may carry native binaries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeLibrary {
    /// Maven coordinates, e.g. `org.lwjgl:lwjgl:3.3.3:natives-linux`
    pub name: String,

    /// Artifact path, relative to the libraries directory or absolute
    pub path: PathBuf,

    /// Explicit natives classifier (`natives-windows`, `natives-osx-${arch}`, ...)
    pub classifier: Option<String>,

    /// Entry prefixes never extracted from this artifact
    pub exclude: Vec<String>,
}

/// Resolved version metadata handed over by version management
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionMetadata {
    /// Game version id, e.g. "1.20.1"
    pub id: String,

    #[serde(default)]
    pub version_type: Option<String>,

    pub main_class: String,

    #[serde(default)]
    pub asset_index: Option<String>,

    /// Absent for versions that only ship a game argument string
    #[serde(default)]
    pub jvm_arguments: Option<ArgumentTemplate>,

    pub game_arguments: ArgumentTemplate,

    /// Classpath entries, relative to the libraries directory or absolute
    #[serde(default)]
    pub classpath: Vec<PathBuf>,

    #[serde(default)]
    pub natives: Vec<NativeLibrary>,
}

/// Everything needed to launch one game instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchRequest {
    /// Root data directory shared by all instances
    pub data_dir: PathBuf,
    pub profile: Profile,
    pub auth: AuthRecord,
    pub version: VersionMetadata,
}

impl LaunchRequest {
    pub fn libraries_dir(&self) -> PathBuf {
        self.data_dir.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.data_dir.join("assets")
    }

    /// Natives are shared per game version
    pub fn natives_dir(&self) -> PathBuf {
        self.data_dir.join("natives").join(&self.version.id)
    }
}

/// How a supervised process ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitReport {
    pub code: Option<i32>,
    pub signaled: bool,
    pub signal: Option<i32>,
    pub runtime: Duration,
    pub output_tail: Vec<String>,
}

impl ExitReport {
    pub fn success(&self) -> bool {
        !self.signaled && self.code == Some(0)
    }
}

#[derive(Debug)]
pub enum LaunchOutcome {
    Exited(ExitReport),
    Failed(LaunchError),
}

/// Result of a launch request once supervision completes
#[derive(Debug)]
pub struct LaunchResult {
    pub success: bool,
    pub outcome: LaunchOutcome,
}

impl LaunchResult {
    pub fn exited(report: ExitReport) -> Self {
        Self {
            success: report.success(),
            outcome: LaunchOutcome::Exited(report),
        }
    }

    pub fn failed(error: LaunchError) -> Self {
        Self {
            success: false,
            outcome: LaunchOutcome::Failed(error),
        }
    }

    pub fn exit_report(&self) -> Option<&ExitReport> {
        match &self.outcome {
            LaunchOutcome::Exited(report) => Some(report),
            LaunchOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&LaunchError> {
        match &self.outcome {
            LaunchOutcome::Failed(err) => Some(err),
            LaunchOutcome::Exited(_) => None,
        }
    }
}
