//! Error taxonomy for provisioning and launching.
//!
//! Every component returns its own error enum; [`LaunchError`] is the umbrella
//! the orchestrator hands back to callers. Only [`ProvisioningError::NoCompatibleRuntime`]
//! is meant to be shown to end users as-is.
use crate::game::runtime::RuntimeMajor;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive {path:?} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("archive entry '{entry}' would escape the destination directory")]
    UnsafePath { entry: String },

    #[error("archive {archive:?} has no entry named '{entry}'")]
    MissingEntry { archive: PathBuf, entry: String },

    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("extraction cancelled")]
    Cancelled,
}

impl ArchiveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArchiveError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn from_zip(path: &std::path::Path, err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(source) => ArchiveError::io(path, source),
            other => ArchiveError::Corrupt {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("execution probe of {path:?} failed: {reason}")]
    ExecutionProbeFailed { path: PathBuf, reason: String },

    #[error("no java executable found under {root:?}")]
    ExecutableMissing { root: PathBuf },

    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error(
        "No compatible Java runtime for Java {major} (tried: {}). \
         Reinstall the launcher to restore its bundled runtimes, or install Java {major} \
         and make sure it is on PATH or JAVA_HOME.",
        attempts.join("; ")
    )]
    NoCompatibleRuntime {
        major: RuntimeMajor,
        attempts: Vec<String>,
    },

    #[error("Java {0} is not part of the bundled runtime manifest")]
    NotBundled(RuntimeMajor),

    #[error("bundled Java {major} runtime is unusable until reinstalled: {reason}")]
    Unusable { major: RuntimeMajor, reason: String },

    #[error("invalid runtime manifest {path:?}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("runtime provisioning cancelled")]
    Cancelled,
}

impl ProvisioningError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProvisioningError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum NativesError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("native library {name} not found at {path:?}")]
    MissingArtifact { name: String, path: PathBuf },

    #[error("native library extraction cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("no resolver for placeholder '${{{name}}}' in '{template}'")]
    UnresolvedPlaceholder { name: String, template: String },

    #[error("unterminated placeholder in '{template}'")]
    MalformedPlaceholder { template: String },
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn {executable:?}: {source}")]
    SpawnFailed {
        executable: PathBuf,
        source: std::io::Error,
    },

    #[error(
        "process crashed {runtime:?} after launch (exit code {code:?}, signal {signal:?}); last output:\n{}",
        output.join("\n")
    )]
    CrashedAtLaunch {
        code: Option<i32>,
        signaled: bool,
        /// Terminating signal number on unix
        signal: Option<i32>,
        runtime: Duration,
        output: Vec<String>,
    },

    #[error("failed to wait for process {pid}: {source}")]
    Wait { pid: u32, source: std::io::Error },

    #[error("failed to terminate process {pid}: {reason}")]
    Terminate { pid: u32, reason: String },
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    #[error(transparent)]
    Natives(#[from] NativesError),

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("required library not found: {path:?}")]
    LibraryMissing { path: PathBuf },

    #[error("natives directory {dir:?} holds no platform libraries after extraction")]
    NativesMissing { dir: PathBuf },

    #[error("launch cancelled before the game process started")]
    Cancelled,
}
