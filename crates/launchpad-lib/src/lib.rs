//! Runtime provisioning and launch orchestration for the launcher.
//!
//! [`RuntimeProvisioner`] hands out verified Java runtimes from the bundled
//! archives (or a system install as fallback), and [`GameLauncher`] turns a
//! [`LaunchRequest`] into a supervised game process.
pub mod config;
pub mod error;
pub mod game;
pub mod sync;
pub mod utils;

pub use config::{LauncherConfig, RuntimePaths};
pub use error::{
    ArchiveError, AssemblyError, LaunchError, NativesError, ProcessError, ProvisioningError,
    VerificationError,
};
pub use game::installer::{CancelHandle, CancelToken, Phase, ProgressEvent, TaskContext};
pub use game::launcher::{GameLauncher, LaunchRequest, LaunchResult};
pub use game::runtime::{RuntimeHandle, RuntimeMajor, RuntimeProvisioner, RuntimeStatus};
