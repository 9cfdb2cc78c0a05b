pub mod installer;
pub mod launcher;
pub mod runtime;

// Re-export commonly used types
pub use launcher::{GameLauncher, LaunchRequest, LaunchResult};
pub use runtime::{RuntimeMajor, RuntimeProvisioner};
