//! Bundled Java runtime selection, provisioning and verification
pub mod discovery;
pub mod major;
pub mod manifest;
pub mod probe;
pub mod provisioner;
pub mod state;

pub use discovery::{NoSystemRuntimes, SystemJavaLocator, SystemRuntimeLocator};
pub use major::RuntimeMajor;
pub use manifest::{BundledRuntime, RuntimeManifest};
pub use probe::{find_java_executable, JavaVersionProbe, ProbeReport, RuntimeProbe};
pub use provisioner::{RuntimeHandle, RuntimeProvisioner, RuntimeSource, RuntimeStatus};
pub use state::{RuntimeRecord, RuntimeState};
