//! Natives, argument assembly and process supervision for game launches
pub mod arguments;
pub mod classifier;
pub mod classpath;
pub mod context;
pub mod natives;
pub mod orchestrator;
pub mod process;
pub mod sanitize;
pub mod template;
pub mod types;

// Re-export commonly used types
pub use arguments::LaunchArgumentAssembler;
pub use classifier::{parse_classifier, PlatformTag};
pub use classpath::build_classpath;
pub use context::{LaunchContext, Lookup, Value};
pub use natives::{has_platform_libraries, natives_dir, NativeLibraryResolver};
pub use orchestrator::{GameLauncher, PreparedLaunch};
pub use process::{quote_arg, LogCallback, OutputSink, ProcessHandle, ProcessSupervisor};
pub use template::{ArgumentPair, ArgumentTemplate, CompiledTemplate};
pub use types::{
    AuthRecord, ExitReport, LaunchOutcome, LaunchRequest, LaunchResult, NativeLibrary, Profile,
    VersionMetadata,
};
