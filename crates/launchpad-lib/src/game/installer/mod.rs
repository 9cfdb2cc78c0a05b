//! Archive extraction, checksums and progress plumbing shared by provisioning and launching
pub mod core;
pub mod types;

pub use self::core::archive::{ArchiveExtractor, EntryMeta, ExtractOptions};
pub use self::core::checksum::ChecksumVerifier;
pub use types::{
    CancelHandle, CancelToken, ChannelProgressReporter, Phase, ProgressEvent, ProgressReporter,
    SilentProgressReporter, TaskContext,
};
