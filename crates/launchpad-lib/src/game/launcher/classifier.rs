use serde::{Deserialize, Serialize};
use std::fmt;

/// Platforms natives are shipped for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformTag {
    WindowsX64,
    Macos,
    MacosArm64,
    Linux,
}

impl PlatformTag {
    /// Tag of the running host, if it is one natives are shipped for
    pub fn current() -> Option<PlatformTag> {
        match (std::env::consts::OS, std::env::consts::ARCH) {
            ("windows", "x86_64") => Some(PlatformTag::WindowsX64),
            ("macos", "aarch64") => Some(PlatformTag::MacosArm64),
            ("macos", _) => Some(PlatformTag::Macos),
            ("linux", _) => Some(PlatformTag::Linux),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformTag::WindowsX64 => "windows-x64",
            PlatformTag::Macos => "macos",
            PlatformTag::MacosArm64 => "macos-arm64",
            PlatformTag::Linux => "linux",
        }
    }

    /// File extensions of loadable native libraries on this platform
    pub fn library_extensions(&self) -> &'static [&'static str] {
        match self {
            PlatformTag::WindowsX64 => &["dll"],
            PlatformTag::Macos | PlatformTag::MacosArm64 => &["dylib", "jnilib"],
            PlatformTag::Linux => &["so"],
        }
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arch bits substituted into templates like `natives-windows-${arch}`
pub(crate) fn arch_bits() -> &'static str {
    if cfg!(target_pointer_width = "32") {
        "32"
    } else {
        "64"
    }
}

/// Map a classifier such as `natives-windows-${arch}`, `natives-osx` or
/// `natives-macos-arm64` to its platform. Unknown or foreign-arch
/// classifiers (e.g. `natives-linux-arm64`, `natives-windows-x86`) map to `None`.
pub fn parse_classifier(classifier: &str) -> Option<PlatformTag> {
    let lowered = classifier.trim().to_lowercase().replace("${arch}", arch_bits());
    let key = lowered.strip_prefix("natives-").unwrap_or(&lowered);

    match key {
        "windows" | "windows-64" | "windows-x64" | "windows-x86_64" | "windows-amd64" => {
            Some(PlatformTag::WindowsX64)
        }
        "osx" | "macos" | "osx-64" | "macos-64" | "macos-x64" => Some(PlatformTag::Macos),
        "osx-arm64" | "macos-arm64" | "macos-aarch64" => Some(PlatformTag::MacosArm64),
        "linux" | "linux-64" | "linux-x64" | "linux-x86_64" => Some(PlatformTag::Linux),
        _ => None,
    }
}

/// Fourth part of maven coordinates `group:artifact:version:classifier`
pub(crate) fn classifier_from_coordinates(name: &str) -> Option<&str> {
    let mut parts = name.split(':');
    let _group = parts.next()?;
    let _artifact = parts.next()?;
    let _version = parts.next()?;
    parts.next().filter(|c| !c.is_empty())
}

/// Whether an archive entry is a loadable native library for `platform`
pub(crate) fn is_platform_library(name: &str, platform: PlatformTag) -> bool {
    let lower = name.to_lowercase();
    platform
        .library_extensions()
        .iter()
        .any(|ext| lower.ends_with(&format!(".{}", ext)))
}
