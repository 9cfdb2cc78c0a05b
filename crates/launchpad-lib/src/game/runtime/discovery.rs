use super::probe::find_java_executable;
use std::collections::HashSet;
use std::path::PathBuf;

/// Source of system-installed runtime executables, consulted when the
/// bundled runtime for a major version cannot be used.
pub trait SystemRuntimeLocator: Send + Sync {
    /// Candidate java executables, most preferred first. Candidates are
    /// probed before use, so listing a wrong major is harmless.
    fn candidates(&self) -> Vec<PathBuf>;
}

/// Looks at `JAVA_HOME`, every `java` on `PATH` and the usual per-OS install roots.
#[derive(Debug, Clone, Default)]
pub struct SystemJavaLocator;

impl SystemJavaLocator {
    fn search_roots() -> Vec<PathBuf> {
        let mut roots = Vec::new();

        #[cfg(windows)]
        {
            roots.push(PathBuf::from("C:\\Program Files\\Java"));
            roots.push(PathBuf::from("C:\\Program Files (x86)\\Java"));
            roots.push(PathBuf::from("C:\\Program Files\\Eclipse Adoptium"));
            roots.push(PathBuf::from("C:\\Program Files\\Zulu"));
        }

        #[cfg(target_os = "macos")]
        {
            roots.push(PathBuf::from("/Library/Java/JavaVirtualMachines"));
        }

        #[cfg(target_os = "linux")]
        {
            roots.push(PathBuf::from("/usr/lib/jvm"));
            roots.push(PathBuf::from("/usr/java"));
        }

        roots
    }
}

impl SystemRuntimeLocator for SystemJavaLocator {
    fn candidates(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        let mut push = |path: PathBuf| {
            let key = dunce::canonicalize(&path).unwrap_or_else(|_| path.clone());
            if seen.insert(key) {
                found.push(path);
            }
        };

        if let Some(home) = std::env::var_os("JAVA_HOME") {
            if let Some(exe) = find_java_executable(&PathBuf::from(home)) {
                push(exe);
            }
        }

        if let Ok(on_path) = which::which_all("java") {
            for exe in on_path {
                push(exe);
            }
        }

        for root in Self::search_roots() {
            let Ok(entries) = std::fs::read_dir(&root) else {
                continue;
            };
            let mut dirs: Vec<PathBuf> = entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            // Newest-looking directory names first
            dirs.sort();
            dirs.reverse();
            for dir in dirs {
                if let Some(exe) = find_java_executable(&dir) {
                    push(exe);
                }
            }
        }

        log::debug!("Found {} system java candidates", found.len());
        found
    }
}

/// Never finds anything. For hosts that must only use bundled runtimes.
#[derive(Debug, Clone, Default)]
pub struct NoSystemRuntimes;

impl SystemRuntimeLocator for NoSystemRuntimes {
    fn candidates(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}
