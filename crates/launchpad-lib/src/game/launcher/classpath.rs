//! Classpath construction for the game process
use crate::error::LaunchError;
use std::path::{Path, PathBuf};

pub fn classpath_separator() -> &'static str {
    if cfg!(windows) {
        ";"
    } else {
        ":"
    }
}

/// Join classpath entries with the host separator. Relative entries are
/// resolved against `libraries_dir`; a missing entry fails the launch.
pub fn build_classpath(entries: &[PathBuf], libraries_dir: &Path) -> Result<String, LaunchError> {
    let mut resolved = Vec::with_capacity(entries.len());

    for entry in entries {
        let full_path = libraries_dir.join(entry);
        if !full_path.exists() {
            return Err(LaunchError::LibraryMissing { path: full_path });
        }
        resolved.push(full_path.to_string_lossy().to_string());
    }

    Ok(resolved.join(classpath_separator()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_existing_entries() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("a.jar"), b"a").unwrap();
        std::fs::create_dir_all(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("nested/b.jar"), b"b").unwrap();

        let classpath = build_classpath(
            &[PathBuf::from("a.jar"), PathBuf::from("nested/b.jar")],
            tmp.path(),
        )
        .unwrap();

        let parts: Vec<&str> = classpath.split(classpath_separator()).collect();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].ends_with("a.jar"));
        assert!(parts[1].ends_with("b.jar"));
    }

    #[test]
    fn missing_entry_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let err = build_classpath(&[PathBuf::from("gone.jar")], tmp.path()).unwrap_err();
        assert!(matches!(err, LaunchError::LibraryMissing { .. }));
    }
}
