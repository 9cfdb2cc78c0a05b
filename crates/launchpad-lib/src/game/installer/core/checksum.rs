use crate::error::VerificationError;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{BufReader, Read};
use std::path::Path;
use walkdir::WalkDir;

/// SHA-256 digests of single files and of whole extracted trees.
/// Digests are lowercase hex.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Streamed SHA-256 of one file
    pub fn compute_digest(&self, path: &Path) -> Result<String, VerificationError> {
        let file = fs::File::open(path).map_err(|e| io_err(path, e))?;
        let mut hasher = Sha256::new();
        feed(&mut hasher, BufReader::new(file), path)?;
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Compare the digest of `path` against `expected` (case-insensitive hex).
    pub fn verify(&self, path: &Path, expected: &str) -> Result<(), VerificationError> {
        let actual = self.compute_digest(path)?;
        if actual.eq_ignore_ascii_case(expected.trim()) {
            Ok(())
        } else {
            log::warn!(
                "Checksum mismatch for {:?}: expected {}, got {}",
                path,
                expected,
                actual
            );
            Err(VerificationError::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: expected.to_ascii_lowercase(),
                actual,
            })
        }
    }

    /// Digest of every regular file under `root`, visited in sorted order.
    /// Relative paths (always `/`-separated) are mixed in so renames and
    /// moves change the result, not only content edits.
    pub fn compute_tree_digest(&self, root: &Path) -> Result<String, VerificationError> {
        let mut hasher = Sha256::new();

        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                io_err(&path, source)
            })?;

            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            hasher.update(rel.as_bytes());
            hasher.update([0u8]);

            if file_type.is_symlink() {
                let target = fs::read_link(entry.path()).map_err(|e| io_err(entry.path(), e))?;
                hasher.update(b"link:");
                hasher.update(target.to_string_lossy().as_bytes());
            } else {
                let file = fs::File::open(entry.path()).map_err(|e| io_err(entry.path(), e))?;
                feed(&mut hasher, BufReader::new(file), entry.path())?;
            }
            hasher.update([0u8]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    /// [`Self::compute_digest`] on the blocking pool
    pub async fn compute_digest_async(&self, path: &Path) -> Result<String, VerificationError> {
        let path = path.to_path_buf();
        let verifier = *self;
        join_blocking(&path.clone(), move || verifier.compute_digest(&path)).await
    }

    /// [`Self::compute_tree_digest`] on the blocking pool
    pub async fn compute_tree_digest_async(
        &self,
        root: &Path,
    ) -> Result<String, VerificationError> {
        let root = root.to_path_buf();
        let verifier = *self;
        join_blocking(&root.clone(), move || verifier.compute_tree_digest(&root)).await
    }
}

fn feed<R: Read>(hasher: &mut Sha256, mut reader: R, path: &Path) -> Result<(), VerificationError> {
    let mut buffer = [0u8; 8192];
    loop {
        let read = reader.read(&mut buffer).map_err(|e| io_err(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(())
}

async fn join_blocking<F>(path: &Path, f: F) -> Result<String, VerificationError>
where
    F: FnOnce() -> Result<String, VerificationError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| io_err(path, std::io::Error::other(e.to_string())))?
}

fn io_err(path: &Path, source: std::io::Error) -> VerificationError {
    VerificationError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hello.txt");
        fs::write(&path, b"hello").unwrap();

        let digest = ChecksumVerifier.compute_digest(&path).unwrap();
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        ChecksumVerifier
            .verify(&path, "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824")
            .unwrap();
    }

    #[test]
    fn mismatch_reports_both_digests() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.bin");
        fs::write(&path, b"abc").unwrap();

        let err = ChecksumVerifier.verify(&path, "00").unwrap_err();
        match err {
            VerificationError::ChecksumMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, "00");
                assert_eq!(actual.len(), 64);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ChecksumVerifier
            .compute_digest(&tmp.path().join("missing"))
            .unwrap_err();
        assert!(matches!(err, VerificationError::Io { .. }));
    }

    #[test]
    fn tree_digest_tracks_content_and_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("tree");
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("bin/java"), b"exe").unwrap();
        fs::write(root.join("release"), b"JAVA_VERSION=17").unwrap();

        let first = ChecksumVerifier.compute_tree_digest(&root).unwrap();
        assert_eq!(first, ChecksumVerifier.compute_tree_digest(&root).unwrap());

        fs::write(root.join("bin/java"), b"EXE").unwrap();
        let edited = ChecksumVerifier.compute_tree_digest(&root).unwrap();
        assert_ne!(first, edited);

        fs::write(root.join("bin/java"), b"exe").unwrap();
        fs::rename(root.join("release"), root.join("bin/release")).unwrap();
        let moved = ChecksumVerifier.compute_tree_digest(&root).unwrap();
        assert_ne!(first, moved);
    }

    #[tokio::test]
    async fn async_variant_matches() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("x");
        fs::write(&path, vec![7u8; 20_000]).unwrap();

        let sync = ChecksumVerifier.compute_digest(&path).unwrap();
        let async_digest = ChecksumVerifier.compute_digest_async(&path).await.unwrap();
        assert_eq!(sync, async_digest);
    }
}
