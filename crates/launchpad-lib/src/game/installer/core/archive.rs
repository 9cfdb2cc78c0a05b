//! ZIP-family archive reading and extraction shared by runtime unpacking and
//! natives extraction.
use crate::error::ArchiveError;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

type Archive = ZipArchive<BufReader<File>>;

/// Metadata for one archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
}

/// Lazy iterator over the entries of one opened archive.
/// Each call to [`ArchiveExtractor::list_entries`] opens a fresh one.
pub struct ArchiveEntries {
    archive: Archive,
    path: PathBuf,
    index: usize,
}

impl Iterator for ArchiveEntries {
    type Item = Result<EntryMeta, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.archive.len() {
            return None;
        }
        let index = self.index;
        self.index += 1;

        Some(
            self.archive
                .by_index_raw(index)
                .map(|file| EntryMeta {
                    name: file.name().to_string(),
                    is_directory: file.is_dir(),
                    size: file.size(),
                })
                .map_err(|e| ArchiveError::from_zip(&self.path, e)),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.archive.len().saturating_sub(self.index);
        (left, Some(left))
    }
}

/// How extracted entries are laid out under the destination
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Drop directory structure and write every file at the destination root
    pub flatten: bool,

    /// Entry name prefixes to skip in addition to signature metadata
    pub exclude: Vec<String>,

    /// When non-empty, only files with one of these extensions are written
    pub only_extensions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    signature_prefixes: Vec<String>,
}

impl Default for ArchiveExtractor {
    fn default() -> Self {
        Self::new(vec![crate::config::SIGNATURE_PREFIX.to_string()])
    }
}

impl ArchiveExtractor {
    pub fn new(signature_prefixes: Vec<String>) -> Self {
        Self { signature_prefixes }
    }

    /// True for entries under the archive signing directory.
    pub fn is_signature_entry(&self, name: &str) -> bool {
        let name = name.trim_start_matches('/');
        self.signature_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }

    pub fn list_entries(&self, archive: &Path) -> Result<ArchiveEntries, ArchiveError> {
        Ok(ArchiveEntries {
            archive: open_archive(archive)?,
            path: archive.to_path_buf(),
            index: 0,
        })
    }

    /// Extract a single entry, preserving its relative path under `destination_root`.
    /// Returns `None` for signature metadata, which is never written.
    pub fn extract_entry(
        &self,
        archive: &Path,
        entry: &str,
        destination_root: &Path,
    ) -> Result<Option<PathBuf>, ArchiveError> {
        if self.is_signature_entry(entry) {
            log::debug!("Skipping signature entry {} in {:?}", entry, archive);
            return Ok(None);
        }

        let mut zip = open_archive(archive)?;
        let mut file = zip.by_name(entry).map_err(|e| match e {
            zip::result::ZipError::FileNotFound => ArchiveError::MissingEntry {
                archive: archive.to_path_buf(),
                entry: entry.to_string(),
            },
            other => ArchiveError::from_zip(archive, other),
        })?;

        let out_path = safe_join(destination_root, file.name())?;
        if file.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| ArchiveError::io(&out_path, e))?;
            return Ok(Some(out_path));
        }

        let mode = file.unix_mode();
        write_entry(&mut file, &out_path, mode)?;
        Ok(Some(out_path))
    }

    /// Extract every eligible entry. `cancelled` is polled before each entry and
    /// `progress` receives `(done, total)` after each one.
    pub fn extract_all(
        &self,
        archive: &Path,
        destination_root: &Path,
        options: &ExtractOptions,
        cancelled: &dyn Fn() -> bool,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<Vec<PathBuf>, ArchiveError> {
        log::debug!("Extracting {:?} -> {:?}", archive, destination_root);

        let mut zip = open_archive(archive)?;
        std::fs::create_dir_all(destination_root)
            .map_err(|e| ArchiveError::io(destination_root, e))?;

        let total = zip.len();
        let mut written = Vec::new();

        for index in 0..total {
            if cancelled() {
                return Err(ArchiveError::Cancelled);
            }

            let mut file = zip
                .by_index(index)
                .map_err(|e| ArchiveError::from_zip(archive, e))?;
            let name = file.name().to_string();

            if self.is_signature_entry(&name)
                || options.exclude.iter().any(|ex| name.starts_with(ex.as_str()))
            {
                progress(index + 1, total);
                continue;
            }

            // Validate the full name even when flattening so `../` entries never pass silently.
            let full_path = safe_join(destination_root, &name)?;

            if file.is_dir() {
                if !options.flatten {
                    std::fs::create_dir_all(&full_path)
                        .map_err(|e| ArchiveError::io(&full_path, e))?;
                }
                progress(index + 1, total);
                continue;
            }

            if !options.only_extensions.is_empty() && !has_extension(&name, &options.only_extensions) {
                progress(index + 1, total);
                continue;
            }

            let out_path = if options.flatten {
                match full_path.file_name() {
                    Some(file_name) => destination_root.join(file_name),
                    None => {
                        progress(index + 1, total);
                        continue;
                    }
                }
            } else {
                full_path
            };

            let mode = file.unix_mode();
            write_entry(&mut file, &out_path, mode)?;
            written.push(out_path);
            progress(index + 1, total);
        }

        log::debug!("Extracted {} files from {:?}", written.len(), archive);
        Ok(written)
    }
}

fn has_extension(name: &str, extensions: &[String]) -> bool {
    let lower = name.to_lowercase();
    extensions
        .iter()
        .any(|ext| lower.ends_with(&format!(".{}", ext.to_lowercase())))
}

fn open_archive(path: &Path) -> Result<Archive, ArchiveError> {
    let file = File::open(path).map_err(|e| ArchiveError::io(path, e))?;
    ZipArchive::new(BufReader::new(file)).map_err(|e| ArchiveError::from_zip(path, e))
}

/// Resolve `entry_name` under `root`, rejecting anything that would land outside it.
pub fn safe_join(root: &Path, entry_name: &str) -> Result<PathBuf, ArchiveError> {
    let unsafe_path = || ArchiveError::UnsafePath {
        entry: entry_name.to_string(),
    };

    let normalized = entry_name.replace('\\', "/");
    if normalized.starts_with('/') || normalized.contains('\0') {
        return Err(unsafe_path());
    }

    let mut parts: Vec<&str> = Vec::new();
    for (i, part) in normalized.split('/').enumerate() {
        match part {
            "" | "." => continue,
            ".." => {
                if parts.pop().is_none() {
                    return Err(unsafe_path());
                }
            }
            // Drive prefixes such as `C:` are absolute on Windows.
            p if i == 0 && p.contains(':') => return Err(unsafe_path()),
            p => parts.push(p),
        }
    }

    let mut out = root.to_path_buf();
    for part in parts {
        out.push(part);
    }
    Ok(out)
}

fn write_entry<R: std::io::Read>(
    reader: &mut R,
    out_path: &Path,
    mode: Option<u32>,
) -> Result<(), ArchiveError> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
    }

    let mut out = File::create(out_path).map_err(|e| ArchiveError::io(out_path, e))?;
    std::io::copy(reader, &mut out).map_err(|e| ArchiveError::io(out_path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Some(mode) = mode {
            // Owner read/write is kept so a later re-extraction can overwrite.
            let perms = std::fs::Permissions::from_mode((mode & 0o777) | 0o600);
            std::fs::set_permissions(out_path, perms).map_err(|e| ArchiveError::io(out_path, e))?;
        }
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write;
    use std::path::Path;
    use zip::write::SimpleFileOptions;

    /// Write a zip with the given `(name, contents)` file entries.
    pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let f = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(f);
        for (name, data) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                zip.start_file(*name, SimpleFileOptions::default().unix_permissions(0o755))
                    .unwrap();
                zip.write_all(data).unwrap();
            }
        }
        zip.finish().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::write_zip;
    use super::*;

    #[test]
    fn lists_entries_and_restarts_per_call() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("a.zip");
        write_zip(
            &zip_path,
            &[("bin/", b""), ("bin/java", b"exe"), ("lib/rt.jar", b"classes")],
        );

        let extractor = ArchiveExtractor::default();
        let entries: Vec<EntryMeta> = extractor
            .list_entries(&zip_path)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_directory);
        assert_eq!(entries[1].name, "bin/java");
        assert_eq!(entries[1].size, 3);

        let again = extractor.list_entries(&zip_path).unwrap().count();
        assert_eq!(again, 3);
    }

    #[test]
    fn extract_entry_creates_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("a.zip");
        write_zip(&zip_path, &[("deep/nested/file.txt", b"hello")]);

        let dest = tmp.path().join("out");
        let extractor = ArchiveExtractor::default();
        let written = extractor
            .extract_entry(&zip_path, "deep/nested/file.txt", &dest)
            .unwrap()
            .unwrap();

        assert_eq!(written, dest.join("deep").join("nested").join("file.txt"));
        assert_eq!(std::fs::read(&written).unwrap(), b"hello");
    }

    #[test]
    fn extract_entry_skips_signature_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("signed.jar");
        write_zip(&zip_path, &[("META-INF/MOJANGCS.SF", b"sig"), ("lib.so", b"x")]);

        let dest = tmp.path().join("out");
        let extractor = ArchiveExtractor::default();
        assert!(extractor
            .extract_entry(&zip_path, "META-INF/MOJANGCS.SF", &dest)
            .unwrap()
            .is_none());
        assert!(!dest.join("META-INF").exists());
    }

    #[test]
    fn missing_entry_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("a.zip");
        write_zip(&zip_path, &[("a.txt", b"a")]);

        let err = ArchiveExtractor::default()
            .extract_entry(&zip_path, "b.txt", tmp.path())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::MissingEntry { .. }));
    }

    #[test]
    fn rejects_traversal_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("evil.zip");
        write_zip(&zip_path, &[("ok.txt", b"fine"), ("../evil.txt", b"pwned")]);

        let dest = tmp.path().join("out");
        let err = ArchiveExtractor::default()
            .extract_all(&zip_path, &dest, &ExtractOptions::default(), &|| false, &mut |_, _| {})
            .unwrap_err();

        assert!(matches!(err, ArchiveError::UnsafePath { .. }));
        assert!(!tmp.path().join("evil.txt").exists());
    }

    #[test]
    fn safe_join_stays_under_root() {
        let root = Path::new("/dest");
        for name in ["a/b.txt", "./a/./b.txt", "a/../b.txt", "a\\b.txt"] {
            let joined = safe_join(root, name).unwrap();
            assert!(joined.starts_with(root), "{} escaped: {:?}", name, joined);
        }

        for name in ["../x", "a/../../x", "/etc/passwd", "C:/Windows/x", "..\\x"] {
            assert!(
                matches!(safe_join(root, name), Err(ArchiveError::UnsafePath { .. })),
                "{} should be rejected",
                name
            );
        }
    }

    #[test]
    fn extracted_paths_canonicalize_under_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("a.zip");
        write_zip(
            &zip_path,
            &[("x/../y/z.txt", b"1"), ("./w.txt", b"2"), ("q/r/s.txt", b"3")],
        );

        let dest = tmp.path().join("out");
        let written = ArchiveExtractor::default()
            .extract_all(&zip_path, &dest, &ExtractOptions::default(), &|| false, &mut |_, _| {})
            .unwrap();

        let canon_root = dunce::canonicalize(&dest).unwrap();
        assert_eq!(written.len(), 3);
        for path in written {
            let canon = dunce::canonicalize(&path).unwrap();
            assert!(canon.starts_with(&canon_root), "{:?} escaped", canon);
        }
    }

    #[test]
    fn flatten_and_filter_apply() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("natives.jar");
        write_zip(
            &zip_path,
            &[
                ("linux/x64/org/lwjgl/liblwjgl.so", b"so"),
                ("linux/x64/org/lwjgl/liblwjgl.so.sha1", b"hash"),
                ("META-INF/MANIFEST.MF", b"m"),
            ],
        );

        let dest = tmp.path().join("natives");
        let options = ExtractOptions {
            flatten: true,
            exclude: vec![],
            only_extensions: vec!["so".to_string()],
        };
        let written = ArchiveExtractor::default()
            .extract_all(&zip_path, &dest, &options, &|| false, &mut |_, _| {})
            .unwrap();

        assert_eq!(written, vec![dest.join("liblwjgl.so")]);
        assert!(!dest.join("META-INF").exists());
    }

    #[test]
    fn corrupt_archive_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.zip");
        std::fs::write(&path, b"definitely not a zip").unwrap();

        let err = ArchiveExtractor::default().list_entries(&path).err().unwrap();
        assert!(matches!(err, ArchiveError::Corrupt { .. }));
    }

    #[test]
    fn cancellation_stops_extraction() {
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("a.zip");
        write_zip(&zip_path, &[("a.txt", b"a"), ("b.txt", b"b")]);

        let err = ArchiveExtractor::default()
            .extract_all(
                &zip_path,
                &tmp.path().join("out"),
                &ExtractOptions::default(),
                &|| true,
                &mut |_, _| {},
            )
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Cancelled));
    }
}
