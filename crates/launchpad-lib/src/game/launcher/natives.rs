//! Native library extraction for game launches
use crate::error::NativesError;
use crate::game::installer::core::archive::{ArchiveExtractor, ExtractOptions};
use crate::game::installer::types::{percent, Phase, TaskContext};
use crate::game::launcher::classifier::{
    classifier_from_coordinates, is_platform_library, parse_classifier, PlatformTag,
};
use crate::game::launcher::types::NativeLibrary;
use crate::sync::KeyedLocks;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extracts platform natives into per-version directories.
///
/// Extraction is single-flight per target directory, and re-running it over a
/// populated directory rewrites the same bytes, so it is safe to call before
/// every launch.
pub struct NativeLibraryResolver {
    extractor: ArchiveExtractor,
    platform: Option<PlatformTag>,
    locks: KeyedLocks<PathBuf>,
}

impl NativeLibraryResolver {
    pub fn new(extractor: ArchiveExtractor) -> Self {
        Self {
            extractor,
            platform: PlatformTag::current(),
            locks: KeyedLocks::new(),
        }
    }

    /// Override the host platform tag
    pub fn with_platform(mut self, platform: Option<PlatformTag>) -> Self {
        self.platform = platform;
        self
    }

    pub fn platform(&self) -> Option<PlatformTag> {
        self.platform
    }

    /// Libraries whose classifier targets the current platform
    pub fn matching_libraries<'a>(&self, libraries: &'a [NativeLibrary]) -> Vec<&'a NativeLibrary> {
        let Some(platform) = self.platform else {
            return Vec::new();
        };
        libraries
            .iter()
            .filter(|lib| library_platform(lib) == Some(platform))
            .collect()
    }

    /// Extract every matching library into `target_dir` and return the number
    /// of files written. Relative artifact paths resolve against `libraries_dir`.
    pub async fn extract_natives_for_version(
        &self,
        libraries: &[NativeLibrary],
        libraries_dir: &Path,
        target_dir: &Path,
        ctx: &TaskContext,
    ) -> Result<usize, NativesError> {
        tokio::fs::create_dir_all(target_dir)
            .await
            .map_err(|e| NativesError::Io {
                path: target_dir.to_path_buf(),
                source: e,
            })?;

        // One lock per directory, however the caller spelled its path
        let key = dunce::canonicalize(target_dir).unwrap_or_else(|_| target_dir.to_path_buf());
        let _guard = tokio::select! {
            guard = self.locks.lock(&key) => guard,
            _ = ctx.cancel.cancelled() => return Err(NativesError::Cancelled),
        };
        if ctx.is_cancelled() {
            return Err(NativesError::Cancelled);
        }

        ctx.reporter.start_phase(Phase::ExtractingNatives);

        let Some(platform) = self.platform else {
            log::warn!("No natives are shipped for this host platform; skipping extraction");
            ctx.reporter.set_percent(Phase::ExtractingNatives, 100);
            return Ok(0);
        };

        let matched = self.matching_libraries(libraries);
        log::debug!(
            "{} of {} libraries carry {} natives",
            matched.len(),
            libraries.len(),
            platform
        );

        // A partial natives set only fails later inside the game's loader
        for library in &matched {
            let jar_path = libraries_dir.join(&library.path);
            if !jar_path.is_file() {
                log::error!("Native library {} not found at {:?}", library.name, jar_path);
                return Err(NativesError::MissingArtifact {
                    name: library.name.clone(),
                    path: jar_path,
                });
            }
        }

        let mut count = 0;
        for (index, library) in matched.iter().enumerate() {
            if ctx.is_cancelled() {
                return Err(NativesError::Cancelled);
            }

            let jar_path = libraries_dir.join(&library.path);
            let options = extract_options(library, platform);
            let extractor = self.extractor.clone();
            let dest = target_dir.to_path_buf();
            let cancel = ctx.cancel.clone();
            let source = jar_path.clone();

            log::debug!("Extracting natives from: {:?}", jar_path);
            let written = tokio::task::spawn_blocking(move || {
                extractor.extract_all(
                    &source,
                    &dest,
                    &options,
                    &|| cancel.is_cancelled(),
                    &mut |_, _| {},
                )
            })
            .await
            .map_err(|e| NativesError::Io {
                path: jar_path.clone(),
                source: std::io::Error::other(e.to_string()),
            })?
            .map_err(|e| match e {
                crate::error::ArchiveError::Cancelled => NativesError::Cancelled,
                other => NativesError::Archive(other),
            })?;

            count += written.len();
            ctx.reporter
                .set_percent(Phase::ExtractingNatives, percent(index + 1, matched.len()));
        }

        ctx.reporter.set_percent(Phase::ExtractingNatives, 100);
        log::info!("Extracted {} native files into {:?}", count, target_dir);
        Ok(count)
    }
}

impl Default for NativeLibraryResolver {
    fn default() -> Self {
        Self::new(ArchiveExtractor::default())
    }
}

/// Platform a library's natives target; explicit classifier first, then the
/// one in its coordinates.
fn library_platform(library: &NativeLibrary) -> Option<PlatformTag> {
    library
        .classifier
        .as_deref()
        .or_else(|| classifier_from_coordinates(&library.name))
        .and_then(parse_classifier)
}

/// Old-style natives jars are already flat, so their layout is kept. Artifacts
/// classified through their coordinates nest libraries under platform
/// directories; only the loadable files are pulled up to the root.
fn extract_options(library: &NativeLibrary, platform: PlatformTag) -> ExtractOptions {
    let flatten = library.classifier.is_none();
    ExtractOptions {
        flatten,
        exclude: library.exclude.clone(),
        only_extensions: if flatten {
            platform
                .library_extensions()
                .iter()
                .map(|ext| ext.to_string())
                .collect()
        } else {
            Vec::new()
        },
    }
}

/// Get the natives directory path for a version
pub fn natives_dir(data_dir: &Path, version_id: &str) -> PathBuf {
    data_dir.join("natives").join(version_id)
}

/// Whether `dir` holds at least one loadable library for `platform`
pub fn has_platform_libraries(dir: &Path, platform: PlatformTag) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .any(|e| is_platform_library(&e.file_name().to_string_lossy(), platform))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::installer::core::archive::test_support::write_zip;
    use std::collections::BTreeMap;

    fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
        WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                (
                    e.path().strip_prefix(dir).unwrap().to_path_buf(),
                    std::fs::read(e.path()).unwrap(),
                )
            })
            .collect()
    }

    fn lib(name: &str, path: &str, classifier: Option<&str>) -> NativeLibrary {
        NativeLibrary {
            name: name.into(),
            path: PathBuf::from(path),
            classifier: classifier.map(str::to_string),
            exclude: vec!["META-INF/".into()],
        }
    }

    #[test]
    fn test_natives_dir() {
        assert_eq!(
            natives_dir(Path::new("/data"), "1.8.9"),
            Path::new("/data/natives/1.8.9")
        );
    }

    #[tokio::test]
    async fn foreign_platform_library_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let libs = tmp.path().join("libraries");
        std::fs::create_dir_all(&libs).unwrap();
        write_zip(&libs.join("lwjgl-linux.jar"), &[("liblwjgl.so", b"elf")]);

        let resolver = NativeLibraryResolver::default().with_platform(Some(PlatformTag::WindowsX64));
        let target = tmp.path().join("natives");
        let count = resolver
            .extract_natives_for_version(
                &[lib("org.lwjgl:lwjgl:2.9.4", "lwjgl-linux.jar", Some("natives-linux"))],
                &libs,
                &target,
                &TaskContext::silent(),
            )
            .await
            .unwrap();

        assert_eq!(count, 0);
        assert!(snapshot(&target).is_empty());
    }

    #[tokio::test]
    async fn repeated_extraction_is_identical() {
        let tmp = tempfile::tempdir().unwrap();
        let libs = tmp.path().join("libraries");
        std::fs::create_dir_all(&libs).unwrap();
        write_zip(
            &libs.join("lwjgl-platform.jar"),
            &[
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0"),
                ("liblwjgl.so", b"elf-bytes"),
                ("sub/", b""),
                ("sub/libopenal.so", b"openal"),
            ],
        );
        write_zip(
            &libs.join("glfw-natives-linux.jar"),
            &[
                ("linux/x64/org/lwjgl/glfw/libglfw.so", b"glfw"),
                ("linux/x64/org/lwjgl/glfw/libglfw.so.sha1", b"hash"),
                ("org/lwjgl/glfw/GLFW.class", b"class"),
            ],
        );

        let libraries = vec![
            lib("org.lwjgl.lwjgl:lwjgl-platform:2.9.4", "lwjgl-platform.jar", Some("natives-linux")),
            lib("org.lwjgl:lwjgl-glfw:3.3.3:natives-linux", "glfw-natives-linux.jar", None),
            lib("org.lwjgl:lwjgl-glfw:3.3.3:natives-windows", "glfw-natives-windows.jar", None),
        ];
        let resolver = NativeLibraryResolver::default().with_platform(Some(PlatformTag::Linux));
        let target = tmp.path().join("natives");
        let ctx = TaskContext::silent();

        let first = resolver
            .extract_natives_for_version(&libraries, &libs, &target, &ctx)
            .await
            .unwrap();
        let before = snapshot(&target);
        let second = resolver
            .extract_natives_for_version(&libraries, &libs, &target, &ctx)
            .await
            .unwrap();

        assert_eq!(first, 3);
        assert_eq!(first, second);
        assert_eq!(before, snapshot(&target));
        assert!(before.contains_key(Path::new("liblwjgl.so")));
        assert!(before.contains_key(&Path::new("sub").join("libopenal.so")));
        assert!(before.contains_key(Path::new("libglfw.so")));
        assert!(!before.keys().any(|k| k.starts_with("META-INF")));
        assert!(has_platform_libraries(&target, PlatformTag::Linux));
        assert!(!has_platform_libraries(&target, PlatformTag::WindowsX64));
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let tmp = tempfile::tempdir().unwrap();
        let (handle, token) = crate::game::installer::types::CancelToken::pair();
        handle.cancel();
        let ctx = TaskContext::new(
            std::sync::Arc::new(crate::game::installer::types::SilentProgressReporter),
            token,
        );

        let resolver = NativeLibraryResolver::default().with_platform(Some(PlatformTag::Linux));
        let err = resolver
            .extract_natives_for_version(
                &[lib("a:b:1:natives-linux", "a.jar", None)],
                tmp.path(),
                &tmp.path().join("natives"),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, NativesError::Cancelled));
    }

    #[tokio::test]
    async fn missing_platform_jar_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let libs = tmp.path().join("libraries");
        std::fs::create_dir_all(&libs).unwrap();
        write_zip(&libs.join("lwjgl-natives-linux.jar"), &[("liblwjgl.so", b"elf")]);

        let libraries = vec![
            lib("org.lwjgl:lwjgl:3.3.3:natives-linux", "lwjgl-natives-linux.jar", None),
            lib("org.lwjgl:lwjgl-tinyfd:3.3.3:natives-linux", "tinyfd-natives-linux.jar", None),
        ];
        let resolver = NativeLibraryResolver::default().with_platform(Some(PlatformTag::Linux));
        let target = tmp.path().join("natives");
        let err = resolver
            .extract_natives_for_version(&libraries, &libs, &target, &TaskContext::silent())
            .await
            .unwrap_err();

        match err {
            NativesError::MissingArtifact { name, path } => {
                assert_eq!(name, "org.lwjgl:lwjgl-tinyfd:3.3.3:natives-linux");
                assert!(path.ends_with("tinyfd-natives-linux.jar"));
            }
            other => panic!("expected MissingArtifact, got {:?}", other),
        }
        // Nothing is extracted from a set that cannot be completed
        assert!(snapshot(&target).is_empty());
    }

    #[tokio::test]
    async fn path_spellings_share_one_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = NativeLibraryResolver::default().with_platform(Some(PlatformTag::Linux));
        let plain = tmp.path().join("natives");
        let dotted = tmp.path().join(".").join("natives");

        resolver
            .extract_natives_for_version(&[], tmp.path(), &plain, &TaskContext::silent())
            .await
            .unwrap();
        assert!(resolver.locks.is_empty());

        let key = dunce::canonicalize(&plain).unwrap();
        let _held = resolver.locks.lock(&key).await;
        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(100),
            resolver.extract_natives_for_version(&[], tmp.path(), &dotted, &TaskContext::silent()),
        )
        .await;
        assert!(blocked.is_err(), "second spelling bypassed the held lock");
    }
}
