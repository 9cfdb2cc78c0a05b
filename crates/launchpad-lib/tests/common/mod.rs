#![allow(dead_code)]

use futures::future::BoxFuture;
use launchpad_lib::error::VerificationError;
use launchpad_lib::game::installer::{ChannelProgressReporter, ChecksumVerifier, ProgressEvent, TaskContext};
use launchpad_lib::game::runtime::{
    ProbeReport, RuntimeManifest, RuntimeProbe, RuntimeProvisioner, SystemRuntimeLocator,
};
use launchpad_lib::{CancelToken, LauncherConfig, RuntimePaths};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use zip::write::SimpleFileOptions;

/// Shell script standing in for a `java` binary. It prints its arguments, and
/// its version comment is what [`ScriptProbe`] reports.
pub fn fake_java(version: &str) -> String {
    fake_java_with(version, "echo \"launched $@\"\nexit 0")
}

pub fn fake_java_with(version: &str, body: &str) -> String {
    format!("#!/bin/sh\n# version {}\n{}\n", version, body)
}

pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let f = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(f);
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default().unix_permissions(0o755))
            .unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// Runtime archive laid out like a JDK build: `jdk-<version>/bin/java` plus payload.
pub fn write_runtime_archive(path: &Path, version: &str) {
    write_runtime_archive_with(path, version, &fake_java(version));
}

pub fn write_runtime_archive_with(path: &Path, version: &str, java: &str) {
    let java_entry = format!("jdk-{}/bin/java", version);
    let modules_entry = format!("jdk-{}/lib/modules", version);
    let release_entry = format!("jdk-{}/release", version);
    let entries: [(&str, &[u8]); 4] = [
        (java_entry.as_str(), java.as_bytes()),
        (modules_entry.as_str(), b"modules"),
        (release_entry.as_str(), version.as_bytes()),
        ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0"),
    ];
    write_zip(path, &entries);
}

/// Reads the version comment out of the script instead of running it.
#[derive(Default)]
pub struct ScriptProbe {
    pub calls: AtomicUsize,
}

impl ScriptProbe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RuntimeProbe for ScriptProbe {
    fn probe<'a>(
        &'a self,
        executable: &'a Path,
    ) -> BoxFuture<'a, Result<ProbeReport, VerificationError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failed = |reason: &str| VerificationError::ExecutionProbeFailed {
                path: executable.to_path_buf(),
                reason: reason.to_string(),
            };
            let text = tokio::fs::read_to_string(executable)
                .await
                .map_err(|e| failed(&e.to_string()))?;
            let version = text
                .lines()
                .find_map(|l| l.strip_prefix("# version "))
                .ok_or_else(|| failed("no version line"))?
                .trim()
                .to_string();
            let major = version
                .split('.')
                .next()
                .and_then(|m| m.parse().ok())
                .ok_or_else(|| failed("bad version"))?;
            Ok(ProbeReport {
                major,
                full_version: version,
            })
        })
    }
}

/// Fixed list of "system" java executables
pub struct FixedLocator(pub Vec<PathBuf>);

impl SystemRuntimeLocator for FixedLocator {
    fn candidates(&self) -> Vec<PathBuf> {
        self.0.clone()
    }
}

/// Bundle directory, data directory and manifest for one test
pub struct Fixture {
    pub tmp: tempfile::TempDir,
    pub paths: RuntimePaths,
    pub probe: Arc<ScriptProbe>,
}

pub struct BundleEntry<'a> {
    pub major: u32,
    pub version: &'a str,
    /// Overrides the archive digest written to the manifest
    pub sha256: Option<&'a str>,
    pub tree_sha256: Option<String>,
    pub write_archive: bool,
    /// Body of the bundled `java` script in place of the default echo
    pub script: Option<&'a str>,
}

impl<'a> BundleEntry<'a> {
    pub fn new(major: u32, version: &'a str) -> Self {
        Self {
            major,
            version,
            sha256: None,
            tree_sha256: None,
            write_archive: true,
            script: None,
        }
    }
}

impl Fixture {
    pub fn new(entries: &[BundleEntry<'_>]) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let bundle = tmp.path().join("bundle");
        let data = tmp.path().join("data");
        std::fs::create_dir_all(&bundle).unwrap();
        std::fs::create_dir_all(&data).unwrap();

        let mut runtimes = Vec::new();
        for entry in entries {
            let file = format!("java-{}.zip", entry.major);
            let archive = bundle.join(&file);
            let mut sha256 = "0".repeat(64);
            if entry.write_archive {
                match entry.script {
                    Some(body) => write_runtime_archive_with(
                        &archive,
                        entry.version,
                        &fake_java_with(entry.version, body),
                    ),
                    None => write_runtime_archive(&archive, entry.version),
                }
                sha256 = ChecksumVerifier.compute_digest(&archive).unwrap();
            }
            if let Some(over) = entry.sha256 {
                sha256 = over.to_string();
            }
            let mut json = serde_json::json!({
                "major": entry.major,
                "archive": file,
                "sha256": sha256,
            });
            if let Some(tree) = &entry.tree_sha256 {
                json["tree_sha256"] = serde_json::Value::String(tree.clone());
            }
            runtimes.push(json);
        }

        let paths = RuntimePaths::new(&bundle, &data);
        std::fs::write(
            &paths.manifest_path,
            serde_json::to_string_pretty(&serde_json::json!({ "runtimes": runtimes })).unwrap(),
        )
        .unwrap();

        Self {
            tmp,
            paths,
            probe: Arc::new(ScriptProbe::default()),
        }
    }

    pub fn provisioner(&self, system: Vec<PathBuf>) -> RuntimeProvisioner {
        self.provisioner_with(system, &LauncherConfig::default())
    }

    pub fn provisioner_with(&self, system: Vec<PathBuf>, config: &LauncherConfig) -> RuntimeProvisioner {
        let manifest = RuntimeManifest::load(&self.paths.manifest_path).unwrap();
        RuntimeProvisioner::new(
            self.paths.clone(),
            manifest,
            config,
            self.probe.clone(),
            Arc::new(FixedLocator(system)),
        )
    }

    /// A "system" java outside the runtime store
    pub fn system_java(&self, version: &str) -> PathBuf {
        let path = self.tmp.path().join("system").join(format!("jdk-{}", version)).join("bin/java");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, fake_java(version)).unwrap();
        path
    }

    pub fn runtime_root(&self, major: u32) -> PathBuf {
        self.paths.runtimes_dir.join(format!("java-{}", major))
    }
}

/// Context whose progress events can be inspected afterwards
pub fn recording_context() -> (TaskContext, UnboundedReceiver<ProgressEvent>) {
    let (reporter, rx) = ChannelProgressReporter::new();
    (TaskContext::new(Arc::new(reporter), CancelToken::never()), rx)
}

pub fn drain(rx: &mut UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Number of extraction passes that started
pub fn extraction_passes(events: &[ProgressEvent]) -> usize {
    use launchpad_lib::Phase;
    events
        .iter()
        .filter(|e| e.phase == Phase::Extracting && e.percent_complete == 0)
        .count()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
