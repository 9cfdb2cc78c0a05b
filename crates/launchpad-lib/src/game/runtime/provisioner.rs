//! Bundled runtime provisioning.
//!
//! Each bundled major version goes through
//! `Unknown -> Extracted -> Verified -> Stale -> Verified`, dropping to
//! `Corrupted` when its tree digest or execution probe fails and to
//! `FailedPermanently` when re-extraction cannot repair it. New trees are
//! always unpacked and verified in a staging directory and swapped in only
//! afterwards, so a working runtime is never removed before its replacement
//! has passed verification.
use super::discovery::{SystemJavaLocator, SystemRuntimeLocator};
use super::manifest::{BundledRuntime, RuntimeManifest};
use super::probe::{find_java_executable, JavaVersionProbe, ProbeReport, RuntimeProbe};
use super::state::{RuntimeRecord, RuntimeState, StateStore};
use super::RuntimeMajor;
use crate::config::{LauncherConfig, RuntimePaths};
use crate::error::{ArchiveError, ProvisioningError, VerificationError};
use crate::game::installer::core::archive::{ArchiveExtractor, ExtractOptions};
use crate::game::installer::core::checksum::ChecksumVerifier;
use crate::game::installer::types::{percent, Phase, TaskContext};
use crate::sync::KeyedLocks;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Where a handed-out runtime came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeSource {
    /// The bundled runtime for the requested major
    Bundled,
    /// A system-installed runtime of the requested major
    System,
    /// A bundled runtime of a different major, used as a last resort
    FallbackBundled,
}

/// A runtime executable that passed verification for this request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeHandle {
    pub requested: RuntimeMajor,
    /// Major version actually provided; differs from `requested` only for bundled fallbacks
    pub major: u32,
    pub executable: PathBuf,
    pub source: RuntimeSource,
    pub full_version: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Snapshot of one bundled runtime for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeStatus {
    pub major: RuntimeMajor,
    pub state: RuntimeState,
    pub verified: bool,
    pub last_verified_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub full_version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Ensure,
    Reverify,
    Reinstall,
}

struct Inner {
    paths: RuntimePaths,
    manifest: RuntimeManifest,
    freshness_window: chrono::Duration,
    extractor: ArchiveExtractor,
    verifier: ChecksumVerifier,
    probe: Arc<dyn RuntimeProbe>,
    locator: Arc<dyn SystemRuntimeLocator>,
    state: Mutex<StateStore>,
    locks: KeyedLocks<RuntimeMajor>,
    recheck_pending: Mutex<HashSet<RuntimeMajor>>,
}

/// Provides verified Java runtimes. Cheap to clone; clones share state and locks.
#[derive(Clone)]
pub struct RuntimeProvisioner {
    inner: Arc<Inner>,
}

impl RuntimeProvisioner {
    pub fn new(
        paths: RuntimePaths,
        manifest: RuntimeManifest,
        config: &LauncherConfig,
        probe: Arc<dyn RuntimeProbe>,
        locator: Arc<dyn SystemRuntimeLocator>,
    ) -> Self {
        let state = StateStore::load(&paths.state_path);
        Self {
            inner: Arc::new(Inner {
                freshness_window: config.freshness_window(),
                extractor: ArchiveExtractor::new(config.signature_prefixes.clone()),
                verifier: ChecksumVerifier,
                probe,
                locator,
                state: Mutex::new(state),
                locks: KeyedLocks::new(),
                recheck_pending: Mutex::new(HashSet::new()),
                manifest,
                paths,
            }),
        }
    }

    /// Provisioner over the manifest at `paths.manifest_path`, probing with
    /// `java -version` and falling back to system installs.
    pub fn from_bundle(
        paths: RuntimePaths,
        config: &LauncherConfig,
    ) -> Result<Self, ProvisioningError> {
        let manifest = RuntimeManifest::load(&paths.manifest_path)?;
        Ok(Self::new(
            paths,
            manifest,
            config,
            Arc::new(JavaVersionProbe::new(config.probe_timeout())),
            Arc::new(SystemJavaLocator),
        ))
    }

    pub fn select_for_game_version(&self, game_version: &str) -> RuntimeMajor {
        RuntimeMajor::select_for_game_version(game_version)
    }

    pub fn paths(&self) -> &RuntimePaths {
        &self.inner.paths
    }

    /// Get a verified runtime for `major`, extracting and verifying the
    /// bundled one if needed and walking the fallback chain when it is
    /// unusable: system runtime of the same major, then other bundled majors.
    pub async fn ensure_runtime(
        &self,
        major: RuntimeMajor,
        ctx: &TaskContext,
    ) -> Result<RuntimeHandle, ProvisioningError> {
        if let Some(handle) = self.fast_path(major) {
            return Ok(handle);
        }

        let mut attempts = Vec::new();

        match self.ensure_bundled(major, ctx, Mode::Ensure).await {
            Ok(handle) => return Ok(handle),
            Err(ProvisioningError::Cancelled) => return Err(ProvisioningError::Cancelled),
            Err(e) => {
                log::warn!("Bundled Java {} unavailable: {}", major, e);
                attempts.push(format!("bundled Java {}: {}", major, e));
            }
        }

        match self.find_system_runtime(major, ctx).await? {
            Some(handle) => {
                log::warn!(
                    "Using system Java {} at {:?} instead of the bundled runtime",
                    major,
                    handle.executable
                );
                return Ok(handle);
            }
            None => attempts.push(format!("no usable system Java {}", major)),
        }

        for other in major.fallback_order() {
            if self.inner.manifest.get(other).is_none() {
                continue;
            }
            if ctx.is_cancelled() {
                return Err(ProvisioningError::Cancelled);
            }

            match self.ensure_bundled(other, ctx, Mode::Ensure).await {
                Ok(mut handle) => {
                    log::warn!(
                        "Falling back to bundled Java {} for a Java {} request",
                        other,
                        major
                    );
                    handle.requested = major;
                    handle.source = RuntimeSource::FallbackBundled;
                    return Ok(handle);
                }
                Err(ProvisioningError::Cancelled) => return Err(ProvisioningError::Cancelled),
                Err(e) => {
                    log::warn!("Fallback bundled Java {} unavailable: {}", other, e);
                    attempts.push(format!("bundled Java {}: {}", other, e));
                }
            }
        }

        log::error!("No compatible runtime for Java {}", major);
        Err(ProvisioningError::NoCompatibleRuntime { major, attempts })
    }

    /// Force a full verification (tree digest and execution probe) of the
    /// bundled runtime, repairing it by re-extraction if that fails.
    pub async fn reverify(
        &self,
        major: RuntimeMajor,
        ctx: &TaskContext,
    ) -> Result<RuntimeHandle, ProvisioningError> {
        self.ensure_bundled(major, ctx, Mode::Reverify).await
    }

    /// Unpack the bundled runtime again from its archive. The current tree
    /// stays in place until the new one is verified.
    pub async fn reinstall(
        &self,
        major: RuntimeMajor,
        ctx: &TaskContext,
    ) -> Result<RuntimeHandle, ProvisioningError> {
        self.ensure_bundled(major, ctx, Mode::Reinstall).await
    }

    pub fn status(&self, major: RuntimeMajor) -> RuntimeStatus {
        let record = self.record(major);
        RuntimeStatus {
            major,
            state: record.state,
            verified: record.state == RuntimeState::Verified,
            last_verified_at: record.last_verified_at,
            last_error: record.last_error,
            full_version: record.full_version,
        }
    }

    /// Status of every bundled runtime
    pub fn statuses(&self) -> Vec<RuntimeStatus> {
        self.inner
            .manifest
            .majors()
            .into_iter()
            .map(|major| self.status(major))
            .collect()
    }

    /// Cheap launcher-start check: marks runtimes whose executable vanished as
    /// corrupted and verified runtimes past the freshness window as stale.
    /// Never extracts or probes.
    pub fn startup_check(&self) -> Vec<RuntimeStatus> {
        let now = Utc::now();
        for major in self.inner.manifest.majors() {
            if self.inner.locks.is_locked(&major) {
                continue;
            }

            let record = self.record(major);
            if !matches!(record.state, RuntimeState::Verified | RuntimeState::Stale) {
                continue;
            }

            if self.executable_of(major, &record).is_none() {
                log::warn!("Java {} runtime executable is missing", major);
                self.update_record(major, |r| {
                    r.transition(major, RuntimeState::Corrupted);
                    r.last_error = Some("runtime executable missing".to_string());
                });
            } else if record.state == RuntimeState::Verified
                && record.is_past_window(self.inner.freshness_window, now)
            {
                self.update_record(major, |r| {
                    r.transition(major, RuntimeState::Stale);
                });
            }
        }
        self.statuses()
    }

    /// Lock-free reuse of a verified or stale runtime. Stale ones stay usable
    /// and get one background re-verification.
    fn fast_path(&self, major: RuntimeMajor) -> Option<RuntimeHandle> {
        let record = self.record(major);
        if !matches!(record.state, RuntimeState::Verified | RuntimeState::Stale) {
            return None;
        }
        let executable = self.executable_of(major, &record)?;

        if record.is_past_window(self.inner.freshness_window, Utc::now()) {
            if record.state == RuntimeState::Verified {
                self.update_record(major, |r| {
                    r.transition(major, RuntimeState::Stale);
                });
            }
            self.schedule_recheck(major);
        }

        Some(self.bundled_handle(major, executable, &record))
    }

    fn schedule_recheck(&self, major: RuntimeMajor) {
        {
            let mut pending = self
                .inner
                .recheck_pending
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if !pending.insert(major) {
                return;
            }
        }

        let this = self.clone();
        tokio::spawn(async move {
            log::info!("Re-verifying stale Java {} runtime in the background", major);
            let ctx = TaskContext::silent();
            if let Err(e) = this.ensure_bundled(major, &ctx, Mode::Reverify).await {
                log::warn!("Background re-verification of Java {} failed: {}", major, e);
            }
            this.inner
                .recheck_pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&major);
        });
    }

    /// Single-flight per major: everything below runs under that major's lock.
    async fn ensure_bundled(
        &self,
        major: RuntimeMajor,
        ctx: &TaskContext,
        mode: Mode,
    ) -> Result<RuntimeHandle, ProvisioningError> {
        let entry = self
            .inner
            .manifest
            .get(major)
            .cloned()
            .ok_or(ProvisioningError::NotBundled(major))?;

        let _guard = tokio::select! {
            guard = self.inner.locks.lock(&major) => guard,
            _ = ctx.cancel.cancelled() => return Err(ProvisioningError::Cancelled),
        };

        let root = self.runtime_root(major);
        let record = self.record(major);
        let now = Utc::now();

        match mode {
            Mode::Ensure => {
                if record.state == RuntimeState::Verified
                    && !record.is_past_window(self.inner.freshness_window, now)
                {
                    // Whoever held the lock before us finished the work
                    if let Some(executable) = self.executable_of(major, &record) {
                        return Ok(self.bundled_handle(major, executable, &record));
                    }
                }
                if record.state == RuntimeState::FailedPermanently {
                    return Err(ProvisioningError::Unusable {
                        major,
                        reason: record
                            .last_error
                            .unwrap_or_else(|| "earlier repair failed".to_string()),
                    });
                }
            }
            Mode::Reverify => {
                if record.state == RuntimeState::FailedPermanently {
                    self.update_record(major, |r| {
                        r.transition(major, RuntimeState::Unknown);
                    });
                }
            }
            Mode::Reinstall => {
                log::info!("Reinstalling bundled Java {} runtime", major);
                self.update_record(major, |r| *r = RuntimeRecord::default());
            }
        }

        let record = self.record(major);
        let mut attempts = 2;

        if mode != Mode::Reinstall && record.state != RuntimeState::Corrupted {
            match self.executable_of(major, &record) {
                Some(executable) => {
                    let expected = entry
                        .tree_sha256
                        .clone()
                        .or_else(|| record.tree_sha256.clone());
                    // An unknown tree without a digest to compare against cannot be trusted
                    if expected.is_some() || record.state != RuntimeState::Unknown {
                        match self
                            .verify_in_place(major, &root, &executable, expected, ctx)
                            .await
                        {
                            Ok(handle) => return Ok(handle),
                            Err(ProvisioningError::Cancelled) => {
                                return Err(ProvisioningError::Cancelled)
                            }
                            Err(e) => {
                                log::warn!("Java {} runtime failed verification: {}", major, e);
                                attempts = 1;
                            }
                        }
                    }
                }
                None if record.state != RuntimeState::Unknown => {
                    log::warn!("Java {} runtime executable is missing, re-extracting", major);
                    self.update_record(major, |r| {
                        r.transition(major, RuntimeState::Corrupted);
                        r.last_error = Some("runtime executable missing".to_string());
                    });
                    attempts = 1;
                }
                None => {}
            }
        } else if record.state == RuntimeState::Corrupted {
            attempts = 1;
        }

        self.check_archive(major, &entry, ctx).await?;

        let mut last_error = None;
        for attempt in 1..=attempts {
            if ctx.is_cancelled() {
                return Err(ProvisioningError::Cancelled);
            }

            match self.extract_and_verify(major, &entry, &root, ctx).await {
                Ok(handle) => return Ok(handle),
                Err(ProvisioningError::Cancelled) => return Err(ProvisioningError::Cancelled),
                Err(e) => {
                    log::warn!(
                        "Extraction attempt {}/{} for Java {} failed: {}",
                        attempt,
                        attempts,
                        major,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "re-extraction failed".to_string());
        self.update_record(major, |r| {
            r.transition(major, RuntimeState::FailedPermanently);
            r.last_error = Some(reason.clone());
        });

        Err(last_error.unwrap_or(ProvisioningError::Unusable { major, reason }))
    }

    /// Check the bundled archive itself before unpacking it. A bad archive
    /// cannot be repaired by extracting it again.
    async fn check_archive(
        &self,
        major: RuntimeMajor,
        entry: &BundledRuntime,
        ctx: &TaskContext,
    ) -> Result<(), ProvisioningError> {
        ctx.reporter.start_phase(Phase::VerifyingArchive);

        let result = match self.inner.verifier.compute_digest_async(&entry.archive).await {
            Ok(actual) if actual.eq_ignore_ascii_case(entry.sha256.trim()) => Ok(()),
            Ok(actual) => Err(VerificationError::ChecksumMismatch {
                path: entry.archive.clone(),
                expected: entry.sha256.to_ascii_lowercase(),
                actual,
            }),
            Err(e) => Err(e),
        };
        ctx.reporter.set_percent(Phase::VerifyingArchive, 100);

        if let Err(e) = result {
            log::error!("Bundled archive for Java {} is unusable: {}", major, e);
            let reason = e.to_string();
            self.update_record(major, |r| {
                if r.state == RuntimeState::Extracted {
                    r.transition(major, RuntimeState::Corrupted);
                }
                r.transition(major, RuntimeState::FailedPermanently);
                r.last_error = Some(reason);
            });
            return Err(e.into());
        }
        Ok(())
    }

    async fn extract_and_verify(
        &self,
        major: RuntimeMajor,
        entry: &BundledRuntime,
        root: &Path,
        ctx: &TaskContext,
    ) -> Result<RuntimeHandle, ProvisioningError> {
        let staging = self.inner.paths.staging_dir().join(major.dir_name());
        remove_dir_if_exists(&staging)?;

        ctx.reporter.start_phase(Phase::Extracting);
        log::info!("Extracting Java {} from {:?}", major, entry.archive);

        let extracted = {
            let extractor = self.inner.extractor.clone();
            let archive = entry.archive.clone();
            let dest = staging.clone();
            let cancel = ctx.cancel.clone();
            let reporter = ctx.reporter.clone();
            tokio::task::spawn_blocking(move || {
                extractor.extract_all(
                    &archive,
                    &dest,
                    &ExtractOptions::default(),
                    &|| cancel.is_cancelled(),
                    &mut |done, total| reporter.set_percent(Phase::Extracting, percent(done, total)),
                )
            })
            .await
            .map_err(|e| ProvisioningError::io(&staging, std::io::Error::other(e.to_string())))?
        };

        let files = match extracted {
            Ok(files) => files,
            Err(e) => {
                discard_staging(&staging);
                if matches!(e, ArchiveError::Cancelled) {
                    return Err(ProvisioningError::Cancelled);
                }
                let reason = e.to_string();
                self.update_record(major, |r| r.last_error = Some(reason));
                return Err(e.into());
            }
        };
        log::debug!("Unpacked {} files for Java {}", files.len(), major);
        let prior_state = self.record(major).state;
        self.with_record(major, |r| {
            r.transition(major, RuntimeState::Extracted);
        });

        ctx.reporter.start_phase(Phase::VerifyingRuntime);
        match self.verify_staged(major, entry, &staging, ctx).await {
            Ok((executable_rel, tree_sha256, report)) => {
                swap_into_place(&staging, root)?;

                let now = Utc::now();
                self.update_record(major, |r| {
                    r.executable_rel = Some(executable_rel.clone());
                    r.tree_sha256 = Some(tree_sha256);
                    r.full_version = Some(report.full_version.clone());
                    r.last_verified_at = Some(now);
                    r.last_error = None;
                    r.transition(major, RuntimeState::Verified);
                });
                ctx.reporter.set_percent(Phase::VerifyingRuntime, 100);
                log::info!("Java {} runtime ready at {:?}", major, root);

                let record = self.record(major);
                Ok(self.bundled_handle(major, root.join(executable_rel), &record))
            }
            Err(e) => {
                discard_staging(&staging);
                if matches!(e, ProvisioningError::Cancelled) {
                    // Nothing was swapped in; the live tree keeps its previous state
                    self.with_record(major, |r| r.state = prior_state);
                    return Err(e);
                }
                let reason = e.to_string();
                self.update_record(major, |r| {
                    r.transition(major, RuntimeState::Corrupted);
                    r.last_error = Some(reason);
                });
                Err(e)
            }
        }
    }

    async fn verify_staged(
        &self,
        major: RuntimeMajor,
        entry: &BundledRuntime,
        staging: &Path,
        ctx: &TaskContext,
    ) -> Result<(PathBuf, String, ProbeReport), ProvisioningError> {
        let missing = || VerificationError::ExecutableMissing {
            root: staging.to_path_buf(),
        };
        let executable = find_java_executable(staging).ok_or_else(missing)?;
        let executable_rel = executable
            .strip_prefix(staging)
            .map(Path::to_path_buf)
            .map_err(|_| missing())?;
        make_executable(&executable)?;

        let tree_sha256 = self.inner.verifier.compute_tree_digest_async(staging).await?;
        if let Some(expected) = &entry.tree_sha256 {
            if !tree_sha256.eq_ignore_ascii_case(expected.trim()) {
                return Err(VerificationError::ChecksumMismatch {
                    path: staging.to_path_buf(),
                    expected: expected.to_ascii_lowercase(),
                    actual: tree_sha256,
                }
                .into());
            }
        }

        if ctx.is_cancelled() {
            return Err(ProvisioningError::Cancelled);
        }

        let report = self.probe_major(major, &executable).await?;
        Ok((executable_rel, tree_sha256, report))
    }

    async fn verify_in_place(
        &self,
        major: RuntimeMajor,
        root: &Path,
        executable: &Path,
        expected_tree: Option<String>,
        ctx: &TaskContext,
    ) -> Result<RuntimeHandle, ProvisioningError> {
        ctx.reporter.start_phase(Phase::VerifyingRuntime);
        log::info!("Verifying Java {} runtime at {:?}", major, root);

        let result: Result<(String, ProbeReport), ProvisioningError> = async {
            let actual = self.inner.verifier.compute_tree_digest_async(root).await?;
            if let Some(expected) = &expected_tree {
                if !actual.eq_ignore_ascii_case(expected.trim()) {
                    return Err(VerificationError::ChecksumMismatch {
                        path: root.to_path_buf(),
                        expected: expected.to_ascii_lowercase(),
                        actual,
                    }
                    .into());
                }
            }
            if ctx.is_cancelled() {
                return Err(ProvisioningError::Cancelled);
            }
            let report = self.probe_major(major, executable).await?;
            Ok((actual, report))
        }
        .await;

        match result {
            Ok((tree_sha256, report)) => {
                let now = Utc::now();
                let executable_rel = executable.strip_prefix(root).ok().map(Path::to_path_buf);
                self.update_record(major, |r| {
                    if r.state == RuntimeState::Unknown {
                        r.transition(major, RuntimeState::Extracted);
                    }
                    r.transition(major, RuntimeState::Verified);
                    if executable_rel.is_some() {
                        r.executable_rel = executable_rel;
                    }
                    r.tree_sha256 = Some(tree_sha256);
                    r.full_version = Some(report.full_version);
                    r.last_verified_at = Some(now);
                    r.last_error = None;
                });
                ctx.reporter.set_percent(Phase::VerifyingRuntime, 100);

                let record = self.record(major);
                Ok(self.bundled_handle(major, executable.to_path_buf(), &record))
            }
            Err(ProvisioningError::Cancelled) => Err(ProvisioningError::Cancelled),
            Err(e) => {
                let reason = e.to_string();
                self.update_record(major, |r| {
                    if r.state == RuntimeState::Unknown {
                        r.transition(major, RuntimeState::Extracted);
                    }
                    r.transition(major, RuntimeState::Corrupted);
                    r.last_error = Some(reason);
                });
                Err(e)
            }
        }
    }

    /// Run the execution probe and require the expected major version.
    async fn probe_major(
        &self,
        major: RuntimeMajor,
        executable: &Path,
    ) -> Result<ProbeReport, VerificationError> {
        let report = self.inner.probe.probe(executable).await?;
        if report.major != major.number() {
            return Err(VerificationError::ExecutionProbeFailed {
                path: executable.to_path_buf(),
                reason: format!(
                    "reports Java {} ({}) but Java {} was expected",
                    report.major, report.full_version, major
                ),
            });
        }
        Ok(report)
    }

    async fn find_system_runtime(
        &self,
        major: RuntimeMajor,
        ctx: &TaskContext,
    ) -> Result<Option<RuntimeHandle>, ProvisioningError> {
        ctx.reporter.start_phase(Phase::SearchingSystemRuntime);

        let locator = self.inner.locator.clone();
        let candidates = match tokio::task::spawn_blocking(move || locator.candidates()).await {
            Ok(candidates) => candidates,
            Err(e) => {
                log::warn!("System runtime search failed: {}", e);
                Vec::new()
            }
        };

        for executable in candidates {
            if ctx.is_cancelled() {
                return Err(ProvisioningError::Cancelled);
            }
            match self.inner.probe.probe(&executable).await {
                Ok(report) if report.major == major.number() => {
                    return Ok(Some(RuntimeHandle {
                        requested: major,
                        major: report.major,
                        executable,
                        source: RuntimeSource::System,
                        full_version: Some(report.full_version),
                        verified_at: Some(Utc::now()),
                    }));
                }
                Ok(report) => log::debug!(
                    "Skipping system Java {} at {:?} (need {})",
                    report.major,
                    executable,
                    major
                ),
                Err(e) => log::debug!("Skipping unusable system Java {:?}: {}", executable, e),
            }
        }
        Ok(None)
    }

    fn runtime_root(&self, major: RuntimeMajor) -> PathBuf {
        self.inner.paths.runtimes_dir.join(major.dir_name())
    }

    fn executable_of(&self, major: RuntimeMajor, record: &RuntimeRecord) -> Option<PathBuf> {
        let root = self.runtime_root(major);
        match &record.executable_rel {
            Some(rel) => Some(root.join(rel)).filter(|p| p.is_file()),
            None => find_java_executable(&root),
        }
    }

    fn bundled_handle(
        &self,
        major: RuntimeMajor,
        executable: PathBuf,
        record: &RuntimeRecord,
    ) -> RuntimeHandle {
        RuntimeHandle {
            requested: major,
            major: major.number(),
            executable,
            source: RuntimeSource::Bundled,
            full_version: record.full_version.clone(),
            verified_at: record.last_verified_at,
        }
    }

    fn record(&self, major: RuntimeMajor) -> RuntimeRecord {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(major)
    }

    /// Change a record in memory only
    fn with_record(&self, major: RuntimeMajor, f: impl FnOnce(&mut RuntimeRecord)) {
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        f(state.get_mut(major));
    }

    /// Change a record and persist the store
    fn update_record(&self, major: RuntimeMajor, f: impl FnOnce(&mut RuntimeRecord)) {
        let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
        f(state.get_mut(major));
        if let Err(e) = state.save() {
            log::warn!("Failed to persist runtime state: {}", e);
        }
    }
}

fn remove_dir_if_exists(dir: &Path) -> Result<(), ProvisioningError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ProvisioningError::io(dir, e)),
    }
}

fn discard_staging(staging: &Path) {
    if let Err(e) = remove_dir_if_exists(staging) {
        log::warn!("Failed to clean up staging directory: {}", e);
    }
}

/// Replace `root` with `staging`. The old tree is moved aside first and only
/// deleted once the new one is in place; it is restored if the move fails.
fn swap_into_place(staging: &Path, root: &Path) -> Result<(), ProvisioningError> {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "runtime".to_string());
    let retired = root.with_file_name(format!(".{}-retired", name));
    remove_dir_if_exists(&retired)?;

    if let Some(parent) = root.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ProvisioningError::io(parent, e))?;
    }

    let had_previous = root.exists();
    if had_previous {
        std::fs::rename(root, &retired).map_err(|e| ProvisioningError::io(root, e))?;
    }

    if let Err(e) = std::fs::rename(staging, root) {
        if had_previous {
            if let Err(restore) = std::fs::rename(&retired, root) {
                log::error!("Failed to restore previous runtime at {:?}: {}", root, restore);
            }
        }
        return Err(ProvisioningError::io(root, e));
    }

    if had_previous {
        if let Err(e) = std::fs::remove_dir_all(&retired) {
            log::warn!("Failed to remove retired runtime {:?}: {}", retired, e);
        }
    }
    Ok(())
}

fn make_executable(path: &Path) -> Result<(), VerificationError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let io_err = |source| VerificationError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut perms = std::fs::metadata(path).map_err(io_err)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms).map_err(io_err)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_replaces_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("java-17");
        let staging = tmp.path().join(".staging").join("java-17");

        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("old"), b"old").unwrap();
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("new"), b"new").unwrap();

        swap_into_place(&staging, &root).unwrap();

        assert!(root.join("new").exists());
        assert!(!root.join("old").exists());
        assert!(!staging.exists());
        assert!(!tmp.path().join(".java-17-retired").exists());
    }

    #[test]
    fn swap_into_empty_location() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("runtimes").join("java-8");
        let staging = tmp.path().join("stage");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("release"), b"8").unwrap();

        swap_into_place(&staging, &root).unwrap();
        assert_eq!(std::fs::read(root.join("release")).unwrap(), b"8");
    }
}
