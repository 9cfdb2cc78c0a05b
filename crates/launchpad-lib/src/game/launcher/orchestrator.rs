//! End-to-end launch: runtime, natives, arguments, process.
//!
//! Each step finishes before the next starts, so a runtime is always verified
//! before its executable reaches the supervisor. Cancellation aborts the
//! preparation steps; once the process is running it becomes a terminate.
use crate::config::LauncherConfig;
use crate::error::{LaunchError, NativesError, ProcessError, ProvisioningError};
use crate::game::installer::core::archive::ArchiveExtractor;
use crate::game::installer::types::{Phase, TaskContext};
use crate::game::launcher::arguments::LaunchArgumentAssembler;
use crate::game::launcher::classpath::build_classpath;
use crate::game::launcher::context::LaunchContext;
use crate::game::launcher::natives::{has_platform_libraries, NativeLibraryResolver};
use crate::game::launcher::process::{OutputSink, ProcessHandle, ProcessSupervisor};
use crate::game::launcher::types::{ExitReport, LaunchRequest, LaunchResult};
use crate::game::runtime::{RuntimeHandle, RuntimeProvisioner};
use std::path::{Path, PathBuf};

/// Everything decided before the game process is spawned
#[derive(Debug, Clone)]
pub struct PreparedLaunch {
    pub runtime: RuntimeHandle,
    pub natives_dir: PathBuf,
    pub argv: Vec<String>,
    pub working_dir: PathBuf,
    pub sink: OutputSink,
}

pub struct GameLauncher {
    provisioner: RuntimeProvisioner,
    natives: NativeLibraryResolver,
    assembler: LaunchArgumentAssembler,
    supervisor: ProcessSupervisor,
    config: LauncherConfig,
}

impl GameLauncher {
    pub fn new(provisioner: RuntimeProvisioner, config: LauncherConfig) -> Self {
        Self {
            provisioner,
            natives: NativeLibraryResolver::new(ArchiveExtractor::new(
                config.signature_prefixes.clone(),
            )),
            assembler: LaunchArgumentAssembler::new(),
            supervisor: ProcessSupervisor::new(&config),
            config,
        }
    }

    pub fn with_natives_resolver(mut self, natives: NativeLibraryResolver) -> Self {
        self.natives = natives;
        self
    }

    pub fn with_supervisor(mut self, supervisor: ProcessSupervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn provisioner(&self) -> &RuntimeProvisioner {
        &self.provisioner
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    /// Launch the game and supervise it until it exits.
    pub async fn launch(&self, request: &LaunchRequest, ctx: &TaskContext) -> LaunchResult {
        log::info!(
            "Launching instance {} (version {})",
            request.profile.instance_id,
            request.version.id
        );

        match self.run(request, ctx).await {
            Ok(report) => LaunchResult::exited(report),
            Err(e) => {
                log::error!("Launch of {} failed: {}", request.profile.instance_id, e);
                LaunchResult::failed(e)
            }
        }
    }

    async fn run(
        &self,
        request: &LaunchRequest,
        ctx: &TaskContext,
    ) -> Result<ExitReport, LaunchError> {
        let prepared = self.prepare(request, ctx).await?;
        let mut handle = self.spawn(&prepared, ctx).await?;
        self.supervise(&mut handle, ctx).await
    }

    /// Provision the runtime, extract natives and assemble the command line.
    pub async fn prepare(
        &self,
        request: &LaunchRequest,
        ctx: &TaskContext,
    ) -> Result<PreparedLaunch, LaunchError> {
        let major = self.provisioner.select_for_game_version(&request.version.id);
        log::debug!("Version {} requires Java {}", request.version.id, major);

        let runtime = self
            .provisioner
            .ensure_runtime(major, ctx)
            .await
            .map_err(|e| match e {
                ProvisioningError::Cancelled => LaunchError::Cancelled,
                other => other.into(),
            })?;
        log::info!(
            "Using Java {} ({:?}) at {:?}",
            runtime.major,
            runtime.source,
            runtime.executable
        );
        check_cancelled(ctx)?;

        // Natives are shared per version, not per instance
        let natives_dir = request.natives_dir();
        self.natives
            .extract_natives_for_version(
                &request.version.natives,
                &request.libraries_dir(),
                &natives_dir,
                ctx,
            )
            .await
            .map_err(|e| match e {
                NativesError::Cancelled => LaunchError::Cancelled,
                other => other.into(),
            })?;
        self.check_natives(request, &natives_dir).await?;
        check_cancelled(ctx)?;

        ctx.reporter.start_phase(Phase::AssemblingArguments);
        let classpath = build_classpath(&request.version.classpath, &request.libraries_dir())?;
        let launch_ctx = LaunchContext::build(request, &natives_dir, &classpath, &self.config);
        let argv = self.assembler.build_command_line(
            &request.version,
            &request.profile,
            &launch_ctx,
            &self.config,
        )?;
        ctx.reporter.set_percent(Phase::AssemblingArguments, 100);

        let log_file = request.profile.log_file.clone().unwrap_or_else(|| {
            request
                .data_dir
                .join("logs")
                .join(format!("{}.log", request.profile.instance_id))
        });

        Ok(PreparedLaunch {
            runtime,
            natives_dir,
            argv,
            working_dir: request.profile.game_dir.clone(),
            sink: OutputSink {
                instance_id: request.profile.instance_id.clone(),
                log_file: Some(log_file),
            },
        })
    }

    /// Abort when the version ships natives for this platform but none landed
    /// in the directory; the game would otherwise die in its native loader.
    async fn check_natives(
        &self,
        request: &LaunchRequest,
        natives_dir: &Path,
    ) -> Result<(), LaunchError> {
        let Some(platform) = self.natives.platform() else {
            return Ok(());
        };
        if self.natives.matching_libraries(&request.version.natives).is_empty() {
            log::debug!("Version {} ships no natives for {}", request.version.id, platform);
            return Ok(());
        }

        let dir = natives_dir.to_path_buf();
        let found = tokio::task::spawn_blocking(move || has_platform_libraries(&dir, platform))
            .await
            .unwrap_or(false);
        if !found {
            log::error!(
                "No native library files found in natives directory {:?}; aborting launch",
                natives_dir
            );
            return Err(LaunchError::NativesMissing {
                dir: natives_dir.to_path_buf(),
            });
        }
        Ok(())
    }

    async fn spawn(
        &self,
        prepared: &PreparedLaunch,
        ctx: &TaskContext,
    ) -> Result<ProcessHandle, LaunchError> {
        check_cancelled(ctx)?;
        ctx.reporter.start_phase(Phase::Launching);

        let handle = self
            .supervisor
            .launch_with(
                &prepared.runtime.executable,
                &prepared.argv,
                &prepared.working_dir,
                &prepared.sink,
            )
            .await?;
        ctx.reporter.set_percent(Phase::Launching, 100);
        Ok(handle)
    }

    /// Wait for exit; a cancel request from here on terminates the process.
    async fn supervise(
        &self,
        handle: &mut ProcessHandle,
        ctx: &TaskContext,
    ) -> Result<ExitReport, LaunchError> {
        tokio::select! {
            result = self.supervisor.await_exit(handle) => Ok(result?),
            _ = ctx.cancel.cancelled() => {
                log::info!("Launch cancelled; terminating process {}", handle.pid());
                self.supervisor.terminate(handle).await?;
                match self.supervisor.await_exit(handle).await {
                    Ok(report) => Ok(report),
                    // A requested stop is not a crash, however early it happens
                    Err(ProcessError::CrashedAtLaunch {
                        code,
                        signaled,
                        signal,
                        runtime,
                        output,
                    }) => {
                        Ok(ExitReport {
                            code,
                            signaled,
                            signal,
                            runtime,
                            output_tail: output,
                        })
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }
}

fn check_cancelled(ctx: &TaskContext) -> Result<(), LaunchError> {
    if ctx.is_cancelled() {
        return Err(LaunchError::Cancelled);
    }
    Ok(())
}
