//! Game process spawning and supervision
use crate::config::LauncherConfig;
use crate::error::ProcessError;
use crate::game::launcher::types::ExitReport;
use crate::utils::process::own_process_group;
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

#[cfg(unix)]
use sysinfo::{Pid as SysPid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

#[cfg(windows)]
use crate::utils::process::hide_console;
#[cfg(windows)]
use windows_sys::Win32::Foundation::{HWND, LPARAM};
#[cfg(windows)]
use windows_sys::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetWindowThreadProcessId, IsHungAppWindow, IsWindowVisible, PostMessageW, WM_CLOSE,
};

/// Log callback type - receives (instance_id, line, stream_type)
/// stream_type is "stdout" or "stderr"
pub type LogCallback = Arc<dyn Fn(String, String, String) + Send + Sync + 'static>;

/// Game log shared by the stdout and stderr readers; `None` once writing failed
type LogFile = Arc<Mutex<Option<Box<dyn Write + Send>>>>;

/// How long reader tasks may keep draining pipes after the child exited
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Where a launched process's output goes besides the diagnostic tail
#[derive(Debug, Clone, Default)]
pub struct OutputSink {
    /// Label passed to the log callback
    pub instance_id: String,
    pub log_file: Option<PathBuf>,
}

/// Last N lines of combined output
#[derive(Debug)]
struct OutputTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl OutputTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn snapshot(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }
}

/// Spawned child, exclusively owned by the supervisor's callers
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
    child: tokio::process::Child,
    started: Instant,
    detached: bool,
    tail: Arc<Mutex<OutputTail>>,
    readers: Vec<JoinHandle<()>>,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Output captured so far
    pub fn output_tail(&self) -> Vec<String> {
        lock_tail(&self.tail).snapshot()
    }
}

fn lock_tail(tail: &Mutex<OutputTail>) -> std::sync::MutexGuard<'_, OutputTail> {
    tail.lock().unwrap_or_else(|e| e.into_inner())
}

/// Spawns processes, streams their output and classifies how they end.
#[derive(Clone)]
pub struct ProcessSupervisor {
    grace_period: Duration,
    tail_lines: usize,
    terminate_timeout: Duration,
    detach: bool,
    log_callback: Option<LogCallback>,
}

impl ProcessSupervisor {
    pub fn new(config: &LauncherConfig) -> Self {
        Self {
            grace_period: config.crash_grace_period(),
            tail_lines: config.output_tail_lines,
            terminate_timeout: config.terminate_timeout(),
            detach: config.detach_processes,
            log_callback: None,
        }
    }

    /// If provided, the callback is called for each line of stdout/stderr output.
    pub fn with_log_callback(mut self, callback: LogCallback) -> Self {
        self.log_callback = Some(callback);
        self
    }

    pub async fn launch(
        &self,
        executable: &Path,
        argv: &[String],
        working_dir: &Path,
    ) -> Result<ProcessHandle, ProcessError> {
        self.launch_with(executable, argv, working_dir, &OutputSink::default())
            .await
    }

    /// Spawn `executable` with `argv` in `working_dir`, streaming its output
    /// to the log, the diagnostic tail and `sink`.
    pub async fn launch_with(
        &self,
        executable: &Path,
        argv: &[String],
        working_dir: &Path,
        sink: &OutputSink,
    ) -> Result<ProcessHandle, ProcessError> {
        let spawn_failed = |source: std::io::Error| ProcessError::SpawnFailed {
            executable: executable.to_path_buf(),
            source,
        };

        // The installer normally creates the directory; create it for fresh instances.
        if !working_dir.exists() {
            tokio::fs::create_dir_all(working_dir)
                .await
                .map_err(spawn_failed)?;
        } else if !working_dir.is_dir() {
            return Err(spawn_failed(std::io::Error::other(format!(
                "working directory {:?} is not a directory",
                working_dir
            ))));
        }

        let log_file = match &sink.log_file {
            Some(path) => open_log_file(path).await,
            None => None,
        };

        let mut command = tokio::process::Command::new(executable);
        command
            .args(argv)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if self.detach {
            own_process_group(&mut command);
        }

        let command_line = std::iter::once(executable.to_string_lossy().to_string())
            .chain(argv.iter().cloned())
            .map(|a| quote_arg(&a))
            .collect::<Vec<_>>()
            .join(" ");
        log::info!("Exec command: {}", command_line);
        log::debug!("Working directory: {:?}", working_dir);

        let mut child = command.spawn().map_err(spawn_failed)?;
        let started = Instant::now();
        let pid = child.id().ok_or_else(|| {
            spawn_failed(std::io::Error::other("process exited before its id was read"))
        })?;
        log::info!("Process started with PID: {}", pid);

        let tail = Arc::new(Mutex::new(OutputTail::new(self.tail_lines)));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(
                stdout,
                "stdout",
                sink.instance_id.clone(),
                tail.clone(),
                log_file.clone(),
                self.log_callback.clone(),
            )));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(
                stderr,
                "stderr",
                sink.instance_id.clone(),
                tail.clone(),
                log_file,
                self.log_callback.clone(),
            )));
        }

        Ok(ProcessHandle {
            pid,
            child,
            started,
            detached: self.detach,
            tail,
            readers,
        })
    }

    /// Wait for the process to end. A failing exit inside the grace period is
    /// reported as [`ProcessError::CrashedAtLaunch`] with the captured output.
    pub async fn await_exit(&self, handle: &mut ProcessHandle) -> Result<ExitReport, ProcessError> {
        let status = handle
            .child
            .wait()
            .await
            .map_err(|source| ProcessError::Wait {
                pid: handle.pid,
                source,
            })?;
        let runtime = handle.started.elapsed();

        // Let the readers drain what is left in the pipes.
        for reader in handle.readers.drain(..) {
            if tokio::time::timeout(DRAIN_TIMEOUT, reader).await.is_err() {
                log::debug!("Output of PID {} still open after exit; detaching reader", handle.pid);
            }
        }

        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal: Option<i32> = None;

        let report = ExitReport {
            code: status.code(),
            signaled: signal.is_some(),
            signal,
            runtime,
            output_tail: handle.output_tail(),
        };

        if report.success() {
            log::info!("Process {} exited successfully after {:?}", handle.pid, runtime);
            return Ok(report);
        }

        if runtime < self.grace_period {
            log::error!(
                "Process {} crashed {:?} after launch ({})",
                handle.pid,
                runtime,
                status
            );
            return Err(ProcessError::CrashedAtLaunch {
                code: report.code,
                signaled: report.signaled,
                signal: report.signal,
                runtime,
                output: report.output_tail,
            });
        }

        log::error!("Process {} exited with error: {}", handle.pid, status);
        Ok(report)
    }

    /// Best-effort termination: graceful first, forced after the timeout or
    /// right away when the process looks stalled.
    pub async fn terminate(&self, handle: &mut ProcessHandle) -> Result<(), ProcessError> {
        let pid = handle.pid;
        if matches!(handle.child.try_wait(), Ok(Some(_))) {
            log::debug!("Process {} already exited", pid);
            return Ok(());
        }

        log::info!("Terminating process {}", pid);

        #[cfg(unix)]
        {
            let stalled = tokio::task::spawn_blocking(move || is_process_stalled_unix(pid))
                .await
                .unwrap_or(false);

            if stalled {
                log::warn!("Process {} appears stalled; sending SIGKILL", pid);
                send_signal(pid, handle.detached, nix::sys::signal::Signal::SIGKILL)?;
            } else {
                send_signal(pid, handle.detached, nix::sys::signal::Signal::SIGTERM)?;
                if tokio::time::timeout(self.terminate_timeout, handle.child.wait())
                    .await
                    .is_err()
                {
                    log::warn!("Process {} didn't respond to SIGTERM, sending SIGKILL", pid);
                    send_signal(pid, handle.detached, nix::sys::signal::Signal::SIGKILL)?;
                }
            }
        }

        #[cfg(windows)]
        {
            let graceful = !is_process_stalled_windows(pid) && request_close_windows(pid);
            let closed = graceful
                && tokio::time::timeout(self.terminate_timeout, handle.child.wait())
                    .await
                    .is_ok();

            if !closed {
                log::warn!("Process {} didn't respond to WM_CLOSE, force killing", pid);
                taskkill(pid).await?;
            }
        }

        #[cfg(not(any(unix, windows)))]
        {
            handle
                .child
                .start_kill()
                .map_err(|e| ProcessError::Terminate {
                    pid,
                    reason: e.to_string(),
                })?;
        }

        Ok(())
    }
}

async fn open_log_file(path: &Path) -> Option<LogFile> {
    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            log::warn!("Failed to create log directory {:?}: {}", parent, e);
            return None;
        }
    }
    match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(Arc::new(Mutex::new(Some(Box::new(std::io::BufWriter::new(file)))))),
        Err(e) => {
            log::warn!("Failed to open log file {:?}: {}", path, e);
            None
        }
    }
}

/// Read lines until EOF. Bytes are decoded lossily so non-UTF-8 output never
/// stops the drain and blocks the child on a full pipe.
async fn forward_lines<R>(
    stream: R,
    stream_type: &'static str,
    instance_id: String,
    tail: Arc<Mutex<OutputTail>>,
    log_file: Option<LogFile>,
    callback: Option<LogCallback>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                log::debug!("Stopped reading {}: {}", stream_type, e);
                break;
            }
        }

        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\r', '\n'])
            .to_string();

        if stream_type == "stderr" {
            log::info!(target: "game::stderr", "{}", line);
        } else {
            log::info!(target: "game::stdout", "{}", line);
        }

        if let Some(file) = &log_file {
            append_line(file, &line);
        }

        lock_tail(&tail).push(line.clone());

        if let Some(cb) = &callback {
            cb(instance_id.clone(), line, stream_type.to_string());
        }
    }
}

/// The first failed write is reported and closes the log for both streams.
fn append_line(file: &Mutex<Option<Box<dyn Write + Send>>>, line: &str) {
    let mut slot = file.lock().unwrap_or_else(|e| e.into_inner());
    let Some(writer) = slot.as_mut() else {
        return;
    };
    if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
        log::warn!("Failed to write game log, output is no longer saved to it: {}", e);
        *slot = None;
    }
}

/// Quote an argument for logs so the command can be pasted into a shell.
pub fn quote_arg(s: &str) -> String {
    if s.is_empty() {
        return "\"\"".to_string();
    }
    // Add quotes if whitespace or double-quote present; escape backslashes and double quotes
    if s.chars().any(|c| c.is_whitespace() || c == '"') {
        let esc = s.replace('\\', "\\\\").replace('"', "\\\"");
        return format!("\"{}\"", esc);
    }
    s.to_string()
}

#[cfg(unix)]
fn send_signal(pid: u32, group: bool, signal: nix::sys::signal::Signal) -> Result<(), ProcessError> {
    use nix::errno::Errno;
    use nix::unistd::Pid;

    let target = Pid::from_raw(pid as i32);
    // A detached child leads its own process group; signal the whole group.
    let result = if group {
        nix::sys::signal::killpg(target, signal)
    } else {
        nix::sys::signal::kill(target, signal)
    };

    match result {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(ProcessError::Terminate {
            pid,
            reason: format!("{}: {}", signal, e),
        }),
    }
}

#[cfg(unix)]
fn is_process_stalled_unix(pid: u32) -> bool {
    let mut system = System::new();
    let pid_sys = SysPid::from_u32(pid);
    let kind = ProcessRefreshKind::nothing().with_cpu();

    system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid_sys]), true, kind);

    if let Some(proc1) = system.process(pid_sys) {
        if matches!(
            proc1.status(),
            ProcessStatus::Dead | ProcessStatus::Zombie | ProcessStatus::Stop
        ) {
            return true;
        }

        let cpu1 = proc1.cpu_usage();
        std::thread::sleep(Duration::from_secs(1));
        system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid_sys]), true, kind);

        if let Some(proc2) = system.process(pid_sys) {
            let cpu2 = proc2.cpu_usage();
            return cpu1 < 0.1 && cpu2 < 0.1;
        }
    }

    // If process disappeared or could not be read, treat as stalled/dead
    true
}

#[cfg(windows)]
struct WindowSearch {
    pid: u32,
    found: Option<HWND>,
}

#[cfg(windows)]
unsafe extern "system" fn enum_window(hwnd: HWND, lparam: LPARAM) -> i32 {
    let search = &mut *(lparam as *mut WindowSearch);
    let mut proc_id = 0;
    GetWindowThreadProcessId(hwnd, &mut proc_id);

    if proc_id == search.pid && IsWindowVisible(hwnd) != 0 {
        search.found = Some(hwnd);
        return 0; // stop enumeration
    }
    1
}

#[cfg(windows)]
fn find_main_window(pid: u32) -> Option<HWND> {
    let mut search = WindowSearch { pid, found: None };
    unsafe {
        EnumWindows(Some(enum_window), &mut search as *mut WindowSearch as LPARAM);
    }
    search.found
}

#[cfg(windows)]
fn is_process_stalled_windows(pid: u32) -> bool {
    match find_main_window(pid) {
        Some(hwnd) => unsafe { IsHungAppWindow(hwnd) != 0 },
        None => false,
    }
}

/// Ask the main window to close; false when there is none.
#[cfg(windows)]
fn request_close_windows(pid: u32) -> bool {
    match find_main_window(pid) {
        Some(hwnd) => unsafe { PostMessageW(hwnd, WM_CLOSE, 0, 0) != 0 },
        None => false,
    }
}

#[cfg(windows)]
async fn taskkill(pid: u32) -> Result<(), ProcessError> {
    let mut command = tokio::process::Command::new("taskkill");
    command.args(["/PID", &pid.to_string(), "/T", "/F"]);
    hide_console(&mut command);
    let output = command
        .output()
        .await
        .map_err(|e| ProcessError::Terminate {
            pid,
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(ProcessError::Terminate {
            pid,
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}
