use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use launchpad_lib::game::installer::{ProgressReporter, TaskContext};
use launchpad_lib::{
    CancelToken, GameLauncher, LaunchRequest, LauncherConfig, Phase, RuntimePaths,
    RuntimeProvisioner,
};

struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn start_phase(&self, phase: Phase) {
        println!("[PHASE] {:?}", phase);
    }

    fn set_percent(&self, phase: Phase, percent: u8) {
        println!("[PROGRESS] {:?} {}%", phase, percent);
    }

    fn set_message(&self, message: &str) {
        println!("[MSG] {}", message);
    }
}

/// Usage: launch_demo <bundle-dir> <request.json> [config.json]
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let bundle_dir = PathBuf::from(args.next().context("missing bundle directory")?);
    let request_path = PathBuf::from(args.next().context("missing launch request")?);
    let config = match args.next() {
        Some(path) => LauncherConfig::load(&PathBuf::from(path))?,
        None => LauncherConfig::default(),
    };

    let data = std::fs::read_to_string(&request_path)
        .with_context(|| format!("Read launch request {:?}", request_path))?;
    let request: LaunchRequest = serde_json::from_str(&data)
        .with_context(|| format!("Parse launch request {:?}", request_path))?;

    let paths = RuntimePaths::new(&bundle_dir, &request.data_dir);
    let provisioner = RuntimeProvisioner::from_bundle(paths, &config)?;
    for status in provisioner.startup_check() {
        println!(
            "[RUNTIME] Java {} {:?} (last verified {:?})",
            status.major, status.state, status.last_verified_at
        );
    }

    // Ctrl-C stops the launch, or the game once it is running
    let (cancel, token) = CancelToken::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let launcher = GameLauncher::new(provisioner, config);
    let ctx = TaskContext::new(Arc::new(ConsoleReporter), token);
    let result = launcher.launch(&request, &ctx).await;

    match (result.exit_report(), result.error()) {
        (Some(report), _) => println!(
            "[DONE] success={} code={:?} runtime={:?}",
            result.success, report.code, report.runtime
        ),
        (None, Some(err)) => println!("[FAILED] {}", err),
        (None, None) => {}
    }
    Ok(())
}
