use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Coarse phase of a provisioning or launch operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    VerifyingArchive,
    Extracting,
    VerifyingRuntime,
    SearchingSystemRuntime,
    ExtractingNatives,
    AssemblingArguments,
    Launching,
}

/// Progress update forwarded to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub percent_complete: u8,
}

/// Progress reporter trait for provisioning and launch operations
/// Implementations forward updates to the UI/notification system
pub trait ProgressReporter: Send + Sync {
    /// Start a new phase (implies 0%)
    fn start_phase(&self, phase: Phase);

    /// Set the completion of the current phase (0-100)
    fn set_percent(&self, phase: Phase, percent: u8);

    /// Set a short status message
    fn set_message(&self, _message: &str) {}
}

/// A progress reporter that does nothing (silent).
/// Useful for background verification or tests.
pub struct SilentProgressReporter;

impl ProgressReporter for SilentProgressReporter {
    fn start_phase(&self, _phase: Phase) {}
    fn set_percent(&self, _phase: Phase, _percent: u8) {}
}

/// Forwards every update as a [`ProgressEvent`] over an unbounded channel.
pub struct ChannelProgressReporter {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressReporter for ChannelProgressReporter {
    fn start_phase(&self, phase: Phase) {
        let _ = self.tx.send(ProgressEvent {
            phase,
            percent_complete: 0,
        });
    }

    fn set_percent(&self, phase: Phase, percent: u8) {
        let _ = self.tx.send(ProgressEvent {
            phase,
            percent_complete: percent.min(100),
        });
    }
}

/// Completion of `done` out of `total` steps, clamped to 0-100
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.saturating_mul(100)) / total).min(100) as u8
}

/// Sending half of a cancellation pair
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Cancellation token wrapper
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// A linked handle/token pair.
    pub fn pair() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx: Arc::new(tx) }, CancelToken::new(rx))
    }

    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Keep the value readable after the sender is gone.
        drop(tx);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; pends forever if it never can be.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Reporter and cancellation token for one caller-initiated operation
#[derive(Clone)]
pub struct TaskContext {
    pub reporter: Arc<dyn ProgressReporter>,
    pub cancel: CancelToken,
}

impl TaskContext {
    pub fn new(reporter: Arc<dyn ProgressReporter>, cancel: CancelToken) -> Self {
        Self { reporter, cancel }
    }

    pub fn silent() -> Self {
        Self::new(Arc::new(SilentProgressReporter), CancelToken::never())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn percent_is_bounded() {
        assert_eq!(percent(0, 0), 100);
        assert_eq!(percent(1, 4), 25);
        assert_eq!(percent(4, 4), 100);
        assert_eq!(percent(9, 4), 100);
    }

    #[test]
    fn channel_reporter_clamps_percent() {
        let (reporter, mut rx) = ChannelProgressReporter::new();
        reporter.start_phase(Phase::Extracting);
        reporter.set_percent(Phase::Extracting, 250);

        assert_eq!(
            rx.try_recv().unwrap(),
            ProgressEvent {
                phase: Phase::Extracting,
                percent_complete: 0
            }
        );
        assert_eq!(rx.try_recv().unwrap().percent_complete, 100);
    }

    #[tokio::test]
    async fn cancel_pair_wakes_waiters() {
        let (handle, token) = CancelToken::pair();
        assert!(!token.is_cancelled());

        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        handle.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn never_token_stays_pending() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
        let res = tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
        assert!(res.is_err());
    }
}
