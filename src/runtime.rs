//! Vision runtime readiness gate.
//!
//! The gate polls a [`LibraryProbe`] until the backend reports itself loaded
//! or the attempt budget runs out. Status is published through a watch
//! channel so every reader sees a whole [`RuntimeStatus`], never a mix of
//! fields from two updates.

use crate::error::{Result, VisionError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Why the gate ended up in the failed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateFailure {
    LibraryLoadTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub ready: bool,
    pub progress_percent: u8,
    pub error: Option<GateFailure>,
}

impl RuntimeStatus {
    pub const READY: Self = Self {
        ready: true,
        progress_percent: 100,
        error: None,
    };

    /// Ready or failed; no further transitions happen after this
    pub fn is_settled(&self) -> bool {
        self.ready || self.error.is_some()
    }
}

/// Answers whether the vision backend is usable yet
pub trait LibraryProbe: Send + Sync {
    fn is_loaded(&self) -> bool;
}

impl<F> LibraryProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_loaded(&self) -> bool {
        self()
    }
}

/// The statically linked `imageproc` backend, available from process start
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinBackend;

impl LibraryProbe for BuiltinBackend {
    fn is_loaded(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_attempts: 100,
        }
    }
}

impl GatePolicy {
    fn progress_after(&self, attempts: u32) -> u8 {
        let max = self.max_attempts.max(1) as u64;
        (attempts as u64 * 100 / max).min(100) as u8
    }
}

/// Read side of the gate; cheap to clone
#[derive(Debug, Clone)]
pub struct RuntimeGate {
    status: watch::Receiver<RuntimeStatus>,
}

/// Handle on the polling task; dropping it stops polling
#[derive(Debug)]
#[must_use = "dropping the GateTask stops polling and the gate never settles"]
pub struct GateTask {
    handle: Option<JoinHandle<()>>,
}

impl RuntimeGate {
    /// Check `probe` now and, if it is not satisfied, poll it in the background.
    ///
    /// Must be called inside a tokio runtime when polling is needed. Keep the
    /// returned [`GateTask`] alive for as long as the gate should keep polling;
    /// binding it to `_` cancels polling immediately.
    pub fn start<P>(probe: P, policy: GatePolicy) -> (Self, GateTask)
    where
        P: LibraryProbe + 'static,
    {
        if probe.is_loaded() {
            debug!("Vision runtime available immediately");
            return (Self::ready(), GateTask { handle: None });
        }

        let (tx, rx) = watch::channel(RuntimeStatus::default());
        let handle = tokio::spawn(poll_until_loaded(probe, policy, tx));

        (Self { status: rx }, GateTask { handle: Some(handle) })
    }

    /// A gate that has already cleared
    pub fn ready() -> Self {
        let (_tx, rx) = watch::channel(RuntimeStatus::READY);
        Self { status: rx }
    }

    pub fn check_ready(&self) -> RuntimeStatus {
        *self.status.borrow()
    }

    /// Fail fast unless the runtime is ready
    pub fn ensure_ready(&self) -> Result<()> {
        if self.check_ready().ready {
            Ok(())
        } else {
            Err(VisionError::LibraryNotReady)
        }
    }

    /// Wait for a terminal state.
    ///
    /// Returns the last published status if polling was cancelled first.
    pub async fn wait_settled(&self) -> RuntimeStatus {
        let mut rx = self.status.clone();
        let settled = rx.wait_for(RuntimeStatus::is_settled).await.map(|status| *status);
        settled.unwrap_or_else(|_| *rx.borrow())
    }
}

impl GateTask {
    /// Stop polling; the gate keeps its last status
    pub fn cancel(&self) {
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }
}

impl Drop for GateTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn poll_until_loaded<P: LibraryProbe>(
    probe: P,
    policy: GatePolicy,
    status: watch::Sender<RuntimeStatus>,
) {
    let mut ticker = tokio::time::interval(policy.poll_interval);
    // The first tick completes immediately; the immediate check already happened.
    ticker.tick().await;

    let mut attempts = 0u32;
    loop {
        ticker.tick().await;
        attempts += 1;

        if probe.is_loaded() {
            status.send_replace(RuntimeStatus::READY);
            info!(attempts, "Vision runtime ready");
            return;
        }

        if attempts >= policy.max_attempts {
            status.send_replace(RuntimeStatus {
                ready: false,
                progress_percent: policy.progress_after(attempts),
                error: Some(GateFailure::LibraryLoadTimeout),
            });
            warn!(attempts, "Vision runtime failed to load, giving up");
            return;
        }

        status.send_replace(RuntimeStatus {
            ready: false,
            progress_percent: policy.progress_after(attempts),
            error: None,
        });
    }
}
