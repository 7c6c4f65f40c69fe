//! Run lifecycle control: cancellation, pause/resume, advisory stop, and the
//! tool-approval rendezvous.
//!
//! The controller is an explicit first-class handle — no ambient task-local
//! state. Every suspension point in a run observes the same cancellation
//! signal. Once cancelled the controller is terminal: guards fail, pending
//! approvals resolve as denied, and new approval requests are denied
//! immediately.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{oneshot, watch};

use crate::error::{AgentError, AgentResult};

struct ControllerInner {
    cancel_tx: watch::Sender<bool>,
    paused: AtomicBool,
    stop_requested: AtomicBool,
    cancel_reason: Mutex<Option<String>>,
    pause_waiters: Mutex<VecDeque<oneshot::Sender<()>>>,
    approvals: Mutex<HashMap<String, oneshot::Sender<bool>>>,
}

/// Shared control handle for one run.
#[derive(Clone)]
pub struct RunController {
    inner: Arc<ControllerInner>,
}

impl Default for RunController {
    fn default() -> Self {
        Self::new()
    }
}

impl RunController {
    pub fn new() -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(ControllerInner {
                cancel_tx,
                paused: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                cancel_reason: Mutex::new(None),
                pause_waiters: Mutex::new(VecDeque::new()),
                approvals: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Observable cancellation signal for long operations.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.inner.cancel_tx.subscribe(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancel_tx.borrow()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    pub fn stop_requested(&self) -> bool {
        self.inner.stop_requested.load(Ordering::SeqCst)
    }

    pub fn cancel_reason(&self) -> Option<String> {
        self.inner.cancel_reason.lock().expect("reason lock").clone()
    }

    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
    }

    /// Clear the pause flag and release all pause-waiters in FIFO order.
    pub fn resume(&self) {
        // Flag flips under the waiter lock so wait_if_paused cannot observe
        // "paused" and then miss this drain.
        let mut waiters = self.inner.pause_waiters.lock().expect("pause lock");
        self.inner.paused.store(false, Ordering::SeqCst);
        while let Some(waiter) = waiters.pop_front() {
            let _ = waiter.send(());
        }
    }

    /// Cooperative stop: engines read this between steps and exit gracefully.
    pub fn stop(&self) {
        self.inner.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Hard cancel: aborts the signal, denies all pending approvals, and
    /// wakes pause-waiters.
    pub fn cancel(&self, reason: Option<String>) {
        {
            let mut stored = self.inner.cancel_reason.lock().expect("reason lock");
            if stored.is_none() {
                *stored = reason;
            }
        }
        let _ = self.inner.cancel_tx.send_replace(true);

        let pending: Vec<_> = {
            let mut approvals = self.inner.approvals.lock().expect("approval lock");
            approvals.drain().collect()
        };
        for (call_id, tx) in pending {
            tracing::debug!(call_id, "denying pending approval on cancel");
            let _ = tx.send(false);
        }

        let mut waiters = self.inner.pause_waiters.lock().expect("pause lock");
        while let Some(waiter) = waiters.pop_front() {
            let _ = waiter.send(());
        }
    }

    /// Return immediately unless paused; otherwise block until resumed or
    /// cancelled.
    pub async fn wait_if_paused(&self) {
        loop {
            if self.is_cancelled() || !self.is_paused() {
                return;
            }
            let rx = {
                let mut waiters = self.inner.pause_waiters.lock().expect("pause lock");
                // Re-check under the lock so a concurrent resume cannot slip
                // between the flag read and the registration.
                if self.is_cancelled() || !self.is_paused() {
                    return;
                }
                let (tx, rx) = oneshot::channel();
                waiters.push_back(tx);
                rx
            };
            let mut signal = self.signal();
            tokio::select! {
                _ = rx => {}
                _ = signal.cancelled() => return,
            }
        }
    }

    /// Register an approval rendezvous for `call_id`. Registration happens
    /// eagerly so a consumer reacting to the `tool_approval_request` event
    /// can always resolve it; resolves `false` immediately when already
    /// cancelled and `false` if the run is cancelled while waiting.
    pub fn begin_approval(&self, call_id: &str) -> PendingApproval {
        if self.is_cancelled() {
            return PendingApproval { rx: None };
        }
        let mut approvals = self.inner.approvals.lock().expect("approval lock");
        if self.is_cancelled() {
            return PendingApproval { rx: None };
        }
        let (tx, rx) = oneshot::channel();
        approvals.insert(call_id.to_string(), tx);
        PendingApproval { rx: Some(rx) }
    }

    /// Await a user decision for `call_id`.
    pub async fn request_approval(&self, call_id: &str) -> bool {
        self.begin_approval(call_id).wait().await
    }

    /// Resolve a pending approval. Returns false when no request with this id
    /// is waiting.
    pub fn resolve_approval(&self, call_id: &str, allowed: bool) -> bool {
        let sender = {
            let mut approvals = self.inner.approvals.lock().expect("approval lock");
            approvals.remove(call_id)
        };
        match sender {
            Some(tx) => tx.send(allowed).is_ok(),
            None => false,
        }
    }

    /// Gate for tool execution: fail fast if cancelled, hold while paused,
    /// re-check after any pause.
    pub async fn guard_tool_execution(&self, tool_name: &str) -> AgentResult<()> {
        if self.is_cancelled() {
            return Err(AgentError::ToolCancelled(tool_name.to_string()));
        }
        self.wait_if_paused().await;
        if self.is_cancelled() {
            return Err(AgentError::ToolCancelled(tool_name.to_string()));
        }
        Ok(())
    }
}

/// An approval rendezvous registered with the controller.
pub struct PendingApproval {
    /// `None` means the run was already cancelled at registration.
    rx: Option<oneshot::Receiver<bool>>,
}

impl PendingApproval {
    /// Resolve to the user's decision; denied on cancellation.
    pub async fn wait(self) -> bool {
        match self.rx {
            Some(rx) => rx.await.unwrap_or(false),
            None => false,
        }
    }
}

/// Clonable view of the cancellation token.
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Complete once the run is cancelled (or the controller is gone).
    pub async fn cancelled(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_if_paused_is_immediate_when_running() {
        let controller = RunController::new();
        controller.wait_if_paused().await;
    }

    #[tokio::test]
    async fn resume_releases_waiters() {
        let controller = RunController::new();
        controller.pause();

        let waiting = controller.clone();
        let handle = tokio::spawn(async move {
            waiting.wait_if_paused().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        controller.resume();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("resumed")
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_wakes_paused_waiters() {
        let controller = RunController::new();
        controller.pause();

        let waiting = controller.clone();
        let handle = tokio::spawn(async move {
            waiting.wait_if_paused().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        controller.cancel(Some("user abort".into()));
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("woken")
            .unwrap();
        assert_eq!(controller.cancel_reason().as_deref(), Some("user abort"));
    }

    #[tokio::test]
    async fn approval_round_trip() {
        let controller = RunController::new();

        let waiting = controller.clone();
        let handle = tokio::spawn(async move { waiting.request_approval("call-1").await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(controller.resolve_approval("call-1", true));
        assert!(handle.await.unwrap());

        // Nothing pending anymore.
        assert!(!controller.resolve_approval("call-1", true));
    }

    #[tokio::test]
    async fn cancel_denies_pending_approvals() {
        let controller = RunController::new();

        let waiting = controller.clone();
        let handle = tokio::spawn(async move { waiting.request_approval("call-2").await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        controller.cancel(None);
        assert!(!handle.await.unwrap());

        // Terminal: later requests deny immediately.
        assert!(!controller.request_approval("call-3").await);
    }

    #[tokio::test]
    async fn guard_fails_after_cancel() {
        let controller = RunController::new();
        controller.cancel(None);
        let err = controller.guard_tool_execution("echo").await.unwrap_err();
        assert!(matches!(err, AgentError::ToolCancelled(name) if name == "echo"));
    }
}
