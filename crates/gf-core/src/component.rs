//! The component contract every Ingestor/Join/Sink implements: an
//! asynchronous `start` that runs until cancelled or fatally erroring, and
//! an idempotent, options-driven `stop`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::signal::ComponentSignal;

/// Options for `Component::stop`. `no_wait = false` (the default) is a
/// graceful stop: the component finishes its in-flight batch and drains
/// before returning. `no_wait = true` aborts the current fetch, performs no
/// new work, naks any un-acked bus messages, and returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopOptions {
    pub no_wait: bool,
}

impl StopOptions {
    pub fn graceful() -> Self {
        Self { no_wait: false }
    }

    pub fn no_wait() -> Self {
        Self { no_wait: true }
    }
}

/// The stop signal a running component observes: a `CancellationToken` to
/// await at every suspension point, plus a flag the component checks once
/// cancelled to decide whether to drain in-flight work (graceful) or abort
/// immediately (no-wait).
#[derive(Clone)]
pub struct StopSignal {
    cancel: CancellationToken,
    no_wait: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            no_wait: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// True once `stop(StopOptions{no_wait: true})` has been requested;
    /// only meaningful after `is_cancelled()` is also true.
    pub fn is_no_wait(&self) -> bool {
        self.no_wait.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn request(&self, opts: StopOptions) {
        if opts.no_wait {
            self.no_wait.store(true, Ordering::SeqCst);
        }
        self.cancel.cancel();
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Common lifecycle contract. `start` takes the stop signal that `stop`
/// will trigger and a channel to report fatal component signals on; it
/// returns once the component has genuinely stopped (not merely been asked
/// to).
#[async_trait]
pub trait Component: Send {
    async fn start(&mut self, stop: StopSignal, signals: mpsc::Sender<ComponentSignal>) -> anyhow::Result<()>;
}

/// A running component plus the stop signal used to stop it. `stop` is
/// idempotent: requesting a stop on an already-cancelled signal is a
/// no-op, and awaiting an already-finished join handle returns immediately
/// with its stored result.
pub struct ComponentHandle {
    stop_signal: StopSignal,
    join: tokio::task::JoinHandle<anyhow::Result<()>>,
}

impl ComponentHandle {
    pub fn new(stop_signal: StopSignal, join: tokio::task::JoinHandle<anyhow::Result<()>>) -> Self {
        Self { stop_signal, join }
    }

    /// Requests a stop and waits for the component task to finish. Safe to
    /// call more than once; the second call observes the same outcome.
    pub async fn stop(self, opts: StopOptions) -> anyhow::Result<()> {
        self.stop_signal.request(opts);
        match self.join.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_cancelled() => Ok(()),
            Err(join_err) => Err(join_err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_is_idempotent_with_respect_to_observable_effect() {
        let stop_signal = StopSignal::new();
        let ran_cleanup = Arc::new(AtomicBool::new(false));
        let ran_cleanup2 = ran_cleanup.clone();
        let signal_clone = stop_signal.clone();
        let join = tokio::spawn(async move {
            signal_clone.cancel_token().cancelled().await;
            ran_cleanup2.store(true, Ordering::SeqCst);
            Ok(())
        });
        let handle = ComponentHandle::new(stop_signal.clone(), join);
        handle.stop(StopOptions::graceful()).await.unwrap();
        assert!(ran_cleanup.load(Ordering::SeqCst));
        // A second stop request on the same (already-cancelled) signal is a no-op.
        assert!(stop_signal.is_cancelled());
    }

    #[test]
    fn no_wait_flag_is_only_observable_after_cancellation() {
        let stop_signal = StopSignal::new();
        assert!(!stop_signal.is_cancelled());
        stop_signal.request(StopOptions::no_wait());
        assert!(stop_signal.is_cancelled());
        assert!(stop_signal.is_no_wait());
    }
}
