//! Cooperative cancellation for a running recording
//!
//! The flag itself is a single `AtomicBool`. The mutex/condvar pair exists only
//! so a pacing sleep can be woken early; nothing else is guarded by it.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Default)]
struct Inner {
    requested: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Shared stop flag threaded through a recording session
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns `true` only for the call that actually set it.
    pub fn request(&self) -> bool {
        let first = !self.inner.requested.swap(true, Ordering::SeqCst);
        if first {
            let _guard = self.inner.lock.lock();
            self.inner.wake.notify_all();
        }
        first
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::SeqCst)
    }

    /// Clear the flag for a fresh session
    pub(crate) fn reset(&self) {
        self.inner.requested.store(false, Ordering::SeqCst);
    }

    /// Block until `deadline` or until a stop is requested.
    ///
    /// Returns `true` when woken by a stop request.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut guard = self.inner.lock.lock();
        loop {
            if self.is_requested() {
                return true;
            }
            if self.inner.wake.wait_until(&mut guard, deadline).timed_out() {
                return self.is_requested();
            }
        }
    }
}

/// Handle given to other threads (signal handlers, UI) to stop a recording
#[derive(Debug, Clone)]
pub struct StopHandle {
    signal: StopSignal,
}

impl StopHandle {
    pub(crate) fn new(signal: StopSignal) -> Self {
        Self { signal }
    }

    /// Ask the capture loop to finish after the frame in flight. Never blocks.
    pub fn stop(&self) {
        if self.signal.request() {
            tracing::info!("Stopping recording");
        } else {
            tracing::info!("Recording already stopping");
        }
    }

    pub fn is_stop_requested(&self) -> bool {
        self.signal.is_requested()
    }
}

/// Wait for Ctrl+C and stop the recording once.
///
/// Meant to be spawned on the runtime next to a recording; it is the only
/// process-level signal wiring the recorder needs.
pub async fn stop_on_ctrl_c(handle: StopHandle) -> std::io::Result<()> {
    stop_when(tokio::signal::ctrl_c(), handle).await
}

/// Stop the recording once `interrupt` resolves. A listener error leaves it running.
pub async fn stop_when<F>(interrupt: F, handle: StopHandle) -> std::io::Result<()>
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    interrupt.await?;
    tracing::info!("Interrupt received");
    handle.stop();
    Ok(())
}
