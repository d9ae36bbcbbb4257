//! Fault injection decorators
//!
//! Wrap a working source to simulate a capture device that hangs or crashes
//! after a number of successful reads.

use crate::capture::source::{Frame, FrameSource, FrameSourceError, FrameSourceResult};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct FreezeState {
    frozen: bool,
    thawed: bool,
}

#[derive(Debug, Default)]
struct FreezeShared {
    state: Mutex<FreezeState>,
    changed: Condvar,
}

/// Remote control for a [`FreezingSource`], usable from another thread
#[derive(Debug, Clone, Default)]
pub struct FreezeHandle {
    shared: Arc<FreezeShared>,
}

impl FreezeHandle {
    /// Release a blocked read. The read fails with `Interrupted`.
    pub fn thaw(&self) {
        let mut state = self.shared.state.lock();
        state.thawed = true;
        self.shared.changed.notify_all();
    }

    pub fn is_frozen(&self) -> bool {
        self.shared.state.lock().frozen
    }

    /// Block until a read has frozen, or the timeout passes
    pub fn wait_until_frozen(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.frozen {
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.frozen
    }
}

/// Returns `reads_before_freeze` frames, then blocks on the next read until
/// thawed through its [`FreezeHandle`]
pub struct FreezingSource<S> {
    inner: S,
    reads_before_freeze: u64,
    reads: u64,
    handle: FreezeHandle,
}

impl<S: FrameSource> FreezingSource<S> {
    pub fn new(reads_before_freeze: u64, inner: S) -> Self {
        Self {
            inner,
            reads_before_freeze,
            reads: 0,
            handle: FreezeHandle::default(),
        }
    }

    pub fn handle(&self) -> FreezeHandle {
        self.handle.clone()
    }

    fn freeze(&self) -> FrameSourceError {
        let shared = &self.handle.shared;
        let mut state = shared.state.lock();
        state.frozen = true;
        shared.changed.notify_all();
        tracing::warn!("Source frozen after {} reads", self.reads);

        while !state.thawed {
            shared.changed.wait(&mut state);
        }
        FrameSourceError::Interrupted("Frozen read released".to_string())
    }
}

impl<S: FrameSource> FrameSource for FreezingSource<S> {
    fn open(&mut self) -> FrameSourceResult<()> {
        self.reads = 0;
        self.inner.open()
    }

    fn read_frame(&mut self) -> FrameSourceResult<Frame> {
        if self.reads >= self.reads_before_freeze {
            return Err(self.freeze());
        }
        self.reads += 1;
        self.inner.read_frame()
    }

    fn sample_frame(&mut self) -> FrameSourceResult<Frame> {
        self.inner.sample_frame()
    }

    fn width(&self) -> u32 {
        self.inner.width()
    }

    fn height(&self) -> u32 {
        self.inner.height()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// Returns `reads_before_error` frames, then fails every read with `Crashed`
pub struct ErrorProneSource<S> {
    inner: S,
    reads_before_error: u64,
    reads: u64,
}

impl<S: FrameSource> ErrorProneSource<S> {
    pub fn new(reads_before_error: u64, inner: S) -> Self {
        Self {
            inner,
            reads_before_error,
            reads: 0,
        }
    }
}

impl<S: FrameSource> FrameSource for ErrorProneSource<S> {
    fn open(&mut self) -> FrameSourceResult<()> {
        self.reads = 0;
        self.inner.open()
    }

    fn read_frame(&mut self) -> FrameSourceResult<Frame> {
        if self.reads >= self.reads_before_error {
            return Err(FrameSourceError::Crashed(format!(
                "Injected failure after {} reads",
                self.reads_before_error
            )));
        }
        self.reads += 1;
        self.inner.read_frame()
    }

    fn sample_frame(&mut self) -> FrameSourceResult<Frame> {
        self.inner.sample_frame()
    }

    fn width(&self) -> u32 {
        self.inner.width()
    }

    fn height(&self) -> u32 {
        self.inner.height()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}
