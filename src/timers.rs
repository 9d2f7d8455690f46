//! Owned groups of one-shot and repeating timer tasks.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::shutdown::Teardown;

/// Timers spawned on behalf of one owner; all of them die with it.
///
/// Once cancelled the set refuses new timers, so a late callback cannot
/// re-arm anything for a context that is already gone.
pub struct TimerSet {
    owner: String,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: bool,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl TimerSet {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Spawn a timer task; returns `false` if the set was already cancelled.
    pub fn spawn<F>(&self, label: &'static str, timer: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        if inner.cancelled {
            debug!(owner = %self.owner, timer = label, "Refusing timer on cancelled set");
            return false;
        }
        inner.handles.retain(|(_, handle)| !handle.is_finished());
        inner.handles.push((label, tokio::spawn(timer)));
        true
    }

    /// Abort every timer and refuse new ones.
    pub fn cancel_all(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.cancelled = true;
            for (label, handle) in inner.handles.drain(..) {
                if !handle.is_finished() {
                    debug!(owner = %self.owner, timer = label, "Timer cancelled");
                }
                handle.abort();
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().map(|inner| inner.cancelled).unwrap_or(true)
    }

    /// Timers still running.
    pub fn active_count(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.handles.iter().filter(|(_, h)| !h.is_finished()).count())
            .unwrap_or(0)
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[async_trait]
impl Teardown for TimerSet {
    fn label(&self) -> String {
        format!("timers:{}", self.owner)
    }

    async fn shutdown(&self) {
        self.cancel_all();
    }
}
