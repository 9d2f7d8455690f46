use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::countdown::Countdown;
use super::{ClipboardSink, CodeSource, SmsWaitCondition};
use crate::backend::BackendError;
use crate::config::SmsConfig;
use crate::domain::{SmsCodeRequest, SmsRequestId, TaskId};
use crate::shutdown::Teardown;
use crate::sync::CodeEdgeDetector;
use crate::workflow::Step;

/// One-shot confirmations raised by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    CodeReceived {
        task_id: TaskId,
        request_id: SmsRequestId,
    },
}

struct TrackerState {
    step: Step,
    request: Option<SmsCodeRequest>,
    detector: CodeEdgeDetector,
    revealed: bool,
    countdown: Countdown,
    torn_down: bool,
}

struct TrackerInner {
    task_id: TaskId,
    source: Arc<dyn CodeSource>,
    condition: SmsWaitCondition,
    refresh_interval: Duration,
    tick: Duration,
    state: Mutex<TrackerState>,
    countdown: watch::Sender<u32>,
    events: mpsc::UnboundedSender<TrackerEvent>,
}

impl TrackerInner {
    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take in a freshly fetched request; returns whether waiting continues.
    fn ingest(&self, request: Option<SmsCodeRequest>) -> bool {
        let mut state = self.state();
        if state.torn_down {
            return false;
        }

        let previous_id = state.request.as_ref().map(|r| r.id);
        if previous_id != request.as_ref().map(|r| r.id) {
            state.revealed = false;
        }

        if let Some(request) = &request {
            if state.detector.observe(request) {
                info!(task_id = %self.task_id, request_id = %request.id, "SMS code received");
                let _ = self.events.send(TrackerEvent::CodeReceived {
                    task_id: self.task_id,
                    request_id: request.id,
                });
            }
        }

        state.request = request;
        self.condition.holds(state.step, state.request.as_ref())
    }

    fn is_torn_down(&self) -> bool {
        self.state().torn_down
    }

    fn still_waiting(&self) -> bool {
        let state = self.state();
        !state.torn_down && self.condition.holds(state.step, state.request.as_ref())
    }

    fn reset_countdown(&self) {
        let mut state = self.state();
        state.countdown.reset();
        self.countdown.send_replace(state.countdown.remaining());
    }

    fn tick_countdown(&self) {
        let mut state = self.state();
        let remaining = state.countdown.tick();
        self.countdown.send_replace(remaining);
    }

    async fn run(self: Arc<Self>) {
        let start = Instant::now();
        let mut tick = interval_at(start + self.tick, self.tick);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut refresh = interval_at(start + self.refresh_interval, self.refresh_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = tick.tick() => self.tick_countdown(),
                _ = refresh.tick() => {
                    let waiting = match self.source.latest_request(self.task_id).await {
                        Ok(request) => self.ingest(request),
                        Err(e) => {
                            warn!(task_id = %self.task_id, error = %e, "SMS code refetch failed");
                            self.still_waiting()
                        }
                    };
                    self.reset_countdown();
                    if !waiting {
                        break;
                    }
                }
            }
        }
        debug!(task_id = %self.task_id, "SMS code timers stopped");
    }
}

/// Tracks the open code request of one task.
///
/// While the wait condition holds, a refetch runs every refresh interval and
/// a countdown ticks toward it. Leaving the wait step, receiving the code, or
/// [`teardown`](Self::teardown) stops both timers.
pub struct SmsCodeTracker {
    inner: Arc<TrackerInner>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl SmsCodeTracker {
    pub fn new(
        task_id: TaskId,
        source: Arc<dyn CodeSource>,
        condition: SmsWaitCondition,
        config: &SmsConfig,
    ) -> (Self, mpsc::UnboundedReceiver<TrackerEvent>) {
        let tick = config.countdown_tick();
        let refresh_interval = config.refresh_interval();
        let period = (refresh_interval.as_millis() / tick.as_millis().max(1)) as u32;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(TrackerInner {
            task_id,
            source,
            condition,
            refresh_interval,
            tick,
            state: Mutex::new(TrackerState {
                step: Step::FIRST,
                request: None,
                detector: CodeEdgeDetector::new(),
                revealed: false,
                countdown: Countdown::new(period),
                torn_down: false,
            }),
            countdown: watch::Sender::new(period),
            events: events_tx,
        });

        let tracker = Self {
            inner,
            driver: Mutex::new(None),
        };
        (tracker, events_rx)
    }

    fn driver(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.driver.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reconcile with the latest known step and request.
    pub fn observe(&self, step: Step, request: Option<SmsCodeRequest>) {
        self.inner.state().step = step;
        let waiting = self.inner.ingest(request);
        self.sync_driver(waiting, false);
    }

    fn sync_driver(&self, waiting: bool, restart: bool) {
        let mut driver = self.driver();
        let running = driver.as_ref().is_some_and(|h| !h.is_finished());

        if !waiting || restart {
            if let Some(handle) = driver.take() {
                handle.abort();
            }
        }
        if waiting && (restart || !running) {
            self.inner.reset_countdown();
            *driver = Some(tokio::spawn(self.inner.clone().run()));
            debug!(task_id = %self.inner.task_id, "SMS code timers started");
        }
    }

    /// Ask for a code: inserts a new request row and restarts the countdown.
    pub async fn request_code(&self) -> Result<SmsCodeRequest, BackendError> {
        if self.inner.is_torn_down() {
            return Err(BackendError::rejected("the task view is closed"));
        }
        let request = self.inner.source.create_request(self.inner.task_id).await?;
        info!(task_id = %self.inner.task_id, request_id = %request.id, "SMS code requested");

        let waiting = self.inner.ingest(Some(request.clone()));
        self.sync_driver(waiting, true);
        Ok(request)
    }

    /// A resend supersedes the open request with a new row.
    pub async fn resend(&self) -> Result<SmsCodeRequest, BackendError> {
        let superseded = self.current_request().map(|r| r.id);
        let request = self.request_code().await?;
        debug!(superseded = ?superseded, request_id = %request.id, "SMS code resent");
        Ok(request)
    }

    /// Session-local reveal toggle; returns the new state.
    pub fn toggle_reveal(&self) -> bool {
        let mut state = self.inner.state();
        state.revealed = !state.revealed;
        state.revealed
    }

    pub fn is_revealed(&self) -> bool {
        self.inner.state().revealed
    }

    /// The code, if one arrived and the employee chose to reveal it.
    pub fn visible_code(&self) -> Option<String> {
        let state = self.inner.state();
        if !state.revealed {
            return None;
        }
        state
            .request
            .as_ref()
            .filter(|r| r.has_code())
            .and_then(|r| r.code.clone())
    }

    /// Copy the received code; `false` when there is nothing to copy.
    pub fn copy_code(&self, sink: &dyn ClipboardSink) -> bool {
        let code = {
            let state = self.inner.state();
            state
                .request
                .as_ref()
                .filter(|r| r.has_code())
                .and_then(|r| r.code.clone())
        };
        match code {
            Some(code) => {
                sink.copy(&code);
                true
            }
            None => false,
        }
    }

    pub fn current_request(&self) -> Option<SmsCodeRequest> {
        self.inner.state().request.clone()
    }

    pub fn countdown(&self) -> u32 {
        *self.inner.countdown.borrow()
    }

    /// Whether the refetch and countdown timers are running.
    pub fn is_active(&self) -> bool {
        self.driver().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop all timers for good; later observations are ignored.
    pub fn teardown(&self) {
        self.inner.state().torn_down = true;
        if let Some(handle) = self.driver().take() {
            handle.abort();
            debug!(task_id = %self.inner.task_id, "SMS code tracker torn down");
        }
    }
}

impl Drop for SmsCodeTracker {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[async_trait]
impl Teardown for SmsCodeTracker {
    fn label(&self) -> String {
        format!("sms-tracker:{}", self.inner.task_id)
    }

    async fn shutdown(&self) {
        self.teardown();
    }
}
