//! Live sync coordinator
//!
//! Keeps one employee's [`SyncedView`] fresh through a push subscription,
//! falling back to interval polling while the subscription is unconfirmed or
//! broken. Both channels funnel into the same refetch-and-replace operation.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn, Instrument};

use super::alerts::{CodeEdgeDetector, NewItemDetector, SyncAlert};
use super::events::{EntityKind, FeedMessage, RemoteEvent};
use super::snapshot::SyncedView;
use super::supervisor::{ChannelEvent, ChannelMode, ChannelSupervisor};
use crate::backend::{BackendError, ChangeFeed, FeedSubscription, PanelBackend};
use crate::config::SyncConfig;
use crate::domain::{EmployeeId, SmsCodeRequest, TaskId};
use crate::observability::{OperationTimer, SyncMetrics, SyncStats};
use crate::shutdown::Teardown;
use crate::sms::CodeSource;
use crate::telemetry::create_sync_span;

#[derive(Default)]
struct Detectors {
    assignments: NewItemDetector,
    codes: CodeEdgeDetector,
}

struct SyncCore {
    backend: Arc<dyn PanelBackend>,
    employee_id: EmployeeId,
    config: SyncConfig,
    view: watch::Sender<Arc<SyncedView>>,
    mode: watch::Sender<ChannelMode>,
    /// Also serializes refetches so replacements apply in order.
    detectors: Mutex<Detectors>,
    alerts: mpsc::UnboundedSender<SyncAlert>,
    metrics: SyncMetrics,
}

impl SyncCore {
    fn current(&self) -> Arc<SyncedView> {
        self.view.borrow().clone()
    }

    async fn refetch(&self, scope: &[EntityKind], trigger: &'static str) -> Result<Arc<SyncedView>, BackendError> {
        let span = create_sync_span(self.employee_id, trigger);
        async move {
            let timer = OperationTimer::new("sync.refetch");
            let mut detectors = self.detectors.lock().await;
            let previous = self.current();
            let mut next = (*previous).clone();

            if let Err(e) = self.fetch_into(&mut next, scope).await {
                self.metrics.record_refetch_error();
                return Err(e);
            }
            next.revision = previous.revision + 1;

            let alerts = detect(&mut detectors, &previous, &next, scope);
            let next = Arc::new(next);
            self.view.send_replace(next.clone());
            self.metrics.record_refetch();
            drop(detectors);

            for alert in alerts {
                self.emit(alert);
            }
            debug!(revision = next.revision, scope = ?scope, "View replaced");
            timer.finish();
            Ok(next)
        }
        .instrument(span)
        .await
    }

    /// Replace every entity set named in `scope`; the view is left alone on error.
    async fn fetch_into(&self, view: &mut SyncedView, scope: &[EntityKind]) -> Result<(), BackendError> {
        let employee_id = self.employee_id;

        if scope.contains(&EntityKind::Assignment) {
            let assignments = self.backend.list_assignments(employee_id).await?;
            view.assignments = assignments.into_iter().map(|a| (a.task_id, a)).collect();
        }
        let task_ids = view.task_ids();

        if scope.contains(&EntityKind::Task) {
            let mut tasks = BTreeMap::new();
            for task_id in &task_ids {
                if let Some(task) = self.backend.fetch_task(*task_id).await? {
                    tasks.insert(*task_id, task);
                }
            }
            view.tasks = tasks;
        }

        if scope.contains(&EntityKind::Document) {
            let mut counts = BTreeMap::new();
            for task_id in &task_ids {
                counts.insert(*task_id, self.backend.count_documents(*task_id, employee_id).await?);
            }
            view.document_counts = counts;
        }

        if scope.contains(&EntityKind::Evaluation) {
            let mut evaluations = BTreeSet::new();
            for task_id in &task_ids {
                if self.backend.evaluation_exists(*task_id, employee_id).await? {
                    evaluations.insert(*task_id);
                }
            }
            view.evaluations = evaluations;
        }

        if scope.contains(&EntityKind::SmsCodeRequest) {
            let mut requests = BTreeMap::new();
            for task_id in &task_ids {
                if let Some(request) = self.backend.latest_sms_request(*task_id, employee_id).await? {
                    requests.insert(*task_id, request);
                }
            }
            view.sms_requests = requests;
        }

        if scope.contains(&EntityKind::Notification) {
            view.notifications = self.backend.list_notifications(employee_id).await?;
        }
        Ok(())
    }

    async fn apply_remote_event(&self, event: &RemoteEvent) -> Result<Arc<SyncedView>, BackendError> {
        if event.employee_id.is_some_and(|id| id != self.employee_id) {
            debug!(record_id = %event.record_id, "Ignoring event for another employee");
            return Ok(self.current());
        }
        if event.is_assignment_delete() {
            info!(
                employee_id = %self.employee_id,
                task_id = ?event.task_id,
                "Assignment deleted remotely"
            );
        }
        self.refetch(event.entity.refetch_scope(), "push_event").await
    }

    /// Background refetches have no caller to report to.
    async fn refetch_in_background(&self, scope: &[EntityKind], trigger: &'static str) {
        if let Err(e) = self.refetch(scope, trigger).await {
            warn!(employee_id = %self.employee_id, trigger, error = %e, "Background refetch failed");
            self.emit(SyncAlert::RefetchFailed {
                message: e.to_string(),
            });
        }
    }

    async fn on_confirmed(&self) {
        self.detectors
            .lock()
            .await
            .assignments
            .start_grace(Instant::now(), self.config.alert_grace());
        // Catch up on anything written between the initial load and the ack.
        self.refetch_in_background(&EntityKind::ALL, "confirmed").await;
    }

    fn emit(&self, alert: SyncAlert) {
        self.metrics.record_alert();
        if self.alerts.send(alert).is_err() {
            debug!("Alert dropped, no listener");
        }
    }
}

fn detect(
    detectors: &mut Detectors,
    previous: &SyncedView,
    next: &SyncedView,
    scope: &[EntityKind],
) -> Vec<SyncAlert> {
    let mut alerts = Vec::new();
    let now = Instant::now();

    if scope.contains(&EntityKind::Assignment) {
        if !detectors.assignments.is_seeded() {
            detectors
                .assignments
                .seed(next.assignments.values().map(|a| a.id), Utc::now());
        } else {
            for (task_id, assignment) in &previous.assignments {
                // Gone, or replaced by a fresh assignment of the same task.
                if next.assignment_id(*task_id) != Some(assignment.id) {
                    detectors.assignments.forget(assignment.id);
                    if let Some(request) = previous.sms_requests.get(task_id) {
                        detectors.codes.forget(request.id);
                    }
                    alerts.push(SyncAlert::AssignmentRevoked { task_id: *task_id });
                }
            }
            for (task_id, assignment) in &next.assignments {
                if detectors
                    .assignments
                    .observe(assignment.id, assignment.assigned_at, now)
                {
                    let title = next
                        .tasks
                        .get(task_id)
                        .map(|t| t.title.clone())
                        .unwrap_or_default();
                    alerts.push(SyncAlert::TaskAssigned {
                        task_id: *task_id,
                        title,
                    });
                }
            }
        }
    }

    if scope.contains(&EntityKind::SmsCodeRequest) {
        for (task_id, request) in &next.sms_requests {
            if detectors.codes.observe(request) {
                alerts.push(SyncAlert::SmsCodeReceived {
                    task_id: *task_id,
                    request_id: request.id,
                });
            }
        }
    }
    alerts
}

enum Command {
    Close,
}

/// Owns the subscription, the confirm timeout and the poll interval.
struct Driver {
    core: Arc<SyncCore>,
    supervisor: ChannelSupervisor,
    subscription: Option<FeedSubscription>,
    poll: Option<Interval>,
    confirm_armed: bool,
}

async fn next_message(subscription: &mut Option<FeedSubscription>) -> Option<FeedMessage> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_poll(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let confirm_deadline = sleep(self.core.config.push_confirm_timeout());
        tokio::pin!(confirm_deadline);

        if self.subscription.is_none() {
            self.handle(ChannelEvent::ChannelError).await;
        }

        loop {
            tokio::select! {
                message = next_message(&mut self.subscription) => {
                    self.on_message(message).await;
                }
                () = &mut confirm_deadline, if self.confirm_armed => {
                    self.handle(ChannelEvent::ConfirmTimeout).await;
                }
                () = next_poll(&mut self.poll) => {
                    self.core.metrics.record_poll();
                    self.core.refetch_in_background(&EntityKind::ALL, "poll").await;
                }
                command = commands.recv() => {
                    match command {
                        Some(Command::Close) | None => self.handle(ChannelEvent::Close).await,
                    }
                }
            }

            if self.supervisor.mode() == ChannelMode::Closed {
                break;
            }
        }
        debug!(employee_id = %self.core.employee_id, "Sync driver stopped");
    }

    async fn on_message(&mut self, message: Option<FeedMessage>) {
        match message {
            Some(FeedMessage::Confirmed) => self.handle(ChannelEvent::Confirmed).await,
            Some(FeedMessage::Event(event)) => {
                self.core.metrics.record_event();
                if let Err(e) = self.core.apply_remote_event(&event).await {
                    warn!(error = %e, entity = ?event.entity, "Refetch after push event failed");
                    self.core.emit(SyncAlert::RefetchFailed {
                        message: e.to_string(),
                    });
                }
            }
            Some(FeedMessage::Error(message)) => {
                warn!(employee_id = %self.core.employee_id, %message, "Change feed reported an error");
                self.subscription = None;
                self.handle(ChannelEvent::ChannelError).await;
            }
            None => {
                self.subscription = None;
                self.handle(ChannelEvent::ChannelError).await;
            }
        }
    }

    async fn handle(&mut self, event: ChannelEvent) {
        let Some(mode) = self.supervisor.handle(event) else {
            return;
        };
        self.core.mode.send_replace(mode);
        info!(employee_id = %self.core.employee_id, mode = %mode, "Sync channel mode changed");

        match mode {
            ChannelMode::LivePush => {
                self.confirm_armed = false;
                self.poll = None;
                self.core.on_confirmed().await;
            }
            ChannelMode::FallbackPoll => {
                self.confirm_armed = false;
                self.core.metrics.record_fallback();
                let period = self.core.config.poll_interval();
                let mut interval = interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.poll = Some(interval);
            }
            ChannelMode::Closed => {
                self.confirm_armed = false;
                self.poll = None;
                self.subscription = None;
            }
            ChannelMode::Connecting => {}
        }
    }
}

/// Per-employee live view of the backend.
///
/// Every instance owns its timers, detectors and metrics; nothing is shared
/// between coordinators.
pub struct LiveSyncCoordinator {
    core: Arc<SyncCore>,
    commands: mpsc::UnboundedSender<Command>,
    driver: StdMutex<Option<JoinHandle<()>>>,
    alerts: StdMutex<Option<mpsc::UnboundedReceiver<SyncAlert>>>,
}

impl LiveSyncCoordinator {
    /// Load the initial view, subscribe, and start the driver.
    ///
    /// A refused subscription is not an error: the coordinator starts
    /// polling straight away.
    pub async fn start(
        backend: Arc<dyn PanelBackend>,
        feed: Arc<dyn ChangeFeed>,
        employee_id: EmployeeId,
        config: SyncConfig,
    ) -> Result<Self, BackendError> {
        let (alert_tx, alert_rx) = mpsc::unbounded_channel();
        let core = Arc::new(SyncCore {
            backend,
            employee_id,
            config,
            view: watch::Sender::new(Arc::new(SyncedView::default())),
            mode: watch::Sender::new(ChannelMode::Connecting),
            detectors: Mutex::new(Detectors::default()),
            alerts: alert_tx,
            metrics: SyncMetrics::new(),
        });

        core.refetch(&EntityKind::ALL, "initial_load").await?;

        let subscription = match feed.subscribe(employee_id).await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                warn!(employee_id = %employee_id, error = %e, "Change feed subscription refused");
                None
            }
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let driver = Driver {
            core: core.clone(),
            supervisor: ChannelSupervisor::new(employee_id),
            confirm_armed: subscription.is_some(),
            subscription,
            poll: None,
        };
        let handle = tokio::spawn(driver.run(command_rx));

        info!(employee_id = %employee_id, "Live sync started");
        Ok(Self {
            core,
            commands: command_tx,
            driver: StdMutex::new(Some(handle)),
            alerts: StdMutex::new(Some(alert_rx)),
        })
    }

    pub fn employee_id(&self) -> EmployeeId {
        self.core.employee_id
    }

    pub fn backend(&self) -> Arc<dyn PanelBackend> {
        self.core.backend.clone()
    }

    /// Latest successfully refetched view.
    pub fn view(&self) -> Arc<SyncedView> {
        self.core.current()
    }

    pub fn watch_view(&self) -> watch::Receiver<Arc<SyncedView>> {
        self.core.view.subscribe()
    }

    pub fn mode(&self) -> ChannelMode {
        *self.core.mode.borrow()
    }

    /// The alert stream; can be taken once.
    pub fn take_alerts(&self) -> Option<mpsc::UnboundedReceiver<SyncAlert>> {
        self.alerts.lock().ok().and_then(|mut slot| slot.take())
    }

    pub fn stats(&self) -> SyncStats {
        self.core.metrics.get_stats()
    }

    pub fn metrics(&self) -> &SyncMetrics {
        &self.core.metrics
    }

    /// Refetch and replace the given entity sets now.
    pub async fn refresh(&self, scope: &[EntityKind]) -> Result<Arc<SyncedView>, BackendError> {
        self.core.refetch(scope, "explicit").await
    }

    /// The single entry point for row-level change notifications.
    pub async fn apply_remote_event(&self, event: &RemoteEvent) -> Result<Arc<SyncedView>, BackendError> {
        self.core.apply_remote_event(event).await
    }

    /// Stop the driver, letting the supervisor reach `closed`.
    pub async fn close(&self) {
        let _ = self.commands.send(Command::Close);
        let handle = self.driver.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Sync driver ended abnormally");
                }
            }
        }
        self.core.mode.send_replace(ChannelMode::Closed);
        self.core.metrics.log_stats();
    }

    /// Abort the driver without waiting; every timer it owns is dropped.
    pub fn teardown(&self) {
        if let Some(handle) = self.driver.lock().ok().and_then(|mut slot| slot.take()) {
            handle.abort();
        }
        self.core.mode.send_replace(ChannelMode::Closed);
    }

    pub fn is_running(&self) -> bool {
        self.driver
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for LiveSyncCoordinator {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[async_trait]
impl Teardown for LiveSyncCoordinator {
    fn label(&self) -> String {
        format!("live-sync:{}", self.core.employee_id)
    }

    async fn shutdown(&self) {
        self.close().await;
    }
}

#[async_trait]
impl CodeSource for LiveSyncCoordinator {
    async fn latest_request(&self, task_id: TaskId) -> Result<Option<SmsCodeRequest>, BackendError> {
        let view = self.refresh(&[EntityKind::SmsCodeRequest]).await?;
        Ok(view.sms_requests.get(&task_id).cloned())
    }

    async fn create_request(&self, task_id: TaskId) -> Result<SmsCodeRequest, BackendError> {
        let request = self
            .core
            .backend
            .request_sms_code(task_id, self.core.employee_id)
            .await?;
        self.refresh(&[EntityKind::SmsCodeRequest, EntityKind::Task]).await?;
        Ok(request)
    }
}
