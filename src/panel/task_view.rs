use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use super::in_flight::InFlightRegistry;
use super::{ActionFeedback, CloseReason, Dialog, Notice, ViewAction, ViewError};
use crate::backend::PanelBackend;
use crate::config::PanelConfig;
use crate::domain::{AssignmentId, AssignmentPatch, EmployeeId, TaskId};
use crate::shutdown::Teardown;
use crate::sms::{SmsCodeTracker, SmsWaitCondition, TrackerEvent};
use crate::sync::{EntityKind, LiveSyncCoordinator, SyncedView, TaskSnapshot};
use crate::telemetry::{create_view_span, generate_correlation_id};
use crate::timers::TimerSet;
use crate::workflow::{
    CompletionPlan, DigitalDecision, GateReason, GateRejection, LegalActions, SideEffect, Step,
    UiHint, WorkflowAction, WorkflowMachine,
};

/// Session-local state; nothing here is persisted.
#[derive(Default)]
struct LocalState {
    note_drafts: BTreeMap<Step, String>,
    video_confirmed: bool,
    open_dialog: Option<Dialog>,
    closed: Option<CloseReason>,
    notices: VecDeque<Notice>,
}

/// One employee's open view of one task.
///
/// The latest refetched assignment is the only source of truth: every
/// workflow action refetches, gates against what came back, writes, and
/// refetches again. Nothing is applied optimistically.
pub struct TaskView {
    task_id: TaskId,
    employee_id: EmployeeId,
    assignment_id: AssignmentId,
    coordinator: Arc<LiveSyncCoordinator>,
    backend: Arc<dyn PanelBackend>,
    machine: WorkflowMachine,
    in_flight: InFlightRegistry,
    tracker: SmsCodeTracker,
    tracker_events: Mutex<mpsc::UnboundedReceiver<TrackerEvent>>,
    timers: TimerSet,
    watcher: Mutex<Option<JoinHandle<()>>>,
    local: Mutex<LocalState>,
    span: tracing::Span,
}

/// Reconcile the view on every coordinator update until it closes.
async fn follow_remote_changes(view: Weak<TaskView>, mut updates: watch::Receiver<Arc<SyncedView>>) {
    while updates.changed().await.is_ok() {
        let Some(view) = view.upgrade() else {
            break;
        };
        view.pump();
        if view.is_closed() {
            break;
        }
    }
}

impl TaskView {
    /// Open the view on a task present in the coordinator's current view.
    ///
    /// The view follows coordinator updates on its own, so a revocation
    /// closes it without any action from the employee.
    pub fn open(
        coordinator: Arc<LiveSyncCoordinator>,
        in_flight: InFlightRegistry,
        config: &PanelConfig,
        task_id: TaskId,
    ) -> Result<Arc<Self>, ViewError> {
        let Some(opened) = coordinator.view().task_context(task_id) else {
            return Err(ViewError::NotFound { task_id });
        };

        let employee_id = coordinator.employee_id();
        let correlation_id = generate_correlation_id();
        let (tracker, tracker_events) = SmsCodeTracker::new(
            task_id,
            coordinator.clone(),
            SmsWaitCondition::new(config.workflow.wait_steps()),
            &config.sms,
        );

        let task_view = Arc::new(Self {
            task_id,
            employee_id,
            assignment_id: opened.assignment.id,
            backend: coordinator.backend(),
            coordinator,
            machine: WorkflowMachine::new(
                config.workflow.gate_rules(),
                config.workflow.demo_reveal_delay(),
            ),
            in_flight,
            tracker,
            tracker_events: Mutex::new(tracker_events),
            timers: TimerSet::new(format!("task-view:{task_id}")),
            watcher: Mutex::new(None),
            local: Mutex::new(LocalState::default()),
            span: create_view_span(task_id, employee_id, &correlation_id),
        });
        task_view.pump();
        let updates = task_view.coordinator.watch_view();
        *task_view.watcher() = Some(tokio::spawn(follow_remote_changes(
            Arc::downgrade(&task_view),
            updates,
        )));
        info!(task_id = %task_id, employee_id = %employee_id, correlation_id = %correlation_id, "Task view opened");
        Ok(task_view)
    }

    fn local(&self) -> MutexGuard<'_, LocalState> {
        self.local.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn watcher(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.watcher.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn stop_watching(&self) {
        if let Some(handle) = self.watcher().take() {
            handle.abort();
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn is_closed(&self) -> bool {
        self.local().closed.is_some()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.local().closed
    }

    pub fn open_dialog(&self) -> Option<Dialog> {
        self.local().open_dialog
    }

    pub fn dismiss_dialog(&self) {
        self.local().open_dialog = None;
    }

    /// Drain one-time notices; each is returned once.
    pub fn take_notices(&self) -> Vec<Notice> {
        self.pump();
        self.local().notices.drain(..).collect()
    }

    pub fn tracker(&self) -> &SmsCodeTracker {
        &self.tracker
    }

    pub fn active_timers(&self) -> usize {
        self.timers.active_count()
    }

    fn ensure_open(&self) -> Result<(), ViewError> {
        match self.local().closed {
            None => Ok(()),
            Some(CloseReason::Revoked) => Err(ViewError::Revoked),
            Some(_) => Err(ViewError::Closed),
        }
    }

    /// The task as of the latest refetch; detects revocation.
    ///
    /// The view is bound to the assignment it was opened on. A different
    /// assignment for the same task means the task was revoked and handed
    /// out again, which closes the view just like a plain revocation.
    pub fn snapshot(&self) -> Result<TaskSnapshot, ViewError> {
        self.ensure_open()?;
        let view = self.coordinator.view();
        match view.task_context(self.task_id) {
            Some(snapshot) if snapshot.assignment.id == self.assignment_id => Ok(snapshot),
            Some(snapshot) => {
                debug!(
                    opened_on = %self.assignment_id,
                    current = %snapshot.assignment.id,
                    "Task was reassigned"
                );
                self.close(CloseReason::Revoked);
                Err(ViewError::Revoked)
            }
            None if view.assignment_id(self.task_id) != Some(self.assignment_id) => {
                self.close(CloseReason::Revoked);
                Err(ViewError::Revoked)
            }
            None => Err(ViewError::NotFound {
                task_id: self.task_id,
            }),
        }
    }

    /// Reconcile local state with the coordinator's latest view.
    pub fn pump(&self) {
        if self.is_closed() {
            return;
        }
        match self.snapshot() {
            Ok(snapshot) => self
                .tracker
                .observe(snapshot.step(), snapshot.sms_request.clone()),
            Err(ViewError::Revoked) => return,
            Err(e) => debug!(task_id = %self.task_id, error = %e, "Nothing to reconcile"),
        }

        let mut events = self
            .tracker_events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while let Ok(TrackerEvent::CodeReceived { .. }) = events.try_recv() {
            self.local().notices.push_back(Notice::SmsCodeReceived);
        }
    }

    /// Tear down everything this view started.
    pub fn close(&self, reason: CloseReason) {
        {
            let mut local = self.local();
            if local.closed.is_some() {
                return;
            }
            local.closed = Some(reason);
            local.open_dialog = None;
            local.note_drafts.clear();
            if reason == CloseReason::Revoked {
                local.notices.push_back(Notice::AssignmentRevoked);
            }
        }
        self.tracker.teardown();
        self.timers.cancel_all();
        self.stop_watching();
        info!(task_id = %self.task_id, reason = ?reason, "Task view closed");
    }

    pub fn navigate_away(&self) {
        self.close(CloseReason::NavigatedAway);
    }

    async fn refresh_assignment(&self) -> Result<TaskSnapshot, ViewError> {
        self.coordinator
            .refresh(EntityKind::Assignment.refetch_scope())
            .await?;
        let snapshot = self.snapshot()?;
        self.pump();
        Ok(snapshot)
    }

    pub fn legal_actions(&self) -> Result<LegalActions, ViewError> {
        let snapshot = self.snapshot()?;
        let draft = self.local().note_drafts.get(&snapshot.step()).cloned();
        let ctx = snapshot.gate_context(draft.as_deref(), self.local().video_confirmed);
        Ok(self
            .machine
            .legal_actions(&snapshot.assignment, &snapshot.task, &ctx))
    }

    // --- Workflow transitions ---

    pub async fn advance(&self, from: Step) -> Result<Step, ViewError> {
        self.transition(from, WorkflowAction::Advance).await
    }

    pub async fn decide(&self, decision: DigitalDecision) -> Result<Step, ViewError> {
        let step = self
            .transition(Step::IDENTITY_DECISION, WorkflowAction::Decide(decision))
            .await?;
        self.dismiss_dialog();
        Ok(step)
    }

    pub async fn go_back(&self, from: Step) -> Result<Step, ViewError> {
        self.transition(from, WorkflowAction::GoBack).await
    }

    async fn transition(&self, expected: Step, action: WorkflowAction) -> Result<Step, ViewError> {
        async move {
            let current = self.snapshot()?;
            let _guard = self
                .in_flight
                .try_begin(current.assignment.id)
                .ok_or(ViewError::InFlight)?;

            let latest = self.refresh_assignment().await?;
            if !latest.assignment.is_accepted() {
                return Err(ViewError::NotAccepted);
            }
            if latest.step() != expected {
                debug!(expected = %expected, latest = %latest.step(), "Stale workflow action");
                return Err(GateRejection::new(GateReason::StaleStep, UiHint::Refresh).into());
            }

            let draft = self.local().note_drafts.get(&expected).cloned();
            let ctx = latest.gate_context(draft.as_deref(), self.local().video_confirmed);
            let plan = match self
                .machine
                .plan(&latest.assignment, &latest.task, action, &ctx)
            {
                Ok(plan) => plan,
                Err(rejection) => {
                    self.coordinator.metrics().record_gate_rejection();
                    if let Some(dialog) = Dialog::for_hint(rejection.hint) {
                        self.local().open_dialog = Some(dialog);
                    }
                    info!(step = %expected, reason = %rejection.reason, "Workflow action rejected");
                    return Err(rejection.into());
                }
            };

            let mut patch = plan.patch();
            if plan.is_forward() {
                if let Some(draft) = draft {
                    patch.step_note = Some((expected, draft));
                }
            }
            self.backend
                .patch_assignment(plan.assignment_id, patch)
                .await?;

            {
                let mut local = self.local();
                local.note_drafts.remove(&expected);
                local.video_confirmed = false;
            }
            let confirmed = self.refresh_assignment().await?;
            self.schedule(&plan.effects, plan.assignment_id);

            info!(from = %plan.from, to = %plan.to, confirmed = %confirmed.step(), "Workflow step changed");
            Ok(confirmed.step())
        }
        .instrument(self.span.clone())
        .await
    }

    fn schedule(&self, effects: &[SideEffect], assignment_id: AssignmentId) {
        for effect in effects {
            match *effect {
                SideEffect::RecordDemoViewed { after } => {
                    let backend = self.backend.clone();
                    let coordinator = self.coordinator.clone();
                    self.timers.spawn("demo_viewed", async move {
                        tokio::time::sleep(after).await;
                        let patch = AssignmentPatch::demo_viewed(Utc::now());
                        if let Err(e) = backend.patch_assignment(assignment_id, patch).await {
                            warn!(error = %e, "Failed to record demo credentials view");
                            return;
                        }
                        if let Err(e) = coordinator
                            .refresh(EntityKind::Assignment.refetch_scope())
                            .await
                        {
                            warn!(error = %e, "Refetch after demo view failed");
                        }
                    });
                }
            }
        }
    }

    // --- Notes and local inputs ---

    /// Keep typed text for the current step without saving it.
    pub fn set_note_draft(&self, text: impl Into<String>) -> Result<(), ViewError> {
        let step = self.snapshot()?.step();
        self.local().note_drafts.insert(step, text.into());
        Ok(())
    }

    pub async fn save_note(&self, text: impl Into<String>) -> Result<(), ViewError> {
        let snapshot = self.snapshot()?;
        let step = snapshot.step();
        self.backend
            .patch_assignment(snapshot.assignment.id, AssignmentPatch::note(step, text))
            .await?;
        self.local().note_drafts.remove(&step);
        self.refresh_assignment().await?;
        Ok(())
    }

    pub async fn save_progress_notes(&self, text: impl Into<String>) -> Result<(), ViewError> {
        let snapshot = self.snapshot()?;
        self.backend
            .patch_assignment(snapshot.assignment.id, AssignmentPatch::progress_notes(text))
            .await?;
        self.refresh_assignment().await?;
        Ok(())
    }

    /// The "video verification completed" checkbox.
    pub fn set_video_confirmed(&self, confirmed: bool) -> Result<(), ViewError> {
        self.ensure_open()?;
        self.local().video_confirmed = confirmed;
        Ok(())
    }

    // --- Remote operations ---

    /// Accept the task once; a second accept never rewinds the workflow.
    pub async fn accept(&self) -> Result<Step, ViewError> {
        let current = self.snapshot()?;
        let _guard = self
            .in_flight
            .try_begin(current.assignment.id)
            .ok_or(ViewError::InFlight)?;

        let latest = self.refresh_assignment().await?;
        if latest.assignment.is_accepted() {
            debug!(task_id = %self.task_id, step = %latest.step(), "Task already accepted");
            return Err(GateRejection::new(GateReason::AlreadyAccepted, UiHint::Refresh).into());
        }
        self.backend.accept_task(self.task_id, self.employee_id).await?;
        let snapshot = self.refresh_assignment().await?;
        info!(task_id = %self.task_id, "Task accepted");
        Ok(snapshot.step())
    }

    /// Submit the finished task for review and close the view.
    pub async fn complete(&self) -> Result<CompletionPlan, ViewError> {
        async move {
            let current = self.snapshot()?;
            let _guard = self
                .in_flight
                .try_begin(current.assignment.id)
                .ok_or(ViewError::InFlight)?;

            let latest = self.refresh_assignment().await?;
            let ctx = latest.gate_context(None, false);
            let plan = self
                .machine
                .plan_completion(&latest.assignment, &ctx, Utc::now())
                .inspect_err(|_| self.coordinator.metrics().record_gate_rejection())?;

            self.backend
                .complete_task(self.task_id, self.employee_id, plan.elapsed_seconds)
                .await?;
            if let Err(e) = self
                .coordinator
                .refresh(EntityKind::Assignment.refetch_scope())
                .await
            {
                warn!(error = %e, "Refetch after completion failed");
            }

            self.local().notices.push_back(Notice::SubmittedForReview {
                elapsed_seconds: plan.elapsed_seconds,
            });
            self.close(CloseReason::Completed);
            info!(elapsed_seconds = plan.elapsed_seconds, "Task submitted for review");
            Ok(plan)
        }
        .instrument(self.span.clone())
        .await
    }

    pub async fn request_sms_code(&self) -> Result<(), ViewError> {
        self.snapshot()?;
        self.tracker.request_code().await?;
        self.pump();
        Ok(())
    }

    pub async fn resend_sms_code(&self) -> Result<(), ViewError> {
        self.snapshot()?;
        self.tracker.resend().await?;
        self.pump();
        Ok(())
    }

    // --- Action handler boundary ---

    /// Run one action and turn every outcome into user feedback.
    pub async fn dispatch(&self, action: ViewAction) -> ActionFeedback {
        let result = match action {
            ViewAction::Advance { from } => self.advance(from).await.map(Some),
            ViewAction::Decide(decision) => self.decide(decision).await.map(Some),
            ViewAction::GoBack { from } => self.go_back(from).await.map(Some),
            ViewAction::SetNoteDraft(text) => self.set_note_draft(text).map(|_| None),
            ViewAction::SaveNote(text) => self.save_note(text).await.map(|_| None),
            ViewAction::SaveProgressNotes(text) => self.save_progress_notes(text).await.map(|_| None),
            ViewAction::ConfirmVideo(confirmed) => self.set_video_confirmed(confirmed).map(|_| None),
            ViewAction::Accept => self.accept().await.map(Some),
            ViewAction::Complete => self.complete().await.map(|_| None),
            ViewAction::RequestSmsCode => self.request_sms_code().await.map(|_| None),
            ViewAction::ResendSmsCode => self.resend_sms_code().await.map(|_| None),
            ViewAction::Refresh => self.refresh_assignment().await.map(|s| Some(s.step())),
        };

        match result {
            Ok(step) => {
                let step = step.or_else(|| self.snapshot().ok().map(|s| s.step()));
                ActionFeedback::Done { step }
            }
            Err(error) => {
                if let ViewError::Transient(e) = &error {
                    warn!(task_id = %self.task_id, error = %e, "Action failed");
                }
                ActionFeedback::from(error)
            }
        }
    }
}

impl Drop for TaskView {
    fn drop(&mut self) {
        self.tracker.teardown();
        self.timers.cancel_all();
        self.stop_watching();
    }
}

#[async_trait]
impl Teardown for TaskView {
    fn label(&self) -> String {
        format!("task-view:{}", self.task_id)
    }

    async fn shutdown(&self) {
        self.close(CloseReason::LoggedOut);
    }
}
