//! In-memory reference backend
//!
//! Implements [`PanelBackend`] and [`ChangeFeed`] over plain collections and
//! offers the administrator operations of the real service (assign, revoke,
//! fulfil codes, review) so whole workflows can run without a server. Every
//! write publishes change events to the affected employee's subscriptions.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use super::{BackendError, ChangeFeed, FeedSubscription, PanelBackend};
use crate::domain::{
    Assignment, AssignmentId, AssignmentPatch, Document, DocumentId, DocumentType, EmployeeId,
    Evaluation, Notification, NotificationKind, ReviewStatus, SmsCodeRequest, SmsRequestId, Task,
    TaskId, TaskStatus,
};
use crate::sync::{ChangeKind, EntityKind, FeedMessage, RemoteEvent};
use crate::workflow::{DigitalDecision, Step};

struct Subscriber {
    employee_id: EmployeeId,
    sender: mpsc::UnboundedSender<FeedMessage>,
}

#[derive(Default)]
struct Store {
    tasks: HashMap<TaskId, Task>,
    assignments: HashMap<AssignmentId, Assignment>,
    sms_requests: Vec<SmsCodeRequest>,
    documents: Vec<Document>,
    evaluations: Vec<Evaluation>,
    notifications: Vec<Notification>,
    subscribers: Vec<Subscriber>,
}

impl Store {
    fn assignment_for(&self, task_id: TaskId, employee_id: EmployeeId) -> Option<&Assignment> {
        self.assignments
            .values()
            .find(|a| a.task_id == task_id && a.employee_id == employee_id)
    }

    fn assignment_for_mut(&mut self, task_id: TaskId, employee_id: EmployeeId) -> Option<&mut Assignment> {
        self.assignments
            .values_mut()
            .find(|a| a.task_id == task_id && a.employee_id == employee_id)
    }

    fn set_status(&mut self, task_id: TaskId, next: TaskStatus) -> Result<(), BackendError> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(BackendError::not_found("task", task_id))?;
        if task.status != next && !task.status.can_transition_to(next) {
            return Err(BackendError::rejected(format!(
                "task {} cannot move from {} to {}",
                task_id, task.status, next
            )));
        }
        task.status = next;
        Ok(())
    }

    fn notify(&mut self, notification: Notification) -> RemoteEvent {
        let event = RemoteEvent::new(EntityKind::Notification, ChangeKind::Insert, notification.id)
            .for_employee(notification.employee_id);
        let event = match notification.task_id {
            Some(task_id) => event.for_task(task_id),
            None => event,
        };
        self.notifications.push(notification);
        event
    }

    fn publish(&mut self, events: Vec<RemoteEvent>) {
        self.subscribers.retain(|s| !s.sender.is_closed());
        for event in events {
            for subscriber in &self.subscribers {
                if event.employee_id == Some(subscriber.employee_id) {
                    let _ = subscriber.sender.send(FeedMessage::Event(event.clone()));
                }
            }
        }
    }
}

/// Read counters, for asserting on refetch cadence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchCounts {
    pub assignment_lists: u64,
    pub sms_lookups: u64,
}

pub struct InMemoryBackend {
    store: RwLock<Store>,
    auto_confirm: AtomicBool,
    refuse_subscriptions: AtomicBool,
    failing_writes: AtomicU32,
    failing_reads: AtomicBool,
    assignment_lists: AtomicU64,
    sms_lookups: AtomicU64,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            store: RwLock::new(Store::default()),
            auto_confirm: AtomicBool::new(true),
            refuse_subscriptions: AtomicBool::new(false),
            failing_writes: AtomicU32::new(0),
            failing_reads: AtomicBool::new(false),
            assignment_lists: AtomicU64::new(0),
            sms_lookups: AtomicU64::new(0),
        }
    }

    // --- Feed control ---

    /// When false, new subscriptions stay unconfirmed until
    /// [`confirm_subscriptions`](Self::confirm_subscriptions) is called.
    pub fn set_auto_confirm(&self, auto_confirm: bool) {
        self.auto_confirm.store(auto_confirm, Ordering::SeqCst);
    }

    pub fn set_refuse_subscriptions(&self, refuse: bool) {
        self.refuse_subscriptions.store(refuse, Ordering::SeqCst);
    }

    pub async fn confirm_subscriptions(&self) {
        let store = self.store.read().await;
        for subscriber in &store.subscribers {
            let _ = subscriber.sender.send(FeedMessage::Confirmed);
        }
    }

    pub async fn fail_subscriptions(&self, message: &str) {
        let mut store = self.store.write().await;
        for subscriber in &store.subscribers {
            let _ = subscriber.sender.send(FeedMessage::Error(message.to_string()));
        }
        store.subscribers.clear();
    }

    pub async fn subscriber_count(&self) -> usize {
        let store = self.store.read().await;
        store
            .subscribers
            .iter()
            .filter(|s| !s.sender.is_closed())
            .count()
    }

    // --- Fault injection and counters ---

    /// Make the next `count` write calls fail with a network error.
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn set_failing_reads(&self, failing: bool) {
        self.failing_reads.store(failing, Ordering::SeqCst);
    }

    pub fn fetch_counts(&self) -> FetchCounts {
        FetchCounts {
            assignment_lists: self.assignment_lists.load(Ordering::SeqCst),
            sms_lookups: self.sms_lookups.load(Ordering::SeqCst),
        }
    }

    fn check_write(&self) -> Result<(), BackendError> {
        let remaining = self.failing_writes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_writes.store(remaining - 1, Ordering::SeqCst);
            return Err(BackendError::network("injected write failure"));
        }
        Ok(())
    }

    fn check_read(&self) -> Result<(), BackendError> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(BackendError::network("injected read failure"));
        }
        Ok(())
    }

    // --- Administrator operations ---

    pub async fn create_task(&self, task: Task) -> TaskId {
        let id = task.id;
        let mut store = self.store.write().await;
        store.tasks.insert(id, task);
        id
    }

    pub async fn task(&self, task_id: TaskId) -> Option<Task> {
        self.store.read().await.tasks.get(&task_id).cloned()
    }

    pub async fn assignment(&self, task_id: TaskId, employee_id: EmployeeId) -> Option<Assignment> {
        self.store
            .read()
            .await
            .assignment_for(task_id, employee_id)
            .cloned()
    }

    pub async fn sms_requests(&self, task_id: TaskId) -> Vec<SmsCodeRequest> {
        self.store
            .read()
            .await
            .sms_requests
            .iter()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect()
    }

    pub async fn assign_task(&self, task_id: TaskId, employee_id: EmployeeId) -> Result<Assignment, BackendError> {
        let mut store = self.store.write().await;
        store.set_status(task_id, TaskStatus::Assigned)?;

        let title = store
            .tasks
            .get_mut(&task_id)
            .map(|task| {
                task.assigned_to = Some(employee_id);
                task.title.clone()
            })
            .unwrap_or_default();

        let assignment = Assignment::new(task_id, employee_id);
        store.assignments.insert(assignment.id, assignment.clone());

        let notification = store.notify(Notification::new(
            employee_id,
            NotificationKind::TaskAssigned,
            Some(task_id),
            format!("New task assigned: {title}"),
        ));
        store.publish(vec![
            RemoteEvent::new(EntityKind::Assignment, ChangeKind::Insert, assignment.id)
                .for_task(task_id)
                .for_employee(employee_id),
            RemoteEvent::new(EntityKind::Task, ChangeKind::Update, task_id)
                .for_task(task_id)
                .for_employee(employee_id),
            notification,
        ]);

        info!(task_id = %task_id, employee_id = %employee_id, "Task assigned");
        Ok(assignment)
    }

    /// Delete the assignment, drop its code requests and reset the task.
    pub async fn revoke_assignment(&self, task_id: TaskId) -> Result<(), BackendError> {
        let mut store = self.store.write().await;

        let removed: Vec<Assignment> = store
            .assignments
            .values()
            .filter(|a| a.task_id == task_id)
            .cloned()
            .collect();
        if removed.is_empty() {
            return Err(BackendError::not_found("assignment", task_id));
        }

        store.set_status(task_id, TaskStatus::Pending)?;
        if let Some(task) = store.tasks.get_mut(&task_id) {
            task.assigned_to = None;
        }

        let mut events = Vec::new();
        for assignment in removed {
            store.assignments.remove(&assignment.id);
            store
                .sms_requests
                .retain(|r| !(r.task_id == task_id && r.employee_id == assignment.employee_id));

            events.push(
                RemoteEvent::new(EntityKind::Assignment, ChangeKind::Delete, assignment.id)
                    .for_task(task_id)
                    .for_employee(assignment.employee_id),
            );
            events.push(
                RemoteEvent::new(EntityKind::Task, ChangeKind::Update, task_id)
                    .for_task(task_id)
                    .for_employee(assignment.employee_id),
            );
            events.push(store.notify(Notification::new(
                assignment.employee_id,
                NotificationKind::AssignmentRevoked,
                Some(task_id),
                "The assignment was revoked",
            )));
        }
        store.publish(events);

        info!(task_id = %task_id, "Assignment revoked");
        Ok(())
    }

    pub async fn fulfill_sms_code(
        &self,
        request_id: SmsRequestId,
        code: &str,
        admin_id: Uuid,
    ) -> Result<(), BackendError> {
        let mut store = self.store.write().await;
        let request = store
            .sms_requests
            .iter_mut()
            .find(|r| r.id == request_id)
            .ok_or(BackendError::not_found("sms_code_request", request_id))?;

        request.code = Some(code.to_string());
        request.fulfilled_by = Some(admin_id);
        request.fulfilled_at = Some(Utc::now());
        let (task_id, employee_id) = (request.task_id, request.employee_id);

        let notification = store.notify(Notification::new(
            employee_id,
            NotificationKind::SmsCodeReady,
            Some(task_id),
            "Your SMS code is ready",
        ));
        store.publish(vec![
            RemoteEvent::new(EntityKind::SmsCodeRequest, ChangeKind::Update, request_id)
                .for_task(task_id)
                .for_employee(employee_id),
            notification,
        ]);

        debug!(request_id = %request_id, task_id = %task_id, "SMS code fulfilled");
        Ok(())
    }

    /// Fulfil the newest open request for a task.
    pub async fn fulfill_latest_sms_code(&self, task_id: TaskId, code: &str) -> Result<SmsRequestId, BackendError> {
        let request_id = {
            let store = self.store.read().await;
            store
                .sms_requests
                .iter()
                .rev()
                .find(|r| r.task_id == task_id)
                .map(|r| r.id)
                .ok_or(BackendError::not_found("sms_code_request", task_id))?
        };
        self.fulfill_sms_code(request_id, code, Uuid::nil()).await?;
        Ok(request_id)
    }

    pub async fn approve_task(&self, task_id: TaskId) -> Result<(), BackendError> {
        self.review_task(task_id, TaskStatus::Completed, NotificationKind::TaskApproved, "Task approved")
            .await
    }

    pub async fn reject_task(&self, task_id: TaskId, reason: &str) -> Result<(), BackendError> {
        self.review_task(task_id, TaskStatus::InProgress, NotificationKind::TaskRejected, reason)
            .await
    }

    async fn review_task(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        kind: NotificationKind,
        message: &str,
    ) -> Result<(), BackendError> {
        let mut store = self.store.write().await;
        store.set_status(task_id, status)?;

        let mut events = Vec::new();
        if let Some(employee_id) = store.tasks.get(&task_id).and_then(|t| t.assigned_to) {
            events.push(
                RemoteEvent::new(EntityKind::Task, ChangeKind::Update, task_id)
                    .for_task(task_id)
                    .for_employee(employee_id),
            );
            events.push(store.notify(Notification::new(employee_id, kind, Some(task_id), message)));
        }
        store.publish(events);
        Ok(())
    }

    pub async fn review_document(
        &self,
        document_id: DocumentId,
        status: ReviewStatus,
        notes: Option<&str>,
    ) -> Result<(), BackendError> {
        let mut store = self.store.write().await;
        let document = store
            .documents
            .iter_mut()
            .find(|d| d.id == document_id)
            .ok_or(BackendError::not_found("document", document_id))?;
        document.status = status;
        document.review_notes = notes.map(str::to_string);

        let event = RemoteEvent::new(EntityKind::Document, ChangeKind::Update, document_id)
            .for_employee(document.owner_id);
        let event = match document.task_id {
            Some(task_id) => event.for_task(task_id),
            None => event,
        };
        store.publish(vec![event]);
        Ok(())
    }

    // --- Employee operations served by other surfaces ---

    pub async fn submit_evaluation(
        &self,
        task_id: TaskId,
        employee_id: EmployeeId,
        rating: u8,
        comment: Option<&str>,
    ) -> Result<(), BackendError> {
        self.check_write()?;
        let mut store = self.store.write().await;
        let evaluation = Evaluation {
            id: Uuid::new_v4(),
            task_id,
            employee_id,
            rating,
            comment: comment.map(str::to_string),
            created_at: Utc::now(),
        };
        let event = RemoteEvent::new(EntityKind::Evaluation, ChangeKind::Insert, evaluation.id)
            .for_task(task_id)
            .for_employee(employee_id);
        store.evaluations.push(evaluation);
        store.publish(vec![event]);
        Ok(())
    }

    pub async fn upload_document(
        &self,
        employee_id: EmployeeId,
        task_id: Option<TaskId>,
        doc_type: DocumentType,
    ) -> Result<DocumentId, BackendError> {
        self.check_write()?;
        let mut store = self.store.write().await;
        let document = Document::new(employee_id, task_id, doc_type);
        let id = document.id;
        let event = RemoteEvent::new(EntityKind::Document, ChangeKind::Insert, id).for_employee(employee_id);
        let event = match task_id {
            Some(task_id) => event.for_task(task_id),
            None => event,
        };
        store.documents.push(document);
        store.publish(vec![event]);
        Ok(id)
    }

    /// Remove a task row outright, leaving any assignment dangling.
    pub async fn delete_task_row(&self, task_id: TaskId) {
        let mut store = self.store.write().await;
        store.tasks.remove(&task_id);
        let employees: Vec<EmployeeId> = store
            .assignments
            .values()
            .filter(|a| a.task_id == task_id)
            .map(|a| a.employee_id)
            .collect();
        let events = employees
            .into_iter()
            .map(|employee_id| {
                RemoteEvent::new(EntityKind::Task, ChangeKind::Delete, task_id)
                    .for_task(task_id)
                    .for_employee(employee_id)
            })
            .collect();
        store.publish(events);
    }
}

#[async_trait]
impl PanelBackend for InMemoryBackend {
    async fn list_assignments(&self, employee_id: EmployeeId) -> Result<Vec<Assignment>, BackendError> {
        self.assignment_lists.fetch_add(1, Ordering::SeqCst);
        self.check_read()?;
        let store = self.store.read().await;
        let mut assignments: Vec<Assignment> = store
            .assignments
            .values()
            .filter(|a| a.employee_id == employee_id)
            .cloned()
            .collect();
        assignments.sort_by_key(|a| a.assigned_at);
        Ok(assignments)
    }

    async fn fetch_task(&self, task_id: TaskId) -> Result<Option<Task>, BackendError> {
        self.check_read()?;
        Ok(self.store.read().await.tasks.get(&task_id).cloned())
    }

    async fn count_documents(&self, task_id: TaskId, employee_id: EmployeeId) -> Result<u32, BackendError> {
        self.check_read()?;
        let store = self.store.read().await;
        let count = store
            .documents
            .iter()
            .filter(|d| d.owner_id == employee_id && d.task_id == Some(task_id))
            .count();
        Ok(count as u32)
    }

    async fn evaluation_exists(&self, task_id: TaskId, employee_id: EmployeeId) -> Result<bool, BackendError> {
        self.check_read()?;
        let store = self.store.read().await;
        Ok(store
            .evaluations
            .iter()
            .any(|e| e.task_id == task_id && e.employee_id == employee_id))
    }

    async fn latest_sms_request(
        &self,
        task_id: TaskId,
        employee_id: EmployeeId,
    ) -> Result<Option<SmsCodeRequest>, BackendError> {
        self.sms_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_read()?;
        let store = self.store.read().await;
        Ok(store
            .sms_requests
            .iter()
            .rev()
            .find(|r| r.task_id == task_id && r.employee_id == employee_id)
            .cloned())
    }

    async fn list_notifications(&self, employee_id: EmployeeId) -> Result<Vec<Notification>, BackendError> {
        self.check_read()?;
        let store = self.store.read().await;
        Ok(store
            .notifications
            .iter()
            .filter(|n| n.employee_id == employee_id)
            .cloned()
            .collect())
    }

    async fn patch_assignment(
        &self,
        assignment_id: AssignmentId,
        patch: AssignmentPatch,
    ) -> Result<(), BackendError> {
        self.check_write()?;
        let mut store = self.store.write().await;
        let assignment = store
            .assignments
            .get_mut(&assignment_id)
            .ok_or(BackendError::not_found("assignment", assignment_id))?;
        assignment.apply(&patch);
        let event = RemoteEvent::new(EntityKind::Assignment, ChangeKind::Update, assignment_id)
            .for_task(assignment.task_id)
            .for_employee(assignment.employee_id);
        store.publish(vec![event]);
        Ok(())
    }

    async fn accept_task(&self, task_id: TaskId, employee_id: EmployeeId) -> Result<Assignment, BackendError> {
        self.check_write()?;
        let mut store = self.store.write().await;
        match store.assignment_for(task_id, employee_id) {
            None => return Err(BackendError::not_found("assignment", task_id)),
            Some(existing) if existing.is_accepted() => {
                return Err(BackendError::rejected(format!("task {task_id} is already accepted")));
            }
            Some(_) => {}
        }
        store.set_status(task_id, TaskStatus::InProgress)?;

        let assignment = store
            .assignment_for_mut(task_id, employee_id)
            .ok_or(BackendError::not_found("assignment", task_id))?;
        assignment.accepted_at = Some(Utc::now());
        assignment.step = Step::FIRST;
        assignment.digital_decision = DigitalDecision::Undecided;
        let accepted = assignment.clone();

        store.publish(vec![
            RemoteEvent::new(EntityKind::Assignment, ChangeKind::Update, accepted.id)
                .for_task(task_id)
                .for_employee(employee_id),
            RemoteEvent::new(EntityKind::Task, ChangeKind::Update, task_id)
                .for_task(task_id)
                .for_employee(employee_id),
        ]);
        Ok(accepted)
    }

    async fn request_sms_code(
        &self,
        task_id: TaskId,
        employee_id: EmployeeId,
    ) -> Result<SmsCodeRequest, BackendError> {
        self.check_write()?;
        let mut store = self.store.write().await;
        if store.assignment_for(task_id, employee_id).is_none() {
            return Err(BackendError::not_found("assignment", task_id));
        }
        store.set_status(task_id, TaskStatus::SmsRequested)?;

        let request = SmsCodeRequest::new(task_id, employee_id);
        store.sms_requests.push(request.clone());
        store.publish(vec![
            RemoteEvent::new(EntityKind::SmsCodeRequest, ChangeKind::Insert, request.id)
                .for_task(task_id)
                .for_employee(employee_id),
            RemoteEvent::new(EntityKind::Task, ChangeKind::Update, task_id)
                .for_task(task_id)
                .for_employee(employee_id),
        ]);
        Ok(request)
    }

    async fn complete_task(
        &self,
        task_id: TaskId,
        employee_id: EmployeeId,
        elapsed_seconds: i64,
    ) -> Result<(), BackendError> {
        self.check_write()?;
        let mut store = self.store.write().await;
        let proof_count = store
            .documents
            .iter()
            .filter(|d| d.owner_id == employee_id && d.task_id == Some(task_id))
            .count();
        if proof_count == 0 {
            return Err(BackendError::rejected("no proof of completion uploaded"));
        }
        if store.assignment_for(task_id, employee_id).is_none() {
            return Err(BackendError::not_found("assignment", task_id));
        }
        store.set_status(task_id, TaskStatus::PendingReview)?;

        let assignment = store
            .assignment_for_mut(task_id, employee_id)
            .ok_or(BackendError::not_found("assignment", task_id))?;
        assignment.completed_at = Some(Utc::now());
        assignment.elapsed_seconds = Some(elapsed_seconds);
        let assignment_id = assignment.id;

        store.publish(vec![
            RemoteEvent::new(EntityKind::Assignment, ChangeKind::Update, assignment_id)
                .for_task(task_id)
                .for_employee(employee_id),
            RemoteEvent::new(EntityKind::Task, ChangeKind::Update, task_id)
                .for_task(task_id)
                .for_employee(employee_id),
        ]);
        info!(task_id = %task_id, employee_id = %employee_id, elapsed_seconds, "Task submitted for review");
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for InMemoryBackend {
    async fn subscribe(&self, employee_id: EmployeeId) -> Result<FeedSubscription, BackendError> {
        if self.refuse_subscriptions.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable {
                message: "change feed refused the subscription".to_string(),
            });
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        if self.auto_confirm.load(Ordering::SeqCst) {
            let _ = sender.send(FeedMessage::Confirmed);
        }

        let mut store = self.store.write().await;
        store.subscribers.push(Subscriber { employee_id, sender });
        debug!(employee_id = %employee_id, "Change feed subscription opened");
        Ok(FeedSubscription::new(receiver))
    }
}
