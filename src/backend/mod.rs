//! Backend abstractions
//!
//! The relational store, its query layer and the push transport live
//! elsewhere. The workflow core talks to them through these two traits so
//! it can be driven by the real service, the in-memory reference backend,
//! or a mock.

pub mod errors;
pub mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::{
    Assignment, AssignmentId, AssignmentPatch, EmployeeId, Notification, SmsCodeRequest, Task,
    TaskId,
};
use crate::sync::FeedMessage;

pub use errors::BackendError;
pub use memory::InMemoryBackend;

#[cfg(test)]
use mockall::automock;

/// Reads and remote operations the workflow core depends on.
///
/// The three remote operations (`accept_task`, `request_sms_code`,
/// `complete_task`) are atomic on the server; callers only react to the
/// state they leave behind.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PanelBackend: Send + Sync {
    /// All assignments currently held by an employee.
    async fn list_assignments(&self, employee_id: EmployeeId) -> Result<Vec<Assignment>, BackendError>;

    async fn fetch_task(&self, task_id: TaskId) -> Result<Option<Task>, BackendError>;

    /// Documents the employee uploaded for the task.
    async fn count_documents(&self, task_id: TaskId, employee_id: EmployeeId) -> Result<u32, BackendError>;

    async fn evaluation_exists(&self, task_id: TaskId, employee_id: EmployeeId) -> Result<bool, BackendError>;

    /// The newest code request for the pair; older rows are superseded.
    async fn latest_sms_request(
        &self,
        task_id: TaskId,
        employee_id: EmployeeId,
    ) -> Result<Option<SmsCodeRequest>, BackendError>;

    async fn list_notifications(&self, employee_id: EmployeeId) -> Result<Vec<Notification>, BackendError>;

    /// Single-row update of workflow columns. Last write wins.
    async fn patch_assignment(
        &self,
        assignment_id: AssignmentId,
        patch: AssignmentPatch,
    ) -> Result<(), BackendError>;

    /// Sets `accepted_at` and starts the workflow at step 1. Rejected when
    /// the assignment was already accepted.
    async fn accept_task(&self, task_id: TaskId, employee_id: EmployeeId) -> Result<Assignment, BackendError>;

    /// Inserts a new request row and marks the task `sms_requested`.
    async fn request_sms_code(
        &self,
        task_id: TaskId,
        employee_id: EmployeeId,
    ) -> Result<SmsCodeRequest, BackendError>;

    /// Validates a proof document exists and moves the task to review.
    async fn complete_task(
        &self,
        task_id: TaskId,
        employee_id: EmployeeId,
        elapsed_seconds: i64,
    ) -> Result<(), BackendError>;
}

/// An open push subscription.
#[derive(Debug)]
pub struct FeedSubscription {
    receiver: mpsc::UnboundedReceiver<FeedMessage>,
}

impl FeedSubscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<FeedMessage>) -> Self {
        Self { receiver }
    }

    /// Next message; `None` once the backend dropped the channel.
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        self.receiver.recv().await
    }
}

/// Change-feed transport: per-employee INSERT/UPDATE/DELETE notifications.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, employee_id: EmployeeId) -> Result<FeedSubscription, BackendError>;
}
