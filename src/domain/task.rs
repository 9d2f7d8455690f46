use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{EmployeeId, TaskId};
use crate::priority::TaskPriority;

/// Lifecycle status of a task.
///
/// Administrator actions (assign, approve, reject, revoke) and employee
/// actions (accept, request code, complete) both move a task through these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    SmsRequested,
    PendingReview,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;

        if self.is_terminal() {
            return false;
        }

        match (self, next) {
            (_, Cancelled) => true,
            (Pending, Assigned) => true,
            (Assigned, InProgress) => true,
            (InProgress, SmsRequested) => true,
            // resend while already waiting
            (SmsRequested, SmsRequested) => true,
            (InProgress | SmsRequested, PendingReview) => true,
            (PendingReview, Completed) => true,
            // rejected review goes back to the employee
            (PendingReview, InProgress) => true,
            // revocation
            (Assigned | InProgress | SmsRequested | PendingReview, Pending) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::SmsRequested => "sms_requested",
            TaskStatus::PendingReview => "pending_review",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub customer: CustomerInfo,
    pub priority: TaskPriority,
    pub deadline: Option<DateTime<Utc>>,
    /// Extra pay in minor currency units (cents).
    pub special_compensation_cents: Option<i64>,
    pub test_email: Option<String>,
    pub test_password: Option<String>,
    pub external_verification_url: Option<String>,
    pub skip_identity_flow: bool,
    pub status: TaskStatus,
    pub assigned_to: Option<EmployeeId>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            title: title.into(),
            customer: CustomerInfo::default(),
            priority: TaskPriority::Normal,
            deadline: None,
            special_compensation_cents: None,
            test_email: None,
            test_password: None,
            external_verification_url: None,
            skip_identity_flow: false,
            status: TaskStatus::Pending,
            assigned_to: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_skip_identity_flow(mut self, skip: bool) -> Self {
        self.skip_identity_flow = skip;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_test_credentials(mut self, email: &str, password: &str) -> Self {
        self.test_email = Some(email.to_string());
        self.test_password = Some(password.to_string());
        self
    }

    pub fn has_test_credentials(&self) -> bool {
        self.test_email.is_some() && self.test_password.is_some()
    }
}
