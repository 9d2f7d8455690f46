use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EmployeeId, NotificationId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskAssigned,
    SmsCodeReady,
    TaskApproved,
    TaskRejected,
    AssignmentRevoked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub employee_id: EmployeeId,
    pub kind: NotificationKind,
    pub task_id: Option<TaskId>,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        employee_id: EmployeeId,
        kind: NotificationKind,
        task_id: Option<TaskId>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            employee_id,
            kind,
            task_id,
            message: message.into(),
            read: false,
            created_at: Utc::now(),
        }
    }
}
