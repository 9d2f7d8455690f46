// Change-feed message shapes

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{EmployeeId, TaskId};

/// Backend tables the coordinator listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Assignment,
    Task,
    SmsCodeRequest,
    Document,
    Evaluation,
    Notification,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Assignment,
        EntityKind::Task,
        EntityKind::SmsCodeRequest,
        EntityKind::Document,
        EntityKind::Evaluation,
        EntityKind::Notification,
    ];

    /// Entity sets that must be refetched when a row of this kind changes.
    ///
    /// An assignment change can add or remove whole tasks from the view, so
    /// it pulls in everything hanging off a task.
    pub fn refetch_scope(self) -> &'static [EntityKind] {
        match self {
            EntityKind::Assignment => &[
                EntityKind::Assignment,
                EntityKind::Task,
                EntityKind::SmsCodeRequest,
                EntityKind::Document,
                EntityKind::Evaluation,
            ],
            EntityKind::Task => &[EntityKind::Task],
            EntityKind::SmsCodeRequest => &[EntityKind::SmsCodeRequest],
            EntityKind::Document => &[EntityKind::Document],
            EntityKind::Evaluation => &[EntityKind::Evaluation],
            EntityKind::Notification => &[EntityKind::Notification],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row-level change, scoped to an employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEvent {
    pub entity: EntityKind,
    pub change: ChangeKind,
    pub record_id: Uuid,
    pub task_id: Option<TaskId>,
    pub employee_id: Option<EmployeeId>,
}

impl RemoteEvent {
    pub fn new(entity: EntityKind, change: ChangeKind, record_id: Uuid) -> Self {
        Self {
            entity,
            change,
            record_id,
            task_id: None,
            employee_id: None,
        }
    }

    pub fn for_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn for_employee(mut self, employee_id: EmployeeId) -> Self {
        self.employee_id = Some(employee_id);
        self
    }

    pub fn is_assignment_delete(&self) -> bool {
        self.entity == EntityKind::Assignment && self.change == ChangeKind::Delete
    }
}

/// What a push subscription delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    /// The backend acknowledged the subscription.
    Confirmed,
    Event(RemoteEvent),
    Error(String),
}
