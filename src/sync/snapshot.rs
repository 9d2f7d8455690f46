use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{Assignment, AssignmentId, Notification, SmsCodeRequest, Task, TaskId};
use crate::workflow::{GateContext, Step};

/// The employee's view of the backend as of the last successful refetch.
///
/// Replaced wholesale per entity set; never merged field by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncedView {
    /// Bumped on every successful refetch.
    pub revision: u64,
    pub assignments: BTreeMap<TaskId, Assignment>,
    pub tasks: BTreeMap<TaskId, Task>,
    pub document_counts: BTreeMap<TaskId, u32>,
    pub evaluations: BTreeSet<TaskId>,
    /// Latest code request per task.
    pub sms_requests: BTreeMap<TaskId, SmsCodeRequest>,
    pub notifications: Vec<Notification>,
}

/// Everything needed to gate and render one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub task: Task,
    pub assignment: Assignment,
    pub document_count: u32,
    pub evaluation_exists: bool,
    pub sms_request: Option<SmsCodeRequest>,
}

impl TaskSnapshot {
    /// Gate context from persisted data plus the session-local inputs.
    pub fn gate_context(&self, note_draft: Option<&str>, video_confirmed: bool) -> GateContext {
        GateContext {
            document_count: self.document_count,
            evaluation_exists: self.evaluation_exists,
            note_draft: note_draft.map(str::to_string),
            persisted_note: self.assignment.note_for(self.assignment.step).map(str::to_string),
            video_confirmed,
        }
    }

    pub fn step(&self) -> Step {
        self.assignment.step
    }
}

impl SyncedView {
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.assignments.keys().copied().collect()
    }

    pub fn assignment_id(&self, task_id: TaskId) -> Option<AssignmentId> {
        self.assignments.get(&task_id).map(|a| a.id)
    }

    /// Snapshot for one task, or `None` when there is nothing to show:
    /// no assignment, or an assignment whose task row is gone.
    pub fn task_context(&self, task_id: TaskId) -> Option<TaskSnapshot> {
        let assignment = self.assignments.get(&task_id)?;
        let task = self.tasks.get(&task_id)?;
        Some(TaskSnapshot {
            task: task.clone(),
            assignment: assignment.clone(),
            document_count: self.document_counts.get(&task_id).copied().unwrap_or(0),
            evaluation_exists: self.evaluations.contains(&task_id),
            sms_request: self.sms_requests.get(&task_id).cloned(),
        })
    }

    pub fn unread_notifications(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }
}
