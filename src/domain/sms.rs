use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EmployeeId, SmsRequestId, TaskId};

/// A request for an externally delivered confirmation code.
///
/// Never mutated by the employee: a resend inserts a new row, and the newest
/// row for a (task, employee) pair is the open one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsCodeRequest {
    pub id: SmsRequestId,
    pub task_id: TaskId,
    pub employee_id: EmployeeId,
    pub requested_at: DateTime<Utc>,
    pub code: Option<String>,
    pub fulfilled_by: Option<uuid::Uuid>,
    pub fulfilled_at: Option<DateTime<Utc>>,
}

impl SmsCodeRequest {
    pub fn new(task_id: TaskId, employee_id: EmployeeId) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            task_id,
            employee_id,
            requested_at: Utc::now(),
            code: None,
            fulfilled_by: None,
            fulfilled_at: None,
        }
    }

    pub fn has_code(&self) -> bool {
        self.code.as_deref().is_some_and(|code| !code.is_empty())
    }
}
