use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DocumentId, EmployeeId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    IdFront,
    IdBack,
    AddressProof,
    CompletionProof,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// KYC evidence. The workflow only ever counts these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub owner_id: EmployeeId,
    pub task_id: Option<TaskId>,
    pub doc_type: DocumentType,
    pub status: ReviewStatus,
    pub review_notes: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    pub fn new(owner_id: EmployeeId, task_id: Option<TaskId>, doc_type: DocumentType) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            owner_id,
            task_id,
            doc_type,
            status: ReviewStatus::Pending,
            review_notes: None,
            uploaded_at: Utc::now(),
        }
    }
}

/// The employee's rating of a task; its existence gates step 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: uuid::Uuid,
    pub task_id: TaskId,
    pub employee_id: EmployeeId,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}
