// Persisted entities consumed and produced by the task workflow core.
//
// Shapes mirror the backend rows column for column; the workflow engine only
// reads them and reacts to the state the remote operations leave behind.

pub mod assignment;
pub mod document;
pub mod notification;
pub mod sms;
pub mod task;

use uuid::Uuid;

pub type TaskId = Uuid;
pub type EmployeeId = Uuid;
pub type AssignmentId = Uuid;
pub type SmsRequestId = Uuid;
pub type DocumentId = Uuid;
pub type NotificationId = Uuid;

pub use assignment::{Assignment, AssignmentPatch, StepNotes};
pub use document::{Document, DocumentType, Evaluation, ReviewStatus};
pub use notification::{Notification, NotificationKind};
pub use sms::SmsCodeRequest;
pub use task::{CustomerInfo, Task, TaskStatus};
