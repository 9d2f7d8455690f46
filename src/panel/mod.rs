// Panel Module - the employee's open task view
//
// A view gates every action against the latest refetched assignment, writes
// through the backend, and confirms by refetching. Failures become
// user-facing feedback at `TaskView::dispatch`; nothing propagates further.

pub mod in_flight;
pub mod session;
pub mod task_view;

use serde::Serialize;
use thiserror::Error;

use crate::backend::BackendError;
use crate::workflow::{DigitalDecision, GateReason, GateRejection, Step, UiHint};

pub use in_flight::{InFlightGuard, InFlightRegistry};
pub use session::PanelSession;
pub use task_view::TaskView;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("Action rejected: {0}")]
    Gate(#[from] GateRejection),

    #[error("Another change to this assignment is still pending")]
    InFlight,

    #[error("The assignment was revoked")]
    Revoked,

    #[error("The task view is closed")]
    Closed,

    #[error("Nothing to show for task {task_id}")]
    NotFound { task_id: uuid::Uuid },

    #[error("The task has not been accepted yet")]
    NotAccepted,

    #[error("Backend call failed: {0}")]
    Transient(#[from] BackendError),
}

/// Dialogs a view can have open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialog {
    Evaluation,
    DocumentUpload,
    IdentityDecision,
}

impl Dialog {
    pub fn for_hint(hint: UiHint) -> Option<Dialog> {
        match hint {
            UiHint::OpenEvaluation => Some(Dialog::Evaluation),
            UiHint::OpenDocumentUpload => Some(Dialog::DocumentUpload),
            UiHint::OpenDecisionDialog => Some(Dialog::IdentityDecision),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Revoked,
    Completed,
    NavigatedAway,
    LoggedOut,
}

/// One-time messages for the employee inside the open task.
///
/// `SmsCodeReceived` is the one confirmation the employee sees and hears
/// for a code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    AssignmentRevoked,
    SmsCodeReceived,
    SubmittedForReview { elapsed_seconds: i64 },
}

/// Everything an employee can do in an open task view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewAction {
    /// Leave `from` forward; refused if the assignment moved meanwhile.
    Advance { from: Step },
    Decide(DigitalDecision),
    GoBack { from: Step },
    SetNoteDraft(String),
    SaveNote(String),
    SaveProgressNotes(String),
    ConfirmVideo(bool),
    Accept,
    Complete,
    RequestSmsCode,
    ResendSmsCode,
    Refresh,
}

/// What the action handler reports back; never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionFeedback {
    Done { step: Option<Step> },
    Rejected {
        reason: GateReason,
        hint: UiHint,
        message: String,
    },
    Busy,
    NotAccepted,
    Revoked,
    Closed,
    NothingToShow,
    Transient { message: String },
}

impl From<ViewError> for ActionFeedback {
    fn from(error: ViewError) -> Self {
        match error {
            ViewError::Gate(rejection) => ActionFeedback::Rejected {
                reason: rejection.reason,
                hint: rejection.hint,
                message: rejection.reason.message().to_string(),
            },
            ViewError::InFlight => ActionFeedback::Busy,
            ViewError::Revoked => ActionFeedback::Revoked,
            ViewError::Closed => ActionFeedback::Closed,
            ViewError::NotFound { .. } => ActionFeedback::NothingToShow,
            ViewError::NotAccepted => ActionFeedback::NotAccepted,
            ViewError::Transient(e) => ActionFeedback::Transient {
                message: e.to_string(),
            },
        }
    }
}
