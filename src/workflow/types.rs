// Core types for the per-assignment task workflow

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A workflow step, always within 1..=9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Step(u8);

impl Step {
    pub const SITE_REVIEW: Step = Step(1);
    pub const RATING: Step = Step(2);
    pub const IDENTITY_DECISION: Step = Step(3);
    pub const DOCUMENT_UPLOAD: Step = Step(4);
    pub const DEMO_CREDENTIALS: Step = Step(5);
    pub const VIDEO_VERIFICATION: Step = Step(6);
    pub const SMS_CODE: Step = Step(7);
    pub const COMPLETION_PROOF: Step = Step(8);
    pub const COMPLETION: Step = Step(9);

    pub const FIRST: Step = Step::SITE_REVIEW;
    pub const LAST: Step = Step::COMPLETION;

    pub fn new(value: u8) -> Option<Self> {
        (1..=9).contains(&value).then_some(Step(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// The step immediately before this one, if any.
    pub fn previous(self) -> Option<Step> {
        Step::new(self.0.saturating_sub(1))
    }

    /// The step immediately after this one, if any.
    pub fn following(self) -> Option<Step> {
        Step::new(self.0 + 1)
    }

    pub fn is_terminal(self) -> bool {
        self == Step::LAST
    }

    pub fn all() -> impl Iterator<Item = Step> {
        (1..=9).map(Step)
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            1 => "site review",
            2 => "rating",
            3 => "identity decision",
            4 => "document upload",
            5 => "demo credentials",
            6 => "video verification",
            7 => "sms code",
            8 => "completion proof",
            _ => "completion",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for Step {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Step::new(value).ok_or_else(|| format!("step {value} is outside 1..=9"))
    }
}

impl From<Step> for u8 {
    fn from(step: Step) -> u8 {
        step.0
    }
}

/// Outcome of the identity-video dialog at step 3.
///
/// Persisted as a nullable boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum DigitalDecision {
    #[default]
    Undecided,
    Accepted,
    Declined,
}

impl From<Option<bool>> for DigitalDecision {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => DigitalDecision::Undecided,
            Some(true) => DigitalDecision::Accepted,
            Some(false) => DigitalDecision::Declined,
        }
    }
}

impl From<DigitalDecision> for Option<bool> {
    fn from(value: DigitalDecision) -> Self {
        match value {
            DigitalDecision::Undecided => None,
            DigitalDecision::Accepted => Some(true),
            DigitalDecision::Declined => Some(false),
        }
    }
}

/// Everything a gate may look at besides the step itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateContext {
    /// Documents uploaded by the employee for this task.
    pub document_count: u32,
    pub evaluation_exists: bool,
    /// Text typed for the current step but not yet saved.
    pub note_draft: Option<String>,
    /// Note saved for the current step.
    pub persisted_note: Option<String>,
    /// "I completed the external video verification" checkbox.
    pub video_confirmed: bool,
}

impl GateContext {
    /// A fresh draft wins over the saved note for the same step.
    pub fn effective_note(&self) -> Option<&str> {
        self.note_draft
            .as_deref()
            .or(self.persisted_note.as_deref())
    }
}

/// Tunables the gates read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRules {
    pub min_note_words: usize,
    pub required_kyc_documents: u32,
}

impl Default for GateRules {
    fn default() -> Self {
        Self {
            min_note_words: 3,
            required_kyc_documents: 3,
        }
    }
}

/// Stable, machine-checkable reason for a rejected transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    EvaluationMissing,
    DocumentsMissing,
    NoteTooShort,
    VideoNotConfirmed,
    CompletionProofMissing,
    DecisionRequired,
    DecisionNotAvailable,
    TerminalStep,
    NotAtTerminalStep,
    AtFirstStep,
    StaleStep,
    AlreadyAccepted,
}

impl GateReason {
    pub fn code(self) -> &'static str {
        match self {
            GateReason::EvaluationMissing => "evaluation_missing",
            GateReason::DocumentsMissing => "documents_missing",
            GateReason::NoteTooShort => "note_too_short",
            GateReason::VideoNotConfirmed => "video_not_confirmed",
            GateReason::CompletionProofMissing => "completion_proof_missing",
            GateReason::DecisionRequired => "decision_required",
            GateReason::DecisionNotAvailable => "decision_not_available",
            GateReason::TerminalStep => "terminal_step",
            GateReason::NotAtTerminalStep => "not_at_terminal_step",
            GateReason::AtFirstStep => "at_first_step",
            GateReason::StaleStep => "stale_step",
            GateReason::AlreadyAccepted => "already_accepted",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            GateReason::EvaluationMissing => "Please fill out the evaluation first",
            GateReason::DocumentsMissing => {
                "Documents missing: upload identity front, identity back and proof of address"
            }
            GateReason::NoteTooShort => "Write a note of at least three words for this step",
            GateReason::VideoNotConfirmed => "Confirm that the video verification was completed",
            GateReason::CompletionProofMissing => "Upload a proof of completion first",
            GateReason::DecisionRequired => "Decide whether the identity video is possible",
            GateReason::DecisionNotAvailable => "No decision is pending at this step",
            GateReason::TerminalStep => "All steps are done; complete the task instead",
            GateReason::NotAtTerminalStep => "The task can only be completed at the last step",
            GateReason::AtFirstStep => "Already at the first step",
            GateReason::StaleStep => "This task moved on in the meantime",
            GateReason::AlreadyAccepted => "This task is already accepted",
        }
    }
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Where the UI should send the employee after a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UiHint {
    None,
    OpenEvaluation,
    OpenDocumentUpload,
    OpenDecisionDialog,
    ConfirmVideoCheckbox,
    EditStepNote,
    CompleteTask,
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{reason}: {}", .reason.message())]
pub struct GateRejection {
    pub reason: GateReason,
    pub hint: UiHint,
}

impl GateRejection {
    pub fn new(reason: GateReason, hint: UiHint) -> Self {
        Self { reason, hint }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_bounds() {
        assert!(Step::new(0).is_none());
        assert!(Step::new(10).is_none());
        assert_eq!(Step::new(1), Some(Step::FIRST));
        assert_eq!(Step::new(9), Some(Step::LAST));
        assert_eq!(Step::FIRST.previous(), None);
        assert_eq!(Step::LAST.following(), None);
        assert_eq!(Step::RATING.previous(), Some(Step::SITE_REVIEW));
        assert_eq!(Step::all().count(), 9);
    }

    #[test]
    fn test_step_serde_rejects_out_of_range() {
        let step: Step = serde_json::from_str("4").unwrap();
        assert_eq!(step, Step::DOCUMENT_UPLOAD);
        assert!(serde_json::from_str::<Step>("12").is_err());
        assert_eq!(serde_json::to_string(&Step::SMS_CODE).unwrap(), "7");
    }

    #[test]
    fn test_digital_decision_persists_as_nullable_bool() {
        assert_eq!(serde_json::to_string(&DigitalDecision::Undecided).unwrap(), "null");
        assert_eq!(serde_json::to_string(&DigitalDecision::Accepted).unwrap(), "true");
        let declined: DigitalDecision = serde_json::from_str("false").unwrap();
        assert_eq!(declined, DigitalDecision::Declined);
    }

    #[test]
    fn test_draft_takes_precedence_over_saved_note() {
        let ctx = GateContext {
            note_draft: Some("fresh words here".into()),
            persisted_note: Some("old".into()),
            ..Default::default()
        };
        assert_eq!(ctx.effective_note(), Some("fresh words here"));

        let saved_only = GateContext {
            persisted_note: Some("old".into()),
            ..Default::default()
        };
        assert_eq!(saved_only.effective_note(), Some("old"));
    }

    #[test]
    fn test_reason_codes_are_stable() {
        assert_eq!(GateReason::EvaluationMissing.code(), "evaluation_missing");
        assert_eq!(GateReason::DocumentsMissing.to_string(), "documents_missing");
        assert_eq!(
            serde_json::to_string(&GateReason::VideoNotConfirmed).unwrap(),
            "\"video_not_confirmed\""
        );
    }
}
