use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{AssignmentId, EmployeeId, TaskId};
use crate::workflow::{DigitalDecision, Step};

/// Per-step free-text notes, keyed by step number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepNotes(BTreeMap<u8, String>);

impl StepNotes {
    pub fn get(&self, step: Step) -> Option<&str> {
        self.0.get(&step.value()).map(String::as_str)
    }

    pub fn set(&mut self, step: Step, text: impl Into<String>) {
        self.0.insert(step.value(), text.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One employee working one task; carries the workflow progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub task_id: TaskId,
    pub employee_id: EmployeeId,
    pub assigned_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub step: Step,
    pub digital_decision: DigitalDecision,
    pub step_notes: StepNotes,
    pub progress_notes: Option<String>,
    pub demo_viewed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: Option<i64>,
}

impl Assignment {
    pub fn new(task_id: TaskId, employee_id: EmployeeId) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            task_id,
            employee_id,
            assigned_at: Utc::now(),
            accepted_at: None,
            step: Step::FIRST,
            digital_decision: DigitalDecision::Undecided,
            step_notes: StepNotes::default(),
            progress_notes: None,
            demo_viewed_at: None,
            completed_at: None,
            elapsed_seconds: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted_at.is_some()
    }

    pub fn note_for(&self, step: Step) -> Option<&str> {
        self.step_notes.get(step)
    }

    /// Apply a patch the way the backend does: present fields overwrite.
    pub fn apply(&mut self, patch: &AssignmentPatch) {
        if let Some(step) = patch.step {
            self.step = step;
        }
        if let Some(decision) = patch.digital_decision {
            self.digital_decision = decision;
        }
        if let Some((step, text)) = &patch.step_note {
            self.step_notes.set(*step, text.clone());
        }
        if let Some(notes) = &patch.progress_notes {
            self.progress_notes = Some(notes.clone());
        }
        if let Some(at) = patch.demo_viewed_at {
            self.demo_viewed_at = Some(at);
        }
    }
}

/// Partial update of the workflow columns of one assignment.
///
/// Written as one atomic row update; last write wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentPatch {
    pub step: Option<Step>,
    pub digital_decision: Option<DigitalDecision>,
    pub step_note: Option<(Step, String)>,
    pub progress_notes: Option<String>,
    pub demo_viewed_at: Option<DateTime<Utc>>,
}

impl AssignmentPatch {
    pub fn step(step: Step) -> Self {
        Self {
            step: Some(step),
            ..Default::default()
        }
    }

    pub fn with_decision(mut self, decision: DigitalDecision) -> Self {
        self.digital_decision = Some(decision);
        self
    }

    pub fn note(step: Step, text: impl Into<String>) -> Self {
        Self {
            step_note: Some((step, text.into())),
            ..Default::default()
        }
    }

    pub fn progress_notes(text: impl Into<String>) -> Self {
        Self {
            progress_notes: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn demo_viewed(at: DateTime<Utc>) -> Self {
        Self {
            demo_viewed_at: Some(at),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &AssignmentPatch::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_new_assignment_starts_at_first_step() {
        let assignment = Assignment::new(Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(assignment.step, Step::FIRST);
        assert_eq!(assignment.digital_decision, DigitalDecision::Undecided);
        assert!(!assignment.is_accepted());
        assert!(assignment.step_notes.is_empty());
    }

    #[test]
    fn test_patch_overwrites_only_present_fields() {
        let mut assignment = Assignment::new(Uuid::new_v4(), Uuid::new_v4());
        assignment.step_notes.set(Step::RATING, "kept as is");

        assignment.apply(&AssignmentPatch::step(Step::DOCUMENT_UPLOAD).with_decision(DigitalDecision::Accepted));
        assert_eq!(assignment.step, Step::DOCUMENT_UPLOAD);
        assert_eq!(assignment.digital_decision, DigitalDecision::Accepted);
        assert_eq!(assignment.note_for(Step::RATING), Some("kept as is"));

        assignment.apply(&AssignmentPatch::note(Step::DOCUMENT_UPLOAD, "all three uploaded"));
        assert_eq!(assignment.step, Step::DOCUMENT_UPLOAD);
        assert_eq!(assignment.note_for(Step::DOCUMENT_UPLOAD), Some("all three uploaded"));
    }

    #[test]
    fn test_step_notes_round_trip_as_string_keyed_map() {
        let mut notes = StepNotes::default();
        notes.set(Step::VIDEO_VERIFICATION, "video call went fine");
        let json = serde_json::to_string(&notes).unwrap();
        assert_eq!(json, r#"{"6":"video call went fine"}"#);
        let back: StepNotes = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(Step::VIDEO_VERIFICATION), Some("video call went fine"));
    }

    #[test]
    fn test_empty_patch() {
        assert!(AssignmentPatch::default().is_empty());
        assert!(!AssignmentPatch::progress_notes("x").is_empty());
    }
}
