use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::branch::{next_step, Trigger};
use super::gating;
use super::types::{DigitalDecision, GateContext, GateReason, GateRejection, GateRules, Step, UiHint};
use crate::domain::{Assignment, AssignmentId, AssignmentPatch, Task};

/// What the employee asked the workflow to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowAction {
    Advance,
    Decide(DigitalDecision),
    GoBack,
}

/// Work that has to happen because a step was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Credentials are on screen; stamp `demo_viewed_at` once `after` elapsed.
    RecordDemoViewed { after: Duration },
}

/// A gated, computed move that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTransition {
    pub assignment_id: AssignmentId,
    pub action: WorkflowAction,
    pub from: Step,
    pub to: Step,
    pub decision: Option<DigitalDecision>,
    pub effects: Vec<SideEffect>,
}

impl PlannedTransition {
    /// The single row update that performs this move.
    pub fn patch(&self) -> AssignmentPatch {
        let patch = AssignmentPatch::step(self.to);
        match self.decision {
            Some(decision) => patch.with_decision(decision),
            None => patch,
        }
    }

    pub fn is_forward(&self) -> bool {
        self.to > self.from
    }
}

/// Result of a successful completion check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionPlan {
    pub elapsed_seconds: i64,
}

/// Legality of every action from the current step, for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegalActions {
    pub step: Step,
    pub advance: Result<Step, GateRejection>,
    pub decide: Result<(), GateRejection>,
    pub go_back: Option<Step>,
    pub complete: Result<(), GateRejection>,
}

/// The per-assignment workflow: gating plus branch table plus side effects.
///
/// Holds no assignment state of its own; every call is evaluated against
/// the assignment it is handed, which callers keep at the latest refetched
/// value.
#[derive(Debug, Clone)]
pub struct WorkflowMachine {
    rules: GateRules,
    demo_reveal_delay: Duration,
}

impl Default for WorkflowMachine {
    fn default() -> Self {
        Self::new(GateRules::default(), Duration::from_millis(1500))
    }
}

impl WorkflowMachine {
    pub fn new(rules: GateRules, demo_reveal_delay: Duration) -> Self {
        Self {
            rules,
            demo_reveal_delay,
        }
    }

    pub fn rules(&self) -> &GateRules {
        &self.rules
    }

    pub fn plan(
        &self,
        assignment: &Assignment,
        task: &Task,
        action: WorkflowAction,
        ctx: &GateContext,
    ) -> Result<PlannedTransition, GateRejection> {
        let from = assignment.step;

        let (to, decision) = match action {
            WorkflowAction::Advance => {
                gating::can_advance(from, ctx, &self.rules)?;
                let to = next_step(from, Trigger::Advance, task.skip_identity_flow).ok_or(
                    GateRejection::new(GateReason::TerminalStep, UiHint::CompleteTask),
                )?;
                (to, None)
            }
            WorkflowAction::Decide(decision) => {
                gating::can_decide(from, ctx, &self.rules)?;
                let to = next_step(from, Trigger::Decide(decision), task.skip_identity_flow)
                    .ok_or(GateRejection::new(
                        GateReason::DecisionRequired,
                        UiHint::OpenDecisionDialog,
                    ))?;
                (to, Some(decision))
            }
            WorkflowAction::GoBack => {
                gating::can_go_back(from)?;
                let to = from
                    .previous()
                    .ok_or(GateRejection::new(GateReason::AtFirstStep, UiHint::None))?;
                (to, None)
            }
        };

        let effective_decision = decision.unwrap_or(assignment.digital_decision);
        let mut effects = Vec::new();
        if to == Step::DEMO_CREDENTIALS
            && to > from
            && effective_decision == DigitalDecision::Accepted
            && assignment.demo_viewed_at.is_none()
        {
            effects.push(SideEffect::RecordDemoViewed {
                after: self.demo_reveal_delay,
            });
        }

        tracing::debug!(
            assignment_id = %assignment.id,
            from = %from,
            to = %to,
            action = ?action,
            "Planned workflow transition"
        );

        Ok(PlannedTransition {
            assignment_id: assignment.id,
            action,
            from,
            to,
            decision,
            effects,
        })
    }

    /// Check the explicit completion action and measure time since acceptance.
    pub fn plan_completion(
        &self,
        assignment: &Assignment,
        ctx: &GateContext,
        now: DateTime<Utc>,
    ) -> Result<CompletionPlan, GateRejection> {
        gating::can_complete(assignment.step, ctx)?;
        let elapsed_seconds = assignment
            .accepted_at
            .map(|accepted| (now - accepted).num_seconds().max(0))
            .unwrap_or(0);
        Ok(CompletionPlan { elapsed_seconds })
    }

    pub fn legal_actions(&self, assignment: &Assignment, task: &Task, ctx: &GateContext) -> LegalActions {
        LegalActions {
            step: assignment.step,
            advance: self
                .plan(assignment, task, WorkflowAction::Advance, ctx)
                .map(|t| t.to),
            decide: gating::can_decide(assignment.step, ctx, &self.rules),
            go_back: assignment.step.previous(),
            complete: gating::can_complete(assignment.step, ctx),
        }
    }
}

/// Apply a planned move to a local copy, as the backend would.
pub fn apply_transition(assignment: &mut Assignment, transition: &PlannedTransition) {
    assignment.apply(&transition.patch());
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn fixture(skip: bool) -> (Assignment, Task) {
        let task = Task::new("Verify shop").with_skip_identity_flow(skip);
        let assignment = Assignment::new(task.id, Uuid::new_v4());
        (assignment, task)
    }

    fn ready() -> GateContext {
        GateContext {
            document_count: 3,
            evaluation_exists: true,
            note_draft: None,
            persisted_note: Some("note with enough words".into()),
            video_confirmed: true,
        }
    }

    #[test]
    fn test_rejected_advance_reports_reason_and_keeps_step() {
        let machine = WorkflowMachine::default();
        let (mut assignment, task) = fixture(false);
        assignment.step = Step::RATING;

        let rejection = machine
            .plan(&assignment, &task, WorkflowAction::Advance, &GateContext::default())
            .unwrap_err();
        assert_eq!(rejection.reason, GateReason::EvaluationMissing);
        assert_eq!(assignment.step, Step::RATING);
    }

    #[test]
    fn test_skip_identity_jumps_to_sms_code() {
        let machine = WorkflowMachine::default();
        let (mut assignment, task) = fixture(true);
        assignment.step = Step::RATING;

        let plan = machine
            .plan(&assignment, &task, WorkflowAction::Advance, &ready())
            .unwrap();
        assert_eq!(plan.to, Step::SMS_CODE);
        assert_eq!(plan.patch(), AssignmentPatch::step(Step::SMS_CODE));
    }

    #[test]
    fn test_decisions_set_flag_and_jump() {
        let machine = WorkflowMachine::default();
        let (mut assignment, task) = fixture(false);
        assignment.step = Step::IDENTITY_DECISION;

        let accepted = machine
            .plan(&assignment, &task, WorkflowAction::Decide(DigitalDecision::Accepted), &ready())
            .unwrap();
        assert_eq!(accepted.to, Step::DOCUMENT_UPLOAD);
        assert_eq!(accepted.patch().digital_decision, Some(DigitalDecision::Accepted));

        let declined = machine
            .plan(&assignment, &task, WorkflowAction::Decide(DigitalDecision::Declined), &ready())
            .unwrap();
        assert_eq!(declined.to, Step::VIDEO_VERIFICATION);
        assert_eq!(declined.patch().digital_decision, Some(DigitalDecision::Declined));
    }

    #[test]
    fn test_undecided_is_not_a_decision() {
        let machine = WorkflowMachine::default();
        let (mut assignment, task) = fixture(false);
        assignment.step = Step::IDENTITY_DECISION;

        let rejection = machine
            .plan(&assignment, &task, WorkflowAction::Decide(DigitalDecision::Undecided), &ready())
            .unwrap_err();
        assert_eq!(rejection.reason, GateReason::DecisionRequired);
    }

    #[test]
    fn test_entering_demo_step_after_acceptance_schedules_reveal_stamp() {
        let machine = WorkflowMachine::new(GateRules::default(), Duration::from_secs(2));
        let (mut assignment, task) = fixture(false);
        assignment.step = Step::DOCUMENT_UPLOAD;
        assignment.digital_decision = DigitalDecision::Accepted;

        let plan = machine
            .plan(&assignment, &task, WorkflowAction::Advance, &ready())
            .unwrap();
        assert_eq!(plan.to, Step::DEMO_CREDENTIALS);
        assert_eq!(
            plan.effects,
            vec![SideEffect::RecordDemoViewed {
                after: Duration::from_secs(2)
            }]
        );

        assignment.demo_viewed_at = Some(Utc::now());
        let again = machine
            .plan(&assignment, &task, WorkflowAction::Advance, &ready())
            .unwrap();
        assert!(again.effects.is_empty());
    }

    #[test]
    fn test_go_back_is_ungated() {
        let machine = WorkflowMachine::default();
        let (mut assignment, task) = fixture(false);
        assignment.step = Step::VIDEO_VERIFICATION;

        let plan = machine
            .plan(&assignment, &task, WorkflowAction::GoBack, &GateContext::default())
            .unwrap();
        assert_eq!(plan.to, Step::DEMO_CREDENTIALS);
        assert!(!plan.is_forward());
        assert!(plan.effects.is_empty());

        assignment.step = Step::FIRST;
        assert_eq!(
            machine
                .plan(&assignment, &task, WorkflowAction::GoBack, &ready())
                .unwrap_err()
                .reason,
            GateReason::AtFirstStep
        );
    }

    #[test]
    fn test_completion_measures_time_since_acceptance() {
        let machine = WorkflowMachine::default();
        let (mut assignment, _task) = fixture(false);
        let now = Utc::now();
        assignment.step = Step::COMPLETION;
        assignment.accepted_at = Some(now - chrono::Duration::minutes(90));

        let plan = machine.plan_completion(&assignment, &ready(), now).unwrap();
        assert_eq!(plan.elapsed_seconds, 90 * 60);

        let no_proof = GateContext::default();
        assert_eq!(
            machine
                .plan_completion(&assignment, &no_proof, now)
                .unwrap_err()
                .reason,
            GateReason::CompletionProofMissing
        );
    }

    #[test]
    fn test_legal_actions_at_identity_step() {
        let machine = WorkflowMachine::default();
        let (mut assignment, task) = fixture(false);
        assignment.step = Step::IDENTITY_DECISION;

        let legal = machine.legal_actions(&assignment, &task, &ready());
        assert_eq!(legal.advance.unwrap_err().reason, GateReason::DecisionRequired);
        assert!(legal.decide.is_ok());
        assert_eq!(legal.go_back, Some(Step::RATING));
        assert_eq!(legal.complete.unwrap_err().reason, GateReason::NotAtTerminalStep);
    }
}
