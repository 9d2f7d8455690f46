//! Gating engine: pure checks deciding whether a step may be left.
//!
//! Nothing here touches the backend. A rejection carries a stable
//! [`GateReason`] and a [`UiHint`] so callers can assert on it and route the
//! employee to the surface that fixes it.

use super::types::{GateContext, GateReason, GateRejection, GateRules, Step, UiHint};

/// Count whitespace separated tokens.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// The generic note gate: every step except the first and the last needs a
/// note of at least `min_note_words` tokens before it can be left.
pub fn check_note(step: Step, ctx: &GateContext, rules: &GateRules) -> Result<(), GateRejection> {
    if step == Step::FIRST || step.is_terminal() {
        return Ok(());
    }

    let words = ctx.effective_note().map(word_count).unwrap_or(0);
    if words < rules.min_note_words {
        return Err(GateRejection::new(GateReason::NoteTooShort, UiHint::EditStepNote));
    }
    Ok(())
}

/// Gate for a forward `advance` out of `step`.
///
/// Step specific preconditions are checked before the note gate, so the
/// reason reported is the one the step is known for.
pub fn can_advance(step: Step, ctx: &GateContext, rules: &GateRules) -> Result<(), GateRejection> {
    match step {
        Step::SITE_REVIEW => return Ok(()),
        Step::RATING => {
            if !ctx.evaluation_exists {
                return Err(GateRejection::new(
                    GateReason::EvaluationMissing,
                    UiHint::OpenEvaluation,
                ));
            }
        }
        Step::IDENTITY_DECISION => {
            return Err(GateRejection::new(
                GateReason::DecisionRequired,
                UiHint::OpenDecisionDialog,
            ));
        }
        Step::DOCUMENT_UPLOAD => {
            if ctx.document_count < rules.required_kyc_documents {
                return Err(GateRejection::new(
                    GateReason::DocumentsMissing,
                    UiHint::OpenDocumentUpload,
                ));
            }
        }
        Step::VIDEO_VERIFICATION => {
            if !ctx.video_confirmed {
                return Err(GateRejection::new(
                    GateReason::VideoNotConfirmed,
                    UiHint::ConfirmVideoCheckbox,
                ));
            }
        }
        Step::COMPLETION_PROOF => {
            if ctx.document_count == 0 {
                return Err(GateRejection::new(
                    GateReason::CompletionProofMissing,
                    UiHint::OpenDocumentUpload,
                ));
            }
        }
        Step::COMPLETION => {
            return Err(GateRejection::new(GateReason::TerminalStep, UiHint::CompleteTask));
        }
        _ => {}
    }

    check_note(step, ctx, rules)
}

/// Gate for submitting the identity-video decision dialog.
pub fn can_decide(step: Step, ctx: &GateContext, rules: &GateRules) -> Result<(), GateRejection> {
    if step != Step::IDENTITY_DECISION {
        return Err(GateRejection::new(
            GateReason::DecisionNotAvailable,
            UiHint::None,
        ));
    }
    check_note(step, ctx, rules)
}

/// Going back one step is never gated, only bounded.
pub fn can_go_back(step: Step) -> Result<(), GateRejection> {
    match step.previous() {
        Some(_) => Ok(()),
        None => Err(GateRejection::new(GateReason::AtFirstStep, UiHint::None)),
    }
}

/// Gate for the explicit `complete task` action at the last step.
pub fn can_complete(step: Step, ctx: &GateContext) -> Result<(), GateRejection> {
    if !step.is_terminal() {
        return Err(GateRejection::new(GateReason::NotAtTerminalStep, UiHint::None));
    }
    if ctx.document_count == 0 {
        return Err(GateRejection::new(
            GateReason::CompletionProofMissing,
            UiHint::OpenDocumentUpload,
        ));
    }
    Ok(())
}
