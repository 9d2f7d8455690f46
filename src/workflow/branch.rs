//! Step branching as data: (from step, trigger, skip flag) -> next step.

use super::types::{DigitalDecision, Step};

/// What moved the workflow forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Advance,
    Decide(DigitalDecision),
}

/// `None` in `skip_identity_flow` matches either value of the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchRule {
    pub from: Step,
    pub trigger: Trigger,
    pub skip_identity_flow: Option<bool>,
    pub to: Step,
}

const fn rule(from: Step, trigger: Trigger, skip_identity_flow: Option<bool>, to: Step) -> BranchRule {
    BranchRule {
        from,
        trigger,
        skip_identity_flow,
        to,
    }
}

/// Every legal forward move. No row exists for advancing out of step 3 or 9.
pub const BRANCH_TABLE: &[BranchRule] = &[
    rule(Step::SITE_REVIEW, Trigger::Advance, None, Step::RATING),
    rule(Step::RATING, Trigger::Advance, Some(true), Step::SMS_CODE),
    rule(Step::RATING, Trigger::Advance, Some(false), Step::IDENTITY_DECISION),
    rule(
        Step::IDENTITY_DECISION,
        Trigger::Decide(DigitalDecision::Accepted),
        None,
        Step::DOCUMENT_UPLOAD,
    ),
    rule(
        Step::IDENTITY_DECISION,
        Trigger::Decide(DigitalDecision::Declined),
        None,
        Step::VIDEO_VERIFICATION,
    ),
    rule(Step::DOCUMENT_UPLOAD, Trigger::Advance, None, Step::DEMO_CREDENTIALS),
    rule(Step::DEMO_CREDENTIALS, Trigger::Advance, None, Step::VIDEO_VERIFICATION),
    rule(Step::VIDEO_VERIFICATION, Trigger::Advance, None, Step::SMS_CODE),
    rule(Step::SMS_CODE, Trigger::Advance, None, Step::COMPLETION_PROOF),
    rule(Step::COMPLETION_PROOF, Trigger::Advance, None, Step::COMPLETION),
];

/// Look up the destination of a forward move, if the table has one.
pub fn next_step(from: Step, trigger: Trigger, skip_identity_flow: bool) -> Option<Step> {
    BRANCH_TABLE
        .iter()
        .find(|rule| {
            rule.from == from
                && rule.trigger == trigger
                && rule
                    .skip_identity_flow
                    .map_or(true, |flag| flag == skip_identity_flow)
        })
        .map(|rule| rule.to)
}

/// Whether a row is a shortcut rather than a plain `+1` move.
pub fn is_shortcut(rule: &BranchRule) -> bool {
    rule.from.following() != Some(rule.to)
}
