// Task Workflow Module - gated step progression per assignment
//
// Nine fixed steps with two branch shortcuts. Gates are pure functions, the
// branch rules are a table, and the machine combines both with the side
// effects a step entry requires.

pub mod branch;
pub mod gating;
pub mod state_machine;
pub mod types;


pub use branch::{next_step, BranchRule, Trigger, BRANCH_TABLE};
pub use gating::{can_advance, can_complete, can_decide, can_go_back, word_count};
pub use state_machine::{
    apply_transition, CompletionPlan, LegalActions, PlannedTransition, SideEffect, WorkflowAction,
    WorkflowMachine,
};
pub use types::{DigitalDecision, GateContext, GateReason, GateRejection, GateRules, Step, UiHint};
