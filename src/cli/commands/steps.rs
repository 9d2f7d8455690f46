use anyhow::Result;

use super::Command;
use crate::config::PanelConfig;
use crate::workflow::{can_advance, BranchRule, GateContext, Step, Trigger, BRANCH_TABLE};

pub struct StepsCommand {
    config: PanelConfig,
}

impl StepsCommand {
    pub fn new(config: PanelConfig) -> Self {
        Self { config }
    }

    /// What blocks leaving `step` with nothing done yet.
    fn gate_summary(&self, step: Step) -> String {
        match can_advance(step, &GateContext::default(), &self.config.workflow.gate_rules()) {
            Ok(()) => "no gate".to_string(),
            Err(rejection) => format!("{} ({})", rejection.reason.message(), rejection.reason),
        }
    }
}

fn describe(rule: &BranchRule) -> String {
    let trigger = match rule.trigger {
        Trigger::Advance => "advance".to_string(),
        Trigger::Decide(decision) => format!("decide {decision:?}").to_lowercase(),
    };
    let condition = match rule.skip_identity_flow {
        Some(true) => " [skip identity]",
        Some(false) => " [identity flow]",
        None => "",
    };
    format!(
        "{} {} -> {} {}{}",
        rule.from,
        trigger,
        rule.to,
        rule.to.name(),
        condition
    )
}

impl Command for StepsCommand {
    async fn execute(&self) -> Result<()> {
        println!("📋 WORKFLOW STEPS");
        println!("=================");
        for step in Step::all() {
            println!("  {:>2}. {:<20} {}", step, step.name(), self.gate_summary(step));
        }
        println!();
        println!("🔀 BRANCH TABLE");
        println!("===============");
        for rule in BRANCH_TABLE {
            println!("  {}", describe(rule));
        }
        println!();
        println!(
            "📝 Notes need at least {} words on every step except {} and {}.",
            self.config.workflow.min_note_words,
            Step::FIRST,
            Step::LAST
        );
        Ok(())
    }
}
