use anyhow::{anyhow, bail, Result};
use std::sync::Arc;
use uuid::Uuid;

use super::Command;
use crate::backend::InMemoryBackend;
use crate::config::PanelConfig;
use crate::domain::{DocumentType, Task, TaskStatus};
use crate::panel::{ActionFeedback, Notice, PanelSession, TaskView, ViewAction};
use crate::sync::EntityKind;
use crate::workflow::{DigitalDecision, Step};

/// Walks one task from assignment to review against the in-memory backend,
/// playing both the employee and the administrator.
pub struct SimulateCommand {
    pub skip_identity: bool,
    pub decline: bool,
    config: PanelConfig,
}

/// What a finished simulation went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    pub visited: Vec<Step>,
    pub final_status: TaskStatus,
    pub elapsed_seconds: i64,
    pub notices: Vec<Notice>,
    pub unread_notifications: usize,
}

fn expect_done(feedback: ActionFeedback) -> Result<Option<Step>> {
    match feedback {
        ActionFeedback::Done { step } => Ok(step),
        other => bail!("Simulation stopped: {other:?}"),
    }
}

fn expect_step(feedback: ActionFeedback) -> Result<Step> {
    expect_done(feedback)?.ok_or_else(|| anyhow!("Simulation stopped: no step reported"))
}

async fn advance_with_note(view: &TaskView, from: Step, note: &str) -> Result<Step> {
    expect_done(view.dispatch(ViewAction::SetNoteDraft(note.to_string())).await)?;
    expect_step(view.dispatch(ViewAction::Advance { from }).await)
}

impl SimulateCommand {
    pub fn new(config: PanelConfig) -> Self {
        Self {
            skip_identity: false,
            decline: false,
            config,
        }
    }

    pub fn with_skip_identity(mut self, skip_identity: bool) -> Self {
        self.skip_identity = skip_identity;
        self
    }

    pub fn with_decline(mut self, decline: bool) -> Self {
        self.decline = decline;
        self
    }

    pub async fn run(&self) -> Result<SimulationReport> {
        let backend = Arc::new(InMemoryBackend::new());
        let employee = Uuid::new_v4();
        let task = Task::new("Simulated shop visit")
            .with_skip_identity_flow(self.skip_identity)
            .with_test_credentials("demo@example.com", "demo-password");
        let task_id = backend.create_task(task).await;
        backend.assign_task(task_id, employee).await?;

        let session =
            PanelSession::login(backend.clone(), backend.clone(), employee, self.config.clone()).await?;
        let view = session.open_task(task_id)?;

        let mut visited = Vec::new();
        let mut step = expect_step(view.dispatch(ViewAction::Accept).await)?;
        while !step.is_terminal() {
            visited.push(step);
            println!("  ➡️  Step {}: {}", step, step.name());

            step = match step {
                Step::SITE_REVIEW => {
                    expect_step(view.dispatch(ViewAction::Advance { from: step }).await)?
                }
                Step::RATING => {
                    backend
                        .submit_evaluation(task_id, employee, 5, Some("Friendly and quick"))
                        .await?;
                    advance_with_note(&view, step, "rated the site visit").await?
                }
                Step::IDENTITY_DECISION => {
                    let decision = if self.decline {
                        DigitalDecision::Declined
                    } else {
                        DigitalDecision::Accepted
                    };
                    expect_done(
                        view.dispatch(ViewAction::SetNoteDraft("customer answered the call".into()))
                            .await,
                    )?;
                    expect_step(view.dispatch(ViewAction::Decide(decision)).await)?
                }
                Step::DOCUMENT_UPLOAD => {
                    for doc_type in [
                        DocumentType::IdFront,
                        DocumentType::IdBack,
                        DocumentType::AddressProof,
                    ] {
                        backend.upload_document(employee, Some(task_id), doc_type).await?;
                    }
                    advance_with_note(&view, step, "identity documents uploaded").await?
                }
                Step::DEMO_CREDENTIALS => {
                    tokio::time::sleep(self.config.workflow.demo_reveal_delay()).await;
                    advance_with_note(&view, step, "logged in with demo account").await?
                }
                Step::VIDEO_VERIFICATION => {
                    expect_done(view.dispatch(ViewAction::ConfirmVideo(true)).await)?;
                    advance_with_note(&view, step, "video call went fine").await?
                }
                Step::SMS_CODE => {
                    expect_done(view.dispatch(ViewAction::RequestSmsCode).await)?;
                    backend.fulfill_latest_sms_code(task_id, "482913").await?;
                    expect_done(view.dispatch(ViewAction::Refresh).await)?;
                    if !view.tracker().is_revealed() {
                        view.tracker().toggle_reveal();
                    }
                    println!("     📨 Code received: {}", view.tracker().visible_code().unwrap_or_default());
                    advance_with_note(&view, step, "entered the sms code").await?
                }
                Step::COMPLETION_PROOF => {
                    backend
                        .upload_document(employee, Some(task_id), DocumentType::CompletionProof)
                        .await?;
                    advance_with_note(&view, step, "uploaded the final screenshot").await?
                }
                other => bail!("Simulation stopped at unexpected step {other}"),
            };
        }
        visited.push(step);
        println!("  ➡️  Step {}: {}", step, step.name());

        expect_done(view.dispatch(ViewAction::Complete).await)?;
        let notices = view.take_notices();
        let elapsed_seconds = notices
            .iter()
            .find_map(|notice| match notice {
                Notice::SubmittedForReview { elapsed_seconds } => Some(*elapsed_seconds),
                _ => None,
            })
            .unwrap_or(0);
        let final_status = backend
            .task(task_id)
            .await
            .map(|task| task.status)
            .ok_or_else(|| anyhow!("Task {task_id} disappeared"))?;
        session.coordinator().refresh(&EntityKind::ALL).await?;
        let unread_notifications = session.coordinator().view().unread_notifications();

        session.logout().await;
        Ok(SimulationReport {
            visited,
            final_status,
            elapsed_seconds,
            notices,
            unread_notifications,
        })
    }
}

impl Command for SimulateCommand {
    async fn execute(&self) -> Result<()> {
        println!("▶️  Simulating one task");
        println!(
            "   skip identity: {}, identity video: {}",
            self.skip_identity,
            if self.decline { "declined" } else { "accepted" }
        );
        println!();

        let report = self.run().await?;

        println!();
        println!("✅ Task submitted for review");
        println!("   📍 Steps visited: {}", report.visited.len());
        println!("   📊 Status: {}", report.final_status.as_str());
        println!("   ⏱️  Elapsed: {}s", report.elapsed_seconds);
        println!("   📬 Unread notifications: {}", report.unread_notifications);
        for notice in &report.notices {
            println!("   🔔 {}", serde_json::to_string(notice)?);
        }
        Ok(())
    }
}
