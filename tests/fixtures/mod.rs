//! Shared builders for panel integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use workforce_panel::domain::{DocumentType, EmployeeId, Task, TaskId};
use workforce_panel::panel::{ActionFeedback, PanelSession, TaskView, ViewAction};
use workforce_panel::{InMemoryBackend, PanelConfig, Step};

/// One task assigned to one employee on a fresh in-memory backend.
pub struct Scene {
    pub backend: Arc<InMemoryBackend>,
    pub employee: EmployeeId,
    pub task_id: TaskId,
}

impl Scene {
    pub async fn with_task(task: Task) -> Self {
        let backend = Arc::new(InMemoryBackend::new());
        let employee = Uuid::new_v4();
        let task_id = backend.create_task(task).await;
        backend
            .assign_task(task_id, employee)
            .await
            .expect("assignment should succeed on a fresh backend");
        Self {
            backend,
            employee,
            task_id,
        }
    }

    pub async fn assigned() -> Self {
        Self::with_task(Task::new("Shop visit")).await
    }

    pub async fn login(&self) -> PanelSession {
        self.login_with(PanelConfig::default()).await
    }

    pub async fn login_with(&self, config: PanelConfig) -> PanelSession {
        PanelSession::login(self.backend.clone(), self.backend.clone(), self.employee, config)
            .await
            .expect("login should load the initial view")
    }

    pub async fn evaluate(&self) {
        self.backend
            .submit_evaluation(self.task_id, self.employee, 5, Some("Helpful staff"))
            .await
            .expect("evaluation should be stored");
    }

    pub async fn upload(&self, doc_type: DocumentType) {
        self.backend
            .upload_document(self.employee, Some(self.task_id), doc_type)
            .await
            .expect("document should be stored");
    }

    pub async fn upload_kyc(&self) {
        for doc_type in [DocumentType::IdFront, DocumentType::IdBack, DocumentType::AddressProof] {
            self.upload(doc_type).await;
        }
    }
}

/// Let the sync driver process whatever the backend just published.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Settle until the backend sees no further reads, so a backlog of queued
/// change events is fully worked off.
pub async fn drain(scene: &Scene) {
    for _ in 0..20 {
        let before = scene.backend.fetch_counts();
        settle().await;
        if scene.backend.fetch_counts() == before {
            return;
        }
    }
}

pub fn expect_step(feedback: ActionFeedback) -> Step {
    match feedback {
        ActionFeedback::Done { step: Some(step) } => step,
        other => panic!("expected the action to succeed, got {other:?}"),
    }
}

/// Type a note for the current step and leave it forward.
pub async fn advance_with_note(view: &TaskView, from: Step, note: &str) -> ActionFeedback {
    view.dispatch(ViewAction::SetNoteDraft(note.to_string())).await;
    view.dispatch(ViewAction::Advance { from }).await
}

/// Accept the task and walk it to the identity decision at step 3.
pub async fn walk_to_decision(scene: &Scene, view: &TaskView) {
    assert_eq!(expect_step(view.dispatch(ViewAction::Accept).await), Step::SITE_REVIEW);
    assert_eq!(
        expect_step(view.dispatch(ViewAction::Advance { from: Step::SITE_REVIEW }).await),
        Step::RATING
    );
    scene.evaluate().await;
    assert_eq!(
        expect_step(advance_with_note(view, Step::RATING, "rated the visit").await),
        Step::IDENTITY_DECISION
    );
}
