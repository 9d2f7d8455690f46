// End-to-end workflow runs through a logged-in session

mod fixtures;

use fixtures::{advance_with_note, expect_step, settle, walk_to_decision, Scene};
use workforce_panel::domain::{DocumentType, Task, TaskStatus};
use workforce_panel::panel::{ActionFeedback, CloseReason, Dialog, Notice, ViewAction, ViewError};
use workforce_panel::{DigitalDecision, GateReason, Step, UiHint};

#[tokio::test(start_paused = true)]
async fn test_declined_identity_path_reaches_review() {
    let scene = Scene::with_task(Task::new("Declined path").with_skip_identity_flow(false)).await;
    let session = scene.login().await;
    let view = session.open_task(scene.task_id).unwrap();

    walk_to_decision(&scene, &view).await;
    view.dispatch(ViewAction::SetNoteDraft("no video possible".into())).await;
    assert_eq!(
        expect_step(view.dispatch(ViewAction::Decide(DigitalDecision::Declined)).await),
        Step::VIDEO_VERIFICATION
    );
    let stored = scene.backend.assignment(scene.task_id, scene.employee).await.unwrap();
    assert_eq!(stored.digital_decision, DigitalDecision::Declined);

    view.dispatch(ViewAction::SaveNote("customer declined the video".into())).await;
    view.dispatch(ViewAction::ConfirmVideo(true)).await;
    assert_eq!(
        expect_step(view.dispatch(ViewAction::Advance { from: Step::VIDEO_VERIFICATION }).await),
        Step::SMS_CODE
    );
    assert_eq!(
        expect_step(advance_with_note(&view, Step::SMS_CODE, "code was entered").await),
        Step::COMPLETION_PROOF
    );

    scene.upload(DocumentType::CompletionProof).await;
    assert_eq!(
        expect_step(advance_with_note(&view, Step::COMPLETION_PROOF, "proof is uploaded").await),
        Step::COMPLETION
    );

    assert_eq!(view.dispatch(ViewAction::Complete).await, ActionFeedback::Done { step: None });
    assert_eq!(
        scene.backend.task(scene.task_id).await.unwrap().status,
        TaskStatus::PendingReview
    );
    assert_eq!(view.close_reason(), Some(CloseReason::Completed));
    assert!(matches!(
        view.take_notices().as_slice(),
        [Notice::SubmittedForReview { .. }]
    ));

    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_skip_identity_goes_from_rating_to_sms_step() {
    let scene = Scene::with_task(Task::new("Skip").with_skip_identity_flow(true)).await;
    let session = scene.login().await;
    let view = session.open_task(scene.task_id).unwrap();

    expect_step(view.dispatch(ViewAction::Accept).await);
    expect_step(view.dispatch(ViewAction::Advance { from: Step::SITE_REVIEW }).await);
    scene.evaluate().await;

    assert_eq!(
        expect_step(advance_with_note(&view, Step::RATING, "rated the visit").await),
        Step::SMS_CODE
    );
    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_accepted_identity_path_stamps_demo_view() {
    let scene = Scene::with_task(Task::new("Accepted").with_test_credentials("demo@example.com", "pw")).await;
    let session = scene.login().await;
    let view = session.open_task(scene.task_id).unwrap();

    walk_to_decision(&scene, &view).await;
    view.dispatch(ViewAction::SetNoteDraft("video is possible".into())).await;
    assert_eq!(
        expect_step(view.dispatch(ViewAction::Decide(DigitalDecision::Accepted)).await),
        Step::DOCUMENT_UPLOAD
    );

    match advance_with_note(&view, Step::DOCUMENT_UPLOAD, "documents are here").await {
        ActionFeedback::Rejected { reason, hint, .. } => {
            assert_eq!(reason, GateReason::DocumentsMissing);
            assert_eq!(hint, UiHint::OpenDocumentUpload);
        }
        other => panic!("expected missing documents, got {other:?}"),
    }
    assert_eq!(view.open_dialog(), Some(Dialog::DocumentUpload));

    scene.upload_kyc().await;
    assert_eq!(
        expect_step(advance_with_note(&view, Step::DOCUMENT_UPLOAD, "documents are here").await),
        Step::DEMO_CREDENTIALS
    );
    assert!(scene
        .backend
        .assignment(scene.task_id, scene.employee)
        .await
        .unwrap()
        .demo_viewed_at
        .is_none());

    tokio::time::sleep(std::time::Duration::from_millis(1600)).await;
    assert!(scene
        .backend
        .assignment(scene.task_id, scene.employee)
        .await
        .unwrap()
        .demo_viewed_at
        .is_some());
    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_two_word_note_is_rejected_three_words_pass() {
    let scene = Scene::assigned().await;
    let session = scene.login().await;
    let view = session.open_task(scene.task_id).unwrap();
    walk_to_decision(&scene, &view).await;
    view.dispatch(ViewAction::SetNoteDraft("video is possible".into())).await;
    assert_eq!(
        expect_step(view.dispatch(ViewAction::Decide(DigitalDecision::Accepted)).await),
        Step::DOCUMENT_UPLOAD
    );

    // The document gate runs first at step 4.
    scene.upload_kyc().await;
    settle().await;

    view.dispatch(ViewAction::SaveNote("two words".into())).await;
    match view.dispatch(ViewAction::Advance { from: Step::DOCUMENT_UPLOAD }).await {
        ActionFeedback::Rejected { reason, hint, .. } => {
            assert_eq!(reason, GateReason::NoteTooShort);
            assert_eq!(hint, UiHint::EditStepNote);
        }
        other => panic!("expected a short note rejection, got {other:?}"),
    }
    assert_eq!(view.snapshot().unwrap().step(), Step::DOCUMENT_UPLOAD);

    view.dispatch(ViewAction::SaveNote("now three words".into())).await;
    assert_eq!(
        expect_step(view.dispatch(ViewAction::Advance { from: Step::DOCUMENT_UPLOAD }).await),
        Step::DEMO_CREDENTIALS
    );
    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_going_back_is_never_gated() {
    let scene = Scene::assigned().await;
    let session = scene.login().await;
    let view = session.open_task(scene.task_id).unwrap();
    walk_to_decision(&scene, &view).await;

    assert_eq!(
        expect_step(view.dispatch(ViewAction::GoBack { from: Step::IDENTITY_DECISION }).await),
        Step::RATING
    );
    assert_eq!(
        expect_step(view.dispatch(ViewAction::GoBack { from: Step::RATING }).await),
        Step::SITE_REVIEW
    );
    assert!(matches!(
        view.dispatch(ViewAction::GoBack { from: Step::SITE_REVIEW }).await,
        ActionFeedback::Rejected { reason: GateReason::AtFirstStep, .. }
    ));
    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_complete_requires_last_step() {
    let scene = Scene::assigned().await;
    let session = scene.login().await;
    let view = session.open_task(scene.task_id).unwrap();
    expect_step(view.dispatch(ViewAction::Accept).await);

    assert!(matches!(
        view.dispatch(ViewAction::Complete).await,
        ActionFeedback::Rejected { reason: GateReason::NotAtTerminalStep, .. }
    ));
    assert!(!view.is_closed());
    assert_eq!(
        scene.backend.task(scene.task_id).await.unwrap().status,
        TaskStatus::InProgress
    );
    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_transient_write_failure_is_reported_and_retryable() {
    let scene = Scene::assigned().await;
    let session = scene.login().await;
    let view = session.open_task(scene.task_id).unwrap();
    expect_step(view.dispatch(ViewAction::Accept).await);

    scene.backend.fail_next_writes(1);
    assert!(matches!(
        view.dispatch(ViewAction::Advance { from: Step::SITE_REVIEW }).await,
        ActionFeedback::Transient { .. }
    ));
    assert_eq!(
        scene.backend.assignment(scene.task_id, scene.employee).await.unwrap().step,
        Step::SITE_REVIEW
    );

    assert_eq!(
        expect_step(view.dispatch(ViewAction::Advance { from: Step::SITE_REVIEW }).await),
        Step::RATING
    );
    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_dangling_assignment_has_nothing_to_show() {
    let scene = Scene::assigned().await;
    scene.backend.delete_task_row(scene.task_id).await;
    let session = scene.login().await;

    assert!(matches!(
        session.open_task(scene.task_id),
        Err(ViewError::NotFound { .. })
    ));
    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_accept_from_second_tab_keeps_progress() {
    let scene = Scene::assigned().await;
    let session = scene.login().await;
    let first_tab = session.open_task(scene.task_id).unwrap();
    let second_tab = session.open_task(scene.task_id).unwrap();
    walk_to_decision(&scene, &first_tab).await;
    let accepted_at = scene
        .backend
        .assignment(scene.task_id, scene.employee)
        .await
        .unwrap()
        .accepted_at;

    assert!(matches!(
        second_tab.dispatch(ViewAction::Accept).await,
        ActionFeedback::Rejected { reason: GateReason::AlreadyAccepted, .. }
    ));

    let stored = scene.backend.assignment(scene.task_id, scene.employee).await.unwrap();
    assert_eq!(stored.step, Step::IDENTITY_DECISION);
    assert_eq!(stored.accepted_at, accepted_at);
    session.logout().await;
}
