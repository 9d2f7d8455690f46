// Push/poll supervision, revocation and multi-tab behavior

mod fixtures;

use std::time::Duration;

use fixtures::{expect_step, settle, walk_to_decision, Scene};
use workforce_panel::domain::Task;
use workforce_panel::panel::{ActionFeedback, CloseReason, Notice, ViewAction};
use workforce_panel::{ChannelMode, GateReason, Step, SyncAlert, UiHint};

#[tokio::test(start_paused = true)]
async fn test_poll_starts_five_seconds_after_unconfirmed_subscribe() {
    let scene = Scene::assigned().await;
    scene.backend.set_auto_confirm(false);
    let session = scene.login().await;
    let coordinator = session.coordinator();
    assert_eq!(scene.backend.fetch_counts().assignment_lists, 1);

    tokio::time::sleep(Duration::from_millis(4900)).await;
    assert_eq!(coordinator.mode(), ChannelMode::Connecting);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(coordinator.mode(), ChannelMode::FallbackPoll);
    assert_eq!(coordinator.stats().fallbacks, 1);
    assert_eq!(scene.backend.fetch_counts().assignment_lists, 1);

    // First poll 1.5 s after the fallback, then every 1.5 s.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(scene.backend.fetch_counts().assignment_lists, 2);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(scene.backend.fetch_counts().assignment_lists, 3);
    assert_eq!(coordinator.stats().polls, 2);

    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_late_confirmation_cancels_polling() {
    let scene = Scene::assigned().await;
    scene.backend.set_auto_confirm(false);
    let session = scene.login().await;
    let coordinator = session.coordinator();

    tokio::time::sleep(Duration::from_millis(6600)).await;
    assert_eq!(coordinator.mode(), ChannelMode::FallbackPoll);
    assert_eq!(coordinator.stats().polls, 1);

    scene.backend.confirm_subscriptions().await;
    settle().await;
    assert_eq!(coordinator.mode(), ChannelMode::LivePush);

    let after_catch_up = scene.backend.fetch_counts();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(scene.backend.fetch_counts(), after_catch_up);
    assert_eq!(coordinator.stats().polls, 1);

    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_channel_error_falls_back_to_polling() {
    let scene = Scene::assigned().await;
    let session = scene.login().await;
    let coordinator = session.coordinator();
    settle().await;
    assert_eq!(coordinator.mode(), ChannelMode::LivePush);

    scene.backend.fail_subscriptions("socket closed").await;
    settle().await;
    assert_eq!(coordinator.mode(), ChannelMode::FallbackPoll);

    let before = scene.backend.fetch_counts().assignment_lists;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(scene.backend.fetch_counts().assignment_lists, before + 1);

    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_refused_subscription_polls_immediately() {
    let scene = Scene::assigned().await;
    scene.backend.set_refuse_subscriptions(true);
    let session = scene.login().await;
    settle().await;

    assert_eq!(session.coordinator().mode(), ChannelMode::FallbackPoll);
    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_revocation_closes_view_and_blocks_mutations() {
    let scene = Scene::assigned().await;
    let session = scene.login().await;
    let mut alerts = session.coordinator().take_alerts().unwrap();
    let view = session.open_task(scene.task_id).unwrap();
    walk_to_decision(&scene, &view).await;
    view.dispatch(ViewAction::SetNoteDraft("half typed note".into())).await;

    scene.backend.revoke_assignment(scene.task_id).await.unwrap();
    settle().await;

    assert_eq!(view.close_reason(), Some(CloseReason::Revoked));
    assert_eq!(view.open_dialog(), None);
    assert_eq!(view.take_notices(), vec![Notice::AssignmentRevoked]);
    assert!(view.take_notices().is_empty());

    assert_eq!(
        view.dispatch(ViewAction::Advance { from: Step::IDENTITY_DECISION }).await,
        ActionFeedback::Revoked
    );
    assert_eq!(
        view.dispatch(ViewAction::RequestSmsCode).await,
        ActionFeedback::Revoked
    );
    assert!(scene.backend.sms_requests(scene.task_id).await.is_empty());
    assert!(!view.tracker().is_active());
    assert_eq!(view.active_timers(), 0);

    let revoked = std::iter::from_fn(|| alerts.try_recv().ok())
        .filter(|alert| matches!(alert, SyncAlert::AssignmentRevoked { .. }))
        .count();
    assert_eq!(revoked, 1);

    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_reassignment_to_same_employee_closes_view() {
    let scene = Scene::assigned().await;
    let session = scene.login().await;
    let mut alerts = session.coordinator().take_alerts().unwrap();
    let view = session.open_task(scene.task_id).unwrap();
    walk_to_decision(&scene, &view).await;
    view.dispatch(ViewAction::SetNoteDraft("half typed note".into())).await;
    let original = scene.backend.assignment(scene.task_id, scene.employee).await.unwrap().id;

    scene.backend.revoke_assignment(scene.task_id).await.unwrap();
    scene.backend.assign_task(scene.task_id, scene.employee).await.unwrap();
    settle().await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    let replacement = scene.backend.assignment(scene.task_id, scene.employee).await.unwrap();
    assert_ne!(replacement.id, original);
    assert_eq!(view.close_reason(), Some(CloseReason::Revoked));
    assert_eq!(view.take_notices(), vec![Notice::AssignmentRevoked]);
    assert_eq!(
        view.dispatch(ViewAction::Advance { from: Step::IDENTITY_DECISION }).await,
        ActionFeedback::Revoked
    );
    assert_eq!(
        scene.backend.assignment(scene.task_id, scene.employee).await.unwrap().step,
        Step::FIRST
    );

    let revoked = std::iter::from_fn(|| alerts.try_recv().ok())
        .filter(|alert| matches!(alert, SyncAlert::AssignmentRevoked { .. }))
        .count();
    assert_eq!(revoked, 1);

    // A freshly opened view works on the new assignment.
    let reopened = session.open_task(scene.task_id).unwrap();
    assert!(!reopened.is_closed());
    assert_eq!(reopened.snapshot().unwrap().assignment.id, replacement.id);

    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_stale_tab_is_refused_without_moving_step() {
    let scene = Scene::assigned().await;
    let session = scene.login().await;
    let first_tab = session.open_task(scene.task_id).unwrap();
    let second_tab = session.open_task(scene.task_id).unwrap();

    expect_step(first_tab.dispatch(ViewAction::Accept).await);
    assert_eq!(
        expect_step(first_tab.dispatch(ViewAction::Advance { from: Step::SITE_REVIEW }).await),
        Step::RATING
    );

    match second_tab.dispatch(ViewAction::Advance { from: Step::SITE_REVIEW }).await {
        ActionFeedback::Rejected { reason, hint, .. } => {
            assert_eq!(reason, GateReason::StaleStep);
            assert_eq!(hint, UiHint::Refresh);
        }
        other => panic!("expected a stale step rejection, got {other:?}"),
    }
    assert_eq!(
        scene.backend.assignment(scene.task_id, scene.employee).await.unwrap().step,
        Step::RATING
    );

    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_advances_move_one_step() {
    let scene = Scene::assigned().await;
    let session = scene.login().await;
    let first_tab = session.open_task(scene.task_id).unwrap();
    let second_tab = session.open_task(scene.task_id).unwrap();
    expect_step(first_tab.dispatch(ViewAction::Accept).await);

    let (a, b) = tokio::join!(
        first_tab.dispatch(ViewAction::Advance { from: Step::SITE_REVIEW }),
        second_tab.dispatch(ViewAction::Advance { from: Step::SITE_REVIEW }),
    );

    let done = [&a, &b]
        .iter()
        .filter(|feedback| matches!(feedback, ActionFeedback::Done { .. }))
        .count();
    assert_eq!(done, 1, "{a:?} / {b:?}");
    assert_eq!(
        scene.backend.assignment(scene.task_id, scene.employee).await.unwrap().step,
        Step::RATING
    );

    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_new_assignment_alerts_after_grace_only_once() {
    let scene = Scene::assigned().await;
    let session = scene.login().await;
    let mut alerts = session.coordinator().take_alerts().unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(alerts.try_recv().is_err());

    let second = scene.backend.create_task(Task::new("Second visit")).await;
    scene.backend.assign_task(second, scene.employee).await.unwrap();
    settle().await;
    session.coordinator().refresh(&workforce_panel::sync::EntityKind::ALL).await.unwrap();

    let assigned: Vec<_> = std::iter::from_fn(|| alerts.try_recv().ok())
        .filter(|alert| matches!(alert, SyncAlert::TaskAssigned { .. }))
        .collect();
    assert_eq!(
        assigned,
        vec![SyncAlert::TaskAssigned {
            task_id: second,
            title: "Second visit".into()
        }]
    );

    session.logout().await;
}

#[tokio::test(start_paused = true)]
async fn test_logout_stops_every_timer() {
    let scene = Scene::assigned().await;
    scene.backend.set_auto_confirm(false);
    let session = scene.login().await;
    let view = session.open_task(scene.task_id).unwrap();
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(session.coordinator().mode(), ChannelMode::FallbackPoll);

    let report = session.logout().await;
    assert!(report.timed_out.is_empty());
    assert_eq!(view.close_reason(), Some(CloseReason::LoggedOut));
    assert!(!session.coordinator().is_running());

    let counts = scene.backend.fetch_counts();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(scene.backend.fetch_counts(), counts);
}
