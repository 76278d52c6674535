//! End-to-end batch execution through the full stack
//!
//! Tests cover:
//! - Sequential happy path with trend detection
//! - Unknown platform isolation mid-batch
//! - Learnings and target-score flow between items
//! - Best-effort persistence
//! - Checkpoint emission
//! - Cancellation

use cadence::context::Trend;
use cadence::plan::{FailureKind, ItemOutcome, ItemState};

use super::test_utils::{batch_request, HarnessBuilder, ModelBehavior};

#[tokio::test]
async fn happy_path_batch_reports_improving_trend() {
    let harness = HarnessBuilder::new()
        .model(vec![
            ModelBehavior::Complete("post one".to_string()),
            ModelBehavior::Complete("post two".to_string()),
            ModelBehavior::Complete("post three".to_string()),
        ])
        .scores(vec![20.0, 22.0, 24.0])
        .build();

    let created = harness
        .service
        .create_batch(batch_request(&[
            ("linkedin", "product launch"),
            ("twitter", "feature recap"),
            ("instagram", "behind the scenes"),
        ]))
        .unwrap();
    assert!(created.success);
    assert_eq!(created.total, 3);

    let response = harness.service.run_batch(&created.plan_id).await.unwrap();
    assert!(response.success);
    assert_eq!(response.report.total, 3);
    assert_eq!(response.report.succeeded, 3);
    assert_eq!(response.report.failed, 0);
    assert!((response.report.avg_score - 22.0).abs() < 1e-9);
    assert_eq!(response.report.trend, Trend::Improving);

    let plan = harness.store.get_plan(&created.plan_id).unwrap();
    assert!(plan.items.iter().all(|i| i.state == ItemState::Succeeded));

    // Each success was persisted to both collaborators.
    assert_eq!(harness.calendar.drafts.lock().len(), 3);
    assert_eq!(harness.knowledge.saved.lock().len(), 3);
}

#[tokio::test]
async fn unknown_platform_fails_only_that_item() {
    let harness = HarnessBuilder::new().scores(vec![20.0, 22.0]).build();

    let created = harness
        .service
        .create_batch(batch_request(&[
            ("linkedin", "a"),
            ("friendster", "b"),
            ("twitter", "c"),
        ]))
        .unwrap();

    let response = harness.service.run_batch(&created.plan_id).await.unwrap();
    assert_eq!(response.report.succeeded, 2);
    assert_eq!(response.report.failed, 1);
    assert_eq!(response.report.total, 3);

    let plan = harness.store.get_plan(&created.plan_id).unwrap();
    assert_eq!(plan.items[0].state, ItemState::Succeeded);
    assert_eq!(plan.items[2].state, ItemState::Succeeded);
    assert_eq!(plan.items[1].state, ItemState::Failed);
    match plan.items[1].outcome.as_ref().unwrap() {
        ItemOutcome::Failure(failure) => {
            assert_eq!(failure.kind, FailureKind::UnknownPlatform);
            assert!(failure.message.contains("Unknown platform: friendster"));
        }
        other => panic!("expected failure outcome, got {other:?}"),
    }

    // The unknown platform never reached the model.
    assert_eq!(harness.script.requests.lock().len(), 2);
}

#[tokio::test]
async fn learnings_and_target_score_flow_between_items() {
    let harness = HarnessBuilder::new().scores(vec![20.0, 23.0]).build();

    let created = harness
        .service
        .create_batch(batch_request(&[
            ("linkedin", "first topic"),
            ("linkedin", "second topic"),
        ]))
        .unwrap();
    harness.service.run_batch(&created.plan_id).await.unwrap();

    let requests = harness.script.requests.lock();
    assert_eq!(requests.len(), 2);

    // The first item starts from the baseline with no history.
    assert_eq!(requests[0].topic, "first topic");
    assert!(requests[0].learnings.is_empty());
    assert_eq!(requests[0].target_score, 18);

    // The second item sees the first item's learning and a raised target:
    // ceil(20.0) + 1.
    assert!(requests[1].learnings.contains("first topic"));
    assert!(requests[1].learnings.contains("20.0"));
    assert_eq!(requests[1].target_score, 21);
}

#[tokio::test]
async fn persistence_failure_never_fails_the_item() {
    let harness = HarnessBuilder::new()
        .failing_calendar()
        .scores(vec![21.0])
        .build();

    let created = harness
        .service
        .create_batch(batch_request(&[("linkedin", "a")]))
        .unwrap();
    let response = harness.service.run_batch(&created.plan_id).await.unwrap();
    assert_eq!(response.report.succeeded, 1);

    let plan = harness.store.get_plan(&created.plan_id).unwrap();
    match plan.items[0].outcome.as_ref().unwrap() {
        ItemOutcome::Success(success) => {
            assert!(success.calendar_ref.is_none());
            assert_eq!(success.persistence_notes.len(), 1);
            assert!(success.persistence_notes[0].contains("calendar"));
            // The other collaborator still persisted.
            assert_eq!(success.knowledge_ref.as_deref(), Some("doc-1"));
        }
        other => panic!("expected success outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn low_score_is_fixed_but_reported_unrevised() {
    let harness = HarnessBuilder::new()
        .model(vec![ModelBehavior::Complete("rough draft".to_string())])
        .scores(vec![12.0])
        .build();

    let created = harness
        .service
        .create_batch(batch_request(&[("twitter", "a")]))
        .unwrap();
    harness.service.run_batch(&created.plan_id).await.unwrap();

    let plan = harness.store.get_plan(&created.plan_id).unwrap();
    match plan.items[0].outcome.as_ref().unwrap() {
        ItemOutcome::Success(success) => {
            assert_eq!(success.content, "rough draft [revised]");
            // The original validation score is kept for audit.
            assert!((success.score - 12.0).abs() < 1e-9);
            assert!(success.needs_review);
        }
        other => panic!("expected success outcome, got {other:?}"),
    }

    let drafts = harness.calendar.drafts.lock();
    assert_eq!(drafts[0].status, "needs_review");
}

#[tokio::test]
async fn checkpoints_emitted_every_interval() {
    let harness = HarnessBuilder::new()
        .checkpoint_interval(2)
        .scores(vec![20.0, 20.0, 22.0, 22.0, 24.0])
        .build();

    let created = harness
        .service
        .create_batch(batch_request(&[
            ("linkedin", "a"),
            ("linkedin", "b"),
            ("linkedin", "c"),
            ("linkedin", "d"),
            ("linkedin", "e"),
        ]))
        .unwrap();
    let response = harness.service.run_batch(&created.plan_id).await.unwrap();
    assert_eq!(response.report.checkpoints_emitted, 2);

    let checkpoints = harness.notifier.checkpoints.lock();
    assert_eq!(checkpoints.len(), 2);
    assert_eq!(checkpoints[0].completed, 2);
    assert_eq!(checkpoints[0].succeeded, 2);
    assert_eq!(checkpoints[1].completed, 4);
    assert_eq!(checkpoints[1].succeeded, 4);
}

#[tokio::test]
async fn cancellation_drains_remaining_items_to_terminal_states() {
    let harness = HarnessBuilder::new().build();

    let created = harness
        .service
        .create_batch(batch_request(&[
            ("linkedin", "a"),
            ("twitter", "b"),
            ("instagram", "c"),
        ]))
        .unwrap();

    harness.executor.cancellation().cancel();
    let response = harness.service.run_batch(&created.plan_id).await.unwrap();
    assert_eq!(response.report.succeeded, 0);
    assert_eq!(response.report.failed, 3);

    let plan = harness.store.get_plan(&created.plan_id).unwrap();
    for item in &plan.items {
        assert_eq!(item.state, ItemState::Failed);
        match item.outcome.as_ref().unwrap() {
            ItemOutcome::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::Cancelled)
            }
            other => panic!("expected failure outcome, got {other:?}"),
        }
    }

    // No generation call was ever started.
    assert!(harness.script.requests.lock().is_empty());
}
