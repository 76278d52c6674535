//! Failure isolation across the generation path
//!
//! Tests cover:
//! - Idle-timeout failures isolated to one item
//! - Circuit breaker fail-fast mid-batch
//! - Scoring outage degrading to the fallback score

use cadence::plan::{FailureKind, ItemOutcome, ItemState};

use super::test_utils::{batch_request, HarnessBuilder, ModelBehavior, ScoreScript};

#[tokio::test]
async fn idle_timeout_fails_one_item_and_batch_continues() {
    let harness = HarnessBuilder::new()
        .model(vec![
            ModelBehavior::Hang,
            ModelBehavior::Complete("late but fine".to_string()),
        ])
        .scores(vec![22.0])
        .build();

    let created = harness
        .service
        .create_batch(batch_request(&[("linkedin", "a"), ("twitter", "b")]))
        .unwrap();
    let response = harness.service.run_batch(&created.plan_id).await.unwrap();
    assert_eq!(response.report.succeeded, 1);
    assert_eq!(response.report.failed, 1);

    let plan = harness.store.get_plan(&created.plan_id).unwrap();
    match plan.items[0].outcome.as_ref().unwrap() {
        ItemOutcome::Failure(failure) => {
            assert_eq!(failure.kind, FailureKind::Timeout);
            assert!(failure.message.contains("idle timeout"));
        }
        other => panic!("expected failure outcome, got {other:?}"),
    }
    assert_eq!(plan.items[1].state, ItemState::Succeeded);
}

#[tokio::test]
async fn open_circuit_fails_fast_for_later_items() {
    let harness = HarnessBuilder::new()
        .failure_threshold(2)
        .model(vec![
            ModelBehavior::Fail,
            ModelBehavior::Fail,
            ModelBehavior::Fail,
            ModelBehavior::Fail,
        ])
        .build();

    let created = harness
        .service
        .create_batch(batch_request(&[
            ("linkedin", "a"),
            ("linkedin", "b"),
            ("linkedin", "c"),
            ("linkedin", "d"),
        ]))
        .unwrap();
    let response = harness.service.run_batch(&created.plan_id).await.unwrap();
    assert_eq!(response.report.failed, 4);

    let plan = harness.store.get_plan(&created.plan_id).unwrap();
    let kinds: Vec<FailureKind> = plan
        .items
        .iter()
        .map(|item| match item.outcome.as_ref().unwrap() {
            ItemOutcome::Failure(failure) => failure.kind,
            other => panic!("expected failure outcome, got {other:?}"),
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            FailureKind::Provider,
            FailureKind::Provider,
            FailureKind::CircuitOpen,
            FailureKind::CircuitOpen,
        ]
    );

    // Once the circuit opened, the model was never called again.
    assert_eq!(harness.script.requests.lock().len(), 2);
}

#[tokio::test]
async fn scoring_outage_degrades_to_fallback_score() {
    let harness = HarnessBuilder::new()
        .score_scripts(vec![ScoreScript::Unavailable])
        .build();

    let created = harness
        .service
        .create_batch(batch_request(&[("linkedin", "a")]))
        .unwrap();
    let response = harness.service.run_batch(&created.plan_id).await.unwrap();
    assert_eq!(response.report.succeeded, 1);
    assert!((response.report.avg_score - 15.0).abs() < 1e-9);

    let plan = harness.store.get_plan(&created.plan_id).unwrap();
    match plan.items[0].outcome.as_ref().unwrap() {
        ItemOutcome::Success(success) => {
            assert!((success.score - 15.0).abs() < 1e-9);
            // Unmeasured content is routed to human review.
            assert!(success.needs_review);
            assert!(success
                .scoring_note
                .as_deref()
                .unwrap()
                .contains("automated scoring failed"));
        }
        other => panic!("expected success outcome, got {other:?}"),
    }

    // The degraded score travels to the calendar as a review note.
    let drafts = harness.calendar.drafts.lock();
    assert_eq!(drafts[0].status, "needs_review");
    assert!(drafts[0].review_notes.is_some());
}
