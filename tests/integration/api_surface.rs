//! Batch request surface behavior
//!
//! Tests cover:
//! - Structured `success: false` error envelopes
//! - Request validation at creation time
//! - Single-item execution
//! - Status reporting and idempotence

use cadence::plan::ItemState;

use super::test_utils::{batch_request, HarnessBuilder};

#[tokio::test]
async fn unknown_plan_returns_structured_error() {
    let harness = HarnessBuilder::new().build();

    let err = harness.service.get_batch_status("plan-missing").unwrap_err();
    assert!(!err.success);
    assert_eq!(err.kind, "not_found");
    assert!(err.error.contains("plan-missing"));

    // The envelope carries success=false on the wire, not just in memory.
    let encoded = serde_json::to_value(&err).unwrap();
    assert_eq!(encoded["success"], serde_json::json!(false));

    let err = harness.service.run_batch("plan-missing").await.unwrap_err();
    assert!(!err.success);
    assert_eq!(err.kind, "not_found");
}

#[tokio::test]
async fn empty_batch_request_is_rejected_whole() {
    let harness = HarnessBuilder::new().build();

    let err = harness
        .service
        .create_batch(batch_request(&[]))
        .unwrap_err();
    assert!(!err.success);
    assert_eq!(err.kind, "invalid_request");
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn execute_item_runs_one_item_in_isolation() {
    let harness = HarnessBuilder::new().scores(vec![21.0]).build();

    let created = harness
        .service
        .create_batch(batch_request(&[("linkedin", "a"), ("twitter", "b")]))
        .unwrap();

    let response = harness
        .service
        .execute_item(&created.plan_id, 1)
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.index, 1);
    assert_eq!(response.state, ItemState::Succeeded);
    assert!(response.outcome.is_some());

    // Single execution runs with empty learnings and the baseline target.
    let requests = harness.script.requests.lock();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].learnings.is_empty());
    assert_eq!(requests[0].target_score, 18);

    // The other item is untouched.
    let plan = harness.store.get_plan(&created.plan_id).unwrap();
    assert_eq!(plan.items[0].state, ItemState::Pending);
}

#[tokio::test]
async fn execute_item_out_of_range_is_not_found() {
    let harness = HarnessBuilder::new().build();

    let created = harness
        .service
        .create_batch(batch_request(&[("linkedin", "a")]))
        .unwrap();
    let err = harness
        .service
        .execute_item(&created.plan_id, 5)
        .await
        .unwrap_err();
    assert!(!err.success);
    assert_eq!(err.kind, "not_found");
}

#[tokio::test]
async fn status_is_idempotent_after_completion() {
    let harness = HarnessBuilder::new().scores(vec![20.0, 24.0]).build();

    let created = harness
        .service
        .create_batch(batch_request(&[("linkedin", "a"), ("twitter", "b")]))
        .unwrap();
    harness.service.run_batch(&created.plan_id).await.unwrap();

    let first = harness.service.get_batch_status(&created.plan_id).unwrap();
    let second = harness.service.get_batch_status(&created.plan_id).unwrap();
    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
    assert_eq!(first.succeeded, 2);
    assert!((first.avg_score - 22.0).abs() < 1e-9);
}

#[tokio::test]
async fn run_report_serializes_flat() {
    let harness = HarnessBuilder::new().scores(vec![20.0]).build();

    let created = harness
        .service
        .create_batch(batch_request(&[("linkedin", "a")]))
        .unwrap();
    let response = harness.service.run_batch(&created.plan_id).await.unwrap();

    let encoded = serde_json::to_value(&response).unwrap();
    assert_eq!(encoded["success"], serde_json::json!(true));
    assert_eq!(encoded["plan_id"], serde_json::json!(created.plan_id));
    assert_eq!(encoded["succeeded"], serde_json::json!(1));
}
