//! Integration tests for function registration, listing and call routing.

mod common;

use common::fixtures::{incr_call, number, StatusBuilder};
use common::{wait_for_result, TestScheduler};
use stratus_proto::{Argument, FunctionCall, KeySet, Location};
use stratus_scheduler::SchedulerError;

#[tokio::test]
async fn call_reaches_sole_server_and_result_lands_in_store() {
    let mut t = TestScheduler::new();
    t.scheduler
        .create_function("incr", b"fn incr".to_vec())
        .await
        .unwrap();
    t.scheduler
        .on_status(&StatusBuilder::new("10.0.0.1").with_functions(vec!["incr"]).build());

    let response_id = t.scheduler.call_function(incr_call(2)).await.unwrap();

    let invocations = t.cluster.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].0, Location::new("10.0.0.1", 0));
    assert_eq!(invocations[0].1.response_id, response_id);
    assert_eq!(wait_for_result(&t.store, &response_id).await, "3");
}

#[tokio::test]
async fn call_prefers_executor_caching_referenced_keys() {
    let mut t = TestScheduler::new();
    t.management.set_executors(&["10.0.0.1", "10.0.0.2"]);
    t.store
        .put_executor_key_set("10.0.0.2", &KeySet::new(vec!["hot".into()]))
        .await
        .unwrap();
    for ip in ["10.0.0.1", "10.0.0.2"] {
        t.scheduler
            .on_status(&StatusBuilder::new(ip).with_functions(vec!["incr"]).build());
    }
    t.scheduler.refresh().await.unwrap();

    for _ in 0..3 {
        let call = FunctionCall::new("incr", vec![Argument::Reference("hot".into()), number(1)]);
        // the fake cluster cannot resolve references, so only routing matters
        let _ = t.scheduler.call_function(call).await;
    }

    assert!(t
        .cluster
        .invocations()
        .iter()
        .all(|(location, _)| location.ip == "10.0.0.2"));
}

#[tokio::test]
async fn calls_without_locality_spread_across_executors() {
    let mut t = TestScheduler::new();
    for tid in 0..3 {
        t.scheduler.on_status(
            &StatusBuilder::new("10.0.0.1")
                .thread(tid)
                .with_functions(vec!["incr"])
                .build(),
        );
    }

    for n in 0..3 {
        t.scheduler.call_function(incr_call(n)).await.unwrap();
    }

    let mut tids: Vec<u32> = t.cluster.invocations().iter().map(|(l, _)| l.tid).collect();
    tids.sort_unstable();
    assert_eq!(tids, vec![0, 1, 2]);
}

#[tokio::test]
async fn call_after_function_dropped_has_no_executor() {
    let mut t = TestScheduler::new();
    let builder = || StatusBuilder::new("10.0.0.1");
    t.scheduler.on_status(&builder().with_functions(vec!["incr"]).build());
    t.scheduler.on_status(&builder().build());

    let err = t.scheduler.call_function(incr_call(1)).await.unwrap_err();
    assert!(matches!(err, SchedulerError::NoExecutorAvailable(f) if f == "incr"));
    assert!(t.cluster.invocations().is_empty());
}

#[tokio::test]
async fn list_filters_by_prefix_in_order() {
    let mut t = TestScheduler::new();
    for name in ["square", "incr", "inverse"] {
        t.scheduler.create_function(name, vec![]).await.unwrap();
    }

    assert_eq!(
        t.scheduler.list(None).await.unwrap(),
        vec!["incr", "inverse", "square"]
    );
    assert_eq!(t.scheduler.list(Some("in")).await.unwrap(), vec!["incr", "inverse"]);
    assert!(t.scheduler.list(Some("zzz")).await.unwrap().is_empty());
}

#[tokio::test]
async fn departed_executor_is_pruned_on_refresh() {
    let mut t = TestScheduler::new();
    t.management.set_executors(&["10.0.0.1"]);
    t.scheduler
        .on_status(&StatusBuilder::new("10.0.0.1").with_functions(vec!["incr"]).build());
    t.scheduler.refresh().await.unwrap();

    t.management.set_executors(&[]);
    t.scheduler.refresh().await.unwrap();

    assert!(t.scheduler.executors().locations("incr").unwrap().is_empty());
    let err = t.scheduler.call_function(incr_call(1)).await.unwrap_err();
    assert!(matches!(err, SchedulerError::NoExecutorAvailable(_)));
}

#[tokio::test]
async fn unreachable_management_keeps_stale_view() {
    let mut t = TestScheduler::new();
    t.management.set_executors(&["10.0.0.1"]);
    t.scheduler
        .on_status(&StatusBuilder::new("10.0.0.1").with_functions(vec!["incr"]).build());

    t.management.set_unreachable(true);
    let err = t.scheduler.refresh().await.unwrap_err();
    assert!(matches!(err, SchedulerError::UpstreamUnavailable(_)));

    t.scheduler.call_function(incr_call(1)).await.unwrap();
    assert_eq!(t.cluster.invocations().len(), 1);
}
