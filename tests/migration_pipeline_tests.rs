//! Pipeline behaviour from `start` up to the approval gate.

mod fixtures;

use billing_bridge::run::RunPhase;
use billing_bridge::{EntityType, LogLevel, MigrationError, RunStatus};
use fixtures::{
    orchestrator, plan_records, plans_destination, records, GatedSource, RecordingDestination,
    ScriptedCohortService,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn cohort_of(snapshot: &billing_bridge::LedgerSnapshot, id: &str) -> Option<String> {
    snapshot
        .results
        .as_ref()?
        .iter()
        .find(|item| item.id() == id)?
        .transformed
        .get("cohort")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[tokio::test]
async fn test_every_fetched_record_produces_one_result() {
    for entity in EntityType::ALL {
        for count in [0usize, 1, 7] {
            let items: Vec<Value> = (0..count).map(|i| json!({"id": format!("r{i}")})).collect();
            let source = Arc::new(GatedSource::new(entity, records(Value::Array(items))));
            let orchestrator = orchestrator(
                source,
                Arc::new(ScriptedCohortService::new("standard")),
                Arc::new(RecordingDestination::new()),
            );

            let summary = orchestrator.start(entity, entity.default_schema()).await.unwrap();

            let snapshot = orchestrator.snapshot().await;
            assert_eq!(summary.fetched, count, "{entity} x{count}");
            assert_eq!(snapshot.result_count(), count, "{entity} x{count}");
            assert_eq!(snapshot.status, RunStatus::Running);
        }
    }
}

#[tokio::test]
async fn test_classification_failures_only_affect_their_records() {
    let cohorts = Arc::new(ScriptedCohortService::new("enterprise").failing_for(&["p1", "p4"]));
    let orchestrator = orchestrator(
        Arc::new(GatedSource::new(EntityType::Plans, plan_records(6))),
        cohorts.clone(),
        Arc::new(RecordingDestination::new()),
    );

    let summary = orchestrator
        .start(EntityType::Plans, EntityType::Plans.default_schema())
        .await
        .unwrap();

    assert_eq!(summary.unclassified, 2);
    assert_eq!(cohorts.call_count(), 6);
    let snapshot = orchestrator.snapshot().await;
    assert_eq!(snapshot.status, RunStatus::Running);
    for i in 0..6 {
        let id = format!("p{i}");
        let expected = if i == 1 || i == 4 { "unclassified" } else { "enterprise" };
        assert_eq!(cohort_of(&snapshot, &id).as_deref(), Some(expected), "record {id}");
    }
}

#[tokio::test]
async fn test_plans_end_to_end_with_one_classifier_failure() {
    let source = GatedSource::new(
        EntityType::Plans,
        records(json!([
            {"id": "p1", "billingFrequency": "monthly"},
            {"id": "p2", "billingFrequency": "annual"}
        ])),
    );
    let orchestrator = orchestrator(
        Arc::new(source),
        Arc::new(ScriptedCohortService::new("standard").failing_for(&["p2"])),
        Arc::new(RecordingDestination::new()),
    );

    orchestrator
        .start(EntityType::Plans, EntityType::Plans.default_schema())
        .await
        .unwrap();

    let snapshot = orchestrator.snapshot().await;
    let results = snapshot.results.clone().unwrap();
    let ids: Vec<&str> = results.iter().map(|item| item.id()).collect();
    assert_eq!(ids, vec!["p1", "p2"]);
    assert_eq!(cohort_of(&snapshot, "p1").as_deref(), Some("standard"));
    assert_eq!(cohort_of(&snapshot, "p2").as_deref(), Some("unclassified"));
    assert_eq!(results[0].transformed.get("billingFrequency"), Some(&json!("monthly")));

    let errors: Vec<&str> = snapshot
        .logs
        .iter()
        .filter(|entry| entry.level == LogLevel::Error)
        .map(|entry| entry.message.as_str())
        .collect();
    assert_eq!(errors.len(), 1, "unexpected error logs: {errors:?}");
    assert!(errors[0].contains("p2"));
}

#[tokio::test]
async fn test_numeric_fields_parse_or_fall_back_to_zero() {
    let source = GatedSource::new(
        EntityType::Transactions,
        records(json!([
            {"id": "t1", "amount": "12.50", "type": "sale", "createdAt": "2024-01-05"},
            {"id": "t2", "amount": "abc", "type": "refund"}
        ])),
    );
    let orchestrator = orchestrator(
        Arc::new(source),
        Arc::new(ScriptedCohortService::new("retail")),
        Arc::new(RecordingDestination::new()),
    );

    orchestrator
        .start(EntityType::Transactions, EntityType::Transactions.default_schema())
        .await
        .unwrap();

    let snapshot = orchestrator.snapshot().await;
    let results = snapshot.results.unwrap();
    let amounts: Vec<f64> = results
        .iter()
        .map(|item| item.transformed.get("amount").and_then(Value::as_f64).unwrap())
        .collect();
    assert_eq!(amounts, vec![12.5, 0.0]);
    assert!(amounts.iter().all(|amount| !amount.is_nan()));
    assert_eq!(results[0].transformed.get("date"), Some(&json!("2024-01-05")));
    assert_eq!(snapshot.status, RunStatus::Running);
    assert!(snapshot
        .logs
        .iter()
        .any(|entry| entry.level == LogLevel::Error && entry.message.contains("t2.amount")));
}

#[tokio::test]
async fn test_start_while_running_is_rejected_without_touching_the_ledger() {
    let source = Arc::new(GatedSource::new(EntityType::Plans, plan_records(2)).gated());
    let orchestrator = Arc::new(orchestrator(
        source.clone(),
        Arc::new(ScriptedCohortService::new("standard")),
        Arc::new(RecordingDestination::new()),
    ));

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .start(EntityType::Plans, EntityType::Plans.default_schema())
                .await
        })
    };
    while source.fetch_count() == 0 {
        tokio::task::yield_now().await;
    }

    let before = orchestrator.snapshot().await;
    let second = orchestrator
        .start(EntityType::Customers, EntityType::Customers.default_schema())
        .await;
    assert!(matches!(second, Err(MigrationError::AlreadyRunning)));
    assert_eq!(orchestrator.snapshot().await, before);
    assert_eq!(before.entity_type, Some(EntityType::Plans));

    source.release();
    let summary = first.await.unwrap().unwrap();
    assert_eq!(summary.results, 2);
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn test_fetch_failure_ends_the_run_and_allows_a_fresh_start() {
    let orchestrator = orchestrator(
        Arc::new(GatedSource::failing("ledger offline")),
        Arc::new(ScriptedCohortService::new("standard")),
        Arc::new(RecordingDestination::new()),
    );

    let error = orchestrator
        .start(EntityType::Plans, EntityType::Plans.default_schema())
        .await
        .unwrap_err();
    assert!(matches!(error, MigrationError::Fetch(_)));

    let failed = orchestrator.snapshot().await;
    assert_eq!(failed.status, RunStatus::Error);
    assert_eq!(failed.progress, 10);
    assert!(failed
        .logs
        .iter()
        .any(|entry| entry.level == LogLevel::Error && entry.message.contains("ledger offline")));

    let retry = orchestrator
        .start(EntityType::Plans, EntityType::Plans.default_schema())
        .await;
    assert!(matches!(retry, Err(MigrationError::Fetch(_))));
    let retried = orchestrator.snapshot().await;
    assert_ne!(retried.run_id, failed.run_id);
    assert_eq!(retried.logs.len(), failed.logs.len(), "logs start over for each run");
}

#[tokio::test]
async fn test_duplicate_ids_are_collapsed_with_a_warning() {
    let source = GatedSource::new(
        EntityType::Plans,
        records(json!([
            {"id": "p1", "name": "Old"},
            {"id": "p2", "name": "Other"},
            {"id": "p1", "name": "New"}
        ])),
    );
    let orchestrator = orchestrator(
        Arc::new(source),
        Arc::new(ScriptedCohortService::new("standard")),
        Arc::new(RecordingDestination::new()),
    );

    let summary = orchestrator
        .start(EntityType::Plans, EntityType::Plans.default_schema())
        .await
        .unwrap();

    assert_eq!(summary.duplicates, vec!["p1"]);
    let snapshot = orchestrator.snapshot().await;
    let results = snapshot.results.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].transformed.get("name"), Some(&json!("New")));
    assert!(snapshot
        .logs
        .iter()
        .any(|entry| entry.level == LogLevel::Warn && entry.message.contains("p1")));
}

#[tokio::test]
async fn test_panicking_source_ends_the_run_and_allows_a_fresh_start() {
    let source = Arc::new(GatedSource::new(EntityType::Plans, plan_records(2)).panicking());
    let orchestrator = orchestrator(
        source.clone(),
        Arc::new(ScriptedCohortService::new("standard")),
        Arc::new(RecordingDestination::new()),
    );

    let error = orchestrator
        .start(EntityType::Plans, EntityType::Plans.default_schema())
        .await
        .unwrap_err();
    assert!(matches!(error, MigrationError::Interrupted { .. }));
    assert!(error.is_run_fatal());

    let failed = orchestrator.snapshot().await;
    assert_eq!(failed.status, RunStatus::Error);
    assert!(failed.results.is_none());
    assert!(failed
        .logs
        .iter()
        .any(|entry| entry.level == LogLevel::Error && entry.message.contains("pipeline panicked")));

    let retry = orchestrator
        .start(EntityType::Plans, EntityType::Plans.default_schema())
        .await;
    assert!(matches!(retry, Err(MigrationError::Interrupted { .. })));
    assert_eq!(source.fetch_count(), 2);
}

#[tokio::test]
async fn test_dropped_start_caller_still_reaches_the_approval_gate() {
    let source = Arc::new(GatedSource::new(EntityType::Plans, plan_records(3)).gated());
    let orchestrator = Arc::new(orchestrator(
        source.clone(),
        Arc::new(ScriptedCohortService::new("standard")),
        Arc::new(RecordingDestination::new()),
    ));

    let caller = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .start(EntityType::Plans, EntityType::Plans.default_schema())
                .await
        })
    };
    while source.fetch_count() == 0 {
        tokio::task::yield_now().await;
    }
    caller.abort();
    assert!(caller.await.unwrap_err().is_cancelled());

    source.release();
    let ready = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = orchestrator.snapshot().await;
            if snapshot.phase == RunPhase::AwaitingApproval {
                return snapshot;
            }
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("detached pipeline never reached the approval gate");
    assert_eq!(ready.status, RunStatus::Running);
    assert_eq!(ready.progress, 70);
    assert_eq!(ready.result_count(), 3);

    orchestrator.set_approval(["p0", "p2"], true).await;
    let report = orchestrator.complete(plans_destination()).await.unwrap();
    assert_eq!(report.written, vec!["p0", "p2"]);
    assert_eq!(orchestrator.snapshot().await.status, RunStatus::Complete);

    source.release();
    orchestrator
        .start(EntityType::Plans, EntityType::Plans.default_schema())
        .await
        .unwrap();
}
