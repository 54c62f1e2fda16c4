use std::collections::BTreeMap;
use std::sync::Arc;

use insta::assert_snapshot;
use openboycott_core::{
    aggregate, bundle_from_json, CompanyPipeline, CompanyRecord, IssueId, ManualClock,
};
use serde_json::json;

const FIXED_TIMESTAMP: i64 = 1_700_000_000;

async fn offline_batch(companies: &[&str]) -> BTreeMap<String, CompanyRecord> {
    let pipeline = CompanyPipeline::offline(Arc::new(ManualClock::at_timestamp(FIXED_TIMESTAMP)));
    let companies: Vec<String> = companies.iter().map(|name| name.to_string()).collect();
    pipeline.analyze(&companies, &mut |_, _| {}, &|_| false).await
}

#[tokio::test(flavor = "current_thread")]
async fn offline_batch_snapshot() {
    let batch = offline_batch(&["Google", "Acme"]).await;
    let rendered = serde_json::to_string_pretty(&batch).expect("batch serializes");
    assert_snapshot!("fixture_batch", rendered);
}

#[tokio::test(flavor = "current_thread")]
async fn offline_runs_are_identical() {
    let first = offline_batch(&["Apple", "Meta"]).await;
    let second = offline_batch(&["Apple", "Meta"]).await;
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
    assert_eq!(first.keys().collect::<Vec<_>>(), vec!["apple", "meta"]);
}

#[tokio::test(flavor = "current_thread")]
async fn blank_company_names_keep_financial_fixture() {
    let batch = offline_batch(&["   "]).await;
    // Only the financial fixture is name-independent.
    assert_eq!(batch.len(), 1);
    let record = &batch[""];
    assert_eq!(
        record.metrics.keys().copied().collect::<Vec<_>>(),
        vec![IssueId::Pay, IssueId::Environment]
    );
}

#[test]
fn loosely_typed_bundles_feed_the_aggregator() {
    let search = bundle_from_json(&json!({
        "ENV": [[1, 80]],
        "PAY": {"weight": 2, "score": 150},
        "CHARITY": "lots",
    }));
    let grounded = bundle_from_json(&json!({"env": {"significance": 1, "score": 60}}));

    let metrics = aggregate([&search, &grounded]);

    assert_eq!(metrics.len(), 1);
    let env = metrics[&IssueId::Environment];
    assert_eq!((env.confidence, env.score), (2.0, 70.0));
}
