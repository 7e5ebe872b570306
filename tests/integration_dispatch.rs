use lawcast_server::domain::delivery::ErrorCategory;

mod common;

#[tokio::test]
async fn one_notice_reaches_every_active_endpoint() {
    let harness = common::TestHarness::new().await;
    let urls = harness.register_endpoints(3).await;

    let outcomes = harness.dispatch.dispatch_notices(&common::notices(&[101])).await.expect("dispatch");
    assert_eq!(outcomes.len(), 1);
    let summary = outcomes[0].result.as_ref().expect("job ok");
    assert_eq!(summary.notice_num, 101);
    assert_eq!(summary.total_endpoints, 3);
    assert_eq!(summary.success_count, 3);
    assert_eq!(summary.failed_count, 0);
    for url in &urls {
        assert_eq!(harness.sender.call_count(url), 1);
    }
}

#[tokio::test]
async fn permanent_failure_deactivates_endpoint_immediately() {
    let harness = common::TestHarness::new().await;
    let urls = harness.register_endpoints(2).await;
    harness.sender.failures.insert(urls[0].clone(), ErrorCategory::NotFound);

    let outcomes = harness.dispatch.dispatch_notices(&common::notices(&[101])).await.expect("dispatch");
    let summary = outcomes[0].result.as_ref().expect("job ok");
    assert_eq!(summary.success_count, 1);
    assert_eq!(summary.failed_count, 1);
    assert_eq!(summary.deactivated, 1);
    assert_eq!(summary.temporary_failures, 0);

    // No retry for a permanent failure.
    assert_eq!(harness.sender.call_count(&urls[0]), 1);

    let mut conn = harness.pool.acquire().await.expect("acquire");
    let active = harness.repo.find_active(&mut conn).await.expect("find_active");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].url, urls[1]);
}

#[tokio::test]
async fn deactivated_endpoint_is_not_targeted_later_in_the_tick() {
    let harness = common::TestHarness::new().await;
    let urls = harness.register_endpoints(2).await;
    harness.sender.failures.insert(urls[0].clone(), ErrorCategory::NotFound);

    // Two notices dispatched back to back, as within one crawl tick.
    harness.dispatch.dispatch_notices(&common::notices(&[101])).await.expect("first dispatch");
    let outcomes = harness.dispatch.dispatch_notices(&common::notices(&[102])).await.expect("second dispatch");

    let summary = outcomes[0].result.as_ref().expect("job ok");
    assert_eq!(summary.total_endpoints, 1, "dead endpoint must not be fetched again");
    assert_eq!(harness.sender.call_count(&urls[0]), 1, "dead endpoint must not be re-tried");
    assert_eq!(harness.sender.call_count(&urls[1]), 2);
}

#[tokio::test]
async fn rate_limited_endpoint_is_retried_and_stays_active() {
    let harness = common::TestHarness::new().await;
    let urls = harness.register_endpoints(1).await;
    harness.sender.failures.insert(urls[0].clone(), ErrorCategory::RateLimited);

    let outcomes = harness.dispatch.dispatch_notices(&common::notices(&[101])).await.expect("dispatch");
    let summary = outcomes[0].result.as_ref().expect("job ok");
    assert_eq!(summary.success_count, 0);
    assert_eq!(summary.failed_count, 1);
    assert_eq!(summary.deactivated, 0);
    assert_eq!(summary.temporary_failures, 1);

    // Initial attempt plus three retries.
    assert_eq!(harness.sender.call_count(&urls[0]), 4);

    let mut conn = harness.pool.acquire().await.expect("acquire");
    assert_eq!(harness.repo.find_active(&mut conn).await.expect("find_active").len(), 1);
}

#[tokio::test]
async fn transient_failure_recovers_mid_delivery() {
    let harness = common::TestHarness::new().await;
    let urls = harness.register_endpoints(1).await;
    harness.sender.transient_failures.insert(urls[0].clone(), 2);

    let outcomes = harness.dispatch.dispatch_notices(&common::notices(&[101])).await.expect("dispatch");
    let summary = outcomes[0].result.as_ref().expect("job ok");
    assert_eq!(summary.success_count, 1);
    assert_eq!(harness.sender.call_count(&urls[0]), 3);
}

#[tokio::test]
async fn no_active_endpoints_is_a_clean_noop() {
    let harness = common::TestHarness::new().await;

    let outcomes = harness.dispatch.dispatch_notices(&common::notices(&[101])).await.expect("dispatch");
    let summary = outcomes[0].result.as_ref().expect("job ok");
    assert_eq!(summary.total_endpoints, 0);
    assert_eq!(summary.success_count, 0);
    assert_eq!(summary.failed_count, 0);
    assert_eq!(harness.sender.total_calls(), 0);
}

#[tokio::test]
async fn successful_sends_stamp_rate_limit_state() {
    let harness = common::TestHarness::new().await;
    harness.register_endpoints(1).await;

    harness.dispatch.dispatch_notices(&common::notices(&[101])).await.expect("dispatch");

    let global = harness.store.get("rate_limit:global").await.expect("get").expect("stamped");
    let stamp: i64 = std::str::from_utf8(&global).expect("utf8").parse().expect("number");
    assert!(stamp > 0);
    assert!(harness.store.get("rate_limit:webhook:1").await.expect("get").is_some());
}
