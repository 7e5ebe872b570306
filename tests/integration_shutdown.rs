use lawcast_server::error::AppError;
use std::sync::atomic::Ordering;
use std::time::Duration;

mod common;

#[tokio::test]
async fn shutdown_drains_in_flight_batches_and_refuses_new_work() {
    // Generous per-job timeout: the two notices serialize on the 1 s
    // per-endpoint window and must not be retried mid-drain.
    let options = lawcast_server::services::batch::BatchOptions {
        timeout: Duration::from_secs(15),
        ..common::fast_options()
    };
    let harness = common::TestHarness::with_options(options).await;
    let urls = harness.register_endpoints(2).await;
    harness.sender.delay_ms.store(100, Ordering::SeqCst);

    let job_id = harness
        .executor
        .submit_notification_batch(&harness.dispatch, common::notices(&[101, 102]))
        .expect("submit");
    assert!(harness.executor.status().job_count >= 1);

    harness.executor.begin_shutdown();
    let err = harness
        .executor
        .submit_notification_batch(&harness.dispatch, common::notices(&[103]))
        .expect_err("gated");
    assert!(matches!(err, AppError::ShuttingDown));

    // The in-flight batch still completes inside the drain ceiling.
    harness.executor.shutdown(Duration::from_secs(10)).await;
    assert_eq!(harness.executor.status().job_count, 0);
    for url in &urls {
        assert_eq!(harness.sender.call_count(url), 2, "both notices reached {url}");
    }
    let _ = job_id;
}

#[tokio::test]
async fn drain_ceiling_force_clears_the_job_table() {
    let harness = common::TestHarness::new().await;
    harness.register_endpoints(1).await;
    harness.sender.delay_ms.store(500, Ordering::SeqCst);

    harness
        .executor
        .submit_notification_batch(&harness.dispatch, common::notices(&[101]))
        .expect("submit");

    harness.executor.shutdown(Duration::from_millis(50)).await;
    assert_eq!(harness.executor.status().job_count, 0, "table force-cleared");
    assert!(harness.executor.status().shutting_down);
}

#[tokio::test]
async fn await_job_returns_the_batch_report() {
    let harness = common::TestHarness::new().await;
    harness.register_endpoints(2).await;

    let job_id = harness
        .executor
        .submit_notification_batch(&harness.dispatch, common::notices(&[101]))
        .expect("submit");

    if let Some(report) = harness.executor.await_job(&job_id).await {
        assert_eq!(report.total_notices, 1);
        assert_eq!(report.notices_dispatched, 1);
        assert_eq!(report.success_count, 2);
        assert_eq!(report.failed_count, 0);
    }
    // Either way the job is gone from the table.
    assert_eq!(harness.executor.status().job_count, 0);
}

#[tokio::test]
async fn job_ids_carry_the_notification_batch_prefix() {
    let harness = common::TestHarness::new().await;
    let job_id = harness
        .executor
        .submit_notification_batch(&harness.dispatch, Vec::new())
        .expect("submit");
    assert!(job_id.starts_with("notification_batch_"), "unexpected job id {job_id}");
    harness.executor.await_job(&job_id).await;
}
