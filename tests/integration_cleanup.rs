use chrono::{Duration, Utc};
use lawcast_server::adapters::database::DbPool;
use lawcast_server::adapters::database::endpoint_repo::EndpointRepository;
use lawcast_server::workers::EndpointCleanupWorker;

mod common;

async fn seed(pool: &DbPool, repo: &EndpointRepository, active: u64, inactive: u64, inactive_age_days: i64) {
    let mut conn = pool.acquire().await.expect("acquire");
    let mut next = 0;
    for _ in 0..active {
        repo.create_or_reactivate(&mut conn, &common::webhook_url(next)).await.expect("create");
        next += 1;
    }
    let mut inactive_ids = Vec::new();
    for _ in 0..inactive {
        let row = repo.create_or_reactivate(&mut conn, &common::webhook_url(next)).await.expect("create");
        repo.deactivate(&mut conn, row.id).await.expect("deactivate");
        inactive_ids.push(row.id);
        next += 1;
    }
    for id in inactive_ids {
        sqlx::query("UPDATE webhooks SET updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now() - Duration::days(inactive_age_days) - Duration::seconds(5))
            .bind(id)
            .execute(&mut *conn)
            .await
            .expect("backdate");
    }
}

fn worker(pool: &DbPool) -> EndpointCleanupWorker {
    EndpointCleanupWorker::new(pool.clone(), EndpointRepository::new(), "Asia/Seoul").expect("worker")
}

#[tokio::test]
async fn unknown_timezone_is_rejected() {
    let pool = common::memory_pool().await;
    assert!(EndpointCleanupWorker::new(pool, EndpointRepository::new(), "Mars/Olympus").is_err());
}

#[tokio::test]
async fn daily_pass_keeps_young_inactive_rows_when_healthy() {
    let pool = common::memory_pool().await;
    let repo = EndpointRepository::new();
    // 9 active + 1 young inactive: efficiency 90%, nothing to purge.
    seed(&pool, &repo, 9, 1, 0).await;

    let deleted = worker(&pool).run_daily().await.expect("daily");
    assert_eq!(deleted, 0);
    let mut conn = pool.acquire().await.expect("acquire");
    assert_eq!(repo.stats(&mut conn).await.expect("stats").total, 10);
}

#[tokio::test]
async fn daily_pass_always_purges_very_old_rows() {
    let pool = common::memory_pool().await;
    let repo = EndpointRepository::new();
    seed(&pool, &repo, 9, 1, 20).await;

    let deleted = worker(&pool).run_daily().await.expect("daily");
    assert_eq!(deleted, 1);
}

#[tokio::test]
async fn daily_pass_purges_everything_inactive_under_critical_efficiency() {
    let pool = common::memory_pool().await;
    let repo = EndpointRepository::new();
    // 1 active + 3 fresh inactive: efficiency 25%, the age-0 rule applies.
    seed(&pool, &repo, 1, 3, 0).await;

    let deleted = worker(&pool).run_daily().await.expect("daily");
    assert_eq!(deleted, 3);
    let mut conn = pool.acquire().await.expect("acquire");
    let stats = repo.stats(&mut conn).await.expect("stats");
    assert_eq!(stats.total, 1);
    assert_eq!(stats.inactive, 0);
}

#[tokio::test]
async fn optimization_pass_purges_below_eighty_percent() {
    let pool = common::memory_pool().await;
    let repo = EndpointRepository::new();
    // 3 active + 1 inactive: 75% < 80%.
    seed(&pool, &repo, 3, 1, 0).await;

    let deleted = worker(&pool).run_optimization().await.expect("optimize");
    assert_eq!(deleted, 1);
}

#[tokio::test]
async fn optimization_pass_leaves_a_healthy_table_alone() {
    let pool = common::memory_pool().await;
    let repo = EndpointRepository::new();
    // 9 active + 1 inactive: 90% ≥ 80%.
    seed(&pool, &repo, 9, 1, 0).await;

    let deleted = worker(&pool).run_optimization().await.expect("optimize");
    assert_eq!(deleted, 0);
}

#[tokio::test]
async fn monitor_purges_accumulated_old_inactive_rows() {
    let pool = common::memory_pool().await;
    let repo = EndpointRepository::new();
    // 60 active + 51 inactive aged 45 days: old-inactive alarm fires, the
    // emergency branch does not (efficiency ≈ 54%, total ≈ 111).
    seed(&pool, &repo, 60, 51, 45).await;

    let deleted = worker(&pool).run_monitor().await.expect("monitor");
    assert_eq!(deleted, 51);
}

#[tokio::test]
async fn monitor_emergency_purge_under_collapsed_efficiency() {
    let pool = common::memory_pool().await;
    let repo = EndpointRepository::new();
    // 10 active + 101 fresh inactive: efficiency ≈ 9%, total 111 > 100.
    seed(&pool, &repo, 10, 101, 0).await;

    let deleted = worker(&pool).run_monitor().await.expect("monitor");
    assert_eq!(deleted, 101);
}

#[tokio::test]
async fn monitor_stays_quiet_on_a_small_healthy_table() {
    let pool = common::memory_pool().await;
    let repo = EndpointRepository::new();
    seed(&pool, &repo, 5, 2, 0).await;

    let deleted = worker(&pool).run_monitor().await.expect("monitor");
    assert_eq!(deleted, 0);
}
