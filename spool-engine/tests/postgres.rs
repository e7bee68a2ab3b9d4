//! PostgreSQL store and lease lock against a live database
//!
//! Run with `DATABASE_URL=postgres://... cargo test -- --ignored`

use std::collections::HashSet;
use std::time::Duration;

use spool_engine::{
    AcquireRetry, JobStatus, JobStore, JobType, LockCoordinator, LockError, LockGuard,
    NewPrintJob, PgJobStore, PgLeaseLock,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

async fn pool() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL unset, skipping");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .unwrap();
    Some(pool)
}

fn single_retry() -> AcquireRetry {
    AcquireRetry {
        retry_count: 1,
        retry_delay: Duration::from_millis(10),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "needs DATABASE_URL"]
async fn test_concurrent_claims_never_share_a_job() {
    let Some(pool) = pool().await else { return };
    let store = PgJobStore::new(pool);
    store.ensure_schema().await.unwrap();

    let reference = format!("claim-{}", uuid::Uuid::new_v4());
    let mut inserted = HashSet::new();
    for _ in 0..20 {
        let job = store
            .insert(NewPrintJob::new(JobType::ChefOrder, "10.9.9.9", 9100, &reference))
            .await
            .unwrap();
        inserted.insert(job.id);
    }

    let claimers: Vec<_> = (0..6)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                let mut claimed = Vec::new();
                while let Some(job) = store.claim_next_pending().await.unwrap() {
                    assert_eq!(job.status, JobStatus::Printing);
                    claimed.push(job.id);
                }
                claimed
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for claimer in claimers {
        for id in claimer.await.unwrap() {
            assert!(seen.insert(id), "job {id} claimed twice");
        }
    }
    assert!(inserted.is_subset(&seen));

    for id in &inserted {
        let job = store.get(*id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Printing);
        assert!(store.mark_failed(*id, "test cleanup").await.unwrap());
    }
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_lease_is_exclusive_until_released() {
    let Some(pool) = pool().await else { return };
    let locks = PgLeaseLock::new(pool, single_retry());
    locks.ensure_schema().await.unwrap();

    let resources = vec![format!("printer:{}", uuid::Uuid::new_v4())];
    let held = locks
        .acquire(&resources, Duration::from_secs(60))
        .await
        .unwrap();

    let contended = locks.acquire(&resources, Duration::from_secs(60)).await;
    assert!(matches!(contended, Err(LockError::Timeout { attempts: 2, .. })));

    held.release().await.unwrap();
    let next = locks
        .acquire(&resources, Duration::from_secs(60))
        .await
        .unwrap();
    next.release().await.unwrap();
}

#[tokio::test]
#[ignore = "needs DATABASE_URL"]
async fn test_expired_lease_is_taken_over() {
    let Some(pool) = pool().await else { return };
    let locks = PgLeaseLock::new(pool, single_retry());
    locks.ensure_schema().await.unwrap();

    let resources = vec![format!("printer:{}", uuid::Uuid::new_v4())];
    let stale = locks
        .acquire(&resources, Duration::from_millis(50))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let current = locks
        .acquire(&resources, Duration::from_secs(60))
        .await
        .unwrap();

    // The stale holder's release only deletes its own token
    stale.release().await.unwrap();
    let contended = locks.acquire(&resources, Duration::from_secs(60)).await;
    assert!(matches!(contended, Err(LockError::Timeout { .. })));

    current.release().await.unwrap();
}
