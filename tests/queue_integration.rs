use chrono::Utc;
use serde_json::json;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use satchel::{
    entities::{Job, JobStatus},
    jobs::JobQueue,
};

async fn fetch_job(pool: &Pool<Postgres>, id: Uuid) -> Job {
    sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("Failed to fetch job row")
}

#[sqlx::test]
async fn test_enqueue_and_claim(pool: Pool<Postgres>) {
    let queue = JobQueue::new(pool.clone());
    let job_id = queue
        .enqueue("test_job", json!({"test": "data"}), None, None)
        .await
        .expect("Failed to enqueue job");

    let job = fetch_job(&pool, job_id).await;
    assert_eq!(job.kind, "test_job");
    assert_eq!(job.payload, json!({"test": "data"}));
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.attempts, 0);

    let worker_id = Uuid::new_v4();
    let jobs = queue
        .claim_due(10, worker_id, 300)
        .await
        .expect("Failed to claim due jobs");

    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, job_id);
    assert_eq!(jobs[0].status, JobStatus::Running);
    assert_eq!(jobs[0].reserved_by, Some(worker_id));
    assert!(jobs[0].visibility_till.is_some());
}

#[sqlx::test]
async fn test_claim_respects_run_at(pool: Pool<Postgres>) {
    let queue = JobQueue::new(pool);
    let future = Utc::now() + chrono::Duration::minutes(30);
    queue
        .enqueue("test_job", json!({}), Some(future), None)
        .await
        .expect("Failed to enqueue job");

    let jobs = queue
        .claim_due(10, Uuid::new_v4(), 300)
        .await
        .expect("Failed to claim due jobs");

    assert!(jobs.is_empty());
}

#[sqlx::test]
async fn test_complete_clears_reservation(pool: Pool<Postgres>) {
    let queue = JobQueue::new(pool.clone());
    let job_id = queue
        .enqueue("test_job", json!({"test": "data"}), None, None)
        .await
        .expect("Failed to enqueue job");

    queue
        .claim_due(1, Uuid::new_v4(), 300)
        .await
        .expect("Failed to claim job");
    queue
        .complete(job_id)
        .await
        .expect("Failed to mark job as completed");

    let job = fetch_job(&pool, job_id).await;
    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(job.reserved_by.is_none());
    assert!(job.visibility_till.is_none());
}

#[sqlx::test]
async fn test_failure_with_retry_requeues(pool: Pool<Postgres>) {
    let queue = JobQueue::new(pool.clone());
    let job_id = queue
        .enqueue("test_job", json!({"test": "data"}), None, Some(3))
        .await
        .expect("Failed to enqueue job");

    let next_run_at = Utc::now() + chrono::Duration::minutes(5);
    queue
        .fail(job_id, "Test error", Some(next_run_at), 60)
        .await
        .expect("Failed to record failure");

    let job = fetch_job(&pool, job_id).await;
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.last_error, Some("Test error".to_string()));
    assert_eq!(job.backoff_seconds, 60);
    // run_at moved to the retry time, so the job is no longer claimable now
    let jobs = queue
        .claim_due(10, Uuid::new_v4(), 300)
        .await
        .expect("Failed to claim due jobs");
    assert!(jobs.is_empty());
}

#[sqlx::test]
async fn test_failure_without_retry_is_permanent(pool: Pool<Postgres>) {
    let queue = JobQueue::new(pool.clone());
    let job_id = queue
        .enqueue("test_job", json!({"test": "data"}), None, Some(1))
        .await
        .expect("Failed to enqueue job");

    queue
        .fail(job_id, "Permanent error", None, 0)
        .await
        .expect("Failed to record permanent failure");

    let job = fetch_job(&pool, job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.last_error, Some("Permanent error".to_string()));
}

#[sqlx::test]
async fn test_lapsed_visibility_window_allows_reclaim(pool: Pool<Postgres>) {
    let queue = JobQueue::new(pool);
    let job_id = queue
        .enqueue("test_job", json!({"test": "data"}), None, None)
        .await
        .expect("Failed to enqueue job");

    let worker_id = Uuid::new_v4();
    let jobs = queue
        .claim_due(1, worker_id, 1)
        .await
        .expect("Failed to claim due jobs");

    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Running);

    // Let the 1-second visibility window lapse
    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

    let worker_id_2 = Uuid::new_v4();
    let jobs = queue
        .claim_due(1, worker_id_2, 300)
        .await
        .expect("Failed to reclaim after timeout");

    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, job_id);
    assert_eq!(jobs[0].reserved_by, Some(worker_id_2));
}

#[sqlx::test]
async fn test_extend_lease_pushes_window_out(pool: Pool<Postgres>) {
    let queue = JobQueue::new(pool.clone());
    let job_id = queue
        .enqueue("test_job", json!({}), None, None)
        .await
        .expect("Failed to enqueue job");

    queue
        .claim_due(1, Uuid::new_v4(), 60)
        .await
        .expect("Failed to claim job");
    let before = fetch_job(&pool, job_id).await.visibility_till.unwrap();

    queue
        .extend_lease(job_id, 600)
        .await
        .expect("Failed to extend lease");
    let after = fetch_job(&pool, job_id).await.visibility_till.unwrap();

    assert!(after > before);
}

#[sqlx::test]
async fn test_batch_claim_reserves_everything(pool: Pool<Postgres>) {
    let queue = JobQueue::new(pool.clone());
    let mut job_ids = Vec::new();
    for i in 0..5 {
        let job_id = queue
            .enqueue("test_job", json!({"index": i}), None, None)
            .await
            .expect("Failed to enqueue job");
        job_ids.push(job_id);
    }

    let worker_id = Uuid::new_v4();
    let jobs = queue
        .claim_due(10, worker_id, 300)
        .await
        .expect("Failed to claim due jobs");

    assert_eq!(jobs.len(), 5);
    for job in &jobs {
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.reserved_by, Some(worker_id));
        assert!(job_ids.contains(&job.id));
    }

    for job in jobs {
        queue
            .complete(job.id)
            .await
            .expect("Failed to mark job as completed");
    }

    for job_id in job_ids {
        assert_eq!(fetch_job(&pool, job_id).await.status, JobStatus::Succeeded);
    }
}
