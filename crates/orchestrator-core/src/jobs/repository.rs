//! Postgres-backed storage for Jobs, Assignments, Results, and the
//! JobRequest audit trail. Every multi-statement operation here runs inside
//! a transaction handed to it by the caller (`jobs::service`), never opens
//! its own — that keeps the create/assign/submit invariants in §3 provable
//! at the transaction boundary rather than scattered across queries.

use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::models::{Job, JobAssignment, JobResult, JobRequest, JobStatus};
use crate::{Database, Error, Result};

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .map(|e| e.code().as_deref() == Some("23505"))
        .unwrap_or(false)
}

#[derive(Clone)]
pub struct JobRepository {
    db: Database,
}

impl JobRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>> {
        Ok(self.db.pool().begin().await?)
    }

    pub async fn find_non_terminal_by_fingerprint(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        job_type: &str,
        hash: &str,
    ) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE type = $1 AND hash = $2 AND status IN ('pending', 'in_progress')
            LIMIT 1
            "#,
        )
        .bind(job_type)
        .bind(hash)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(job)
    }

    /// Attempt to insert a new PENDING job. Returns `Ok(None)` (instead of a
    /// unique-violation error) if a concurrent transaction already won the
    /// race on (type, hash) for a non-terminal job.
    pub async fn try_insert_job(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        job_type: &str,
        hash: &str,
        input_payload: &serde_json::Value,
    ) -> Result<Option<Job>> {
        let result = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (type, status, user_id, input_payload, hash)
            VALUES ($1, 'pending', $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(job_type)
        .bind(user_id)
        .bind(input_payload)
        .bind(hash)
        .fetch_one(&mut **tx)
        .await;

        match result {
            Ok(job) => Ok(Some(job)),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(Error::from(e)),
        }
    }

    pub async fn insert_job_request(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        job_type: &str,
        input_payload: &serde_json::Value,
        cache_hit: bool,
        job_id: Uuid,
    ) -> Result<JobRequest> {
        let request = sqlx::query_as::<_, JobRequest>(
            r#"
            INSERT INTO job_requests (user_id, type, input_payload, cache_hit, job_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(job_type)
        .bind(input_payload)
        .bind(cache_hit)
        .bind(job_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(request)
    }

    pub async fn find_job(&self, id: Uuid) -> Result<Job> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| Error::not_found(format!("job {}", id)))
    }

    pub async fn find_job_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<Job> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| Error::not_found(format!("job {}", id)))
    }

    pub async fn update_job_status(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        status: JobStatus,
    ) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Jobs eligible for assignment: PENDING with no live assignment,
    /// oldest-first, ties broken by id (spec §4.5.2, §5).
    pub async fn poll_pending(&self, job_type: Option<&str>, limit: i64) -> Result<Vec<Job>> {
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            SELECT j.* FROM jobs j
            WHERE j.status = 'pending'
              AND ($1::text IS NULL OR j.type = $1)
              AND NOT EXISTS (
                  SELECT 1 FROM job_assignments a
                  WHERE a.job_id = j.id AND a.completed_at IS NULL AND a.expires_at > NOW()
              )
            ORDER BY j.created_at ASC, j.id ASC
            LIMIT $2
            "#,
        )
        .bind(job_type)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(jobs)
    }

    pub async fn insert_assignment(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        job_id: Uuid,
        ecs_task_arn: &str,
        ecs_cluster_arn: &str,
        expires_at: DateTime<Utc>,
        storage_scheme: &str,
        storage_uri: &str,
    ) -> Result<JobAssignment> {
        let assignment = sqlx::query_as::<_, JobAssignment>(
            r#"
            INSERT INTO job_assignments
                (job_id, ecs_task_arn, ecs_cluster_arn, expires_at, storage_scheme, storage_uri)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(ecs_task_arn)
        .bind(ecs_cluster_arn)
        .bind(expires_at)
        .bind(storage_scheme)
        .bind(storage_uri)
        .fetch_one(&mut **tx)
        .await?;

        Ok(assignment)
    }

    pub async fn find_assignment_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<JobAssignment> {
        sqlx::query_as::<_, JobAssignment>("SELECT * FROM job_assignments WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| Error::not_found(format!("assignment {}", id)))
    }

    pub async fn complete_assignment(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE job_assignments SET completed_at = $1, updated_at = NOW() WHERE id = $2")
            .bind(now)
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn insert_result(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        job_id: Uuid,
        assignment_id: Uuid,
        result_payload: Option<&serde_json::Value>,
        storage_scheme: &str,
        storage_uri: &str,
        metadata: &serde_json::Value,
    ) -> Result<JobResult> {
        let result = sqlx::query_as::<_, JobResult>(
            r#"
            INSERT INTO job_results
                (job_id, assignment_id, result_payload, storage_scheme, storage_uri, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(assignment_id)
        .bind(result_payload)
        .bind(storage_scheme)
        .bind(storage_uri)
        .bind(metadata)
        .fetch_one(&mut **tx)
        .await?;

        Ok(result)
    }

    pub async fn list_jobs(
        &self,
        owner: Option<Uuid>,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Job>, i64)> {
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::job_status IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(owner)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.db.pool())
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM jobs
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::job_status IS NULL OR status = $2)
            "#,
        )
        .bind(owner)
        .bind(status)
        .fetch_one(self.db.pool())
        .await?;

        Ok((jobs, total))
    }

    pub async fn find_assignments_for_job(&self, job_id: Uuid) -> Result<Vec<JobAssignment>> {
        let assignments = sqlx::query_as::<_, JobAssignment>(
            "SELECT * FROM job_assignments WHERE job_id = $1 ORDER BY created_at ASC",
        )
        .bind(job_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(assignments)
    }

    pub async fn find_result_for_assignment(&self, assignment_id: Uuid) -> Result<Option<JobResult>> {
        let result = sqlx::query_as::<_, JobResult>(
            "SELECT * FROM job_results WHERE assignment_id = $1",
        )
        .bind(assignment_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(result)
    }

    /// IN_PROGRESS jobs whose current (non-live) assignment expired more
    /// than `grace` ago and were never completed or reassigned. Returns the
    /// number of jobs transitioned to TIMED_OUT.
    pub async fn sweep_timed_out(&self, grace: chrono::Duration) -> Result<u64> {
        let cutoff = Utc::now() - grace;

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'timed_out', updated_at = NOW()
            WHERE status = 'in_progress'
              AND id IN (
                  SELECT a.job_id FROM job_assignments a
                  WHERE a.completed_at IS NULL AND a.expires_at < $1
              )
              AND NOT EXISTS (
                  SELECT 1 FROM job_assignments a2
                  WHERE a2.job_id = jobs.id AND a2.completed_at IS NULL AND a2.expires_at >= NOW()
              )
            "#,
        )
        .bind(cutoff)
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected())
    }
}
