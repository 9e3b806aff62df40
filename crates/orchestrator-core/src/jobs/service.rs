//! Job Service (C5): the transactional operations from spec §4.5, composed
//! from the Payload Registry (C1), Fingerprint (C2), the Blob Locator (C3),
//! and `jobs::repository`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::blob::BlobLocator;
use crate::fingerprint::fingerprint;
use crate::jobs::repository::JobRepository;
use crate::models::{Job, JobAssignment, JobRequest, JobStatus, JobWithAssignments, AssignmentWithResult, SubmittedStatus};
use crate::registry::PayloadRegistry;
use crate::{Error, Result};

pub struct CreateOutcome {
    pub job: Job,
    pub request: JobRequest,
    pub cached: bool,
}

pub struct DownloadOutcome {
    pub job: Job,
    pub files: BTreeMap<String, String>,
}

pub struct JobService {
    repository: JobRepository,
    registry: Arc<PayloadRegistry>,
    blob: Arc<BlobLocator>,
}

impl JobService {
    pub fn new(repository: JobRepository, registry: Arc<PayloadRegistry>, blob: Arc<BlobLocator>) -> Self {
        Self {
            repository,
            registry,
            blob,
        }
    }

    /// §4.5.1. At most one non-terminal Job exists per (class, fingerprint)
    /// — enforced first by a plain lookup, then by the DB's unique partial
    /// index catching the race a concurrent creator might win.
    pub async fn create(&self, user_id: Uuid, class: &str, input_payload: Value) -> Result<CreateOutcome> {
        let input_payload = self.registry.validate_input(class, &input_payload)?;
        let hash = fingerprint(class, &input_payload);

        let mut tx = self.repository.begin().await?;

        if let Some(existing) = self
            .repository
            .find_non_terminal_by_fingerprint(&mut tx, class, &hash)
            .await?
        {
            let request = self
                .repository
                .insert_job_request(&mut tx, user_id, class, &input_payload, true, existing.id)
                .await?;
            tx.commit().await?;
            return Ok(CreateOutcome {
                job: existing,
                request,
                cached: true,
            });
        }

        match self
            .repository
            .try_insert_job(&mut tx, user_id, class, &hash, &input_payload)
            .await?
        {
            Some(job) => {
                let request = self
                    .repository
                    .insert_job_request(&mut tx, user_id, class, &input_payload, false, job.id)
                    .await?;
                tx.commit().await?;
                Ok(CreateOutcome {
                    job,
                    request,
                    cached: false,
                })
            }
            None => {
                // Lost the race: a concurrent create committed first.
                let winner = self
                    .repository
                    .find_non_terminal_by_fingerprint(&mut tx, class, &hash)
                    .await?
                    .ok_or_else(|| {
                        Error::transient("lost the create race but found no winning job")
                    })?;
                let request = self
                    .repository
                    .insert_job_request(&mut tx, user_id, class, &input_payload, true, winner.id)
                    .await?;
                tx.commit().await?;
                Ok(CreateOutcome {
                    job: winner,
                    request,
                    cached: true,
                })
            }
        }
    }

    /// §4.5.2. Never mutates state.
    pub async fn poll(&self, class: Option<&str>) -> Result<Vec<Job>> {
        self.repository.poll_pending(class, 10).await
    }

    /// §4.5.3.
    pub async fn assign(&self, job_id: Uuid, ecs_task_arn: &str, ecs_cluster_arn: &str) -> Result<JobAssignment> {
        let mut tx = self.repository.begin().await?;

        let job = self.repository.find_job_for_update(&mut tx, job_id).await?;
        if job.status != JobStatus::Pending {
            return Err(Error::conflict(format!(
                "job {} is not PENDING (status={})",
                job_id, job.status
            )));
        }

        let now = Utc::now();
        let location = self.blob.storage_for(&job.job_type, job.id, now.timestamp_millis());
        let timeout = self.registry.timeout(&job.job_type)?;
        let expires_at = now + chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::hours(1));

        let assignment = self
            .repository
            .insert_assignment(
                &mut tx,
                job.id,
                ecs_task_arn,
                ecs_cluster_arn,
                expires_at,
                &location.scheme,
                &location.uri,
            )
            .await?;

        self.repository
            .update_job_status(&mut tx, job.id, JobStatus::InProgress)
            .await?;

        tx.commit().await?;
        Ok(assignment)
    }

    /// §4.5.4.
    pub async fn submit_result(
        &self,
        assignment_id: Uuid,
        status: SubmittedStatus,
        result_payload: Option<Value>,
    ) -> Result<()> {
        let mut tx = self.repository.begin().await?;

        let assignment = self.repository.find_assignment_for_update(&mut tx, assignment_id).await?;
        if assignment.completed_at.is_some() {
            return Err(Error::conflict(format!(
                "assignment {} already has a result",
                assignment_id
            )));
        }

        let job = self.repository.find_job_for_update(&mut tx, assignment.job_id).await?;

        if let Some(payload) = &result_payload {
            self.registry.validate_result(&job.job_type, payload)?;
        }

        let now = Utc::now();
        self.repository
            .insert_result(
                &mut tx,
                job.id,
                assignment.id,
                result_payload.as_ref(),
                &assignment.storage_scheme,
                &assignment.storage_uri,
                &Value::Object(Default::default()),
            )
            .await?;

        self.repository.complete_assignment(&mut tx, assignment.id, now).await?;
        self.repository
            .update_job_status(&mut tx, job.id, status.into())
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// §4.5.5.
    pub async fn cancel(&self, job_id: Uuid, caller_id: Uuid, caller_is_admin: bool) -> Result<Job> {
        let mut tx = self.repository.begin().await?;

        let job = self.repository.find_job_for_update(&mut tx, job_id).await?;

        if !caller_is_admin && job.user_id != caller_id {
            return Err(Error::forbidden("not the job owner"));
        }

        if job.status.is_terminal() {
            return Err(Error::conflict(format!(
                "job {} is already terminal (status={})",
                job_id, job.status
            )));
        }

        self.repository
            .update_job_status(&mut tx, job_id, JobStatus::Cancelled)
            .await?;
        tx.commit().await?;

        self.repository.find_job(job_id).await
    }

    /// §4.5.7.
    pub async fn download(&self, job_id: Uuid, ttl: Option<Duration>) -> Result<DownloadOutcome> {
        let job = self.repository.find_job(job_id).await?;
        if job.status != JobStatus::Succeeded {
            return Err(Error::validation(format!(
                "job {} is not SUCCEEDED (status={})",
                job_id, job.status
            )));
        }

        let assignments = self.repository.find_assignments_for_job(job_id).await?;
        let mut result_uri = None;
        for assignment in &assignments {
            if let Some(result) = self.repository.find_result_for_assignment(assignment.id).await? {
                result_uri = Some(result.storage_uri);
                break;
            }
        }

        let uri = result_uri
            .ok_or_else(|| Error::validation(format!("job {} has no assignment with a result", job_id)))?;

        let files = self.blob.presign_list(&uri, ttl).await?;
        Ok(DownloadOutcome { job, files })
    }

    pub async fn list(
        &self,
        owner: Option<Uuid>,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Job>, i64)> {
        self.repository.list_jobs(owner, status, limit, offset).await
    }

    pub async fn get_with_assignments(&self, job_id: Uuid) -> Result<JobWithAssignments> {
        let job = self.repository.find_job(job_id).await?;
        let assignments = self.repository.find_assignments_for_job(job_id).await?;

        let mut with_results = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let result = self.repository.find_result_for_assignment(assignment.id).await?;
            with_results.push(AssignmentWithResult { assignment, result });
        }

        Ok(JobWithAssignments {
            job,
            assignments: with_results,
        })
    }
}
