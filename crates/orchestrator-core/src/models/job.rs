use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Status of a Job. Transitions are enforced by the Job Service, never by
/// the store alone — see `can_transition_to`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled | JobStatus::TimedOut
        )
    }

    /// Whether a Job in this status is still eligible for the cache-hit rule
    /// (§3: "at most one non-terminal Job exists per fingerprint").
    pub fn is_non_terminal(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(&self, new_status: JobStatus) -> bool {
        use JobStatus::*;
        match (self, new_status) {
            (Pending, InProgress) => true,
            (Pending, Cancelled) => true,
            (InProgress, Succeeded) => true,
            (InProgress, Failed) => true,
            (InProgress, Cancelled) => true,
            (InProgress, TimedOut) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Succeeded => "SUCCEEDED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::TimedOut => "TIMED_OUT",
        };
        write!(f, "{}", s)
    }
}

/// Final status a worker may submit a result with (spec §4.5.4).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmittedStatus {
    Succeeded,
    Failed,
}

impl From<SubmittedStatus> for JobStatus {
    fn from(status: SubmittedStatus) -> Self {
        match status {
            SubmittedStatus::Succeeded => JobStatus::Succeeded,
            SubmittedStatus::Failed => JobStatus::Failed,
        }
    }
}

/// A user request for work (spec §3 "Job").
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(rename = "type")]
    pub job_type: String,
    pub status: JobStatus,
    pub user_id: Uuid,
    pub input_payload: Value,
    pub hash: String,
}

/// A lease granting one worker the right to execute one job.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobAssignment {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub job_id: Uuid,
    pub ecs_task_arn: String,
    pub ecs_cluster_arn: String,
    pub expires_at: DateTime<Utc>,
    pub storage_scheme: String,
    pub storage_uri: String,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobAssignment {
    /// A live assignment: not completed, lease not expired (GLOSSARY).
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.completed_at.is_none() && self.expires_at > now
    }
}

/// The outcome record of a completed assignment.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobResult {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub job_id: Uuid,
    pub assignment_id: Uuid,
    pub result_payload: Option<Value>,
    pub storage_scheme: String,
    pub storage_uri: String,
    pub metadata: Value,
}

/// Audit row linking a (user, job) creation request — records whether the
/// request hit the fingerprint cache (spec §4.5.1).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobRequest {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub user_id: Uuid,
    #[sqlx(rename = "type")]
    pub job_type: String,
    pub input_payload: Value,
    pub cache_hit: bool,
    pub job_id: Uuid,
}

/// A Job joined with its assignments and their results, for `GET /jobs/:id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobWithAssignments {
    #[serde(flatten)]
    pub job: Job,
    pub assignments: Vec<AssignmentWithResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentWithResult {
    #[serde(flatten)]
    pub assignment: JobAssignment,
    pub result: Option<JobResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_can_be_assigned_or_cancelled() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::InProgress));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Succeeded));
    }

    #[test]
    fn in_progress_can_reach_any_terminal_state() {
        assert!(JobStatus::InProgress.can_transition_to(JobStatus::Succeeded));
        assert!(JobStatus::InProgress.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::InProgress.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::InProgress.can_transition_to(JobStatus::TimedOut));
    }

    #[test]
    fn terminal_states_accept_no_further_transitions() {
        for terminal in [
            JobStatus::Succeeded,
            JobStatus::Failed,
            JobStatus::Cancelled,
            JobStatus::TimedOut,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(JobStatus::InProgress));
            assert!(!terminal.can_transition_to(JobStatus::Pending));
        }
    }

    #[test]
    fn live_assignment_requires_uncompleted_and_unexpired() {
        let now = Utc::now();
        let mut assignment = JobAssignment {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            job_id: Uuid::new_v4(),
            ecs_task_arn: "arn:aws:ecs:task/1".to_string(),
            ecs_cluster_arn: "arn:aws:ecs:cluster/1".to_string(),
            expires_at: now + chrono::Duration::minutes(60),
            storage_scheme: "S3".to_string(),
            storage_uri: "s3://bucket/prefix/test/job/123".to_string(),
            heartbeat_at: None,
            completed_at: None,
        };
        assert!(assignment.is_live(now));

        assignment.completed_at = Some(now);
        assert!(!assignment.is_live(now));

        assignment.completed_at = None;
        assignment.expires_at = now - chrono::Duration::minutes(1);
        assert!(!assignment.is_live(now));
    }
}
