use serde::{Deserialize, Serialize};
use validator::Validate;

pub mod job;

pub use job::{
    AssignmentWithResult, Job, JobAssignment, JobRequest, JobResult, JobStatus,
    JobWithAssignments, SubmittedStatus,
};

/// Pagination parameters for `GET /jobs` listing.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Pagination {
    #[serde(default = "default_page")]
    #[validate(range(min = 1, max = 100))]
    pub page: i64,

    #[serde(default = "default_per_page", rename = "perPage")]
    #[validate(range(min = 1, max = 500))]
    pub per_page: i64,
}

fn default_page() -> i64 {
    1
}

fn default_per_page() -> i64 {
    20
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl Pagination {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_zero_on_first_page() {
        let p = Pagination {
            page: 1,
            per_page: 20,
        };
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn offset_advances_by_per_page() {
        let p = Pagination {
            page: 3,
            per_page: 20,
        };
        assert_eq!(p.offset(), 40);
    }
}
