use std::sync::Arc;

use orchestrator_core::{AuthService, Database, JobService};

#[derive(Clone)]
pub struct AppState {
    pub job_service: Arc<JobService>,
    pub auth_service: Arc<AuthService>,
    pub db: Database,
}

impl AppState {
    pub fn new(job_service: Arc<JobService>, auth_service: Arc<AuthService>, db: Database) -> Self {
        Self {
            job_service,
            auth_service,
            db,
        }
    }
}
