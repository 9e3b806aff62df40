pub mod config;
pub mod error;
pub mod models;
pub mod db;
pub mod registry;
pub mod fingerprint;
pub mod blob;
pub mod container;
pub mod jobs;
pub mod worker_auth;
pub mod auth;

// Re-export commonly used types
pub use error::{Error, ErrorEnvelope, Result};
pub use config::{Config, DatabaseConfig, BlobConfig, ManagerConfig, ClassConfig, ServerConfig, SecurityConfig, JwtConfig, ServicePrincipalConfig, LoggingConfig, LogFormat, RegistryConfig, SweeperSettings};
pub use models::{Job, JobAssignment, JobResult, JobRequest, JobStatus, JobWithAssignments, AssignmentWithResult, SubmittedStatus, Pagination};
pub use db::{Database, create_pool};
pub use db::migrate::{Migrator, auto_migrate, DbStatus};
pub use registry::{PayloadRegistry, ClassDefinition, ClassSpec, default_timeout_minutes, load_class_specs_from_file};
pub use fingerprint::fingerprint;
pub use blob::{BlobLocator, StorageLocation};
pub use container::{ContainerDriver, MappedStatus, DescribedTask, RunTaskRequest, map_status};
pub use jobs::{JobRepository, JobService, CreateOutcome, DownloadOutcome, Sweeper, SweeperConfig};
pub use worker_auth::WorkerAuthClient;
pub use auth::{AuthService, JwtClaims, TokenType};

/// Current version of the orchestrator crate family.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
    }
    
    #[test]
    fn test_error_creation() {
        let err = Error::validation("Test validation error");
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.category(), "validation");
    }
}