//! Job Service (C5): queue semantics over Job/JobAssignment/JobResult.

pub mod repository;
pub mod service;
pub mod sweeper;

pub use repository::JobRepository;
pub use service::{CreateOutcome, DownloadOutcome, JobService};
pub use sweeper::{Sweeper, SweeperConfig};
