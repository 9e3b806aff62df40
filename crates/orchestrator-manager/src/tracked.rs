//! In-memory TrackedWorker table (spec §4.6.1, §5: "advisory... resynchronized
//! from the container runtime every tick"). Never persisted — a Manager
//! restart starts this table empty.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use orchestrator_core::MappedStatus;

#[derive(Debug, Clone)]
pub struct TrackedWorker {
    pub task_id: String,
    pub cluster_arn: String,
    pub task_definition_arn: String,
    pub started_at: DateTime<Utc>,
    pub job_classes: Vec<String>,
    pub status: MappedStatus,
}

#[derive(Default)]
pub struct TrackedWorkerTable {
    workers: HashMap<String, TrackedWorker>,
}

impl TrackedWorkerTable {
    pub fn insert(&mut self, worker: TrackedWorker) {
        self.workers.insert(worker.task_id.clone(), worker);
    }

    pub fn evict(&mut self, task_id: &str) {
        self.workers.remove(task_id);
    }

    pub fn set_status(&mut self, task_id: &str, status: MappedStatus) {
        if let Some(worker) = self.workers.get_mut(task_id) {
            worker.status = status;
        }
    }

    pub fn by_cluster(&self) -> HashMap<&str, Vec<&TrackedWorker>> {
        let mut grouped: HashMap<&str, Vec<&TrackedWorker>> = HashMap::new();
        for worker in self.workers.values() {
            grouped.entry(&worker.cluster_arn).or_default().push(worker);
        }
        grouped
    }

    /// Non-stopped workers for a task-definition — what the scaling decision
    /// compares against `target_capacity`.
    pub fn live_count_for(&self, task_definition_arn: &str) -> u32 {
        self.workers
            .values()
            .filter(|w| w.task_definition_arn == task_definition_arn && w.status != MappedStatus::Stopped)
            .count() as u32
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.workers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(id: &str, task_def: &str, status: MappedStatus) -> TrackedWorker {
        TrackedWorker {
            task_id: id.to_string(),
            cluster_arn: "arn:aws:ecs:cluster/1".to_string(),
            task_definition_arn: task_def.to_string(),
            started_at: Utc::now(),
            job_classes: vec!["TEST_CLASS".to_string()],
            status,
        }
    }

    #[test]
    fn live_count_excludes_stopped() {
        let mut table = TrackedWorkerTable::default();
        table.insert(worker("t1", "def-a", MappedStatus::Running));
        table.insert(worker("t2", "def-a", MappedStatus::Stopped));
        table.insert(worker("t3", "def-a", MappedStatus::Pending));
        assert_eq!(table.live_count_for("def-a"), 2);
    }

    #[test]
    fn eviction_removes_the_worker() {
        let mut table = TrackedWorkerTable::default();
        table.insert(worker("t1", "def-a", MappedStatus::Running));
        table.evict("t1");
        assert!(table.is_empty());
    }
}
