//! Capacity Manager (C6) binary: the control loop of spec §4.6. Polls
//! pending load per job class, reconciles tracked ECS tasks against the
//! container runtime, and launches workers on a logarithmic curve.

mod scaling;
mod tracked;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use orchestrator_core::{
    map_status, ClassConfig, Config, ContainerDriver, DescribedTask, Error, Job, MappedStatus,
    Result, RunTaskRequest, WorkerAuthClient,
};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use scaling::{cooldown_elapsed, target_capacity};
use tracked::{TrackedWorker, TrackedWorkerTable};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;

    if config.manager.classes.is_empty() {
        return Err(Error::config(
            "manager.classes must define at least one job class".to_string(),
        ));
    }

    let shared_config = aws_config::load_from_env().await;
    let ecs = aws_sdk_ecs::Client::new(&shared_config);
    let ec2 = aws_sdk_ec2::Client::new(&shared_config);
    let driver = Arc::new(ContainerDriver::new(ecs, ec2));

    let http = reqwest::Client::new();
    let auth = WorkerAuthClient::new(
        http,
        config.manager.api_endpoint.clone(),
        config.manager.email.clone(),
        config.manager.password.clone(),
    );

    let manager = Manager {
        config: config.clone(),
        driver,
        auth,
        workers: Mutex::new(TrackedWorkerTable::default()),
        last_scaled: Mutex::new(HashMap::new()),
    };

    info!(
        interval_ms = config.manager.poll_interval_ms,
        classes = config.manager.classes.len(),
        "capacity manager starting"
    );

    let mut ticks = tokio::time::interval(Duration::from_millis(config.manager.poll_interval_ms));
    let mut shutdown = std::pin::pin!(shutdown_signal());

    loop {
        tokio::select! {
            _ = ticks.tick() => {
                if let Err(e) = manager.tick().await {
                    error!(error = %e, "tick failed");
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping future polls");
                break;
            }
        }
    }

    Ok(())
}

struct Manager {
    config: Config,
    driver: Arc<ContainerDriver>,
    auth: WorkerAuthClient,
    workers: Mutex<TrackedWorkerTable>,
    last_scaled: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Manager {
    /// One full reconcile + decide + launch pass (spec §4.6.1). Single-flight
    /// by construction: `main`'s loop never starts a tick while this one is
    /// still awaited.
    async fn tick(&self) -> Result<()> {
        self.reconcile_workers().await?;
        let pending_by_task_def = self.fetch_pending_by_task_definition().await?;

        for (task_definition_arn, pending) in pending_by_task_def {
            let class = match self.class_for_task_definition(&task_definition_arn) {
                Some(class) => class,
                None => continue,
            };
            if let Err(e) = self.decide_and_launch(&task_definition_arn, &class, pending).await {
                error!(task_definition_arn = %task_definition_arn, error = %e, "scaling decision failed");
            }
        }

        Ok(())
    }

    /// §4.6.1 step 1. DescribeTasks in chunks of <=100 per cluster; absent or
    /// STOPPED tasks are evicted, unknown statuses are logged and left alone.
    async fn reconcile_workers(&self) -> Result<()> {
        const CHUNK_SIZE: usize = 100;

        let by_cluster: Vec<(String, Vec<String>)> = {
            let table = self.workers.lock().await;
            table
                .by_cluster()
                .into_iter()
                .map(|(cluster, workers)| {
                    (cluster.to_string(), workers.iter().map(|w| w.task_id.clone()).collect())
                })
                .collect()
        };

        for (cluster, task_ids) in by_cluster {
            for chunk in task_ids.chunks(CHUNK_SIZE) {
                let described = self.driver.describe_tasks(&cluster, chunk).await?;
                self.apply_described(described).await;
            }
        }

        Ok(())
    }

    async fn apply_described(&self, described: Vec<DescribedTask>) {
        let mut table = self.workers.lock().await;
        for task in described {
            if task.missing {
                table.evict(&task.task_id);
                continue;
            }
            match task.status.as_deref().map(map_status) {
                Some(MappedStatus::Stopped) => table.evict(&task.task_id),
                Some(status) => table.set_status(&task.task_id, status),
                None => warn!(task_id = %task.task_id, "describe_tasks returned no status"),
            }
        }
    }

    /// §4.6.1 steps 2-3: fetch pending jobs per configured class and
    /// aggregate by the class's task-definition.
    async fn fetch_pending_by_task_definition(&self) -> Result<HashMap<String, u32>> {
        let mut by_task_def = HashMap::new();

        for (class, class_config) in &self.config.manager.classes {
            let jobs = self.poll_pending(class).await?;
            *by_task_def.entry(class_config.task_definition_arn.clone()).or_insert(0) +=
                jobs.len() as u32;
        }

        Ok(by_task_def)
    }

    async fn poll_pending(&self, class: &str) -> Result<Vec<Job>> {
        let path = format!("/jobs/poll?jobType={}", class);
        let response = self.auth.get(&path).await?;
        if !response.status().is_success() {
            return Err(Error::transient(format!(
                "poll for class {} returned {}",
                class,
                response.status()
            )));
        }
        response.json().await.map_err(Error::from)
    }

    fn class_for_task_definition(&self, task_definition_arn: &str) -> Option<(String, ClassConfig)> {
        self.config
            .manager
            .classes
            .iter()
            .find(|(_, cfg)| cfg.task_definition_arn == task_definition_arn)
            .map(|(class, cfg)| (class.clone(), cfg.clone()))
    }

    /// §4.6.2-4.6.3.
    async fn decide_and_launch(
        &self,
        task_definition_arn: &str,
        class: &(String, ClassConfig),
        pending: u32,
    ) -> Result<()> {
        let (class_name, class_config) = class;
        let now = Utc::now();

        let last_scaled = {
            let last_scaled = self.last_scaled.lock().await;
            last_scaled.get(task_definition_arn).copied()
        };

        if !cooldown_elapsed(now, last_scaled, class_config.cooldown_seconds) {
            return Ok(());
        }

        let live = {
            let table = self.workers.lock().await;
            table.live_count_for(task_definition_arn)
        };

        let target = target_capacity(
            pending,
            class_config.sensitivity,
            class_config.factor,
            class_config.min_capacity,
            class_config.max_capacity,
        );

        let diff = target as i64 - live as i64;
        if diff <= 0 {
            return Ok(());
        }

        info!(
            task_definition_arn = %task_definition_arn,
            pending, live, target, diff,
            "launching workers"
        );

        for _ in 0..diff {
            if let Err(e) = self.launch_one(task_definition_arn, class_name, class_config).await {
                error!(task_definition_arn = %task_definition_arn, error = %e, "launch failed");
                continue;
            }
            let mut last_scaled = self.last_scaled.lock().await;
            last_scaled.insert(task_definition_arn.to_string(), Utc::now());
        }

        Ok(())
    }

    async fn launch_one(
        &self,
        task_definition_arn: &str,
        class_name: &str,
        class_config: &ClassConfig,
    ) -> Result<()> {
        let subnet = self.driver.pick_public_subnet(&self.config.manager.vpc_id).await?;

        let task_ids = self
            .driver
            .run_task(RunTaskRequest {
                cluster: &class_config.cluster_arn,
                task_definition: task_definition_arn,
                subnet: &subnet,
                security_group: &class_config.security_group,
                assign_public_ip: true,
            })
            .await?;

        let started_at = Utc::now();
        let mut table = self.workers.lock().await;
        for task_id in task_ids {
            table.insert(TrackedWorker {
                task_id,
                cluster_arn: class_config.cluster_arn.clone(),
                task_definition_arn: task_definition_arn.to_string(),
                started_at,
                job_classes: vec![class_name.to_string()],
                status: MappedStatus::Pending,
            });
        }

        Ok(())
    }
}

/// §4.6.4: stop scheduling future polls on SIGTERM/SIGINT. No state is
/// persisted — the next start reconciles from scratch.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
