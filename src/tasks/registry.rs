//! Task registry and scheduler.
//!
//! Owns the persisted task rows and the process-local map of live trigger
//! handles. Exactly one handle exists per active task; paused and deleted
//! tasks have none. Handles are rebuilt from persisted state at startup
//! via [`TaskRegistry::rehydrate`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use cron::Schedule as CronSchedule;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::PagewatchConfig;
use crate::error::{persistence, EngineError};
use crate::fetch::PageFetcher;
use crate::robots::{ConsentChecker, ConsentDecision};
use crate::storage::{self, Pool};
use crate::summarize::SummarizerClient;
use crate::tasks::runner::{self, AnalysisOutcome, AnalysisPipeline, WebAnalysisPipeline};
use crate::tasks::{ExecutionResult, NewTask, Task, TaskStatus};

/// Live trigger for one active task. Aborting the join handle stops all
/// future firings; a run already in flight completes on its own.
struct TriggerHandle {
    join: JoinHandle<()>,
}

impl Drop for TriggerHandle {
    fn drop(&mut self) {
        self.join.abort();
    }
}

/// Registry of recurring analysis tasks and their in-process triggers.
#[derive(Clone)]
pub struct TaskRegistry {
    pool: Pool,
    consent: Arc<ConsentChecker>,
    pipeline: Arc<dyn AnalysisPipeline>,
    handles: Arc<Mutex<HashMap<String, TriggerHandle>>>,
}

impl TaskRegistry {
    pub fn new(
        pool: Pool,
        consent: Arc<ConsentChecker>,
        pipeline: Arc<dyn AnalysisPipeline>,
    ) -> Self {
        Self {
            pool,
            consent,
            pipeline,
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build a registry with the production pipeline from configuration.
    pub fn from_config(pool: Pool, cfg: &PagewatchConfig) -> Self {
        let consent = Arc::new(ConsentChecker::new(cfg.robots.clone()));
        let pipeline = Arc::new(WebAnalysisPipeline::new(
            PageFetcher::new(&cfg.fetch),
            SummarizerClient::new(cfg.summarizer.clone()),
        ));
        Self::new(pool, consent, pipeline)
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Register a new task: validate, consent-gate, persist, install trigger.
    pub async fn create_task(&self, new: NewTask) -> Result<Task, EngineError> {
        if new.url.trim().is_empty()
            || new.task_description.trim().is_empty()
            || new.api_key.trim().is_empty()
            || new.cron_expr.trim().is_empty()
        {
            return Err(EngineError::InvalidInput(
                "url, task_description, cron_expr and api_key are required".to_string(),
            ));
        }

        let parsed_url = Url::parse(&new.url)
            .map_err(|e| EngineError::InvalidInput(format!("invalid URL: {e}")))?;
        if parsed_url.scheme() != "http" && parsed_url.scheme() != "https" {
            return Err(EngineError::InvalidInput(
                "URL must use http or https".to_string(),
            ));
        }

        let schedule = runner::parse_cron(&new.cron_expr).map_err(|e| EngineError::InvalidCron {
            expr: new.cron_expr.clone(),
            reason: e.to_string(),
        })?;

        // Creation-time consent gate. Permission is re-checked at every
        // firing too, since the site's policy can change.
        let decision = self.consent.check(&new.url).await;
        if !decision.allowed {
            return Err(EngineError::ScrapingDisallowed(decision.message));
        }

        let now = Utc::now();
        let name = new.name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| {
            format!(
                "Task for {}",
                parsed_url.host_str().unwrap_or("unknown host")
            )
        });

        let task = Task {
            id: Uuid::new_v4().to_string(),
            name,
            url: new.url,
            task_description: new.task_description,
            cron_expr: new.cron_expr,
            api_key: new.api_key,
            status: TaskStatus::Active,
            execution_count: 0,
            success_count: 0,
            error_count: 0,
            last_executed: None,
            next_execution: schedule.after(&now).next(),
            created_at: now,
            updated_at: now,
        };

        storage::insert_task(&self.pool, &task).map_err(persistence)?;
        self.install_handle(&task.id, schedule);
        info!(task = %task.id, url = %task.url, cron = %task.cron_expr, "task created");

        Ok(task)
    }

    /// `active` -> `paused`: destroy the trigger, keep counters and history.
    pub fn pause_task(&self, id: &str) -> Result<(), EngineError> {
        let task = storage::get_task(&self.pool, id)
            .map_err(persistence)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        self.remove_handle(id);
        storage::set_task_status(&self.pool, &task.id, TaskStatus::Paused, None)
            .map_err(persistence)?;
        info!(task = %id, "task paused");
        Ok(())
    }

    /// `paused` -> `active`: recompute the next firing and reinstall a trigger.
    pub fn resume_task(&self, id: &str) -> Result<(), EngineError> {
        let task = storage::get_task(&self.pool, id)
            .map_err(persistence)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        let schedule = runner::parse_cron(&task.cron_expr).map_err(|e| EngineError::InvalidCron {
            expr: task.cron_expr.clone(),
            reason: e.to_string(),
        })?;
        let next = schedule.after(&Utc::now()).next();

        storage::set_task_status(&self.pool, &task.id, TaskStatus::Active, next)
            .map_err(persistence)?;
        self.install_handle(&task.id, schedule);
        info!(task = %id, next = ?next, "task resumed");
        Ok(())
    }

    /// Irreversible: destroy the trigger, remove the task, cascade its
    /// results. Returns the number of result rows removed.
    pub fn delete_task(&self, id: &str) -> Result<usize, EngineError> {
        self.remove_handle(id);
        let removed = storage::delete_task(&self.pool, id)
            .map_err(persistence)?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        info!(task = %id, results_removed = removed, "task deleted");
        Ok(removed)
    }

    /// All registered tasks, newest-created first.
    pub fn list_tasks(&self) -> Result<Vec<Task>, EngineError> {
        storage::list_tasks(&self.pool).map_err(persistence)
    }

    /// Execution results newest-first, optionally filtered to one task.
    pub fn list_results(
        &self,
        task_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ExecutionResult>, EngineError> {
        storage::list_results(&self.pool, task_id, limit).map_err(persistence)
    }

    /// Standalone consent pre-flight, as exposed on the API.
    pub async fn check_consent(&self, url: &str) -> ConsentDecision {
        self.consent.check(url).await
    }

    /// One-shot analysis without registering a task.
    pub async fn analyze_now(
        &self,
        url: &str,
        question: &str,
        api_key: &str,
    ) -> Result<AnalysisOutcome, EngineError> {
        let decision = self.consent.check(url).await;
        if !decision.allowed {
            return Err(EngineError::ScrapingDisallowed(decision.message));
        }
        self.pipeline.analyze(url, question, api_key).await
    }

    /// Reinstall triggers for all persisted active tasks. Called at startup
    /// so schedules survive a process restart.
    pub fn rehydrate(&self) -> Result<usize, EngineError> {
        let tasks = storage::list_active_tasks(&self.pool).map_err(persistence)?;
        let mut installed = 0;
        for task in tasks {
            match runner::parse_cron(&task.cron_expr) {
                Ok(schedule) => {
                    let next = schedule.after(&Utc::now()).next();
                    storage::set_task_status(&self.pool, &task.id, TaskStatus::Active, next)
                        .map_err(persistence)?;
                    self.install_handle(&task.id, schedule);
                    installed += 1;
                }
                Err(e) => {
                    warn!(task = %task.id, cron = %task.cron_expr, "stored cron no longer parses: {e}");
                }
            }
        }
        info!(installed, "scheduler rehydrated");
        Ok(installed)
    }

    /// Number of live triggers. Diagnostic only.
    pub fn active_handles(&self) -> usize {
        self.handles.lock().expect("handles lock poisoned").len()
    }

    fn install_handle(&self, task_id: &str, schedule: CronSchedule) {
        // Always destroy any existing handle first; at most one trigger
        // may exist per task id.
        self.remove_handle(task_id);

        let pool = self.pool.clone();
        let consent = Arc::clone(&self.consent);
        let pipeline = Arc::clone(&self.pipeline);
        let id = task_id.to_string();
        let run_lock = Arc::new(AsyncMutex::new(()));

        let join = tokio::spawn(trigger_loop(pool, consent, pipeline, id, schedule, run_lock));
        self.handles
            .lock()
            .expect("handles lock poisoned")
            .insert(task_id.to_string(), TriggerHandle { join });
    }

    fn remove_handle(&self, task_id: &str) {
        // TriggerHandle aborts the spawned loop on drop.
        self.handles
            .lock()
            .expect("handles lock poisoned")
            .remove(task_id);
    }
}

/// Per-task trigger: sleep until the next cron firing, then run the
/// coordinator. The run-lock keeps at most one execution per task in
/// flight; a firing that finds the previous run still active is skipped.
async fn trigger_loop(
    pool: Pool,
    consent: Arc<ConsentChecker>,
    pipeline: Arc<dyn AnalysisPipeline>,
    task_id: String,
    schedule: CronSchedule,
    run_lock: Arc<AsyncMutex<()>>,
) {
    loop {
        let now = Utc::now();
        let Some(next) = schedule.after(&now).next() else {
            warn!(task = %task_id, "schedule yields no future firings, trigger exiting");
            break;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        match Arc::clone(&run_lock).try_lock_owned() {
            Ok(guard) => {
                let pool = pool.clone();
                let consent = Arc::clone(&consent);
                let pipeline = Arc::clone(&pipeline);
                let task_id = task_id.clone();
                tokio::spawn(async move {
                    let _guard = guard;
                    runner::run_once(&pool, &consent, pipeline.as_ref(), &task_id).await;
                });
            }
            Err(_) => {
                warn!(task = %task_id, "previous run still in flight, skipping this firing");
            }
        }
    }
}
