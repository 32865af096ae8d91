//! Execution coordinator -- one scheduled run of one task.
//!
//! Errors here are never surfaced to a caller: nobody is waiting on an
//! autonomous firing. Pipeline failures become error results and bump
//! `error_count`; persistence failures are logged and the run abandoned
//! without taking the scheduler down.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use tracing::{error, info, warn};

use crate::error::EngineError;
use crate::extract;
use crate::fetch::PageFetcher;
use crate::robots::ConsentChecker;
use crate::storage::{self, Pool};
use crate::summarize::{SummarizerClient, Summary};
use crate::tasks::Task;
use url::Url;

/// Successful outcome of the fetch -> extract -> summarize pipeline.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub summary: Summary,
    pub page_title: String,
    pub site_name: String,
}

/// The fetch/extract/summarize pipeline behind a seam so scheduled runs can
/// be exercised with stubs.
#[async_trait::async_trait]
pub trait AnalysisPipeline: Send + Sync {
    async fn analyze(
        &self,
        url: &str,
        question: &str,
        api_key: &str,
    ) -> Result<AnalysisOutcome, EngineError>;
}

/// Production pipeline: real fetcher, extractor, and model client.
pub struct WebAnalysisPipeline {
    fetcher: PageFetcher,
    summarizer: SummarizerClient,
}

impl WebAnalysisPipeline {
    pub fn new(fetcher: PageFetcher, summarizer: SummarizerClient) -> Self {
        Self { fetcher, summarizer }
    }
}

#[async_trait::async_trait]
impl AnalysisPipeline for WebAnalysisPipeline {
    async fn analyze(
        &self,
        url: &str,
        question: &str,
        api_key: &str,
    ) -> Result<AnalysisOutcome, EngineError> {
        let html = self.fetcher.fetch(url).await?;
        let parsed = Url::parse(url)
            .map_err(|e| EngineError::InvalidInput(format!("invalid URL '{url}': {e}")))?;
        let page = extract::extract(&html, &parsed)?;
        let summary = self.summarizer.summarize(&page, question, api_key).await?;
        Ok(AnalysisOutcome {
            summary,
            page_title: page.title,
            site_name: page.site_name,
        })
    }
}

/// Parse a 5- or 6-field cron expression. The `cron` crate wants a seconds
/// field, so classic 5-field expressions get `0` prepended.
pub fn parse_cron(cron_expr: &str) -> Result<CronSchedule, cron::error::Error> {
    let fields = cron_expr.split_whitespace().count();
    if fields == 5 {
        CronSchedule::from_str(&format!("0 {cron_expr}"))
    } else {
        CronSchedule::from_str(cron_expr)
    }
}

/// Compute the firing after `now` for a stored cron expression, or None
/// when the expression no longer parses.
pub fn next_execution(cron_expr: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    parse_cron(cron_expr).ok().and_then(|s| s.after(&now).next())
}

/// Run one firing of `task_id`: bookkeeping, consent re-check, pipeline,
/// result record.
pub async fn run_once(
    pool: &Pool,
    consent: &ConsentChecker,
    pipeline: &dyn AnalysisPipeline,
    task_id: &str,
) {
    let task = match storage::get_task(pool, task_id) {
        Ok(Some(task)) => task,
        Ok(None) => {
            // Deleted between firing and lookup.
            warn!(task = %task_id, "task gone at execution time");
            return;
        }
        Err(e) => {
            error!(task = %task_id, "failed to load task: {e:#}");
            return;
        }
    };

    let now = Utc::now();
    let next = next_execution(&task.cron_expr, now);
    if let Err(e) = storage::mark_execution_started(pool, task_id, now, next) {
        error!(task = %task_id, "failed to mark execution start: {e:#}");
        return;
    }

    // Policy can change between firings, so consent is re-checked every run.
    let decision = consent.check(&task.url).await;
    if !decision.allowed {
        warn!(task = %task_id, url = %task.url, "consent denied: {}", decision.message);
        record_failure(pool, &task, &format!("Scraping disallowed: {}", decision.message));
        return;
    }

    match pipeline.analyze(&task.url, &task.task_description, &task.api_key).await {
        Ok(outcome) => {
            info!(task = %task_id, url = %task.url, "analysis succeeded");
            if let Err(e) = storage::record_success(
                pool,
                &task,
                &outcome.summary,
                &outcome.page_title,
                &outcome.site_name,
            ) {
                error!(task = %task_id, "failed to record success result: {e:#}");
            }
        }
        Err(e) => {
            warn!(task = %task_id, url = %task.url, "analysis failed: {e}");
            record_failure(pool, &task, &e.to_string());
        }
    }
}

fn record_failure(pool: &Pool, task: &Task, message: &str) {
    if let Err(e) = storage::record_error(pool, task, message) {
        error!(task = %task.id, "failed to record error result: {e:#}");
    }
}
