//! Task model, registry, and execution runner.

pub mod registry;
pub mod runner;

pub use registry::TaskRegistry;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a registered task. Deletion is terminal and removes
/// the row, so it has no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Paused,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Paused => "paused",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(TaskStatus::Active),
            "paused" => Some(TaskStatus::Paused),
            _ => None,
        }
    }
}

/// A persisted recurring web-analysis job.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub url: String,
    pub task_description: String,
    pub cron_expr: String,
    /// Model credential. Never serialized into API responses.
    #[serde(skip_serializing)]
    pub api_key: String,
    pub status: TaskStatus,
    pub execution_count: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub last_executed: Option<DateTime<Utc>>,
    pub next_execution: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied fields for task creation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub url: String,
    pub task_description: String,
    pub cron_expr: String,
    pub api_key: String,
    /// Defaults to "Task for {host}" when absent.
    #[serde(default)]
    pub name: Option<String>,
}

/// Outcome status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Success => "success",
            ResultStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(ResultStatus::Success),
            "error" => Some(ResultStatus::Error),
            _ => None,
        }
    }
}

/// One immutable record of a single firing's outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub id: i64,
    pub task_id: String,
    /// Denormalized for display without a join.
    pub url: String,
    pub task_description: String,
    pub status: ResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub executed_at: DateTime<Utc>,
}
