//! SQLite storage layer -- schema, queries, migrations.
//!
//! Owns the task table and the append-only execution result log. Counter
//! updates are single `UPDATE ... SET c = c + 1` statements so increments
//! stay atomic under concurrent task firings.

pub mod schema;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use r2d2::Pool as R2D2Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Row};

use crate::summarize::Summary;
use crate::tasks::{ExecutionResult, ResultStatus, Task, TaskStatus};

/// Connection Pool type
pub type Pool = R2D2Pool<SqliteConnectionManager>;

/// Open (or create) the SQLite database and return a connection pool.
pub fn open_pool(path: &str) -> Result<Pool> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create data directory {}", parent.display()))?;
        }
    }

    let manager = SqliteConnectionManager::file(path).with_init(|c| {
        c.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = R2D2Pool::new(manager)?;

    // Run migrations on a single connection
    let conn = pool.get()?;
    schema::migrate(&conn)?;

    Ok(pool)
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get("status")?;
    Ok(Task {
        id: row.get("id")?,
        name: row.get("name")?,
        url: row.get("url")?,
        task_description: row.get("task_description")?,
        cron_expr: row.get("cron_expr")?,
        api_key: row.get("api_key")?,
        status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Paused),
        execution_count: row.get("execution_count")?,
        success_count: row.get("success_count")?,
        error_count: row.get("error_count")?,
        last_executed: parse_ts_opt(row.get("last_executed")?),
        next_execution: parse_ts_opt(row.get("next_execution")?),
        created_at: parse_ts(row.get("created_at")?),
        updated_at: parse_ts(row.get("updated_at")?),
    })
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_ts_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn ts_opt(ts: &Option<DateTime<Utc>>) -> Option<String> {
    ts.map(|t| t.to_rfc3339())
}

/// Persist a newly created task.
pub fn insert_task(pool: &Pool, task: &Task) -> Result<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT INTO tasks (
            id, name, url, task_description, cron_expr, api_key, status,
            execution_count, success_count, error_count,
            last_executed, next_execution, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            task.id,
            task.name,
            task.url,
            task.task_description,
            task.cron_expr,
            task.api_key,
            task.status.as_str(),
            task.execution_count,
            task.success_count,
            task.error_count,
            ts_opt(&task.last_executed),
            ts_opt(&task.next_execution),
            task.created_at.to_rfc3339(),
            task.updated_at.to_rfc3339(),
        ],
    )
    .context("Failed to insert task")?;
    Ok(())
}

pub fn get_task(pool: &Pool, id: &str) -> Result<Option<Task>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT * FROM tasks WHERE id = ?1")?;
    let mut rows = stmt.query_map(params![id], task_from_row)?;
    match rows.next() {
        Some(task) => Ok(Some(task?)),
        None => Ok(None),
    }
}

/// All tasks, newest-created first.
pub fn list_tasks(pool: &Pool) -> Result<Vec<Task>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT * FROM tasks ORDER BY created_at DESC, id DESC")?;
    let rows = stmt.query_map([], task_from_row)?;
    let mut tasks = Vec::new();
    for t in rows {
        tasks.push(t?);
    }
    Ok(tasks)
}

/// Active tasks only, used to rehydrate scheduler handles at startup.
pub fn list_active_tasks(pool: &Pool) -> Result<Vec<Task>> {
    Ok(list_tasks(pool)?
        .into_iter()
        .filter(|t| t.status == TaskStatus::Active)
        .collect())
}

/// Persist a lifecycle transition. Returns false when the task is unknown.
pub fn set_task_status(
    pool: &Pool,
    id: &str,
    status: TaskStatus,
    next_execution: Option<DateTime<Utc>>,
) -> Result<bool> {
    let conn = pool.get()?;
    let changed = conn.execute(
        "UPDATE tasks SET status = ?2, next_execution = ?3, updated_at = ?4 WHERE id = ?1",
        params![
            id,
            status.as_str(),
            ts_opt(&next_execution),
            Utc::now().to_rfc3339()
        ],
    )?;
    Ok(changed > 0)
}

/// Bump `execution_count` and stamp the scheduling bookkeeping before any
/// network I/O, so a stats snapshot taken mid-run reflects the attempt.
pub fn mark_execution_started(
    pool: &Pool,
    id: &str,
    last_executed: DateTime<Utc>,
    next_execution: Option<DateTime<Utc>>,
) -> Result<()> {
    let conn = pool.get()?;
    let changed = conn.execute(
        "UPDATE tasks SET
            execution_count = execution_count + 1,
            last_executed = ?2,
            next_execution = ?3,
            updated_at = ?4
         WHERE id = ?1",
        params![
            id,
            last_executed.to_rfc3339(),
            ts_opt(&next_execution),
            Utc::now().to_rfc3339()
        ],
    )?;
    anyhow::ensure!(changed > 0, "task {} vanished before execution", id);
    Ok(())
}

/// Append a success result and bump `success_count`, atomically.
pub fn record_success(pool: &Pool, task: &Task, summary: &Summary, page_title: &str, site_name: &str) -> Result<()> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO task_results (
            task_id, url, task_description, status,
            analysis, page_title, site_name, generated_at, executed_at
        ) VALUES (?1, ?2, ?3, 'success', ?4, ?5, ?6, ?7, ?8)",
        params![
            task.id,
            task.url,
            task.task_description,
            summary.analysis,
            page_title,
            site_name,
            summary.generated_at.to_rfc3339(),
            Utc::now().to_rfc3339(),
        ],
    )?;
    tx.execute(
        "UPDATE tasks SET success_count = success_count + 1, updated_at = ?2 WHERE id = ?1",
        params![task.id, Utc::now().to_rfc3339()],
    )?;
    tx.commit().context("Failed to record success result")?;
    Ok(())
}

/// Append an error result and bump `error_count`, atomically.
pub fn record_error(pool: &Pool, task: &Task, message: &str) -> Result<()> {
    let mut conn = pool.get()?;
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO task_results (
            task_id, url, task_description, status, error_message, executed_at
        ) VALUES (?1, ?2, ?3, 'error', ?4, ?5)",
        params![
            task.id,
            task.url,
            task.task_description,
            message,
            Utc::now().to_rfc3339(),
        ],
    )?;
    tx.execute(
        "UPDATE tasks SET error_count = error_count + 1, updated_at = ?2 WHERE id = ?1",
        params![task.id, Utc::now().to_rfc3339()],
    )?;
    tx.commit().context("Failed to record error result")?;
    Ok(())
}

/// Delete a task and cascade its results. Returns the number of result rows
/// removed, or None when the task is unknown.
pub fn delete_task(pool: &Pool, id: &str) -> Result<Option<usize>> {
    let mut conn = pool.get()?;
    // One transaction, so the count cannot miss a result appended by an
    // in-flight run between the two statements.
    let tx = conn.transaction()?;
    let results: i64 = tx.query_row(
        "SELECT COUNT(*) FROM task_results WHERE task_id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    let changed = tx.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
    tx.commit().context("Failed to delete task")?;
    if changed == 0 {
        return Ok(None);
    }
    Ok(Some(results as usize))
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<ExecutionResult> {
    let status: String = row.get("status")?;
    Ok(ExecutionResult {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        url: row.get("url")?,
        task_description: row.get("task_description")?,
        status: ResultStatus::parse(&status).unwrap_or(ResultStatus::Error),
        analysis: row.get("analysis")?,
        page_title: row.get("page_title")?,
        site_name: row.get("site_name")?,
        generated_at: parse_ts_opt(row.get("generated_at")?),
        error_message: row.get("error_message")?,
        executed_at: parse_ts(row.get("executed_at")?),
    })
}

/// Execution results newest-first, optionally filtered to one task.
pub fn list_results(pool: &Pool, task_id: Option<&str>, limit: usize) -> Result<Vec<ExecutionResult>> {
    let conn = pool.get()?;
    let mut out = Vec::new();

    match task_id {
        Some(task_id) => {
            let mut stmt = conn.prepare(
                "SELECT * FROM task_results WHERE task_id = ?1
                 ORDER BY executed_at DESC, id DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![task_id, limit as i64], result_from_row)?;
            for r in rows {
                out.push(r?);
            }
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT * FROM task_results ORDER BY executed_at DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], result_from_row)?;
            for r in rows {
                out.push(r?);
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pool() -> (tempfile::TempDir, Pool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = open_pool(path.to_str().unwrap()).unwrap();
        (dir, pool)
    }

    fn sample_task(id: &str) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            name: "Task for example.com".to_string(),
            url: "https://example.com/pricing".to_string(),
            task_description: "Summarize pricing".to_string(),
            cron_expr: "0 * * * *".to_string(),
            api_key: "secret".to_string(),
            status: TaskStatus::Active,
            execution_count: 0,
            success_count: 0,
            error_count: 0,
            last_executed: None,
            next_execution: Some(now + chrono::Duration::hours(1)),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_insert_and_get_round_trip() {
        let (_dir, pool) = test_pool();
        let task = sample_task("t1");
        insert_task(&pool, &task).unwrap();

        let loaded = get_task(&pool, "t1").unwrap().unwrap();
        assert_eq!(loaded.url, task.url);
        assert_eq!(loaded.status, TaskStatus::Active);
        assert_eq!(loaded.execution_count, 0);
        assert!(loaded.next_execution.is_some());

        assert!(get_task(&pool, "nope").unwrap().is_none());
    }

    #[test]
    fn test_counters_and_results() {
        let (_dir, pool) = test_pool();
        let task = sample_task("t1");
        insert_task(&pool, &task).unwrap();

        mark_execution_started(&pool, "t1", Utc::now(), None).unwrap();
        record_error(&pool, &task, "fetch failed: HTTP 500").unwrap();

        let loaded = get_task(&pool, "t1").unwrap().unwrap();
        assert_eq!(loaded.execution_count, 1);
        assert_eq!(loaded.error_count, 1);
        assert_eq!(loaded.success_count, 0);
        assert!(loaded.success_count + loaded.error_count <= loaded.execution_count);

        let results = list_results(&pool, Some("t1"), 50).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ResultStatus::Error);
        assert_eq!(results[0].error_message.as_deref(), Some("fetch failed: HTTP 500"));
    }

    #[test]
    fn test_delete_cascades_results() {
        let (_dir, pool) = test_pool();
        let task = sample_task("t1");
        insert_task(&pool, &task).unwrap();
        record_error(&pool, &task, "boom").unwrap();
        record_error(&pool, &task, "boom again").unwrap();

        let removed = delete_task(&pool, "t1").unwrap();
        assert_eq!(removed, Some(2));
        assert!(get_task(&pool, "t1").unwrap().is_none());
        assert!(list_results(&pool, Some("t1"), 50).unwrap().is_empty());

        assert_eq!(delete_task(&pool, "t1").unwrap(), None);
    }

    #[test]
    fn test_list_tasks_newest_first() {
        let (_dir, pool) = test_pool();
        let mut older = sample_task("older");
        older.created_at = Utc::now() - chrono::Duration::hours(1);
        insert_task(&pool, &older).unwrap();
        insert_task(&pool, &sample_task("newer")).unwrap();

        let tasks = list_tasks(&pool).unwrap();
        assert_eq!(tasks[0].id, "newer");
        assert_eq!(tasks[1].id, "older");
    }

    #[test]
    fn test_results_limit_and_order() {
        let (_dir, pool) = test_pool();
        let task = sample_task("t1");
        insert_task(&pool, &task).unwrap();
        for i in 0..5 {
            record_error(&pool, &task, &format!("err {i}")).unwrap();
        }

        let results = list_results(&pool, None, 3).unwrap();
        assert_eq!(results.len(), 3);
        // newest first
        assert_eq!(results[0].error_message.as_deref(), Some("err 4"));
    }
}
