//! SQLite-backed persistence for sessions, conversation turns, goals,
//! checkpoints, scheduled tasks, and LLM usage.
//!
//! One `Store` per process, file `noctua.db` in the project directory.
//! Calls open a connection per operation inside `spawn_blocking`, so the
//! async runtime never blocks on sqlite.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::error::StoreError;
use crate::goals::{Checkpoint, CheckpointStatus, Goal, GoalStatus};
use crate::message::Message;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    channel TEXT NOT NULL,
    permission_mode TEXT,
    created_at TEXT NOT NULL,
    last_active TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS conversation_turns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_turns_session ON conversation_turns(session_id);
CREATE TABLE IF NOT EXISTS goals (
    id TEXT PRIMARY KEY,
    goal TEXT NOT NULL,
    status TEXT NOT NULL,
    current_checkpoint INTEGER NOT NULL DEFAULT 0,
    total_checkpoints INTEGER NOT NULL DEFAULT 0,
    context_summary TEXT NOT NULL DEFAULT '',
    llm_calls INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS checkpoints (
    goal_id TEXT NOT NULL,
    ord INTEGER NOT NULL,
    title TEXT NOT NULL,
    success_criteria TEXT NOT NULL,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    result_summary TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (goal_id, ord)
);
CREATE TABLE IF NOT EXISTS scheduled_tasks (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    cron TEXT NOT NULL,
    tool_name TEXT NOT NULL,
    params TEXT NOT NULL DEFAULT '{}',
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS schedule_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    success INTEGER,
    detail TEXT
);
CREATE TABLE IF NOT EXISTS llm_usage (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    provider TEXT NOT NULL,
    model TEXT NOT NULL,
    task_type TEXT NOT NULL,
    input_tokens INTEGER NOT NULL,
    output_tokens INTEGER NOT NULL,
    cost_usd REAL NOT NULL,
    finish_reason TEXT NOT NULL,
    latency_ms INTEGER NOT NULL,
    fallback_from TEXT NOT NULL DEFAULT '',
    suspected_truncated INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
"#;

/// One row of the `llm_usage` table; produced by the router after each
/// provider call.
#[derive(Clone, Debug)]
pub struct UsageRow {
    pub provider: String,
    pub model: String,
    pub task_type: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub finish_reason: String,
    pub latency_ms: u64,
    pub fallback_from: String,
    pub suspected_truncated: bool,
}

/// A persisted scheduled task (the cron engine itself lives outside the
/// core; `schedule_list` exposes these rows to the model).
#[derive(Clone, Debug)]
pub struct ScheduledTask {
    pub id: String,
    pub name: String,
    pub cron: String,
    pub tool_name: String,
    pub params: String,
    pub enabled: bool,
}

#[derive(Clone)]
pub struct Store {
    db_path: PathBuf,
}

impl Store {
    /// Open (or create) the database and ensure the schema exists.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = Connection::open(&db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { db_path })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            f(&conn)
        })
        .await?
    }

    // ── sessions ────────────────────────────────────────────────

    pub async fn upsert_session(
        &self,
        id: &str,
        user_id: &str,
        channel: &str,
        permission_mode: Option<&str>,
    ) -> Result<(), StoreError> {
        let (id, user_id, channel) = (id.to_string(), user_id.to_string(), channel.to_string());
        let mode = permission_mode.map(str::to_string);
        let now = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, channel, permission_mode, created_at, last_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(id) DO UPDATE SET last_active = ?5, permission_mode = ?4",
                params![id, user_id, channel, mode, now],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn delete_session(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM conversation_turns WHERE session_id = ?1", params![id])?;
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
    }

    // ── conversation turns ──────────────────────────────────────

    pub async fn append_turn(&self, session_id: &str, message: &Message) -> Result<(), StoreError> {
        let session_id = session_id.to_string();
        let (role, content) = message.to_row();
        let now = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO conversation_turns (session_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![session_id, role, content, now],
            )?;
            Ok(())
        })
        .await
    }

    /// Last `limit` turns in chronological order.
    pub async fn load_turns(&self, session_id: &str, limit: u32) -> Result<Vec<Message>, StoreError> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT role, content FROM (
                     SELECT id, role, content FROM conversation_turns
                     WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2
                 ) ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![session_id, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            let mut out = Vec::new();
            for row in rows {
                let (role, content) = row?;
                out.push(Message::from_row(&role, &content));
            }
            Ok(out)
        })
        .await
    }

    pub async fn clear_turns(&self, session_id: &str) -> Result<(), StoreError> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM conversation_turns WHERE session_id = ?1",
                params![session_id],
            )?;
            Ok(())
        })
        .await
    }

    // ── goals ───────────────────────────────────────────────────

    pub async fn insert_goal(&self, goal: &Goal) -> Result<(), StoreError> {
        let g = goal.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO goals (id, goal, status, current_checkpoint, total_checkpoints,
                                    context_summary, llm_calls, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    g.id,
                    g.goal,
                    g.status.as_str(),
                    g.current_checkpoint,
                    g.total_checkpoints,
                    g.context_summary,
                    g.llm_calls,
                    g.created_at.to_rfc3339(),
                    g.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn update_goal(&self, goal: &Goal) -> Result<(), StoreError> {
        let g = goal.clone();
        let now = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE goals SET status = ?2, current_checkpoint = ?3, total_checkpoints = ?4,
                                  context_summary = ?5, llm_calls = ?6, updated_at = ?7
                 WHERE id = ?1",
                params![
                    g.id,
                    g.status.as_str(),
                    g.current_checkpoint,
                    g.total_checkpoints,
                    g.context_summary,
                    g.llm_calls,
                    now,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_goal(&self, id: &str) -> Result<Goal, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, goal, status, current_checkpoint, total_checkpoints,
                        context_summary, llm_calls, created_at, updated_at
                 FROM goals WHERE id = ?1",
            )?;
            let mut rows = stmt.query(params![id.clone()])?;
            match rows.next()? {
                Some(row) => goal_from_row(row),
                None => Err(StoreError::NotFound(format!("goal {}", id))),
            }
        })
        .await
    }

    pub async fn load_goals_by_status(&self, status: GoalStatus) -> Result<Vec<Goal>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, goal, status, current_checkpoint, total_checkpoints,
                        context_summary, llm_calls, created_at, updated_at
                 FROM goals WHERE status = ?1 ORDER BY created_at ASC",
            )?;
            let mut rows = stmt.query(params![status.as_str()])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(goal_from_row(row)?);
            }
            Ok(out)
        })
        .await
    }

    // ── checkpoints ─────────────────────────────────────────────

    pub async fn replace_checkpoints(
        &self,
        goal_id: &str,
        checkpoints: &[Checkpoint],
    ) -> Result<(), StoreError> {
        let goal_id = goal_id.to_string();
        let cps = checkpoints.to_vec();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM checkpoints WHERE goal_id = ?1", params![goal_id])?;
            for cp in &cps {
                conn.execute(
                    "INSERT INTO checkpoints (goal_id, ord, title, success_criteria, status,
                                              attempts, result_summary)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        cp.goal_id,
                        cp.ord,
                        cp.title,
                        cp.success_criteria,
                        cp.status.as_str(),
                        cp.attempts,
                        cp.result_summary,
                    ],
                )?;
            }
            Ok(())
        })
        .await
    }

    pub async fn update_checkpoint(&self, cp: &Checkpoint) -> Result<(), StoreError> {
        let cp = cp.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE checkpoints SET status = ?3, attempts = ?4, result_summary = ?5
                 WHERE goal_id = ?1 AND ord = ?2",
                params![cp.goal_id, cp.ord, cp.status.as_str(), cp.attempts, cp.result_summary],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn load_checkpoints(&self, goal_id: &str) -> Result<Vec<Checkpoint>, StoreError> {
        let goal_id = goal_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT goal_id, ord, title, success_criteria, status, attempts, result_summary
                 FROM checkpoints WHERE goal_id = ?1 ORDER BY ord ASC",
            )?;
            let rows = stmt.query_map(params![goal_id], |row| {
                Ok(Checkpoint {
                    goal_id: row.get(0)?,
                    ord: row.get(1)?,
                    title: row.get(2)?,
                    success_criteria: row.get(3)?,
                    status: CheckpointStatus::parse(&row.get::<_, String>(4)?)
                        .unwrap_or(CheckpointStatus::Pending),
                    attempts: row.get(5)?,
                    result_summary: row.get(6)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })
        .await
    }

    // ── scheduled tasks ─────────────────────────────────────────

    pub async fn add_scheduled_task(&self, task: &ScheduledTask) -> Result<(), StoreError> {
        let t = task.clone();
        let now = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO scheduled_tasks (id, name, cron, tool_name, params, enabled, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![t.id, t.name, t.cron, t.tool_name, t.params, t.enabled as i64, now],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_scheduled_tasks(&self) -> Result<Vec<ScheduledTask>, StoreError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, cron, tool_name, params, enabled
                 FROM scheduled_tasks ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(ScheduledTask {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    cron: row.get(2)?,
                    tool_name: row.get(3)?,
                    params: row.get(4)?,
                    enabled: row.get::<_, i64>(5)? != 0,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
        })
        .await
    }

    pub async fn record_schedule_run(
        &self,
        task_id: &str,
        started_at: DateTime<Utc>,
        success: bool,
        detail: &str,
    ) -> Result<(), StoreError> {
        let task_id = task_id.to_string();
        let detail = detail.to_string();
        let started = started_at.to_rfc3339();
        let finished = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO schedule_runs (task_id, started_at, finished_at, success, detail)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![task_id, started, finished, success as i64, detail],
            )?;
            Ok(())
        })
        .await
    }

    // ── llm usage ───────────────────────────────────────────────

    pub async fn record_usage(&self, row: UsageRow) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO llm_usage (provider, model, task_type, input_tokens, output_tokens,
                                        cost_usd, finish_reason, latency_ms, fallback_from,
                                        suspected_truncated, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    row.provider,
                    row.model,
                    row.task_type,
                    row.input_tokens,
                    row.output_tokens,
                    row.cost_usd,
                    row.finish_reason,
                    row.latency_ms as i64,
                    row.fallback_from,
                    row.suspected_truncated as i64,
                    now,
                ],
            )?;
            Ok(())
        })
        .await
    }
}

fn goal_from_row(row: &rusqlite::Row<'_>) -> Result<Goal, StoreError> {
    let status: String = row.get(2)?;
    let created: String = row.get(7)?;
    let updated: String = row.get(8)?;
    Ok(Goal {
        id: row.get(0)?,
        goal: row.get(1)?,
        status: GoalStatus::parse(&status).unwrap_or(GoalStatus::Failed),
        current_checkpoint: row.get(3)?,
        total_checkpoints: row.get(4)?,
        context_summary: row.get(5)?,
        llm_calls: row.get(6)?,
        created_at: DateTime::parse_from_rfc3339(&created)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&updated)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn temp_store() -> (NamedTempFile, Store) {
        let file = NamedTempFile::new().unwrap();
        let store = Store::new(file.path()).unwrap();
        (file, store)
    }

    #[tokio::test]
    async fn turns_append_and_load_order() {
        let (_file, store) = temp_store();
        store.append_turn("s1", &Message::user("hi")).await.unwrap();
        store
            .append_turn("s1", &Message::assistant("hello"))
            .await
            .unwrap();
        store
            .append_turn("s1", &Message::tool("file_read", "{\"success\":true}"))
            .await
            .unwrap();

        let turns = store.load_turns("s1", 10).await.unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0], Message::user("hi"));
        assert_eq!(turns[1], Message::assistant("hello"));
        assert_eq!(turns[2].role(), "tool");
    }

    #[tokio::test]
    async fn turns_limit_keeps_most_recent() {
        let (_file, store) = temp_store();
        for i in 0..6 {
            store
                .append_turn("s2", &Message::user(format!("m{}", i)))
                .await
                .unwrap();
        }
        let turns = store.load_turns("s2", 2).await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0], Message::user("m4"));
        assert_eq!(turns[1], Message::user("m5"));
    }

    #[tokio::test]
    async fn clear_turns_empties_session_only() {
        let (_file, store) = temp_store();
        store.append_turn("a", &Message::user("x")).await.unwrap();
        store.append_turn("b", &Message::user("y")).await.unwrap();
        store.clear_turns("a").await.unwrap();
        assert!(store.load_turns("a", 10).await.unwrap().is_empty());
        assert_eq!(store.load_turns("b", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn goal_roundtrip_with_checkpoints() {
        let (_file, store) = temp_store();
        let mut goal = Goal::new("ship the release");
        goal.total_checkpoints = 2;
        store.insert_goal(&goal).await.unwrap();

        let cps = vec![
            Checkpoint {
                goal_id: goal.id.clone(),
                ord: 0,
                title: "write changelog".into(),
                success_criteria: "changelog committed".into(),
                status: CheckpointStatus::Complete,
                attempts: 1,
                result_summary: "done".into(),
            },
            Checkpoint {
                goal_id: goal.id.clone(),
                ord: 1,
                title: "tag release".into(),
                success_criteria: "tag pushed".into(),
                status: CheckpointStatus::Pending,
                attempts: 0,
                result_summary: String::new(),
            },
        ];
        store.replace_checkpoints(&goal.id, &cps).await.unwrap();

        goal.current_checkpoint = 1;
        store.update_goal(&goal).await.unwrap();

        let loaded = store.get_goal(&goal.id).await.unwrap();
        assert_eq!(loaded.current_checkpoint, 1);
        assert_eq!(loaded.status, GoalStatus::Active);

        let loaded_cps = store.load_checkpoints(&goal.id).await.unwrap();
        assert_eq!(loaded_cps.len(), 2);
        assert_eq!(loaded_cps[0].status, CheckpointStatus::Complete);
        assert_eq!(loaded_cps[1].status, CheckpointStatus::Pending);

        let active = store.load_goals_by_status(GoalStatus::Active).await.unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn usage_rows_insert() {
        let (_file, store) = temp_store();
        store
            .record_usage(UsageRow {
                provider: "openai".into(),
                model: "gpt-test".into(),
                task_type: "planning".into(),
                input_tokens: 100,
                output_tokens: 20,
                cost_usd: 0.001,
                finish_reason: "stop".into(),
                latency_ms: 420,
                fallback_from: String::new(),
                suspected_truncated: false,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn scheduled_tasks_roundtrip_with_runs() {
        let (_file, store) = temp_store();
        store
            .add_scheduled_task(&ScheduledTask {
                id: "st1".into(),
                name: "nightly digest".into(),
                cron: "0 7 * * *".into(),
                tool_name: "shell_execute".into(),
                params: "{}".into(),
                enabled: true,
            })
            .await
            .unwrap();

        let tasks = store.list_scheduled_tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "nightly digest");
        assert!(tasks[0].enabled);

        store
            .record_schedule_run("st1", Utc::now(), true, "ok")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_goal_is_not_found() {
        let (_file, store) = temp_store();
        assert!(matches!(
            store.get_goal("nope").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
