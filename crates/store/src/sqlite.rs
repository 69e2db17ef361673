//! SQLite store with FTS5-ranked tool relevance.
//!
//! Tables:
//! - `threads`: thread configuration
//! - `messages`: append-only transcript, ordered by insertion
//! - `tools`: registered base tools plus their execution statistics
//! - `tools_fts`: FTS5 index over tool name, description and document
//!
//! Triggers keep the FTS index in sync on insert/delete/update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use toolchat_core::error::StoreError;
use toolchat_core::message::{Message, MessageToolCall, Role};
use toolchat_core::store::{MessageStore, ThreadStore, ToolStore};
use toolchat_core::thread::Thread;
use toolchat_core::tool::{AuthType, BaseTool, ToolStats};
use tracing::{debug, info};

use crate::keywords;

/// A production SQLite store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // An in-memory database exists per connection, so keep exactly one.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements: [(&str, &str); 9] = [
            (
                "threads table",
                r#"
                CREATE TABLE IF NOT EXISTS threads (
                    id                TEXT PRIMARY KEY,
                    name              TEXT NOT NULL,
                    model             TEXT,
                    system_prompt     TEXT,
                    memory_enabled    INTEGER NOT NULL DEFAULT 0,
                    memory            TEXT NOT NULL DEFAULT '',
                    memory_max_tokens INTEGER NOT NULL,
                    max_input_tokens  INTEGER,
                    created_at        TEXT NOT NULL
                )
                "#,
            ),
            (
                "messages table",
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    iid          INTEGER PRIMARY KEY AUTOINCREMENT,
                    id           TEXT UNIQUE NOT NULL,
                    thread_id    TEXT,
                    role         TEXT NOT NULL,
                    content      TEXT,
                    tool_calls   TEXT NOT NULL DEFAULT '[]',
                    tool_call_id TEXT,
                    created_at   TEXT NOT NULL
                )
                "#,
            ),
            (
                "messages thread index",
                "CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id, iid)",
            ),
            (
                "tools table",
                r#"
                CREATE TABLE IF NOT EXISTS tools (
                    iid            INTEGER PRIMARY KEY AUTOINCREMENT,
                    id             TEXT UNIQUE NOT NULL,
                    name           TEXT NOT NULL,
                    description    TEXT NOT NULL DEFAULT '',
                    schema         TEXT NOT NULL,
                    auth_type      TEXT NOT NULL DEFAULT 'None',
                    credential     TEXT,
                    count          INTEGER NOT NULL DEFAULT 0,
                    success_count  INTEGER NOT NULL DEFAULT 0,
                    avg_latency_ms REAL NOT NULL DEFAULT 0.0,
                    created_at     TEXT NOT NULL
                )
                "#,
            ),
            (
                "tools FTS5 table",
                r#"
                CREATE VIRTUAL TABLE IF NOT EXISTS tools_fts USING fts5(
                    name,
                    description,
                    schema,
                    content='tools',
                    content_rowid='iid',
                    tokenize='porter unicode61'
                )
                "#,
            ),
            (
                "tools insert trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS tools_ai AFTER INSERT ON tools BEGIN
                    INSERT INTO tools_fts(rowid, name, description, schema)
                    VALUES (new.iid, new.name, new.description, new.schema);
                END
                "#,
            ),
            (
                "tools delete trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS tools_ad AFTER DELETE ON tools BEGIN
                    INSERT INTO tools_fts(tools_fts, rowid, name, description, schema)
                    VALUES ('delete', old.iid, old.name, old.description, old.schema);
                END
                "#,
            ),
            (
                // Statistics updates don't touch indexed columns.
                "tools update trigger",
                r#"
                CREATE TRIGGER IF NOT EXISTS tools_au AFTER UPDATE OF name, description, schema ON tools BEGIN
                    INSERT INTO tools_fts(tools_fts, rowid, name, description, schema)
                    VALUES ('delete', old.iid, old.name, old.description, old.schema);
                    INSERT INTO tools_fts(rowid, name, description, schema)
                    VALUES (new.iid, new.name, new.description, new.schema);
                END
                "#,
            ),
            (
                "tools created_at index",
                "CREATE INDEX IF NOT EXISTS idx_tools_created_at ON tools(created_at DESC)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Build a safe FTS5 query from free text.
    ///
    /// Each term is quoted to prevent injection and prefix-matched; terms are
    /// OR-ed so a long conversation excerpt still matches partially.
    fn fts_query(text: &str) -> String {
        keywords::extract(text)
            .into_iter()
            .map(|w| format!("\"{w}\"*"))
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    fn row_to_message(row: &SqliteRow) -> Result<Message, StoreError> {
        let role_str: String = column(row, "role")?;
        let role = Role::parse(&role_str)
            .ok_or_else(|| StoreError::QueryFailed(format!("unknown role '{role_str}'")))?;
        let tool_calls_json: String = column(row, "tool_calls")?;
        let tool_calls: Vec<MessageToolCall> = serde_json::from_str(&tool_calls_json)
            .map_err(|e| StoreError::QueryFailed(format!("tool_calls column: {e}")))?;

        Ok(Message {
            id: column(row, "id")?,
            role,
            content: column(row, "content")?,
            tool_calls,
            tool_call_id: column(row, "tool_call_id")?,
            thread_id: column(row, "thread_id")?,
            created_at: parse_time(&column::<String>(row, "created_at")?),
        })
    }

    fn row_to_thread(row: &SqliteRow) -> Result<Thread, StoreError> {
        let memory_max_tokens: i64 = column(row, "memory_max_tokens")?;
        let max_input_tokens: Option<i64> = column(row, "max_input_tokens")?;

        Ok(Thread {
            id: column(row, "id")?,
            name: column(row, "name")?,
            model: column(row, "model")?,
            system_prompt: column(row, "system_prompt")?,
            memory_enabled: column::<i64>(row, "memory_enabled")? != 0,
            memory: column(row, "memory")?,
            memory_max_tokens: memory_max_tokens.max(0) as usize,
            max_input_tokens: max_input_tokens.map(|t| t.max(0) as usize),
            created_at: parse_time(&column::<String>(row, "created_at")?),
        })
    }

    fn row_to_tool(row: &SqliteRow) -> Result<BaseTool, StoreError> {
        let count: i64 = column(row, "count")?;
        let success_count: i64 = column(row, "success_count")?;

        Ok(BaseTool {
            id: column(row, "id")?,
            name: column(row, "name")?,
            description: column(row, "description")?,
            schema: column(row, "schema")?,
            auth_type: AuthType::from(column::<String>(row, "auth_type")?),
            credential: column(row, "credential")?,
            stats: ToolStats {
                count: count.max(0) as u64,
                success_count: success_count.max(0) as u64,
                avg_latency_ms: column(row, "avg_latency_ms")?,
            },
            created_at: parse_time(&column::<String>(row, "created_at")?),
        })
    }

    async fn recent_tools(&self, limit: usize) -> Result<Vec<BaseTool>, StoreError> {
        let rows = sqlx::query("SELECT * FROM tools ORDER BY iid DESC LIMIT ?1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("recent tools: {e}")))?;
        rows.iter().map(Self::row_to_tool).collect()
    }
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create_message(&self, message: &Message) -> Result<(), StoreError> {
        let tool_calls = serde_json::to_string(&message.tool_calls)
            .map_err(|e| StoreError::Storage(format!("tool_calls serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, thread_id, role, content, tool_calls, tool_call_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                thread_id = excluded.thread_id,
                role = excluded.role,
                content = excluded.content,
                tool_calls = excluded.tool_calls,
                tool_call_id = excluded.tool_call_id
            "#,
        )
        .bind(&message.id)
        .bind(&message.thread_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&tool_calls)
        .bind(&message.tool_call_id)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT message failed: {e}")))?;

        debug!(message_id = %message.id, role = message.role.as_str(), "Stored message");
        Ok(())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query("SELECT * FROM messages WHERE thread_id = ?1 ORDER BY iid")
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("list messages: {e}")))?;
        rows.iter().map(Self::row_to_message).collect()
    }
}

#[async_trait]
impl ThreadStore for SqliteStore {
    async fn get_thread(&self, id: &str) -> Result<Option<Thread>, StoreError> {
        let row = sqlx::query("SELECT * FROM threads WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET thread: {e}")))?;

        row.as_ref().map(Self::row_to_thread).transpose()
    }

    async fn create_thread(&self, thread: &Thread) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO threads (id, name, model, system_prompt, memory_enabled, memory,
                                 memory_max_tokens, max_input_tokens, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                model = excluded.model,
                system_prompt = excluded.system_prompt,
                memory_enabled = excluded.memory_enabled,
                memory = excluded.memory,
                memory_max_tokens = excluded.memory_max_tokens,
                max_input_tokens = excluded.max_input_tokens
            "#,
        )
        .bind(&thread.id)
        .bind(&thread.name)
        .bind(&thread.model)
        .bind(&thread.system_prompt)
        .bind(thread.memory_enabled as i64)
        .bind(&thread.memory)
        .bind(thread.memory_max_tokens as i64)
        .bind(thread.max_input_tokens.map(|t| t as i64))
        .bind(thread.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT thread failed: {e}")))?;

        debug!(thread_id = %thread.id, "Stored thread");
        Ok(())
    }
}

#[async_trait]
impl ToolStore for SqliteStore {
    async fn create_tool(&self, tool: &BaseTool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tools (id, name, description, schema, auth_type, credential,
                               count, success_count, avg_latency_ms, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                schema = excluded.schema,
                auth_type = excluded.auth_type,
                credential = excluded.credential
            "#,
        )
        .bind(&tool.id)
        .bind(&tool.name)
        .bind(&tool.description)
        .bind(&tool.schema)
        .bind(tool.auth_type.as_str())
        .bind(&tool.credential)
        .bind(tool.stats.count as i64)
        .bind(tool.stats.success_count as i64)
        .bind(tool.stats.avg_latency_ms)
        .bind(tool.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT tool failed: {e}")))?;

        debug!(tool_id = %tool.id, tool = %tool.name, "Stored tool");
        Ok(())
    }

    async fn get_tool(&self, id: &str) -> Result<Option<BaseTool>, StoreError> {
        let row = sqlx::query("SELECT * FROM tools WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET tool: {e}")))?;

        row.as_ref().map(Self::row_to_tool).transpose()
    }

    async fn list_tools(&self) -> Result<Vec<BaseTool>, StoreError> {
        let rows = sqlx::query("SELECT * FROM tools ORDER BY iid")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("list tools: {e}")))?;
        rows.iter().map(Self::row_to_tool).collect()
    }

    async fn tools_by_prompt(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<BaseTool>, StoreError> {
        let fts_query = Self::fts_query(query);
        if fts_query.is_empty() {
            return self.recent_tools(limit).await;
        }

        let rows = sqlx::query(
            r#"
            SELECT t.*, bm25(tools_fts) AS rank
            FROM tools_fts f
            JOIN tools t ON t.iid = f.rowid
            WHERE tools_fts MATCH ?1
            ORDER BY rank
            LIMIT ?2
            "#,
        )
        .bind(&fts_query)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("FTS5 tool search: {e}")))?;

        rows.iter().map(Self::row_to_tool).collect()
    }

    async fn record_execution(
        &self,
        tool_id: &str,
        latency_ms: u64,
        success: bool,
    ) -> Result<(), StoreError> {
        // SQLite evaluates every SET expression against the old row.
        let result = sqlx::query(
            r#"
            UPDATE tools SET
                avg_latency_ms = (avg_latency_ms * count + ?2) / (count + 1),
                count = count + 1,
                success_count = success_count + ?3
            WHERE id = ?1
            "#,
        )
        .bind(tool_id)
        .bind(latency_ms as f64)
        .bind(success as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE tool stats failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("tool {tool_id}")));
        }
        Ok(())
    }
}
