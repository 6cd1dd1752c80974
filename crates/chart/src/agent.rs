//! Tabular question answering over a SQLite database.

use crate::sandbox::first_block;
use async_trait::async_trait;
use ragchart_core::{AppError, AppResult, DatabaseSettings};
use ragchart_llm::LlmClient;
use ragchart_prompt::{ids, PromptLibrary};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use sqlparser::ast::Statement;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Final text of a tabular agent run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularAnswer {
    pub output: String,
}

/// Answers a question from structured data.
#[async_trait]
pub trait TabularAgent: Send + Sync {
    async fn invoke(&self, question: &str) -> AppResult<TabularAnswer>;
}

/// Rows returned by one query, rendered as text.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRows {
    pub text: String,
    pub count: usize,
    pub truncated: bool,
}

/// Agent that writes one read-only query, runs it and summarizes the rows.
///
/// A query that fails to parse or execute is fed back to the model and
/// retried, up to `max_steps` attempts.
pub struct SqlAgent {
    conn: Arc<Mutex<Connection>>,
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLibrary>,
    model: String,
    max_rows: usize,
    max_steps: usize,
}

impl SqlAgent {
    /// Open `path` read-only.
    pub fn open(
        path: &Path,
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLibrary>,
        model: impl Into<String>,
        settings: &DatabaseSettings,
    ) -> AppResult<Self> {
        if !path.exists() {
            return Err(AppError::Config(format!(
                "database not found: {}",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        tracing::debug!("Opened tabular database {}", path.display());

        Self::from_connection(conn, llm, prompts, model, settings)
    }

    pub fn from_connection(
        conn: Connection,
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptLibrary>,
        model: impl Into<String>,
        settings: &DatabaseSettings,
    ) -> AppResult<Self> {
        if settings.max_steps == 0 || settings.max_rows == 0 {
            return Err(AppError::Config(
                "database maxSteps and maxRows must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            llm,
            prompts,
            model: model.into(),
            max_rows: settings.max_rows,
            max_steps: settings.max_steps,
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> AppResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| AppError::Database("database lock poisoned".to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| AppError::Database(format!("database task failed: {}", e)))?
    }

    /// CREATE statements of every table and view.
    pub async fn schema(&self) -> AppResult<String> {
        self.with_conn(read_schema).await
    }

    /// Run a validated query, keeping at most `max_rows` rows.
    pub async fn run_query(&self, sql: &str) -> AppResult<QueryRows> {
        let sql = sql.to_string();
        let max_rows = self.max_rows;
        self.with_conn(move |conn| query_rows(conn, &sql, max_rows))
            .await
    }

    /// Ask for one query and try it. The outer error is a model or prompt
    /// failure; the inner one is a rejected query worth retrying.
    async fn attempt(
        &self,
        schema: &str,
        question: &str,
        feedback: &str,
    ) -> AppResult<(String, AppResult<QueryRows>)> {
        let max_rows = self.max_rows.to_string();
        let prompt = self.prompts.render(
            ids::AGENT_SQL,
            &[
                ("schema", schema),
                ("question", question),
                ("max_rows", &max_rows),
                ("feedback", feedback),
            ],
        )?;
        let reply = self.llm.complete(&prompt.into_request(self.model.as_str())).await?;

        let sql = first_block(&reply.content, &["sql", ""])?
            .unwrap_or_else(|| reply.content.trim().to_string());
        let rows = match validate_query(&sql) {
            Ok(()) => self.run_query(&sql).await,
            Err(e) => Err(e),
        };
        Ok((sql, rows))
    }

    async fn summarize(&self, question: &str, sql: &str, rows: &QueryRows) -> AppResult<String> {
        let prompt = self.prompts.render(
            ids::AGENT_ANSWER,
            &[("question", question), ("query", sql), ("rows", &rows.text)],
        )?;
        let reply = self.llm.complete(&prompt.into_request(self.model.as_str())).await?;
        Ok(reply.content.trim().to_string())
    }
}

#[async_trait]
impl TabularAgent for SqlAgent {
    async fn invoke(&self, question: &str) -> AppResult<TabularAnswer> {
        let schema = self.schema().await?;
        if schema.is_empty() {
            return Err(AppError::Database("database has no tables".to_string()));
        }

        let mut feedback = String::new();
        let mut last_error = String::new();

        for step in 1..=self.max_steps {
            let (sql, result) = self.attempt(&schema, question, &feedback).await?;
            match result {
                Ok(rows) => {
                    tracing::info!(
                        step,
                        rows = rows.count,
                        truncated = rows.truncated,
                        "Tabular query succeeded"
                    );
                    let output = self.summarize(question, &sql, &rows).await?;
                    return Ok(TabularAnswer { output });
                }
                Err(e) => {
                    tracing::warn!(step, "Tabular query rejected: {}", e);
                    feedback = format!("Query:\n{}\nError: {}", sql, e);
                    last_error = e.to_string();
                }
            }
        }

        Err(AppError::Database(format!(
            "no valid query after {} attempts: {}",
            self.max_steps, last_error
        )))
    }
}

/// Accept exactly one SELECT or WITH statement.
pub fn validate_query(sql: &str) -> AppResult<()> {
    let statements = Parser::parse_sql(&SQLiteDialect {}, sql)
        .map_err(|e| AppError::Database(format!("failed to parse SQL: {}", e)))?;

    if statements.len() != 1 {
        return Err(AppError::Database(format!(
            "expected exactly one SQL statement, got {}",
            statements.len()
        )));
    }

    match &statements[0] {
        Statement::Query(_) => Ok(()),
        other => Err(AppError::Database(format!(
            "only read-only queries are allowed: {}",
            other
        ))),
    }
}

fn read_schema(conn: &Connection) -> AppResult<String> {
    let mut stmt = conn.prepare(
        "SELECT sql FROM sqlite_master
         WHERE type IN ('table', 'view') AND sql IS NOT NULL AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;
    let statements = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(statements.join(";\n\n"))
}

fn query_rows(conn: &Connection, sql: &str, max_rows: usize) -> AppResult<QueryRows> {
    let mut stmt = conn.prepare(sql)?;
    if !stmt.readonly() {
        return Err(AppError::Database(
            "query would modify the database".to_string(),
        ));
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut lines = vec![columns.join(" | ")];
    let mut count = 0;
    let mut truncated = false;

    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        if count == max_rows {
            truncated = true;
            break;
        }
        let mut cells = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            cells.push(format_cell(row.get_ref(i)?));
        }
        lines.push(cells.join(" | "));
        count += 1;
    }

    Ok(QueryRows {
        text: lines.join("\n"),
        count,
        truncated,
    })
}

fn format_cell(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => format!("<blob {} bytes>", bytes.len()),
    }
}
