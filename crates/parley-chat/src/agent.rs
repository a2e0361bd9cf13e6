//! Structured-query execution agent.
//!
//! An agent receives a natural-language instruction (or, after a correction,
//! a ready query) and the tenant's data source, runs a query against it and
//! returns the raw result as text. `SqliteAgent` is the concrete agent for
//! SQLite data sources.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info, warn};

use crate::error::ExecutionError;
use crate::llm::TextGenerator;
use crate::prompts;

/// Handle to the physical data source of one logical database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSource {
    pub tenant: String,
    pub database: String,
    pub path: PathBuf,
}

/// What an agent is asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentInput<'a> {
    /// Combined instruction: context, schema, question and clarifications.
    Instruction(&'a str),
    /// Query text from the correction step, run without regeneration.
    Query(&'a str),
}

impl<'a> AgentInput<'a> {
    pub fn text(&self) -> &'a str {
        match *self {
            AgentInput::Instruction(text) | AgentInput::Query(text) => text,
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(self, AgentInput::Query(_))
    }
}

/// Runs instructions against a data source.
///
/// Dropping the returned future must stop any work it started.
#[async_trait]
pub trait QueryAgent: Send + Sync {
    async fn run(&self, input: AgentInput<'_>, source: &DataSource) -> Result<String, ExecutionError>;
}

// =============================================================================
// Query extraction
// =============================================================================

// Compiled once; constant patterns.
static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").expect("Invalid fence regex"));

static READ_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(select|with)\b").expect("Invalid read-only regex"));

/// Pull a read-only query out of generated `text`.
///
/// Code fences are stripped and a trailing `;` is dropped. Returns `None`
/// unless what remains starts with `SELECT` or `WITH`.
pub fn extract_sql(text: &str) -> Option<String> {
    let body = FENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);

    let sql = body.trim().trim_end_matches(';').trim();
    if READ_ONLY.is_match(sql) {
        Some(sql.to_string())
    } else {
        None
    }
}

/// Reject queries carrying more than one statement.
///
/// Semicolons inside string literals, quoted identifiers and comments are
/// ignored, as is a final semicolon followed only by blanks or comments.
pub fn ensure_single_statement(sql: &str) -> Result<(), ExecutionError> {
    if has_second_statement(sql) {
        return Err(ExecutionError::Rejected(
            "only a single statement may be executed".to_string(),
        ));
    }
    Ok(())
}

fn has_second_statement(sql: &str) -> bool {
    let bytes = sql.as_bytes();
    let mut ended = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = find_from(bytes, i + 2, b"\n").map_or(bytes.len(), |end| end + 1);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = find_from(bytes, i + 2, b"*/").map_or(bytes.len(), |end| end + 2);
            }
            _ if ended && !bytes[i].is_ascii_whitespace() => return true,
            quote @ (b'\'' | b'"' | b'`') => i = skip_quoted(bytes, i + 1, quote),
            b'[' => i = find_from(bytes, i + 1, b"]").map_or(bytes.len(), |end| end + 1),
            b';' => {
                ended = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    false
}

/// Index just past the closing `quote`; doubled quotes are escapes.
fn skip_quoted(bytes: &[u8], mut i: usize, quote: u8) -> usize {
    while i < bytes.len() {
        if bytes[i] == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn find_from(bytes: &[u8], start: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(start..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| start + pos)
}

// =============================================================================
// SqliteAgent
// =============================================================================

/// SQLite virtual machine steps between cancellation checks.
const PROGRESS_STEPS: i32 = 1_000;

/// Agent that turns instructions into SQLite queries and runs them read-only.
///
/// Instructions always go through the generator; only `AgentInput::Query`
/// runs as given.
pub struct SqliteAgent {
    generator: Arc<dyn TextGenerator>,
    max_rows: usize,
}

impl SqliteAgent {
    pub fn new(generator: Arc<dyn TextGenerator>, max_rows: usize) -> Self {
        Self {
            generator,
            max_rows: max_rows.max(1),
        }
    }

    async fn to_sql(&self, input: AgentInput<'_>) -> Result<String, ExecutionError> {
        let text = match input {
            AgentInput::Query(query) => {
                return extract_sql(query).ok_or_else(|| {
                    ExecutionError::Rejected(format!(
                        "corrected text is not a read-only query: {}",
                        query.trim()
                    ))
                });
            }
            AgentInput::Instruction(instruction) => self
                .generator
                .generate(&prompts::sql_generation(instruction))
                .await
                .map_err(|e| ExecutionError::Generation(e.to_string()))?,
        };

        extract_sql(&text).ok_or_else(|| {
            ExecutionError::Rejected(format!(
                "generated text is not a read-only query: {}",
                text.trim()
            ))
        })
    }
}

/// Flags the running query as cancelled when dropped.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl QueryAgent for SqliteAgent {
    async fn run(&self, input: AgentInput<'_>, source: &DataSource) -> Result<String, ExecutionError> {
        let sql = self.to_sql(input).await?;
        ensure_single_statement(&sql)?;
        debug!(tenant = %source.tenant, database = %source.database, sql = %sql, "Running query");

        let path = source.path.clone();
        let max_rows = self.max_rows;
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        // A timeout drops this future; the guard then stops the blocking query.
        let _cancel = CancelOnDrop(cancelled);
        let result = tokio::task::spawn_blocking(move || run_query(&path, &sql, max_rows, flag))
            .await
            .map_err(|e| ExecutionError::Query(format!("query task failed: {}", e)))??;

        info!(tenant = %source.tenant, database = %source.database, "Query succeeded");
        Ok(result)
    }
}

fn run_query(
    path: &Path,
    sql: &str,
    max_rows: usize,
    cancelled: Arc<AtomicBool>,
) -> Result<String, ExecutionError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| ExecutionError::DataSource(format!("{}: {}", path.display(), e)))?;

    let flag = Arc::clone(&cancelled);
    conn.progress_handler(PROGRESS_STEPS, Some(move || flag.load(Ordering::Relaxed)));

    let query_err = |e: rusqlite::Error| {
        if cancelled.load(Ordering::Relaxed) {
            warn!(path = %path.display(), "Query interrupted");
            ExecutionError::Query("query interrupted".to_string())
        } else {
            ExecutionError::Query(e.to_string())
        }
    };

    let mut stmt = conn.prepare(sql).map_err(query_err)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = columns.len();

    let mut lines = vec![columns.join(" | ")];
    let mut rows = stmt.query([]).map_err(query_err)?;

    let mut count = 0usize;
    let mut truncated = false;
    while let Some(row) = rows.next().map_err(query_err)? {
        if count == max_rows {
            truncated = true;
            break;
        }
        let mut cells = Vec::with_capacity(width);
        for i in 0..width {
            let value = row.get_ref(i).map_err(query_err)?;
            cells.push(render_value(value));
        }
        lines.push(cells.join(" | "));
        count += 1;
    }

    if count == 0 {
        lines.push("(no rows)".to_string());
    }
    if truncated {
        lines.push(format!("... (showing first {} rows)", max_rows));
    }
    Ok(lines.join("\n"))
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}
