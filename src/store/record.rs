use std::future::Future;
use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::{params, Connection};
use tokio::sync::oneshot;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{Finding, SessionReport};

/// Columns the deployed schema may legitimately lack. A findings insert that
/// trips over one of these is retried exactly once with all of them omitted.
const OPTIONAL_FINDING_COLUMNS: &[&str] = &["citation"];

/// Structured persistence collaborator for findings and the per-session
/// report.
pub trait RecordStore: Send + Sync {
    fn insert_findings(
        &self,
        session_id: String,
        findings: Vec<Finding>,
    ) -> impl Future<Output = PipelineResult<()>> + Send;

    /// Insert-or-replace keyed by session id; reprocessing a session must
    /// never create a second report row.
    fn upsert_report(
        &self,
        report: SessionReport,
    ) -> impl Future<Output = PipelineResult<()>> + Send;
}

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct StoreInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("failed to send shutdown to record store thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("failed to join record store thread: {join_err:?}");
            }
        }
    }
}

/// SQLite-backed record store. All access goes through one dedicated worker
/// thread so async callers never block on the connection.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<StoreInner>,
}

impl SqliteStore {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("sitecheck-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("failed to enable WAL mode: {err}");
                }

                let init_result = run_migrations(&conn).context("failed to run migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("record store receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => task(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }

                info!("record store thread shutting down");
            })
            .with_context(|| "failed to spawn record store worker thread")?;

        ready_rx
            .recv()
            .context("record store worker exited before signaling readiness")??;

        info!("record store initialized at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(StoreInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("record store caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to record store thread: {err}"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("record store thread terminated unexpectedly"))?
    }
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS findings (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            item_id TEXT NOT NULL,
            frame_index INTEGER,
            description TEXT NOT NULL,
            category TEXT,
            severity TEXT,
            confidence REAL NOT NULL,
            citation TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_findings_session ON findings(session_id);
        CREATE TABLE IF NOT EXISTS reports (
            session_id TEXT PRIMARY KEY,
            generated_at TEXT NOT NULL,
            summary_json TEXT NOT NULL,
            findings_json TEXT NOT NULL,
            document_url TEXT
        );",
    )
    .context("failed to create tables")?;
    Ok(())
}

fn insert_finding_full(conn: &Connection, session_id: &str, finding: &Finding) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR REPLACE INTO findings
            (id, session_id, item_id, frame_index, description, category, severity, confidence, citation)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            finding.id,
            session_id,
            finding.source.item_id,
            finding.source.frame_index.map(|i| i as i64),
            finding.description,
            finding.category.map(|c| c.as_str()),
            finding.severity.map(|s| s.as_str()),
            finding.confidence,
            finding.citation,
        ],
    )
}

fn insert_finding_without_optional(
    conn: &Connection,
    session_id: &str,
    finding: &Finding,
) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR REPLACE INTO findings
            (id, session_id, item_id, frame_index, description, category, severity, confidence)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            finding.id,
            session_id,
            finding.source.item_id,
            finding.source.frame_index.map(|i| i as i64),
            finding.description,
            finding.category.map(|c| c.as_str()),
            finding.severity.map(|s| s.as_str()),
            finding.confidence,
        ],
    )
}

fn is_optional_column_mismatch(err: &rusqlite::Error) -> bool {
    let message = err.to_string();
    OPTIONAL_FINDING_COLUMNS
        .iter()
        .any(|column| message.contains(column))
}

impl RecordStore for SqliteStore {
    fn insert_findings(
        &self,
        session_id: String,
        findings: Vec<Finding>,
    ) -> impl Future<Output = PipelineResult<()>> + Send {
        let store = self.clone();
        async move {
            store
                .execute(move |conn| {
                    for finding in &findings {
                        if let Err(err) = insert_finding_full(conn, &session_id, finding) {
                            if is_optional_column_mismatch(&err) {
                                insert_finding_without_optional(conn, &session_id, finding)
                                    .with_context(|| "retry insert without optional columns")?;
                            } else {
                                return Err(anyhow!("failed to insert finding: {err}"));
                            }
                        }
                    }
                    Ok(())
                })
                .await
                .map_err(|err| PipelineError::Persistence(format!("{err:#}")))
        }
    }

    fn upsert_report(
        &self,
        report: SessionReport,
    ) -> impl Future<Output = PipelineResult<()>> + Send {
        let store = self.clone();
        async move {
            store
                .execute(move |conn| {
                    let summary_json = serde_json::to_string(&report.summary)?;
                    let findings_json = serde_json::to_string(&report.findings)?;
                    conn.execute(
                        "INSERT INTO reports (session_id, generated_at, summary_json, findings_json, document_url)
                         VALUES (?1, ?2, ?3, ?4, ?5)
                         ON CONFLICT(session_id) DO UPDATE SET
                            generated_at = excluded.generated_at,
                            summary_json = excluded.summary_json,
                            findings_json = excluded.findings_json,
                            document_url = excluded.document_url",
                        params![
                            report.session_id,
                            report.generated_at.to_rfc3339(),
                            summary_json,
                            findings_json,
                            report.document_url,
                        ],
                    )
                    .with_context(|| "failed to upsert session report")?;
                    Ok(())
                })
                .await
                .map_err(|err| PipelineError::Persistence(format!("{err:#}")))
        }
    }
}

/// In-memory fake for tests.
#[cfg(test)]
pub mod fake {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryRecordStore {
        pub findings: Mutex<Vec<(String, Finding)>>,
        pub reports: Mutex<HashMap<String, SessionReport>>,
    }

    impl RecordStore for MemoryRecordStore {
        fn insert_findings(
            &self,
            session_id: String,
            findings: Vec<Finding>,
        ) -> impl Future<Output = PipelineResult<()>> + Send {
            let mut stored = self.findings.lock().unwrap();
            for finding in findings {
                stored.push((session_id.clone(), finding));
            }
            async { Ok(()) }
        }

        fn upsert_report(
            &self,
            report: SessionReport,
        ) -> impl Future<Output = PipelineResult<()>> + Send {
            self.reports
                .lock()
                .unwrap()
                .insert(report.session_id.clone(), report);
            async { Ok(()) }
        }
    }
}
