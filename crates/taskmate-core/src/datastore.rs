use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::record::{FocusSession, Task};
use crate::source::{RecordSink, RecordSource};

/// Local stand-in for the hosted backend: one JSON document per line.
///
/// A line that is not JSON fails the load. A JSON document that does not fit
/// the record schema is skipped with a warning.
#[derive(Debug, Clone)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub sessions_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let sessions_path = data_dir.join("sessions.data");

        if !tasks_path.exists() {
            fs::write(&tasks_path, "")?;
        }
        if !sessions_path.exists() {
            fs::write(&sessions_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            sessions = %sessions_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            sessions_path,
        })
    }

    /// Loads every task, reconciling `completed` with `status`.
    #[tracing::instrument(skip(self))]
    pub fn load_tasks(&self) -> anyhow::Result<Vec<Task>> {
        load_tasks_from(&self.tasks_path)
    }

    #[tracing::instrument(skip(self))]
    pub fn load_sessions(&self) -> anyhow::Result<Vec<FocusSession>> {
        load_jsonl(&self.sessions_path).context("failed to load sessions.data")
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }

    #[tracing::instrument(skip(self, session), fields(id = %session.id))]
    pub fn append_session(&self, session: &FocusSession) -> anyhow::Result<()> {
        let mut sessions = self.load_sessions()?;
        sessions.push(session.clone());
        save_jsonl_atomic(&self.sessions_path, &sessions).context("failed to save sessions.data")?;
        debug!(count = sessions.len(), "session appended");
        Ok(())
    }
}

impl RecordSource for DataStore {
    async fn fetch_tasks(&self) -> anyhow::Result<Vec<Task>> {
        let path = self.tasks_path.clone();
        tokio::task::spawn_blocking(move || load_tasks_from(&path))
            .await
            .map_err(|err| anyhow!("task loader did not finish: {err}"))?
    }

    async fn fetch_sessions(&self) -> anyhow::Result<Vec<FocusSession>> {
        let path = self.sessions_path.clone();
        tokio::task::spawn_blocking(move || {
            load_jsonl(&path).context("failed to load sessions.data")
        })
        .await
        .map_err(|err| anyhow!("session loader did not finish: {err}"))?
    }
}

impl RecordSink for DataStore {
    fn record_session(&self, session: &FocusSession) -> anyhow::Result<()> {
        self.append_session(session)
    }
}

fn load_tasks_from(path: &Path) -> anyhow::Result<Vec<Task>> {
    let mut tasks: Vec<Task> = load_jsonl(path).context("failed to load tasks.data")?;
    let reconciled = tasks.iter_mut().map(Task::normalize).filter(|changed| *changed).count();
    if reconciled > 0 {
        debug!(reconciled, "reconciled completion signals on load");
    }
    Ok(tasks)
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    let mut skipped = 0usize;
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let document: serde_json::Value = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        match serde_json::from_value::<T>(document) {
            Ok(record) => out.push(record),
            Err(err) => {
                skipped += 1;
                warn!(
                    file = %path.display(),
                    line = idx + 1,
                    error = %err,
                    "skipping record that does not match the schema"
                );
            }
        }
    }

    debug!(count = out.len(), skipped, "loaded records from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
