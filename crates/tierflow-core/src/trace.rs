//! Append-only JSONL persistence for run traces.
//!
//! One JSON object per line. Appends are idempotent per `run_id`: loads
//! dedup on the id, last write wins. Write failures are reported to the
//! caller, who logs and continues; persistence never fails a run.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tierflow_models::RunTrace;
use tracing::warn;

use crate::error::Result;

const TRACE_FILE_NAME: &str = "traces.jsonl";

/// Directory-scoped JSONL trace store.
pub struct TraceStore {
    dir: PathBuf,
}

impl TraceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_path(&self) -> PathBuf {
        self.dir.join(TRACE_FILE_NAME)
    }

    /// Append one trace as a single JSONL row.
    pub fn append(&self, trace: &RunTrace) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let line = serde_json::to_string(trace)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_path())?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Load every stored trace, oldest first. Unparseable lines are
    /// skipped with a warning; duplicate run ids keep the later row.
    pub fn load_all(&self) -> Result<Vec<RunTrace>> {
        let path = self.file_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(fs::File::open(&path)?);
        let mut by_run_id: HashMap<String, usize> = HashMap::new();
        let mut traces: Vec<RunTrace> = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunTrace>(&line) {
                Ok(trace) => {
                    if let Some(&idx) = by_run_id.get(&trace.run_id) {
                        traces[idx] = trace;
                    } else {
                        by_run_id.insert(trace.run_id.clone(), traces.len());
                        traces.push(trace);
                    }
                }
                Err(e) => {
                    warn!(line = line_no + 1, error = %e, path = %path.display(), "Skipping malformed trace line");
                }
            }
        }

        Ok(traces)
    }

    /// Load traces for one task string, sorted by budget ascending.
    pub fn load_for_task(&self, task: &str) -> Result<Vec<RunTrace>> {
        let mut traces: Vec<RunTrace> = self
            .load_all()?
            .into_iter()
            .filter(|t| t.task == task)
            .collect();
        traces.sort_by(|a, b| {
            a.budget_dollars
                .partial_cmp(&b.budget_dollars)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(traces)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
