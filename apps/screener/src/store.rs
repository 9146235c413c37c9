#![allow(dead_code)]

//! Append-only JSONL result store, owned by the orchestrator.
//!
//! One `PipelineRunResult` per line, each line independently parseable. On
//! open the store recovers already-processed candidate ids from disk (corrupt
//! trailing lines from a crash are skipped with a warning, not fatal), which
//! is what makes re-runs resumable. Appends are serialized behind a mutex and
//! fsync'd so a record either fully exists or not at all.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analyzer::AnalysisVerdict;
use crate::errors::StoreError;

/// Stage a candidate failed in, for typed failure markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStage {
    Parse,
    Analysis,
}

/// Terminal outcome for one candidate: a verdict or a typed failure marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CandidateOutcome {
    Scored { verdict: AnalysisVerdict },
    Failed { stage: FailedStage, message: String },
}

/// The record appended per candidate per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunResult {
    pub candidate_id: String,
    #[serde(flatten)]
    pub outcome: CandidateOutcome,
    pub recorded_at: DateTime<Utc>,
    /// Analyzer mode label ("mock" / "llm" / "llm_fallback_mock").
    pub mode: String,
}

struct StoreInner {
    file: File,
    seen: HashSet<String>,
}

/// Handle to the append-only store. Cheap to share via `Arc`; all mutation
/// goes through the inner mutex (single-writer discipline).
pub struct RunStore {
    path: PathBuf,
    inner: Mutex<StoreInner>,
}

impl RunStore {
    /// Opens (or creates) the store and loads processed candidate ids.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut seen = HashSet::new();
        let mut torn_tail = false;
        if path.exists() {
            torn_tail = !ends_with_newline(path)?;
            let reader = BufReader::new(File::open(path)?);
            let mut corrupt = 0usize;
            for (line_no, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<PipelineRunResult>(&line) {
                    Ok(record) => {
                        seen.insert(record.candidate_id);
                    }
                    Err(e) => {
                        // Expected after a crash mid-append; the record never
                        // happened as far as the pipeline is concerned.
                        warn!(line = line_no + 1, "skipping corrupt store line: {e}");
                        corrupt += 1;
                    }
                }
            }
            info!(
                path = %path.display(),
                recovered = seen.len(),
                corrupt,
                "result store recovered"
            );
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if torn_tail {
            // Heal the torn line so the next append starts on its own line.
            writeln!(file)?;
            file.sync_all()?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(StoreInner { file, seen }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if a record for this candidate already exists.
    pub fn contains(&self, candidate_id: &str) -> bool {
        self.lock().seen.contains(candidate_id)
    }

    pub fn seen_count(&self) -> usize {
        self.lock().seen.len()
    }

    /// Appends one record, flushes, and fsyncs. Idempotent per candidate id:
    /// a duplicate append is a no-op returning `false`.
    pub fn append(&self, record: &PipelineRunResult) -> Result<bool, StoreError> {
        let line = serde_json::to_string(record)?;

        let mut inner = self.lock();
        if inner.seen.contains(&record.candidate_id) {
            debug!(candidate = %record.candidate_id, "duplicate record suppressed");
            return Ok(false);
        }
        writeln!(inner.file, "{line}")?;
        inner.file.flush()?;
        inner.file.sync_all()?;
        inner.seen.insert(record.candidate_id.clone());
        Ok(true)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        // Poisoning only happens if a writer panicked mid-append; the data on
        // disk is still line-consistent, so continue with the inner state.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn ends_with_newline(path: &Path) -> Result<bool, StoreError> {
    use std::io::{Read, Seek, SeekFrom};
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Reads every parseable record back from a store file. Corrupt lines are
/// skipped with a warning, mirroring [`RunStore::open`].
pub fn load_records(path: &Path) -> Result<Vec<PipelineRunResult>, StoreError> {
    let mut out = Vec::new();
    if !path.exists() {
        return Ok(out);
    }
    let reader = BufReader::new(File::open(path)?);
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<PipelineRunResult>(&line) {
            Ok(record) => out.push(record),
            Err(e) => warn!(line = line_no + 1, "skipping corrupt store line: {e}"),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnalysisMode, AnalysisVerdict, Classification, Rationale};
    use std::io::Write as _;

    fn verdict_record(id: &str) -> PipelineRunResult {
        PipelineRunResult {
            candidate_id: id.to_string(),
            outcome: CandidateOutcome::Scored {
                verdict: AnalysisVerdict {
                    classification: Classification::Match,
                    score: 1.0,
                    rationale: Rationale {
                        matched: vec!["go".to_string()],
                        missing: vec![],
                        notes: vec![],
                    },
                    mode: AnalysisMode::Mock,
                },
            },
            recorded_at: Utc::now(),
            mode: "mock".to_string(),
        }
    }

    fn failed_record(id: &str) -> PipelineRunResult {
        PipelineRunResult {
            candidate_id: id.to_string(),
            outcome: CandidateOutcome::Failed {
                stage: FailedStage::Parse,
                message: "Resume text is empty".to_string(),
            },
            recorded_at: Utc::now(),
            mode: "mock".to_string(),
        }
    }

    #[test]
    fn test_round_trip_structural_equality() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let store = RunStore::open(&path).unwrap();

        let scored = verdict_record("cand-1");
        let failed = failed_record("cand-2");
        assert!(store.append(&scored).unwrap());
        assert!(store.append(&failed).unwrap());

        let records = load_records(&path).unwrap();
        assert_eq!(records, vec![scored, failed]);
    }

    #[test]
    fn test_reopen_recovers_seen_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        {
            let store = RunStore::open(&path).unwrap();
            store.append(&verdict_record("cand-1")).unwrap();
        }
        let store = RunStore::open(&path).unwrap();
        assert!(store.contains("cand-1"));
        assert!(!store.contains("cand-2"));
        assert_eq!(store.seen_count(), 1);
    }

    #[test]
    fn test_append_is_idempotent_per_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let store = RunStore::open(&path).unwrap();

        assert!(store.append(&verdict_record("cand-1")).unwrap());
        assert!(!store.append(&verdict_record("cand-1")).unwrap());
        assert_eq!(load_records(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_trailing_line_is_skipped_on_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        {
            let store = RunStore::open(&path).unwrap();
            store.append(&verdict_record("cand-1")).unwrap();
        }
        // Simulate a crash mid-append.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{{\"candidate_id\": \"cand-2\", \"trunc").unwrap();
        drop(file);

        let store = RunStore::open(&path).unwrap();
        assert!(store.contains("cand-1"));
        assert!(!store.contains("cand-2"));

        // The torn line must not swallow the next append.
        store.append(&verdict_record("cand-3")).unwrap();
        let records = load_records(&path).unwrap();
        assert!(records.iter().any(|r| r.candidate_id == "cand-3"));
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never-written.jsonl");
        assert!(load_records(&path).unwrap().is_empty());
    }
}
