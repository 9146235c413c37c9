//! Pipeline Orchestrator — drives one screening run end to end.
//!
//! Interpretation and search run once, synchronously; their outputs become
//! shared read-only input for a bounded worker pool that runs Parse → Analyze
//! per candidate. One candidate's failure never aborts the run: it is
//! recorded as a typed failure marker and processing continues. Candidates
//! already present in the result store are skipped, which makes an
//! interrupted run resumable.

use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::analyzer::{Classification, ResumeAnalyzer};
use crate::crawler::{CandidateReference, CandidateSource};
use crate::errors::PipelineError;
use crate::interpreter::{BriefInterpreter, CriteriaBundle};
use crate::parser;
use crate::store::{CandidateOutcome, FailedStage, PipelineRunResult, RunStore};

/// End-of-run report: classification counts plus bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Candidates returned by the search step.
    pub total_candidates: usize,
    pub matched: usize,
    pub conditional: usize,
    pub rejected: usize,
    pub failed: usize,
    /// Candidates skipped because the store already held a record for them.
    pub skipped: usize,
    /// Dispatch stopped early by the cancellation signal.
    pub cancelled: bool,
    /// The search step hit its result cap with more results available.
    pub partial_search: bool,
}

impl RunSummary {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            total_candidates: 0,
            matched: 0,
            conditional: 0,
            rejected: 0,
            failed: 0,
            skipped: 0,
            cancelled: false,
            partial_search: false,
        }
    }

    /// Records processed this run (excluding skips).
    pub fn processed(&self) -> usize {
        self.matched + self.conditional + self.rejected + self.failed
    }
}

/// What one worker reports back for tallying.
enum WorkerOutcome {
    Classified(Classification),
    Failed,
}

pub struct Pipeline {
    interpreter: Arc<dyn BriefInterpreter>,
    source: Arc<dyn CandidateSource>,
    analyzer: Arc<dyn ResumeAnalyzer>,
    store: Arc<RunStore>,
    concurrency: usize,
    /// Mode label stamped on failure markers (scored records carry the
    /// verdict's own mode).
    mode_label: String,
}

impl Pipeline {
    pub fn new(
        interpreter: Arc<dyn BriefInterpreter>,
        source: Arc<dyn CandidateSource>,
        analyzer: Arc<dyn ResumeAnalyzer>,
        store: Arc<RunStore>,
        concurrency: usize,
        mode_label: String,
    ) -> Self {
        Self {
            interpreter,
            source,
            analyzer,
            store,
            concurrency: concurrency.max(1),
            mode_label,
        }
    }

    /// Runs the full screening pipeline for one hiring brief.
    ///
    /// The cancellation signal stops dispatch of new candidates; in-flight
    /// candidates finish (or time out under their own transport policy).
    pub async fn run(
        &self,
        brief: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunSummary, PipelineError> {
        let run_id = Uuid::new_v4();
        let mut summary = RunSummary::new(run_id);
        info!(%run_id, "starting screening run");

        let interpretation = self.interpreter.interpret(brief).await?;
        let bundle = Arc::new(interpretation.bundle);
        info!(
            required = bundle.required.len(),
            preferred = bundle.preferred.len(),
            seniority = ?bundle.min_seniority,
            location = ?bundle.location,
            "brief interpreted"
        );

        let outcome = self.source.search(&interpretation.payload).await?;
        summary.total_candidates = outcome.candidates.len();
        summary.partial_search = outcome.partial;
        if outcome.partial {
            warn!("search results truncated at the configured result cap");
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut workers = JoinSet::new();

        for candidate in outcome.candidates {
            if self.store.contains(&candidate.id) {
                debug!(candidate = %candidate.id, "already processed; skipping");
                summary.skipped += 1;
                continue;
            }
            if *cancel.borrow() {
                info!("cancellation requested; halting dispatch");
                summary.cancelled = true;
                break;
            }

            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("worker semaphore closed");
            let bundle = Arc::clone(&bundle);
            let analyzer = Arc::clone(&self.analyzer);
            let store = Arc::clone(&self.store);
            let mode_label = self.mode_label.clone();
            workers.spawn(async move {
                let _permit = permit;
                process_candidate(candidate, &bundle, analyzer.as_ref(), &store, &mode_label).await
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(WorkerOutcome::Classified(Classification::Match)) => summary.matched += 1,
                Ok(WorkerOutcome::Classified(Classification::Conditional)) => {
                    summary.conditional += 1
                }
                Ok(WorkerOutcome::Classified(Classification::Reject)) => summary.rejected += 1,
                Ok(WorkerOutcome::Failed) => summary.failed += 1,
                Err(e) => {
                    error!("worker task failed: {e}");
                    summary.failed += 1;
                }
            }
        }

        info!(
            %run_id,
            total = summary.total_candidates,
            processed = summary.processed(),
            matched = summary.matched,
            conditional = summary.conditional,
            rejected = summary.rejected,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            partial_search = summary.partial_search,
            "screening run finished"
        );
        Ok(summary)
    }
}

/// Parse → Analyze → persist for one candidate. Never propagates an error:
/// failures become typed markers in the store.
async fn process_candidate(
    candidate: CandidateReference,
    bundle: &CriteriaBundle,
    analyzer: &dyn ResumeAnalyzer,
    store: &RunStore,
    mode_label: &str,
) -> WorkerOutcome {
    debug!(candidate = %candidate.id, "processing");

    let (outcome, record) = match parser::parse(&candidate.resume_text) {
        Ok(resume) => {
            let verdict = analyzer.analyze(bundle, &resume).await;
            debug!(
                candidate = %candidate.id,
                classification = ?verdict.classification,
                score = verdict.score,
                "verdict recorded"
            );
            let outcome = WorkerOutcome::Classified(verdict.classification);
            let record = PipelineRunResult {
                candidate_id: candidate.id.clone(),
                mode: verdict.mode.label().to_string(),
                outcome: CandidateOutcome::Scored { verdict },
                recorded_at: chrono::Utc::now(),
            };
            (outcome, record)
        }
        Err(e) => {
            warn!(candidate = %candidate.id, error = %e, "resume unusable");
            let record = PipelineRunResult {
                candidate_id: candidate.id.clone(),
                mode: mode_label.to_string(),
                outcome: CandidateOutcome::Failed {
                    stage: FailedStage::Parse,
                    message: e.to_string(),
                },
                recorded_at: chrono::Utc::now(),
            };
            (WorkerOutcome::Failed, record)
        }
    };

    match store.append(&record) {
        Ok(_) => outcome,
        Err(e) => {
            error!(candidate = %candidate.id, "failed to persist result: {e}");
            WorkerOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{RuleAnalyzer, Thresholds};
    use crate::crawler::{SearchOutcome, SourceMeta};
    use crate::errors::SearchError;
    use crate::interpreter::{HeuristicInterpreter, SearchPayload, Vocabulary};
    use async_trait::async_trait;

    struct StaticSource {
        candidates: Vec<CandidateReference>,
        partial: bool,
    }

    #[async_trait]
    impl CandidateSource for StaticSource {
        async fn search(&self, _payload: &SearchPayload) -> Result<SearchOutcome, SearchError> {
            Ok(SearchOutcome {
                candidates: self.candidates.clone(),
                partial: self.partial,
            })
        }
    }

    fn candidate(id: &str, resume_text: &str) -> CandidateReference {
        CandidateReference {
            id: id.to_string(),
            resume_text: resume_text.to_string(),
            source: SourceMeta {
                site: "test-board".to_string(),
                updated_at: None,
            },
        }
    }

    fn pipeline_with(
        store: Arc<RunStore>,
        candidates: Vec<CandidateReference>,
        partial: bool,
    ) -> Pipeline {
        Pipeline::new(
            Arc::new(HeuristicInterpreter::new(Vocabulary::builtin(), 20)),
            Arc::new(StaticSource { candidates, partial }),
            Arc::new(RuleAnalyzer::new(Thresholds::default())),
            store,
            2,
            "mock".to_string(),
        )
    }

    fn cancel_rx() -> watch::Receiver<bool> {
        // The receiver keeps serving the last value after the sender drops.
        watch::channel(false).1
    }

    const BRIEF: &str = "Senior Go engineer, required: Go, Kubernetes";

    #[tokio::test]
    async fn test_every_candidate_gets_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RunStore::open(&dir.path().join("r.jsonl")).unwrap());
        let pipeline = pipeline_with(
            store.clone(),
            vec![
                candidate("a", "Skills\nGo, Kubernetes"),
                candidate("b", "Skills\nPHP"),
                candidate("c", ""), // unusable → failure marker
            ],
            false,
        );

        let summary = pipeline.run(BRIEF, cancel_rx()).await.unwrap();
        assert_eq!(summary.total_candidates, 3);
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed(), 3);
        // No candidate silently dropped.
        assert_eq!(store.seen_count(), 3);
    }

    #[tokio::test]
    async fn test_rerun_skips_persisted_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.jsonl");
        let store = Arc::new(RunStore::open(&path).unwrap());
        let candidates = vec![
            candidate("a", "Skills\nGo, Kubernetes"),
            candidate("b", "Skills\nGo"),
        ];

        let first = pipeline_with(store.clone(), candidates.clone(), false)
            .run(BRIEF, cancel_rx())
            .await
            .unwrap();
        assert_eq!(first.processed(), 2);

        let store = Arc::new(RunStore::open(&path).unwrap());
        let second = pipeline_with(store, candidates, false)
            .run(BRIEF, cancel_rx())
            .await
            .unwrap();
        assert_eq!(second.skipped, 2);
        assert_eq!(second.processed(), 0);
    }

    #[tokio::test]
    async fn test_resumed_run_preserves_existing_records_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.jsonl");

        // First run persists 2 of the eventual 5 candidates, then "crashes".
        let store = Arc::new(RunStore::open(&path).unwrap());
        let first_batch = vec![
            candidate("a", "Skills\nGo, Kubernetes"),
            candidate("b", "Skills\nGo"),
        ];
        pipeline_with(store, first_batch.clone(), false)
            .run(BRIEF, cancel_rx())
            .await
            .unwrap();
        let bytes_before = std::fs::read(&path).unwrap();

        // Restarted run sees all 5 candidates; only the remaining 3 are new.
        let mut all = first_batch;
        all.push(candidate("c", "Skills\nKubernetes"));
        all.push(candidate("d", "Skills\nRust"));
        all.push(candidate("e", "Skills\nGo, Kubernetes, Docker"));
        let store = Arc::new(RunStore::open(&path).unwrap());
        let summary = pipeline_with(store, all, false)
            .run(BRIEF, cancel_rx())
            .await
            .unwrap();

        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.processed(), 3);

        let bytes_after = std::fs::read(&path).unwrap();
        assert!(bytes_after.starts_with(&bytes_before));
        assert_eq!(crate::store::load_records(&path).unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_cancellation_stops_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RunStore::open(&dir.path().join("r.jsonl")).unwrap());
        let pipeline = pipeline_with(
            store.clone(),
            (0..10)
                .map(|i| candidate(&format!("c{i}"), "Skills\nGo"))
                .collect(),
            false,
        );

        let (tx, rx) = watch::channel(true); // cancelled before dispatch
        let summary = pipeline.run(BRIEF, rx).await.unwrap();
        drop(tx);
        assert!(summary.cancelled);
        assert_eq!(summary.processed(), 0);
        assert_eq!(store.seen_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_search_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RunStore::open(&dir.path().join("r.jsonl")).unwrap());
        let pipeline = pipeline_with(store, vec![candidate("a", "Skills\nGo")], true);

        let summary = pipeline.run(BRIEF, cancel_rx()).await.unwrap();
        assert!(summary.partial_search);
    }
}
