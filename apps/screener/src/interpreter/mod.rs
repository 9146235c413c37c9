//! Criteria Interpreter — turns a free-text hiring brief into structured
//! search criteria.
//!
//! The transformation is deterministic and pure: identical brief text yields
//! byte-identical `CriteriaBundle` and `SearchPayload` (ordered collections
//! throughout). The stage sits behind [`BriefInterpreter`] so a higher-fidelity
//! model-backed implementation can replace [`HeuristicInterpreter`] without
//! touching downstream stages.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::InterpretError;

pub mod vocabulary;

pub use vocabulary::Vocabulary;

/// Seniority ladder, ordered from most junior to most senior.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Seniority {
    Junior,
    Mid,
    Senior,
    Staff,
    Principal,
}

impl fmt::Display for Seniority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Seniority::Junior => "junior",
            Seniority::Mid => "mid",
            Seniority::Senior => "senior",
            Seniority::Staff => "staff",
            Seniority::Principal => "principal",
        };
        f.write_str(label)
    }
}

/// Structured representation of a hiring brief. Immutable once produced;
/// every field derives solely from the input text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaBundle {
    /// Canonical skill slugs the candidate must have. Never empty if the
    /// brief names any skill.
    pub required: BTreeSet<String>,
    /// Canonical skill slugs that are nice to have.
    pub preferred: BTreeSet<String>,
    pub min_seniority: Option<Seniority>,
    pub location: Option<String>,
    /// Other structured filters (e.g. workplace=remote).
    pub filters: BTreeMap<String, String>,
    /// The normalized brief the bundle was derived from, kept for audit.
    pub source_brief: String,
}

/// Query shape handed to the crawler capability. Pure function of the bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPayload {
    /// Ordered query terms (canonical skill slugs, lexicographic).
    pub query_terms: Vec<String>,
    pub filters: BTreeMap<String, String>,
    /// Result cap for the whole search.
    pub page_size: usize,
}

/// Output pair of one interpretation.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpretation {
    pub bundle: CriteriaBundle,
    pub payload: SearchPayload,
}

/// The interpreter seam. Carried as `Arc<dyn BriefInterpreter>` and resolved
/// once at startup.
#[async_trait]
pub trait BriefInterpreter: Send + Sync {
    async fn interpret(&self, brief: &str) -> Result<Interpretation, InterpretError>;
}

/// Default deterministic interpreter: tokenizes the brief and matches tokens
/// (and two-token phrases) against a configurable vocabulary of skill,
/// seniority, and location markers. No network, no model, no invention —
/// a skill lands in the bundle only if the brief names it.
pub struct HeuristicInterpreter {
    vocabulary: Vocabulary,
    page_size: usize,
}

/// Which bucket a brief segment feeds skills into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkillBucket {
    Required,
    Preferred,
}

impl HeuristicInterpreter {
    pub fn new(vocabulary: Vocabulary, page_size: usize) -> Self {
        Self {
            vocabulary,
            page_size,
        }
    }

    fn build_bundle(&self, brief: &str) -> CriteriaBundle {
        let normalized = normalize_whitespace(brief);
        let lowered = normalized.to_lowercase();

        let mut required = BTreeSet::new();
        let mut preferred = BTreeSet::new();

        for (bucket, segment) in split_segments(&lowered) {
            let tokens = tokenize(segment);
            for slug in self.vocabulary.match_skills(&tokens) {
                match bucket {
                    SkillBucket::Required => {
                        required.insert(slug);
                    }
                    SkillBucket::Preferred => {
                        preferred.insert(slug);
                    }
                }
            }
        }
        // A skill listed as required wins over a preferred mention.
        preferred.retain(|s| !required.contains(s));

        let all_tokens = tokenize(&lowered);
        let min_seniority = self.vocabulary.match_seniority(&all_tokens);
        let location = self.vocabulary.match_location(&all_tokens);

        let mut filters = BTreeMap::new();
        if all_tokens.iter().any(|t| t == "remote") {
            filters.insert("workplace".to_string(), "remote".to_string());
        }

        CriteriaBundle {
            required,
            preferred,
            min_seniority,
            location,
            filters,
            source_brief: normalized,
        }
    }

    fn build_payload(&self, bundle: &CriteriaBundle) -> SearchPayload {
        // Low-signal bundles fall back to preferred skills for query terms;
        // an empty term list with seniority/location filters is still valid.
        let query_terms: Vec<String> = if bundle.required.is_empty() {
            bundle.preferred.iter().cloned().collect()
        } else {
            bundle.required.iter().cloned().collect()
        };

        let mut filters = bundle.filters.clone();
        if let Some(seniority) = bundle.min_seniority {
            filters.insert("seniority".to_string(), seniority.to_string());
        }
        if let Some(location) = &bundle.location {
            filters.insert("location".to_string(), location.to_lowercase());
        }

        SearchPayload {
            query_terms,
            filters,
            page_size: self.page_size,
        }
    }
}

#[async_trait]
impl BriefInterpreter for HeuristicInterpreter {
    async fn interpret(&self, brief: &str) -> Result<Interpretation, InterpretError> {
        if brief.trim().is_empty() {
            return Err(InterpretError::EmptyBrief);
        }
        let bundle = self.build_bundle(brief);
        let payload = self.build_payload(&bundle);
        Ok(Interpretation { bundle, payload })
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits a lowercased brief into labeled segments. Text before the first
/// label is unlabeled and counts as required — a brief that just says
/// "Go engineer" requires Go.
fn split_segments(lowered: &str) -> Vec<(SkillBucket, &str)> {
    const LABELS: [(&str, SkillBucket); 4] = [
        ("required:", SkillBucket::Required),
        ("must have:", SkillBucket::Required),
        ("preferred:", SkillBucket::Preferred),
        ("nice to have:", SkillBucket::Preferred),
    ];

    let mut marks: Vec<(usize, usize, SkillBucket)> = Vec::new();
    for (label, bucket) in LABELS {
        let mut from = 0;
        while let Some(pos) = lowered[from..].find(label) {
            let at = from + pos;
            marks.push((at, at + label.len(), bucket));
            from = at + label.len();
        }
    }
    marks.sort_by_key(|(start, _, _)| *start);

    let mut segments = Vec::new();
    let head_end = marks.first().map_or(lowered.len(), |(start, _, _)| *start);
    if head_end > 0 {
        segments.push((SkillBucket::Required, &lowered[..head_end]));
    }
    for (i, (_, body_start, bucket)) in marks.iter().enumerate() {
        let body_end = marks
            .get(i + 1)
            .map_or(lowered.len(), |(next_start, _, _)| *next_start);
        segments.push((*bucket, &lowered[*body_start..body_end]));
    }
    segments
}

/// Splits on separators while keeping intra-token symbols that matter for
/// skill names (`c++`, `c#`, `ci/cd`, `.net`).
fn tokenize(segment: &str) -> Vec<String> {
    segment
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '(' | ')' | '|' | '•'))
        .map(|t| t.trim_matches(|c: char| matches!(c, '.' | ':' | '!' | '?' | '"' | '\'')))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpreter() -> HeuristicInterpreter {
        HeuristicInterpreter::new(Vocabulary::builtin(), 20)
    }

    async fn interpret(brief: &str) -> Interpretation {
        interpreter().interpret(brief).await.unwrap()
    }

    const BERLIN_BRIEF: &str =
        "Senior Go engineer, Berlin, required: Go, Kubernetes; preferred: Rust";

    #[tokio::test]
    async fn test_berlin_brief_scenario() {
        let out = interpret(BERLIN_BRIEF).await;
        let bundle = &out.bundle;

        let required: Vec<&str> = bundle.required.iter().map(String::as_str).collect();
        let preferred: Vec<&str> = bundle.preferred.iter().map(String::as_str).collect();
        assert_eq!(required, vec!["go", "kubernetes"]);
        assert_eq!(preferred, vec!["rust"]);
        assert_eq!(bundle.min_seniority, Some(Seniority::Senior));
        assert_eq!(bundle.location.as_deref(), Some("Berlin"));
    }

    #[tokio::test]
    async fn test_identical_briefs_yield_byte_identical_output() {
        let a = interpret(BERLIN_BRIEF).await;
        let b = interpret(BERLIN_BRIEF).await;

        let bundle_a = serde_json::to_vec(&a.bundle).unwrap();
        let bundle_b = serde_json::to_vec(&b.bundle).unwrap();
        assert_eq!(bundle_a, bundle_b);

        let payload_a = serde_json::to_vec(&a.payload).unwrap();
        let payload_b = serde_json::to_vec(&b.payload).unwrap();
        assert_eq!(payload_a, payload_b);
    }

    #[tokio::test]
    async fn test_payload_is_pure_function_of_bundle() {
        let out = interpret(BERLIN_BRIEF).await;
        assert_eq!(out.payload.query_terms, vec!["go", "kubernetes"]);
        assert_eq!(
            out.payload.filters.get("seniority").map(String::as_str),
            Some("senior")
        );
        assert_eq!(
            out.payload.filters.get("location").map(String::as_str),
            Some("berlin")
        );
        assert_eq!(out.payload.page_size, 20);
    }

    #[tokio::test]
    async fn test_no_skill_markers_is_valid_low_signal_bundle() {
        let out = interpret("Senior person for our Berlin office").await;
        assert!(out.bundle.required.is_empty());
        assert!(out.bundle.preferred.is_empty());
        assert_eq!(out.bundle.min_seniority, Some(Seniority::Senior));
        assert_eq!(out.bundle.location.as_deref(), Some("Berlin"));
        // Payload still carries the structured filters.
        assert!(out.payload.query_terms.is_empty());
        assert!(out.payload.filters.contains_key("seniority"));
    }

    #[tokio::test]
    async fn test_empty_brief_is_an_error() {
        let err = interpreter().interpret("   \n  ").await.unwrap_err();
        assert!(matches!(err, InterpretError::EmptyBrief));
    }

    #[tokio::test]
    async fn test_aliases_map_to_canonical_slugs() {
        let out = interpret("Golang and k8s engineer, js a plus").await;
        assert!(out.bundle.required.contains("go"));
        assert!(out.bundle.required.contains("kubernetes"));
        assert!(out.bundle.required.contains("javascript"));
    }

    #[tokio::test]
    async fn test_required_mention_wins_over_preferred() {
        let out = interpret("required: Rust; nice to have: Rust, Docker").await;
        assert!(out.bundle.required.contains("rust"));
        assert!(!out.bundle.preferred.contains("rust"));
        assert!(out.bundle.preferred.contains("docker"));
    }

    #[tokio::test]
    async fn test_remote_becomes_structured_filter() {
        let out = interpret("Remote Python engineer").await;
        assert_eq!(
            out.bundle.filters.get("workplace").map(String::as_str),
            Some("remote")
        );
    }

    #[tokio::test]
    async fn test_unlabeled_skills_are_required() {
        let out = interpret("Python engineer with Docker").await;
        assert!(out.bundle.required.contains("python"));
        assert!(out.bundle.required.contains("docker"));
        assert!(out.bundle.preferred.is_empty());
    }

    #[test]
    fn test_tokenize_keeps_skill_symbols() {
        let tokens = tokenize("c++, c#; ci/cd (docker) .net");
        assert_eq!(tokens, vec!["c++", "c#", "ci/cd", "docker", "net"]);
    }

    #[test]
    fn test_seniority_ordering() {
        assert!(Seniority::Junior < Seniority::Mid);
        assert!(Seniority::Senior < Seniority::Principal);
    }
}
