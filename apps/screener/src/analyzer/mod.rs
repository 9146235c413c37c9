//! Resume Analyzer — the traffic-light engine.
//!
//! Two interchangeable strategies behind [`ResumeAnalyzer`], selected once at
//! startup and carried as `Arc<dyn ResumeAnalyzer>`:
//!
//! - [`RuleAnalyzer`]: deterministic skill-coverage scoring, no external
//!   calls. Default, and the fallback for the LLM strategy.
//! - [`LlmAnalyzer`]: same contract, scoring delegated to the reasoning
//!   capability through the resilient transport. The response is
//!   post-validated; anything unparseable falls back to the rule engine for
//!   that single candidate and records the fallback in the verdict's mode.
//!
//! In both modes the classification is derived locally from the score via
//! the configured thresholds, so "classification is a function of score
//! thresholds" holds regardless of strategy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::ConfigError;
use crate::interpreter::{CriteriaBundle, Seniority};
use crate::llm_client::LlmClient;
use crate::parser::ParsedResume;

pub mod prompts;

/// Weight of required-skill coverage when preferred skills are also present.
/// With full required coverage the score is at least `REQUIRED_WEIGHT`, which
/// is why missing preferred skills can lower the score but never force a
/// REJECT on their own.
pub const REQUIRED_WEIGHT: f32 = 0.8;
pub const PREFERRED_WEIGHT: f32 = 0.2;

/// Traffic-light classification of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Match,
    Conditional,
    Reject,
}

/// Which strategy produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    Mock,
    Llm,
    /// The LLM response could not be validated; the rule engine substituted.
    LlmFallbackMock,
}

impl AnalysisMode {
    pub fn label(&self) -> &'static str {
        match self {
            AnalysisMode::Mock => "mock",
            AnalysisMode::Llm => "llm",
            AnalysisMode::LlmFallbackMock => "llm_fallback_mock",
        }
    }
}

/// Why the classification came out the way it did. References only criteria
/// and parsed-resume fields — never PII such as names or contact details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    pub matched: Vec<String>,
    pub missing: Vec<String>,
    pub notes: Vec<String>,
}

/// Output of the analyzer for one (bundle, resume) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisVerdict {
    pub classification: Classification,
    /// Coverage score in `[0, 1]`.
    pub score: f32,
    pub rationale: Rationale,
    pub mode: AnalysisMode,
}

/// Coverage thresholds separating MATCH / CONDITIONAL / REJECT.
/// Configuration values, not literals; defaults are documented here:
/// `score >= 0.8` → MATCH, `score >= 0.5` → CONDITIONAL, else REJECT
/// (boundaries inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub high: f32,
    pub low: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { high: 0.8, low: 0.5 }
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ok = self.low > 0.0 && self.low <= self.high && self.high <= 1.0;
        if ok {
            Ok(())
        } else {
            Err(ConfigError::Invalid {
                key: "SCREENER_MATCH_THRESHOLD/SCREENER_CONDITIONAL_THRESHOLD".to_string(),
                reason: format!(
                    "thresholds must satisfy 0 < low <= high <= 1, got low={} high={}",
                    self.low, self.high
                ),
            })
        }
    }
}

/// Maps a score to its traffic-light class. Boundaries are inclusive:
/// a score exactly at `low` is CONDITIONAL, exactly at `high` is MATCH.
pub fn classify(score: f32, thresholds: &Thresholds) -> Classification {
    if score >= thresholds.high {
        Classification::Match
    } else if score >= thresholds.low {
        Classification::Conditional
    } else {
        Classification::Reject
    }
}

/// The analyzer seam. Infallible by contract: the LLM strategy degrades to
/// the rule engine instead of surfacing errors.
#[async_trait]
pub trait ResumeAnalyzer: Send + Sync {
    async fn analyze(&self, bundle: &CriteriaBundle, resume: &ParsedResume) -> AnalysisVerdict;
}

// ────────────────────────────────────────────────────────────────────────────
// RuleAnalyzer — deterministic coverage scoring (Mock mode)
// ────────────────────────────────────────────────────────────────────────────

pub struct RuleAnalyzer {
    thresholds: Thresholds,
}

impl RuleAnalyzer {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    fn scored_verdict(&self, bundle: &CriteriaBundle, resume: &ParsedResume) -> AnalysisVerdict {
        let skills = match &resume.skills {
            Some(skills) => skills,
            None => return self.unknown_skills_verdict(bundle, resume),
        };

        let mut rationale = Rationale::default();

        let mut required_hits = 0usize;
        for skill in &bundle.required {
            if skills.contains(skill) {
                required_hits += 1;
                rationale.matched.push(skill.clone());
            } else {
                rationale.missing.push(skill.clone());
            }
        }
        let mut preferred_hits = 0usize;
        for skill in &bundle.preferred {
            if skills.contains(skill) {
                preferred_hits += 1;
                rationale.matched.push(format!("{skill} (preferred)"));
            } else {
                rationale.missing.push(format!("{skill} (preferred)"));
            }
        }

        let score = coverage_score(
            required_hits,
            bundle.required.len(),
            preferred_hits,
            bundle.preferred.len(),
            &self.thresholds,
        );
        if bundle.required.is_empty() && bundle.preferred.is_empty() {
            rationale
                .notes
                .push("brief named no skills; nothing to verify".to_string());
        }
        push_seniority_note(&mut rationale, bundle, resume);

        AnalysisVerdict {
            classification: classify(score, &self.thresholds),
            score,
            rationale,
            mode: AnalysisMode::Mock,
        }
    }

    /// The resume declared no recognizable skill section. Unknown is not a
    /// negative signal: classify at the conditional boundary.
    fn unknown_skills_verdict(
        &self,
        bundle: &CriteriaBundle,
        resume: &ParsedResume,
    ) -> AnalysisVerdict {
        let mut rationale = Rationale {
            matched: Vec::new(),
            missing: bundle.required.iter().cloned().collect(),
            notes: vec!["resume lists no recognizable skills; coverage unknown".to_string()],
        };
        push_seniority_note(&mut rationale, bundle, resume);

        let score = self.thresholds.low;
        AnalysisVerdict {
            classification: classify(score, &self.thresholds),
            score,
            rationale,
            mode: AnalysisMode::Mock,
        }
    }
}

#[async_trait]
impl ResumeAnalyzer for RuleAnalyzer {
    async fn analyze(&self, bundle: &CriteriaBundle, resume: &ParsedResume) -> AnalysisVerdict {
        self.scored_verdict(bundle, resume)
    }
}

/// Weighted coverage ratio. Weights collapse onto whichever skill set the
/// bundle actually has; a bundle with no skills at all scores at the
/// conditional boundary.
fn coverage_score(
    required_hits: usize,
    required_total: usize,
    preferred_hits: usize,
    preferred_total: usize,
    thresholds: &Thresholds,
) -> f32 {
    let ratio = |hits: usize, total: usize| hits as f32 / total as f32;
    match (required_total, preferred_total) {
        (0, 0) => thresholds.low,
        (_, 0) => ratio(required_hits, required_total),
        (0, _) => ratio(preferred_hits, preferred_total),
        (_, _) => {
            REQUIRED_WEIGHT * ratio(required_hits, required_total)
                + PREFERRED_WEIGHT * ratio(preferred_hits, preferred_total)
        }
    }
}

/// Minimum overall experience implied by a seniority rung.
fn seniority_floor_years(seniority: Seniority) -> f32 {
    match seniority {
        Seniority::Junior => 0.0,
        Seniority::Mid => 2.0,
        Seniority::Senior => 5.0,
        Seniority::Staff => 8.0,
        Seniority::Principal => 10.0,
    }
}

/// Adds an advisory note when the parsed experience falls short of the
/// brief's seniority bar. Advisory only — it never changes the class.
fn push_seniority_note(rationale: &mut Rationale, bundle: &CriteriaBundle, resume: &ParsedResume) {
    if let (Some(min), Some(years)) = (bundle.min_seniority, resume.years_experience) {
        let floor = seniority_floor_years(min);
        if years < floor {
            rationale.notes.push(format!(
                "{years:.1} years of experience is below the typical {min} bar (~{floor:.0}y)"
            ));
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LlmAnalyzer — reasoning-capability strategy with rule fallback
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmAnalyzer {
    client: LlmClient,
    thresholds: Thresholds,
    fallback: RuleAnalyzer,
}

/// Shape the reasoning capability must return. The model's own traffic-light
/// opinion is deliberately absent: the class is re-derived from the score.
#[derive(Debug, Deserialize)]
struct LlmVerdictWire {
    score: f32,
    #[serde(default)]
    matched: Vec<String>,
    #[serde(default)]
    missing: Vec<String>,
    reasoning: String,
}

impl LlmAnalyzer {
    pub fn new(client: LlmClient, thresholds: Thresholds) -> Self {
        Self {
            client,
            thresholds,
            fallback: RuleAnalyzer::new(thresholds),
        }
    }

    async fn fallback_verdict(
        &self,
        bundle: &CriteriaBundle,
        resume: &ParsedResume,
    ) -> AnalysisVerdict {
        let mut verdict = self.fallback.analyze(bundle, resume).await;
        verdict.mode = AnalysisMode::LlmFallbackMock;
        verdict
    }
}

#[async_trait]
impl ResumeAnalyzer for LlmAnalyzer {
    async fn analyze(&self, bundle: &CriteriaBundle, resume: &ParsedResume) -> AnalysisVerdict {
        let prompt = build_analysis_prompt(bundle, resume);

        match self
            .client
            .call_json::<LlmVerdictWire>(&prompt, prompts::ANALYZE_SYSTEM)
            .await
        {
            Ok(wire) => match verdict_from_wire(wire, &self.thresholds) {
                Some(verdict) => verdict,
                None => {
                    warn!("LLM verdict failed post-validation; substituting rule engine");
                    self.fallback_verdict(bundle, resume).await
                }
            },
            Err(e) => {
                warn!(error = %e, "LLM analysis failed; substituting rule engine");
                self.fallback_verdict(bundle, resume).await
            }
        }
    }
}

/// Post-validation of the wire verdict: score must be a finite value in
/// `[0, 1]` and the reasoning non-empty, otherwise the caller falls back.
fn verdict_from_wire(wire: LlmVerdictWire, thresholds: &Thresholds) -> Option<AnalysisVerdict> {
    if !wire.score.is_finite() || !(0.0..=1.0).contains(&wire.score) {
        return None;
    }
    if wire.reasoning.trim().is_empty() {
        return None;
    }
    Some(AnalysisVerdict {
        classification: classify(wire.score, thresholds),
        score: wire.score,
        rationale: Rationale {
            matched: wire.matched,
            missing: wire.missing,
            notes: vec![wire.reasoning],
        },
        mode: AnalysisMode::Llm,
    })
}

/// Renders the audited prompt: structured criteria plus anonymized resume
/// facts, with the resume-derived text sanitized and isolated in a
/// `<resume_content>` tag. Raw resume text and PII never enter the payload.
fn build_analysis_prompt(bundle: &CriteriaBundle, resume: &ParsedResume) -> String {
    #[derive(Serialize)]
    struct CriteriaView<'a> {
        required: &'a std::collections::BTreeSet<String>,
        preferred: &'a std::collections::BTreeSet<String>,
        min_seniority: Option<Seniority>,
        location: Option<&'a str>,
    }

    let criteria = CriteriaView {
        required: &bundle.required,
        preferred: &bundle.preferred,
        min_seniority: bundle.min_seniority,
        location: bundle.location.as_deref(),
    };
    // The view above is infallibly serializable; keep the fallback cheap.
    let criteria_json =
        serde_json::to_string_pretty(&criteria).unwrap_or_else(|_| "{}".to_string());

    let facts = sanitize_text(&resume_facts(resume), 6000);

    prompts::ANALYZE_PROMPT_TEMPLATE
        .replace("{criteria_json}", &criteria_json)
        .replace("{resume_content}", &facts)
}

/// Compact markdown rendition of the parsed resume, significant fields only.
/// Caps per section keep the prompt bounded.
fn resume_facts(resume: &ParsedResume) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(skills) = &resume.skills {
        let list: Vec<String> = skills.iter().take(60).map(|s| format!("- {s}")).collect();
        parts.push(format!("# Skills\n{}", list.join("\n")));
    }
    if let Some(years) = resume.years_experience {
        parts.push(format!("# Profile\nyears of experience: {years:.1}"));
    }
    if !resume.employment.is_empty() {
        let entries: Vec<String> = resume
            .employment
            .iter()
            .take(12)
            .map(|e| {
                let org = e.organization.as_deref().unwrap_or("(organization not stated)");
                let period = e.period.as_deref().unwrap_or("(period not stated)");
                format!("- {} — {org} ({period})", e.title)
            })
            .collect();
        parts.push(format!("# Experience\n{}", entries.join("\n")));
    }
    if !resume.education.is_empty() {
        let entries: Vec<String> = resume
            .education
            .iter()
            .take(8)
            .map(|e| {
                let field = e.field.as_deref().unwrap_or("(field not stated)");
                match e.year {
                    Some(year) => format!("- {} — {field}, {year}", e.institution),
                    None => format!("- {} — {field}", e.institution),
                }
            })
            .collect();
        parts.push(format!("# Education\n{}", entries.join("\n")));
    }

    if parts.is_empty() {
        "# Resume\n(no extractable content)".to_string()
    } else {
        parts.join("\n\n")
    }
}

/// Input hardening for resume-derived text: resumes are data, not
/// instructions.
fn sanitize_text(text: &str, max_chars: usize) -> String {
    let mut cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .take(max_chars)
        .collect();

    for (marker, neutral) in [
        ("<system>", "&lt;system&gt;"),
        ("</system>", "&lt;/system&gt;"),
        ("<assistant>", "&lt;assistant&gt;"),
        ("</assistant>", "&lt;/assistant&gt;"),
        ("<user>", "&lt;user&gt;"),
        ("</user>", "&lt;/user&gt;"),
        ("<resume_content>", "&lt;resume_content&gt;"),
        ("</resume_content>", "&lt;/resume_content&gt;"),
    ] {
        cleaned = cleaned.replace(marker, neutral);
    }

    while cleaned.contains("  ") {
        cleaned = cleaned.replace("  ", " ");
    }
    cleaned.trim().to_string()
}
