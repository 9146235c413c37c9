//! Marker vocabulary for the heuristic interpreter.
//!
//! Ships with compiled-in defaults and can be replaced wholesale from a JSON
//! file (`SCREENER_VOCABULARY_FILE`), so deployments can extend the skill
//! taxonomy without a rebuild.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::interpreter::Seniority;

/// Alias → canonical marker tables. All keys are lowercase; skill values are
/// canonical lowercase slugs, location values are display names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    pub skills: BTreeMap<String, String>,
    pub seniority: BTreeMap<String, Seniority>,
    pub locations: BTreeMap<String, String>,
}

impl Vocabulary {
    /// Compiled-in default vocabulary.
    pub fn builtin() -> Self {
        let skills = [
            ("go", "go"),
            ("golang", "go"),
            ("rust", "rust"),
            ("python", "python"),
            ("java", "java"),
            ("javascript", "javascript"),
            ("js", "javascript"),
            ("typescript", "typescript"),
            ("ts", "typescript"),
            ("c++", "c++"),
            ("cpp", "c++"),
            ("c#", "c#"),
            ("csharp", "c#"),
            ("php", "php"),
            ("ruby", "ruby"),
            ("kotlin", "kotlin"),
            ("swift", "swift"),
            ("scala", "scala"),
            ("sql", "sql"),
            ("react", "react"),
            ("vue", "vue"),
            ("angular", "angular"),
            ("django", "django"),
            ("flask", "flask"),
            ("rails", "rails"),
            ("spring", "spring"),
            ("kubernetes", "kubernetes"),
            ("k8s", "kubernetes"),
            ("docker", "docker"),
            ("terraform", "terraform"),
            ("ansible", "ansible"),
            ("aws", "aws"),
            ("gcp", "gcp"),
            ("azure", "azure"),
            ("linux", "linux"),
            ("git", "git"),
            ("ci/cd", "ci/cd"),
            ("postgres", "postgres"),
            ("postgresql", "postgres"),
            ("mysql", "mysql"),
            ("mongodb", "mongodb"),
            ("redis", "redis"),
            ("kafka", "kafka"),
            ("rabbitmq", "rabbitmq"),
            ("elasticsearch", "elasticsearch"),
            ("grpc", "grpc"),
            ("graphql", "graphql"),
            ("pytorch", "pytorch"),
            ("tensorflow", "tensorflow"),
            ("android", "android"),
            ("ios", "ios"),
            ("flutter", "flutter"),
        ];
        let seniority = [
            ("intern", Seniority::Junior),
            ("junior", Seniority::Junior),
            ("entry-level", Seniority::Junior),
            ("mid", Seniority::Mid),
            ("middle", Seniority::Mid),
            ("mid-level", Seniority::Mid),
            ("intermediate", Seniority::Mid),
            ("senior", Seniority::Senior),
            ("sr", Seniority::Senior),
            ("staff", Seniority::Staff),
            ("lead", Seniority::Staff),
            ("principal", Seniority::Principal),
        ];
        let locations = [
            ("berlin", "Berlin"),
            ("munich", "Munich"),
            ("hamburg", "Hamburg"),
            ("london", "London"),
            ("manchester", "Manchester"),
            ("dublin", "Dublin"),
            ("paris", "Paris"),
            ("amsterdam", "Amsterdam"),
            ("madrid", "Madrid"),
            ("barcelona", "Barcelona"),
            ("lisbon", "Lisbon"),
            ("warsaw", "Warsaw"),
            ("krakow", "Krakow"),
            ("kyiv", "Kyiv"),
            ("lviv", "Lviv"),
            ("prague", "Prague"),
            ("vienna", "Vienna"),
            ("zurich", "Zurich"),
            ("stockholm", "Stockholm"),
            ("helsinki", "Helsinki"),
            ("oslo", "Oslo"),
            ("copenhagen", "Copenhagen"),
            ("toronto", "Toronto"),
            ("vancouver", "Vancouver"),
            ("austin", "Austin"),
            ("boston", "Boston"),
            ("seattle", "Seattle"),
            ("chicago", "Chicago"),
            ("bangalore", "Bangalore"),
            ("singapore", "Singapore"),
            ("tokyo", "Tokyo"),
        ];

        Self {
            skills: to_map(&skills),
            seniority: seniority
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            locations: to_map(&locations),
        }
    }

    /// Loads a replacement vocabulary from a JSON file with the same
    /// three-table shape as [`Vocabulary::builtin`].
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Invalid {
            key: "SCREENER_VOCABULARY_FILE".to_string(),
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        let mut vocabulary: Vocabulary =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
                key: "SCREENER_VOCABULARY_FILE".to_string(),
                reason: format!("invalid vocabulary JSON: {e}"),
            })?;
        vocabulary.lowercase_keys();
        Ok(vocabulary)
    }

    fn lowercase_keys(&mut self) {
        self.skills = std::mem::take(&mut self.skills)
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v.to_lowercase()))
            .collect();
        self.seniority = std::mem::take(&mut self.seniority)
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        self.locations = std::mem::take(&mut self.locations)
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
    }

    /// Canonical slugs for every skill named by the tokens (single tokens
    /// plus adjacent two-token phrases, so "machine learning"-style aliases
    /// resolve when present in a custom vocabulary).
    pub fn match_skills(&self, tokens: &[String]) -> Vec<String> {
        let mut found = Vec::new();
        for window in phrases(tokens) {
            if let Some(slug) = self.skills.get(&window) {
                found.push(slug.clone());
            }
        }
        found
    }

    /// Highest seniority marker named by the tokens.
    pub fn match_seniority(&self, tokens: &[String]) -> Option<Seniority> {
        tokens
            .iter()
            .filter_map(|t| self.seniority.get(t.as_str()))
            .max()
            .copied()
    }

    /// First location marker named by the tokens (reading order).
    pub fn match_location(&self, tokens: &[String]) -> Option<String> {
        for window in phrases(tokens) {
            if let Some(name) = self.locations.get(&window) {
                return Some(name.clone());
            }
        }
        None
    }
}

/// Single tokens followed by adjacent bigrams, in reading order.
fn phrases(tokens: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tokens.len() * 2);
    for (i, token) in tokens.iter().enumerate() {
        out.push(token.clone());
        if let Some(next) = tokens.get(i + 1) {
            out.push(format!("{token} {next}"));
        }
    }
    out
}

fn to_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_builtin_aliases_resolve() {
        let v = Vocabulary::builtin();
        let found = v.match_skills(&tokens(&["golang", "k8s", "postgresql"]));
        assert_eq!(found, vec!["go", "kubernetes", "postgres"]);
    }

    #[test]
    fn test_highest_seniority_wins() {
        let v = Vocabulary::builtin();
        let s = v.match_seniority(&tokens(&["junior", "to", "senior"]));
        assert_eq!(s, Some(Seniority::Senior));
    }

    #[test]
    fn test_unknown_tokens_match_nothing() {
        let v = Vocabulary::builtin();
        assert!(v.match_skills(&tokens(&["basket", "weaving"])).is_empty());
        assert_eq!(v.match_seniority(&tokens(&["wizard"])), None);
        assert_eq!(v.match_location(&tokens(&["atlantis"])), None);
    }

    #[test]
    fn test_location_resolves_to_display_name() {
        let v = Vocabulary::builtin();
        assert_eq!(v.match_location(&tokens(&["berlin"])).as_deref(), Some("Berlin"));
    }

    #[test]
    fn test_bigram_phrases_are_considered() {
        let mut v = Vocabulary::builtin();
        v.skills
            .insert("machine learning".to_string(), "machine-learning".to_string());
        let found = v.match_skills(&tokens(&["machine", "learning"]));
        assert!(found.contains(&"machine-learning".to_string()));
    }

    #[test]
    fn test_vocabulary_file_round_trip() {
        let v = Vocabulary::builtin();
        let json = serde_json::to_string(&v).unwrap();
        let back: Vocabulary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.skills, v.skills);
        assert_eq!(back.locations, v.locations);
    }
}
