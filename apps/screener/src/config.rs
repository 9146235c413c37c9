use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::analyzer::Thresholds;
use crate::errors::ConfigError;
use crate::transport::RetryPolicy;

/// Which analyzer strategy to run. Resolved once at startup, never per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerKind {
    Mock,
    Llm,
}

impl AnalyzerKind {
    pub fn label(&self) -> &'static str {
        match self {
            AnalyzerKind::Mock => "mock",
            AnalyzerKind::Llm => "llm",
        }
    }
}

/// Application configuration loaded from environment variables.
/// Validation failures here are the only fatal errors: the process refuses
/// to start before any candidate is touched.
#[derive(Debug, Clone)]
pub struct Config {
    /// The hiring brief for this run.
    pub brief: String,
    /// Crawler capability endpoint.
    pub crawler_url: String,
    /// Present iff the analyzer runs in LLM mode.
    pub anthropic_api_key: Option<String>,
    pub analyzer: AnalyzerKind,
    pub store_path: PathBuf,
    pub concurrency: usize,
    /// Result cap per search.
    pub page_size: usize,
    pub thresholds: Thresholds,
    pub retry: RetryPolicy,
    /// Delay between crawler page fetches.
    pub politeness_delay: Duration,
    /// Optional replacement vocabulary for the heuristic interpreter.
    pub vocabulary_file: Option<PathBuf>,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let brief = load_brief()?;
        let analyzer = parse_analyzer_kind(&env_or("SCREENER_MODE", "mock"))?;

        let anthropic_api_key = std::env::var("ANTHROPIC_API_KEY").ok();
        if analyzer == AnalyzerKind::Llm && anthropic_api_key.is_none() {
            // Never attempt silent network calls without credentials.
            return Err(ConfigError::MissingVar("ANTHROPIC_API_KEY".to_string()));
        }

        let thresholds = Thresholds {
            high: parse_env("SCREENER_MATCH_THRESHOLD", Thresholds::default().high)?,
            low: parse_env("SCREENER_CONDITIONAL_THRESHOLD", Thresholds::default().low)?,
        };
        thresholds.validate()?;

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_env("SCREENER_RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_backoff: Duration::from_millis(parse_env(
                "SCREENER_RETRY_BASE_MS",
                defaults.base_backoff.as_millis() as u64,
            )?),
            multiplier: parse_env("SCREENER_RETRY_MULTIPLIER", defaults.multiplier)?,
            jitter: parse_env("SCREENER_RETRY_JITTER", defaults.jitter)?,
            attempt_timeout: Duration::from_millis(parse_env(
                "SCREENER_ATTEMPT_TIMEOUT_MS",
                defaults.attempt_timeout.as_millis() as u64,
            )?),
            max_total_delay: Duration::from_millis(parse_env(
                "SCREENER_RETRY_BUDGET_MS",
                defaults.max_total_delay.as_millis() as u64,
            )?),
        };
        validate_retry(&retry)?;

        let concurrency: usize = parse_env("SCREENER_CONCURRENCY", 4)?;
        if concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "SCREENER_CONCURRENCY".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let page_size: usize = parse_env("SCREENER_PAGE_SIZE", 20)?;
        if page_size == 0 {
            return Err(ConfigError::Invalid {
                key: "SCREENER_PAGE_SIZE".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Config {
            brief,
            crawler_url: require_env("SCREENER_CRAWLER_URL")?,
            anthropic_api_key,
            analyzer,
            store_path: PathBuf::from(env_or("SCREENER_STORE_PATH", "results.jsonl")),
            concurrency,
            page_size,
            thresholds,
            retry,
            politeness_delay: Duration::from_millis(parse_env("SCREENER_POLITENESS_MS", 1000u64)?),
            vocabulary_file: std::env::var("SCREENER_VOCABULARY_FILE")
                .ok()
                .map(PathBuf::from),
            rust_log: env_or("RUST_LOG", "info"),
        })
    }
}

/// The brief comes from a file (`SCREENER_BRIEF_FILE`) or inline
/// (`SCREENER_BRIEF`); the file wins when both are set.
fn load_brief() -> Result<String, ConfigError> {
    if let Ok(path) = std::env::var("SCREENER_BRIEF_FILE") {
        return std::fs::read_to_string(&path).map_err(|e| ConfigError::Invalid {
            key: "SCREENER_BRIEF_FILE".to_string(),
            reason: format!("cannot read {path}: {e}"),
        });
    }
    require_env("SCREENER_BRIEF")
}

fn parse_analyzer_kind(raw: &str) -> Result<AnalyzerKind, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "mock" => Ok(AnalyzerKind::Mock),
        "llm" => Ok(AnalyzerKind::Llm),
        other => Err(ConfigError::Invalid {
            key: "SCREENER_MODE".to_string(),
            reason: format!("expected 'mock' or 'llm', got '{other}'"),
        }),
    }
}

fn validate_retry(retry: &RetryPolicy) -> Result<(), ConfigError> {
    if retry.max_attempts == 0 {
        return Err(ConfigError::Invalid {
            key: "SCREENER_RETRY_MAX_ATTEMPTS".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    if !(0.0..1.0).contains(&retry.jitter) {
        return Err(ConfigError::Invalid {
            key: "SCREENER_RETRY_JITTER".to_string(),
            reason: format!("must be in [0, 1), got {}", retry.jitter),
        });
    }
    if retry.multiplier < 1.0 {
        return Err(ConfigError::Invalid {
            key: "SCREENER_RETRY_MULTIPLIER".to_string(),
            reason: format!("must be >= 1, got {}", retry.multiplier),
        });
    }
    Ok(())
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parses an optional environment variable, falling back to the default.
fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("cannot parse '{raw}': {e}"),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analyzer_kind() {
        assert_eq!(parse_analyzer_kind("mock").unwrap(), AnalyzerKind::Mock);
        assert_eq!(parse_analyzer_kind(" LLM ").unwrap(), AnalyzerKind::Llm);
        assert!(parse_analyzer_kind("hybrid").is_err());
    }

    #[test]
    fn test_validate_retry_bounds() {
        let mut retry = RetryPolicy::default();
        assert!(validate_retry(&retry).is_ok());

        retry.jitter = 1.5;
        assert!(validate_retry(&retry).is_err());

        retry = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(validate_retry(&retry).is_err());

        retry = RetryPolicy {
            multiplier: 0.5,
            ..RetryPolicy::default()
        };
        assert!(validate_retry(&retry).is_err());
    }

    #[test]
    fn test_analyzer_kind_labels() {
        assert_eq!(AnalyzerKind::Mock.label(), "mock");
        assert_eq!(AnalyzerKind::Llm.label(), "llm");
    }
}
