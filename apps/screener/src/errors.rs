use thiserror::Error;

use crate::transport::TransportError;

/// Startup configuration failure. The only error that aborts the process;
/// everything else is recorded per candidate and the run continues.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required environment variable '{0}' is not set")]
    MissingVar(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Brief interpretation failure.
#[derive(Debug, Error)]
pub enum InterpretError {
    #[error("Hiring brief is empty")]
    EmptyBrief,
}

/// Resume text was structurally unusable. Partial extraction is NOT an
/// error — missing sections stay absent on the parsed resume.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Resume text is empty")]
    Empty,

    #[error("Resume content is not readable text: {0}")]
    NotText(String),
}

/// Crawler capability failure, surfaced only after the transport layer has
/// exhausted retries or hit a fatal classification.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Candidate search failed: {0}")]
    Transport(#[from] TransportError),
}

/// Result store I/O failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Run-level pipeline failure. Per-candidate parse/analysis problems never
/// surface here — they become failure markers in the result store.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Interpret(#[from] InterpretError),

    #[error(transparent)]
    Search(#[from] SearchError),
}
