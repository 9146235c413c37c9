//! Crawler Client — executes a `SearchPayload` against the external search
//! capability.
//!
//! The concrete crawler backend sits behind a fixed JSON request/response
//! contract; all network I/O goes through the resilient transport layer.
//! Results are paginated up to the payload's result cap, with a politeness
//! delay between page fetches; truncation is always surfaced via the
//! `partial` flag, never silent.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::SearchError;
use crate::interpreter::SearchPayload;
use crate::transport::{self, RetryPolicy, TransportFailure};

/// Non-PII metadata about where a candidate reference came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMeta {
    pub site: String,
    pub updated_at: Option<String>,
}

/// One search result: an opaque candidate id plus the raw resume text.
/// Created per result, consumed once by the resume parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReference {
    pub id: String,
    pub resume_text: String,
    pub source: SourceMeta,
}

/// Search results plus the truncation marker.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub candidates: Vec<CandidateReference>,
    /// True when more results existed than the payload's cap allowed.
    pub partial: bool,
}

/// Wire request accepted by the crawler capability.
#[derive(Debug, Clone, Serialize)]
struct SearchRequest {
    query: Vec<String>,
    filters: BTreeMap<String, String>,
    page: usize,
    page_size: usize,
}

/// Wire response returned by the crawler capability.
#[derive(Debug, Clone, Deserialize)]
struct SearchResponse {
    candidates: Vec<CandidateWire>,
    #[serde(default)]
    next_page: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateWire {
    id: String,
    resume_text: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

/// The candidate-search seam. The production implementation is
/// [`CrawlerClient`]; tests inject fixed candidate lists.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn search(&self, payload: &SearchPayload) -> Result<SearchOutcome, SearchError>;
}

/// HTTP client for the crawler capability.
pub struct CrawlerClient {
    http: reqwest::Client,
    endpoint: String,
    policy: RetryPolicy,
    politeness_delay: Duration,
}

impl CrawlerClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: String,
        policy: RetryPolicy,
        politeness_delay: Duration,
    ) -> Self {
        Self {
            http,
            endpoint,
            policy,
            politeness_delay,
        }
    }

    async fn fetch_page(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let response = transport::execute(&self.policy, "crawler.search", || async {
            let response = self
                .http
                .post(&self.endpoint)
                .json(request)
                .send()
                .await
                .map_err(|e| transport::failure_from_request(&e))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(transport::failure_from_status(status, &body));
            }

            response
                .json::<SearchResponse>()
                .await
                .map_err(|e| TransportFailure::fatal(format!("malformed search response: {e}")))
        })
        .await?;
        Ok(response)
    }
}

#[async_trait]
impl CandidateSource for CrawlerClient {
    async fn search(&self, payload: &SearchPayload) -> Result<SearchOutcome, SearchError> {
        let mut candidates = Vec::new();
        let mut seen_ids = HashSet::new();
        let mut partial = false;
        let mut page = 0usize;

        loop {
            let request = SearchRequest {
                query: payload.query_terms.clone(),
                filters: payload.filters.clone(),
                page,
                page_size: payload.page_size,
            };
            debug!(page, "fetching search results page");
            let response = self.fetch_page(&request).await?;

            let page_count = response.candidates.len();
            partial |= absorb_page(
                &mut candidates,
                &mut seen_ids,
                response.candidates,
                payload.page_size,
            );
            debug!(page, page_count, total = candidates.len(), "absorbed page");

            if candidates.len() >= payload.page_size {
                // More results behind the cap count as truncation too.
                partial |= response.next_page.is_some();
                break;
            }
            match response.next_page {
                Some(next) if next > page => {
                    page = next;
                    tokio::time::sleep(self.politeness_delay).await;
                }
                // A non-advancing next_page would loop forever; stop.
                _ => break,
            }
        }

        info!(
            candidates = candidates.len(),
            partial, "candidate search finished"
        );
        Ok(SearchOutcome { candidates, partial })
    }
}

/// Folds one wire page into the accumulator, deduplicating by candidate id
/// and enforcing the result cap. Returns true when results were dropped for
/// the cap.
fn absorb_page(
    out: &mut Vec<CandidateReference>,
    seen_ids: &mut HashSet<String>,
    page: Vec<CandidateWire>,
    cap: usize,
) -> bool {
    let mut truncated = false;
    for wire in page {
        if wire.id.is_empty() || !seen_ids.insert(wire.id.clone()) {
            continue;
        }
        if out.len() >= cap {
            truncated = true;
            break;
        }
        out.push(CandidateReference {
            id: wire.id,
            resume_text: wire.resume_text,
            source: SourceMeta {
                site: wire.source.unwrap_or_else(|| "unknown".to_string()),
                updated_at: wire.updated_at,
            },
        });
    }
    truncated
}
