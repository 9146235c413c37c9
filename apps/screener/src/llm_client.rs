//! LLM Client — the single point of entry for calls to the reasoning
//! capability.
//!
//! ARCHITECTURAL RULE: no other module may call the Anthropic API directly.
//! All reasoning-capability interactions go through this module, and every
//! request runs under the resilient transport's retry policy.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::transport::{self, RetryPolicy, TransportError, TransportFailure};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all reasoning calls.
pub const MODEL: &str = "claude-sonnet-4-5";
const MAX_TOKENS: u32 = 1024;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned no parseable JSON object")]
    NoJsonObject,

    #[error("LLM returned empty content")]
    EmptyContent,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

/// Client for the Anthropic Messages API. Retries (429/5xx/timeouts) are
/// handled by [`transport::execute`] under the configured policy.
#[derive(Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    policy: RetryPolicy,
}

impl LlmClient {
    pub fn new(client: reqwest::Client, api_key: String, policy: RetryPolicy) -> Self {
        Self {
            client,
            api_key,
            policy,
        }
    }

    /// Makes one call to the reasoning capability, returning the full
    /// response object.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<LlmResponse, LlmError> {
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = transport::execute(&self.policy, "llm.messages", || async {
            let response = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await
                .map_err(|e| transport::failure_from_request(&e))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(transport::failure_from_status(status, &body));
            }

            response
                .json::<LlmResponse>()
                .await
                .map_err(|e| TransportFailure::fatal(format!("malformed LLM response: {e}")))
        })
        .await?;

        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "LLM call succeeded"
        );

        Ok(response)
    }

    /// Calls the LLM and deserializes the text response as JSON. Tolerates
    /// markdown fences and prose around the object; the prompt must instruct
    /// the model to return valid JSON.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        system: &str,
    ) -> Result<T, LlmError> {
        let response = self.call(prompt, system).await?;
        let text = response.text().ok_or(LlmError::EmptyContent)?;

        let text = strip_json_fences(text);
        match serde_json::from_str(text) {
            Ok(value) => Ok(value),
            Err(_) => {
                // Models sometimes wrap the object in prose; salvage the
                // first balanced JSON object before giving up.
                let object = extract_first_json_object(text).ok_or(LlmError::NoJsonObject)?;
                serde_json::from_str(object).map_err(LlmError::Parse)
            }
        }
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

/// Finds the first balanced `{...}` object in the text, respecting string
/// literals and escapes.
fn extract_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_extract_object_from_surrounding_prose() {
        let input = "Here is the verdict: {\"score\": 0.8, \"note\": \"ok\"} Hope that helps!";
        assert_eq!(
            extract_first_json_object(input),
            Some("{\"score\": 0.8, \"note\": \"ok\"}")
        );
    }

    #[test]
    fn test_extract_object_handles_nested_and_strings() {
        let input = r#"{"a": {"b": "brace } in string"}, "c": 1} trailing"#;
        assert_eq!(
            extract_first_json_object(input),
            Some(r#"{"a": {"b": "brace } in string"}, "c": 1}"#)
        );
    }

    #[test]
    fn test_extract_object_none_without_braces() {
        assert_eq!(extract_first_json_object("no json here"), None);
    }
}
