//! JSON repair ladder for model responses
//!
//! Each call expects strict JSON. A response that fails to parse is first
//! stripped of code fences and re-parsed; if that still fails, the parse
//! error is sent back to the model as a correction turn, up to a fixed number
//! of attempts.

use serde_json::Value;

use crate::error::{PostrankError, Result};
use crate::llm::{CompletionRequest, LlmClient, Message};
use crate::scoring::backoff::{BackoffPolicy, complete_with_backoff};
use crate::scoring::prompts::correction_prompt;

/// Remove a surrounding markdown code fence, if any
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };

    // skip the fence line, including any language tag
    let after_fence = &trimmed[start + 3..];
    let body = match after_fence.find('\n') {
        Some(newline) => &after_fence[newline + 1..],
        None => after_fence,
    };

    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Parse as JSON, retrying once with code fences removed
pub fn parse_lenient(raw: &str) -> std::result::Result<Value, serde_json::Error> {
    match serde_json::from_str(raw.trim()) {
        Ok(value) => Ok(value),
        Err(_) => serde_json::from_str(strip_code_fences(raw)),
    }
}

/// Shape check for array responses
pub fn expect_array(value: Value) -> std::result::Result<Vec<Value>, String> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err("response must be a JSON array".to_string()),
    }
}

/// Drives one logical completion through backoff and repair
#[derive(Clone, Copy)]
pub struct JsonCompletion<'a> {
    pub client: &'a dyn LlmClient,
    pub backoff: &'a BackoffPolicy,
    /// Total completion attempts including correction turns
    pub max_attempts: u32,
}

impl JsonCompletion<'_> {
    /// Complete `request` and parse the reply with `shape`.
    ///
    /// API errors surface after backoff is exhausted. Parse and shape errors
    /// trigger a correction turn until `max_attempts` is reached, after which
    /// a `Parse` error is returned.
    pub async fn run<T, F>(&self, mut request: CompletionRequest, shape: F) -> Result<T>
    where
        F: Fn(Value) -> std::result::Result<T, String>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let response = complete_with_backoff(self.client, &request, self.backoff).await?;

            let parsed = parse_lenient(&response.content)
                .map_err(|e| e.to_string())
                .and_then(&shape);

            match parsed {
                Ok(value) => {
                    if attempt > 1 {
                        log::info!("Model JSON repaired on attempt {}", attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    log::warn!(
                        "Unparseable model response (attempt {}/{}): {}",
                        attempt,
                        attempts,
                        e
                    );
                    if attempt < attempts {
                        request = request
                            .with_message(Message::assistant(response.content))
                            .with_user_message(correction_prompt(&e));
                    }
                    last_error = e;
                }
            }
        }

        Err(PostrankError::Parse {
            attempts,
            message: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient, Role};

    fn runner<'a>(client: &'a MockLlmClient, backoff: &'a BackoffPolicy) -> JsonCompletion<'a> {
        JsonCompletion {
            client,
            backoff,
            max_attempts: 3,
        }
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```\n"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("Here you go:\n```json\n[]\n```"), "[]");
        assert_eq!(strip_code_fences("  [3]  "), "[3]");
    }

    #[test]
    fn test_parse_lenient() {
        assert_eq!(parse_lenient("[1]").unwrap(), serde_json::json!([1]));
        assert_eq!(parse_lenient("```json\n[1]\n```").unwrap(), serde_json::json!([1]));
        assert!(parse_lenient("not json").is_err());
    }

    #[tokio::test]
    async fn test_fenced_reply_parses_without_correction() {
        let mock = MockLlmClient::with_texts(["```json\n[{\"post_index\": 0}]\n```"]);
        let backoff = BackoffPolicy::immediate(1);

        let items = runner(&mock, &backoff)
            .run(CompletionRequest::new("s").with_user_message("go"), expect_array)
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_correction_turn_carries_parse_error() {
        let mock = MockLlmClient::with_texts(["[{\"post_index\": 0,}]", "[{\"post_index\": 0}]"]);
        let backoff = BackoffPolicy::immediate(1);

        let items = runner(&mock, &backoff)
            .run(CompletionRequest::new("s").with_user_message("go"), expect_array)
            .await
            .unwrap();
        assert_eq!(items.len(), 1);

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        let retry = &requests[1];
        assert_eq!(retry.messages.len(), 3);
        assert_eq!(retry.messages[1].role, Role::Assistant);
        assert_eq!(retry.messages[1].content, "[{\"post_index\": 0,}]");
        assert!(retry.last_user_message().unwrap().contains("could not be parsed"));
    }

    #[tokio::test]
    async fn test_wrong_shape_counts_as_parse_failure() {
        let mock = MockLlmClient::with_texts(["{\"post_index\": 0}", "{}", "\"nope\""]);
        let backoff = BackoffPolicy::immediate(1);

        let err = runner(&mock, &backoff)
            .run(CompletionRequest::new("s").with_user_message("go"), expect_array)
            .await
            .unwrap_err();

        match err {
            PostrankError::Parse { attempts, message } => {
                assert_eq!(attempts, 3);
                assert_eq!(message, "response must be a JSON array");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_api_error_propagates() {
        let mock = MockLlmClient::new(vec![Err(LlmError::MissingApiKey {
            env_var: "ANTHROPIC_API_KEY".to_string(),
        })]);
        let backoff = BackoffPolicy::immediate(3);

        let err = runner(&mock, &backoff)
            .run(CompletionRequest::new("s"), expect_array)
            .await
            .unwrap_err();
        assert!(matches!(err, PostrankError::Llm(LlmError::MissingApiKey { .. })));
    }
}
