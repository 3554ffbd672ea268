use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

use super::{CompletionBackend, CompletionRequest, Credential};
use crate::{PipelineResult, SummarizerError};

/// Client for an OpenAI-compatible chat completions endpoint
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_url: String,
    model: String,
    temperature: f32,
}

impl OpenAiBackend {
    pub fn new(
        api_url: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SummarizerError::UpstreamUnavailable(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            model: model.into(),
            temperature,
        })
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": request.system,
                },
                {
                    "role": "user",
                    "content": request.user,
                },
            ],
            "temperature": self.temperature,
        })
    }
}

fn transport_error(err: reqwest::Error) -> SummarizerError {
    if err.is_timeout() {
        SummarizerError::UpstreamUnavailable("language model request timed out".to_string())
    } else {
        SummarizerError::UpstreamUnavailable(format!("language model request failed: {}", err))
    }
}

/// `Retry-After` in whole seconds, as sent with 429 responses
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Error message from an OpenAI-style error body, or the raw body
fn error_message(body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(|s| s.to_string()));

    message.unwrap_or_else(|| body.chars().take(200).collect())
}

/// Map a non-success response to a typed failure
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> SummarizerError {
    let message = error_message(body);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SummarizerError::AuthError(message),
        // An exhausted quota will not recover by waiting
        StatusCode::TOO_MANY_REQUESTS if body.contains("insufficient_quota") => {
            SummarizerError::AuthError(message)
        }
        StatusCode::TOO_MANY_REQUESTS => SummarizerError::RateLimited {
            attempts: 1,
            retry_after,
        },
        _ => SummarizerError::UpstreamUnavailable(format!("HTTP {}: {}", status, message)),
    }
}

/// Pull the generated text out of a chat completion response
pub fn extract_content(response: &Value) -> PipelineResult<String> {
    response["choices"][0]["message"]["content"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| {
            SummarizerError::UpstreamUnavailable(format!(
                "unexpected completion response: {}",
                response.to_string().chars().take(200).collect::<String>()
            ))
        })
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, credential: &Credential, request: &CompletionRequest) -> PipelineResult<String> {
        tracing::debug!(
            "Requesting completion from {} (model {}, {} bytes of content)",
            self.api_url,
            self.model,
            request.user.len()
        );

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(credential.expose())
            .json(&self.request_body(request))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &body));
        }

        let body: Value = response.json().await.map_err(transport_error)?;
        extract_content(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde_json::json;

    #[test]
    fn test_auth_failures() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        let err = classify_status(StatusCode::UNAUTHORIZED, None, body);
        assert!(matches!(err, SummarizerError::AuthError(msg) if msg == "Incorrect API key provided"));
    }

    #[test]
    fn test_rate_limit_keeps_retry_hint() {
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(7)), "{}");
        assert!(matches!(
            err,
            SummarizerError::RateLimited { retry_after: Some(d), .. } if d == Duration::from_secs(7)
        ));
    }

    #[test]
    fn test_exhausted_quota_is_not_retryable() {
        let body = r#"{"error": {"message": "You exceeded your current quota", "code": "insufficient_quota"}}"#;
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, None, body);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_server_errors_are_upstream() {
        let err = classify_status(StatusCode::BAD_GATEWAY, None, "<html>bad gateway</html>");
        assert!(matches!(err, SummarizerError::UpstreamUnavailable(msg) if msg.contains("502")));
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(12)));
    }

    #[test]
    fn test_extract_content() {
        let response = json!({"choices": [{"message": {"role": "assistant", "content": "A summary."}}]});
        assert_eq!(extract_content(&response).unwrap(), "A summary.");
        assert!(extract_content(&json!({"choices": []})).is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let backend =
            OpenAiBackend::new("https://api.openai.com/v1/chat/completions", "gpt-4o-mini", 0.3, Duration::from_secs(5))
                .unwrap();
        let body = backend.request_body(&CompletionRequest {
            system: "instructions".into(),
            user: "transcript".into(),
        });

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "transcript");
    }
}
