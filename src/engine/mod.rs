use async_trait::async_trait;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

pub mod chunk;
pub mod openai;

use crate::prompt::{self, PromptId, PromptTemplate};
use crate::{PipelineResult, SummarizerError, TranscriptIssue};

pub use openai::OpenAiBackend;

/// Smallest per-chunk budget, however long the prompt is
const MIN_CHUNK_BYTES: usize = 1_000;

/// API key for the language model service
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// `None` for a blank key
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        (!key.is_empty()).then_some(Self(key))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// One chat completion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Instruction text
    pub system: String,

    /// Transcript (plus any extra context)
    pub user: String,
}

/// A text-completion service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, credential: &Credential, request: &CompletionRequest) -> PipelineResult<String>;
}

/// Retry policy for rate-limited completions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay between retries in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    4
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Calculate delay after a failed attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);

        Duration::from_millis((delay.min(self.max_delay_ms as f64)).max(0.0) as u64)
    }

    /// Delay before the next attempt, honoring a server hint up to the cap
    pub fn next_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let cap = Duration::from_millis(self.max_delay_ms);
        let delay = self.delay_for_attempt(attempt);

        match retry_after {
            Some(hint) => delay.max(hint).min(cap),
            None => delay,
        }
    }
}

/// Tuning knobs for the engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Input budget per completion, in bytes of prompt + content
    pub max_input_bytes: usize,

    /// Chunk completions allowed in flight at once
    pub max_concurrent_chunks: usize,

    /// Deadline for a single completion attempt
    pub request_timeout: Duration,

    pub retry: RetryPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_input_bytes: 48_000,
            max_concurrent_chunks: 3,
            request_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }
}

/// Sends transcripts to the language model, chunking those over the input budget
pub struct SummarizationEngine {
    backend: Arc<dyn CompletionBackend>,
    settings: EngineSettings,
}

impl SummarizationEngine {
    pub fn new(backend: Arc<dyn CompletionBackend>, settings: EngineSettings) -> Self {
        Self { backend, settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run `prompt` over `transcript` and return the raw model output.
    ///
    /// Fails with `MissingCredential` or `TranscriptUnavailable` before any request is made.
    /// Transcripts over the input budget are split; summaries of the parts are merged in
    /// transcript order, timestamp outlines of the parts are concatenated.
    pub async fn complete(
        &self,
        credential: Option<&Credential>,
        transcript: &str,
        prompt: &PromptTemplate,
        extra: Option<&str>,
    ) -> PipelineResult<String> {
        let credential = credential.ok_or(SummarizerError::MissingCredential)?;

        if transcript.trim().is_empty() {
            return Err(SummarizerError::TranscriptUnavailable {
                video_id: String::new(),
                issue: TranscriptIssue::Empty,
            });
        }

        if transcript.len() <= self.chunk_budget(prompt, extra) {
            tracing::debug!("Transcript fits in one request ({} bytes)", transcript.len());
            return self.complete_one(credential, &prompt.body, transcript, extra).await;
        }

        // Parts of a summary go out under the chunk prompt, outline parts under their own
        let part_prompt = match prompt.id {
            PromptId::Timestamp => prompt.clone(),
            _ => prompt::build(PromptId::Chunk, prompt.extra_context.as_deref()),
        };
        let budget = self.chunk_budget(&part_prompt, extra);
        let chunks = chunk::split(transcript, budget);

        tracing::info!(
            "Transcript of {} bytes split into {} chunks of at most {} bytes",
            transcript.len(),
            chunks.len(),
            budget
        );

        match prompt.id {
            PromptId::Timestamp => {
                let outlines = self.complete_all(credential, &part_prompt.body, chunks, extra).await?;
                Ok(outlines
                    .iter()
                    .map(|o| o.trim())
                    .filter(|o| !o.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            _ => {
                let partials = self.complete_all(credential, &part_prompt.body, chunks, extra).await?;
                self.merge(credential, partials, prompt.extra_context.as_deref(), extra).await
            }
        }
    }

    fn chunk_budget(&self, prompt: &PromptTemplate, extra: Option<&str>) -> usize {
        let overhead = prompt.body.len() + extra.map_or(0, |e| e.len() + 2);
        self.settings
            .max_input_bytes
            .saturating_sub(overhead)
            .max(MIN_CHUNK_BYTES)
    }

    /// Combine ordered partial summaries, reducing level by level while they overflow the budget
    async fn merge(
        &self,
        credential: &Credential,
        mut partials: Vec<String>,
        extra_context: Option<&str>,
        extra: Option<&str>,
    ) -> PipelineResult<String> {
        let merge_prompt = prompt::build(PromptId::Merge, extra_context);
        let budget = self.chunk_budget(&merge_prompt, extra);

        loop {
            let groups = group_parts(&partials, budget);

            if groups.len() == 1 || groups.len() == partials.len() {
                if groups.len() > 1 {
                    tracing::warn!(
                        "Partial summaries cannot be reduced further; merging {} parts in one request",
                        partials.len()
                    );
                }
                let combined = number_parts(&partials);
                return self.complete_one(credential, &merge_prompt.body, &combined, extra).await;
            }

            tracing::debug!("Reducing {} partial summaries in {} groups", partials.len(), groups.len());
            let group_refs: Vec<&str> = groups.iter().map(String::as_str).collect();
            partials = self
                .complete_all(credential, &merge_prompt.body, group_refs, extra)
                .await?;
        }
    }

    /// Complete every chunk with bounded parallelism; results keep chunk order
    async fn complete_all(
        &self,
        credential: &Credential,
        system: &str,
        chunks: Vec<&str>,
        extra: Option<&str>,
    ) -> PipelineResult<Vec<String>> {
        let total = chunks.len();

        stream::iter(chunks.into_iter().enumerate())
            .map(move |(index, chunk)| async move {
                tracing::debug!("Completing chunk {}/{}", index + 1, total);
                self.complete_one(credential, system, chunk, extra).await
            })
            .buffered(self.settings.max_concurrent_chunks.max(1))
            .try_collect()
            .await
    }

    async fn complete_one(
        &self,
        credential: &Credential,
        system: &str,
        content: &str,
        extra: Option<&str>,
    ) -> PipelineResult<String> {
        let user = match extra {
            Some(extra) => format!("{}\n\n{}", content.trim(), extra),
            None => content.trim().to_string(),
        };
        let request = CompletionRequest {
            system: system.to_string(),
            user,
        };

        self.with_retry(credential, &request).await
    }

    /// One request with a timeout per attempt and bounded backoff on rate limiting
    async fn with_retry(&self, credential: &Credential, request: &CompletionRequest) -> PipelineResult<String> {
        let policy = &self.settings.retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = match timeout(self.settings.request_timeout, self.backend.complete(credential, request)).await {
                Ok(result) => result,
                Err(_) => Err(SummarizerError::UpstreamUnavailable(format!(
                    "completion timed out after {}s",
                    self.settings.request_timeout.as_secs_f64()
                ))),
            };

            match result {
                Err(SummarizerError::RateLimited { retry_after, .. }) if attempt < max_attempts => {
                    let delay = policy.next_delay(attempt, retry_after);
                    tracing::warn!(
                        "Rate limited (attempt {}/{}), retrying in {}ms",
                        attempt,
                        max_attempts,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(SummarizerError::RateLimited { retry_after, .. }) => {
                    return Err(SummarizerError::RateLimited {
                        attempts: attempt,
                        retry_after,
                    });
                }
                other => return other,
            }
        }
    }
}

/// Pack consecutive parts into groups whose numbered text fits `budget`
fn group_parts(parts: &[String], budget: usize) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for part in parts {
        let mut candidate = current.clone();
        candidate.push(part.clone());

        if !current.is_empty() && number_parts(&candidate).len() > budget {
            groups.push(number_parts(&current));
            current = vec![part.clone()];
        } else {
            current = candidate;
        }
    }

    if !current.is_empty() {
        groups.push(number_parts(&current));
    }

    groups
}

fn number_parts(parts: &[String]) -> String {
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| format!("Part {}:\n{}", i + 1, part.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::assert_err;

    fn key() -> Credential {
        Credential::new("sk-test").unwrap()
    }

    fn fast_settings(max_input_bytes: usize) -> EngineSettings {
        EngineSettings {
            max_input_bytes,
            max_concurrent_chunks: 2,
            request_timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_attempts: 3,
                initial_delay_ms: 1,
                max_delay_ms: 5,
                backoff_multiplier: 2.0,
            },
        }
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        assert_eq!(format!("{:?}", key()), "Credential(***)");
        assert!(Credential::new("   ").is_none());
    }

    #[test]
    fn test_retry_delay_calculation() {
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(10000));
        assert_eq!(policy.next_delay(1, Some(Duration::from_secs(3))), Duration::from_secs(3));
        assert_eq!(policy.next_delay(1, Some(Duration::from_secs(60))), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_missing_credential_makes_no_request() {
        let mut backend = MockCompletionBackend::new();
        backend.expect_complete().never();

        let engine = SummarizationEngine::new(Arc::new(backend), fast_settings(10_000));
        let prompt = prompt::build(PromptId::Default, None);
        let err = engine.complete(None, "some transcript", &prompt, None).await.unwrap_err();
        assert!(matches!(err, SummarizerError::MissingCredential));
    }

    #[tokio::test]
    async fn test_empty_transcript_makes_no_request() {
        let mut backend = MockCompletionBackend::new();
        backend.expect_complete().never();

        let engine = SummarizationEngine::new(Arc::new(backend), fast_settings(10_000));
        let prompt = prompt::build(PromptId::Default, None);
        let err = engine.complete(Some(&key()), "  \n ", &prompt, None).await.unwrap_err();
        assert!(matches!(
            err,
            SummarizerError::TranscriptUnavailable { issue: TranscriptIssue::Empty, .. }
        ));
    }

    #[tokio::test]
    async fn test_single_request_carries_prompt_and_extra() {
        let mut backend = MockCompletionBackend::new();
        backend
            .expect_complete()
            .withf(|_, request| {
                request.system.contains("chapter timestamps")
                    && request.user == "[00:01] hi\n\nhttps://youtube.com/watch?v=X"
            })
            .times(1)
            .returning(|_, _| Ok("[0:01] Greeting".to_string()));

        let engine = SummarizationEngine::new(Arc::new(backend), fast_settings(10_000));
        let prompt = prompt::build(PromptId::Timestamp, Some("https://youtube.com/watch?v=X"));
        let output = engine
            .complete(Some(&key()), "[00:01] hi", &prompt, Some("https://youtube.com/watch?v=X"))
            .await
            .unwrap();
        assert_eq!(output, "[0:01] Greeting");
    }

    #[tokio::test]
    async fn test_rate_limit_retried_then_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut backend = MockCompletionBackend::new();
        backend.expect_complete().times(2).returning(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(SummarizerError::RateLimited { attempts: 1, retry_after: None })
            } else {
                Ok("done".to_string())
            }
        });

        let engine = SummarizationEngine::new(Arc::new(backend), fast_settings(10_000));
        let prompt = prompt::build(PromptId::Default, None);
        let output = engine.complete(Some(&key()), "text", &prompt, None).await.unwrap();
        assert_eq!(output, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_surfaces_after_max_attempts() {
        let mut backend = MockCompletionBackend::new();
        backend
            .expect_complete()
            .times(3)
            .returning(|_, _| Err(SummarizerError::RateLimited { attempts: 1, retry_after: None }));

        let engine = SummarizationEngine::new(Arc::new(backend), fast_settings(10_000));
        let prompt = prompt::build(PromptId::Default, None);
        let err = engine.complete(Some(&key()), "text", &prompt, None).await.unwrap_err();
        assert!(matches!(err, SummarizerError::RateLimited { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_upstream_and_auth_errors_are_not_retried() {
        for make in [
            (|| SummarizerError::UpstreamUnavailable("connection reset".into())) as fn() -> SummarizerError,
            || SummarizerError::AuthError("invalid key".into()),
        ] {
            let mut backend = MockCompletionBackend::new();
            backend.expect_complete().times(1).returning(move |_, _| Err(make()));

            let engine = SummarizationEngine::new(Arc::new(backend), fast_settings(10_000));
            let prompt = prompt::build(PromptId::Default, None);
            let result = engine.complete(Some(&key()), "text", &prompt, None).await;
            assert_err!(result);
        }
    }

    struct SlowBackend;

    #[async_trait]
    impl CompletionBackend for SlowBackend {
        async fn complete(&self, _: &Credential, _: &CompletionRequest) -> PipelineResult<String> {
            sleep(Duration::from_secs(30)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test]
    async fn test_timeout_reports_upstream_unavailable() {
        let mut settings = fast_settings(10_000);
        settings.request_timeout = Duration::from_millis(20);

        let engine = SummarizationEngine::new(Arc::new(SlowBackend), settings);
        let prompt = prompt::build(PromptId::Default, None);
        let err = engine.complete(Some(&key()), "text", &prompt, None).await.unwrap_err();
        assert!(matches!(err, SummarizerError::UpstreamUnavailable(msg) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn test_long_summary_is_chunked_and_merged() {
        let mut backend = MockCompletionBackend::new();
        backend
            .expect_complete()
            .withf(|_, r| r.system.contains("one consecutive part"))
            .returning(|_, r| Ok(format!("partial({})", r.user.split_whitespace().last().unwrap_or(""))));
        backend
            .expect_complete()
            .withf(|_, r| r.system.contains("consecutive parts of one video"))
            .times(1)
            .returning(|_, r| Ok(r.user.clone()));

        let transcript = (0..2_000).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let engine = SummarizationEngine::new(Arc::new(backend), fast_settings(2_000));
        let prompt = prompt::build(PromptId::Default, None);
        let summary = engine.complete(Some(&key()), &transcript, &prompt, None).await.unwrap();

        assert!(summary.starts_with("Part 1:\npartial("));
        assert!(summary.contains("partial(w1999)"));
    }

    #[test]
    fn test_group_parts_keeps_order_and_budget() {
        let parts: Vec<String> = (0..6).map(|i| format!("summary {}", i)).collect();
        let groups = group_parts(&parts, 40);
        assert!(groups.len() > 1);
        assert!(groups[0].contains("summary 0"));
        assert!(groups.last().unwrap().contains("summary 5"));
        assert!(groups.iter().all(|g| g.len() <= 40));
    }
}
