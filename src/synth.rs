//! Answer synthesis: turn a question plus retrieved context into an answer.
//!
//! The language model is an opaque boundary: prompt in, text out. Each
//! request is bounded by `llm.timeout_secs`, and a request that runs out of
//! time is retried through [`crate::retry`] like any other transient failure.
//! The whole call is capped at [`RetryPolicy::worst_case`]. Anything that
//! still fails surfaces as [`RagError::Synthesis`], with `timed_out` set when
//! the model never answered.
//!
//! # Providers
//!
//! | `llm.provider` | Endpoint | Credential (default env var) |
//! |----------------|----------|------------------------------|
//! | `openai` | `POST {base_url}/chat/completions` | `OPENAI_API_KEY` (required) |
//! | `huggingface` | `POST {base_url}/{model}` | `HF_TOKEN` (optional) |

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{RagError, Result};
use crate::models::RetrievalResult;
use crate::prompt::{self, Answer};
use crate::retry::{self, CallError, RetryPolicy};

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OPENAI_DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const HF_DEFAULT_URL: &str = "https://api-inference.huggingface.co/models";
const HF_DEFAULT_MODEL: &str = "tiiuae/falcon-rw-1b";

/// A language model that can complete a prompt.
#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Send a fully rendered prompt and return the raw completion text.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Answer `question` from `context` using the fixed prompt template.
    async fn synthesize(&self, question: &str, context: &RetrievalResult) -> Result<Answer> {
        let prompt = prompt::build_prompt(question, context);
        let raw = self.complete(&prompt).await?;
        let answer = prompt::parse_answer(&raw);
        tracing::debug!(
            model = self.model_name(),
            sufficient = answer.has_sufficient_context,
            "answer synthesized"
        );
        Ok(answer)
    }
}

/// Shared HTTP plumbing for the remote synthesizers.
struct Endpoint {
    client: reqwest::Client,
    policy: RetryPolicy,
    timeout: Duration,
}

impl Endpoint {
    fn new(config: &LlmConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = retry::client_with_timeout(timeout).map_err(RagError::synthesis)?;
        Ok(Self {
            client,
            policy: RetryPolicy::new(config.max_retries, config.base_delay_ms),
            timeout,
        })
    }

    async fn post(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
        label: &str,
    ) -> Result<serde_json::Value> {
        let budget = self.policy.worst_case(self.timeout);
        let call = retry::post_json(&self.client, url, bearer, body, &self.policy, label);
        match tokio::time::timeout(budget, call).await {
            Ok(Ok(json)) => Ok(json),
            Ok(Err(CallError::TimedOut(msg))) => Err(RagError::synthesis_timeout(msg)),
            Ok(Err(CallError::Failed(msg))) => Err(RagError::synthesis(msg)),
            Err(_) => Err(RagError::synthesis_timeout(format!(
                "{} did not answer within {}s",
                label,
                budget.as_secs()
            ))),
        }
    }
}

fn api_key_from_env(config: &LlmConfig, default_var: &str) -> Option<String> {
    let var = config.api_key_env.as_deref().unwrap_or(default_var);
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

// ============ OpenAI ============

/// Chat-completions synthesizer for OpenAI and compatible servers.
pub struct OpenAISynthesizer {
    model: String,
    temperature: f32,
    max_tokens: u32,
    url: String,
    api_key: String,
    endpoint: Endpoint,
}

impl OpenAISynthesizer {
    /// Create from config, reading the key from `llm.api_key_env`
    /// (default `OPENAI_API_KEY`).
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let var = config.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
        let api_key = api_key_from_env(config, "OPENAI_API_KEY")
            .ok_or_else(|| RagError::Config(format!("{} environment variable not set", var)))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: String) -> Result<Self> {
        let base = config.base_url.as_deref().unwrap_or(OPENAI_DEFAULT_URL);
        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_MODEL.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            url: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key,
            endpoint: Endpoint::new(config)?,
        })
    }
}

#[async_trait]
impl AnswerSynthesizer for OpenAISynthesizer {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "user", "content": prompt }
            ],
        });
        let json = self
            .endpoint
            .post(&self.url, Some(&self.api_key), &body, "OpenAI chat")
            .await?;

        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| RagError::synthesis("OpenAI reply had no message content"))
    }
}

// ============ Hugging Face ============

/// Text-generation synthesizer for the Hugging Face inference API.
pub struct HuggingFaceSynthesizer {
    model: String,
    temperature: f32,
    max_tokens: u32,
    url: String,
    token: Option<String>,
    endpoint: Endpoint,
}

impl HuggingFaceSynthesizer {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let token = api_key_from_env(config, "HF_TOKEN");
        if token.is_none() {
            tracing::warn!("no Hugging Face token found; calling the inference API anonymously");
        }
        Self::with_token(config, token)
    }

    pub fn with_token(config: &LlmConfig, token: Option<String>) -> Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| HF_DEFAULT_MODEL.to_string());
        let base = config.base_url.as_deref().unwrap_or(HF_DEFAULT_URL);
        Ok(Self {
            url: format!("{}/{}", base.trim_end_matches('/'), model),
            model,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            token,
            endpoint: Endpoint::new(config)?,
        })
    }
}

#[async_trait]
impl AnswerSynthesizer for HuggingFaceSynthesizer {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "inputs": prompt,
            "parameters": {
                "temperature": self.temperature,
                "max_new_tokens": self.max_tokens,
                "return_full_text": false,
            },
        });
        let json = self
            .endpoint
            .post(&self.url, self.token.as_deref(), &body, "Hugging Face")
            .await?;

        // The API answers with either a list or a single object.
        json.pointer("/0/generated_text")
            .or_else(|| json.get("generated_text"))
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| RagError::synthesis("Hugging Face reply had no generated_text"))
    }
}

/// Create the configured [`AnswerSynthesizer`].
pub fn create_synthesizer(config: &LlmConfig) -> Result<Arc<dyn AnswerSynthesizer>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAISynthesizer::new(config)?)),
        "huggingface" => Ok(Arc::new(HuggingFaceSynthesizer::new(config)?)),
        other => Err(RagError::Config(format!("unknown llm provider: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serve `app` on an ephemeral port and return its base URL.
    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn llm_config(base_url: String) -> LlmConfig {
        LlmConfig {
            base_url: Some(base_url),
            max_retries: 2,
            base_delay_ms: 10,
            timeout_secs: 5,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn openai_retries_on_503_then_parses_json_reply() {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/chat/completions",
                post(|State(calls): State<Arc<AtomicUsize>>| async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        return Err(StatusCode::SERVICE_UNAVAILABLE);
                    }
                    Ok(Json(serde_json::json!({
                        "choices": [{ "message": { "content":
                            "{\"answer\": \"Thirty days.\", \"has_sufficient_context\": true}" } }]
                    })))
                }),
            )
            .with_state(calls.clone());
        let base = spawn(app).await;

        let synth = OpenAISynthesizer::with_api_key(&llm_config(base), "test-key".into()).unwrap();
        let context = RetrievalResult {
            query: "q".into(),
            hits: Vec::new(),
        };
        let answer = synth.synthesize("How long?", &context).await.unwrap();
        assert_eq!(answer.text, "Thirty days.");
        assert!(answer.has_sufficient_context);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/chat/completions",
                post(|State(calls): State<Arc<AtomicUsize>>| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    StatusCode::UNAUTHORIZED
                }),
            )
            .with_state(calls.clone());
        let base = spawn(app).await;

        let synth = OpenAISynthesizer::with_api_key(&llm_config(base), "bad".into()).unwrap();
        let err = synth.complete("hi").await.unwrap_err();
        assert!(matches!(err, RagError::Synthesis { timed_out: false, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_first_reply_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/chat/completions",
                post(|State(calls): State<Arc<AtomicUsize>>| async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        tokio::time::sleep(Duration::from_secs(3)).await;
                    }
                    Json(serde_json::json!({
                        "choices": [{ "message": { "content": "Eventually." } }]
                    }))
                }),
            )
            .with_state(calls.clone());
        let base = spawn(app).await;

        let config = LlmConfig {
            timeout_secs: 1,
            max_retries: 3,
            ..llm_config(base)
        };
        let synth = OpenAISynthesizer::with_api_key(&config, "test-key".into()).unwrap();
        let reply = synth.complete("hi").await.unwrap();
        assert_eq!(reply, "Eventually.");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn model_that_never_answers_is_a_timeout() {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/chat/completions",
                post(|State(calls): State<Arc<AtomicUsize>>| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    StatusCode::OK
                }),
            )
            .with_state(calls.clone());
        let base = spawn(app).await;

        let config = LlmConfig {
            timeout_secs: 1,
            max_retries: 1,
            ..llm_config(base)
        };
        let synth = OpenAISynthesizer::with_api_key(&config, "test-key".into()).unwrap();
        let err = synth.complete("hi").await.unwrap_err();
        assert!(matches!(err, RagError::Synthesis { timed_out: true, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn huggingface_reads_generated_text() {
        let app = Router::new().route(
            "/tiiuae/falcon-rw-1b",
            post(|| async {
                Json(serde_json::json!([{ "generated_text": "I don't know." }]))
            }),
        );
        let base = spawn(app).await;

        let synth = HuggingFaceSynthesizer::with_token(&llm_config(base), None).unwrap();
        let context = RetrievalResult {
            query: "q".into(),
            hits: Vec::new(),
        };
        let answer = synth.synthesize("Who?", &context).await.unwrap();
        assert!(!answer.has_sufficient_context);
    }

    #[test]
    fn unknown_provider_is_config_error() {
        let config = LlmConfig {
            provider: "mystery".into(),
            ..Default::default()
        };
        assert!(matches!(create_synthesizer(&config), Err(RagError::Config(_))));
    }
}
