use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

pub const PERPLEXITY_DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";
pub const GEMINI_DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Ordered Perplexity model lists. Each request walks one list top to
/// bottom, one call per model, and keeps the first 2xx response.
pub const LAYOUT_MODELS: &[&str] = &[
    "sonar-small-chat",
    "sonar-pro",
    "sonar-small-online",
    "llama-3.1-sonar-small-128k-online",
];
pub const QUIZ_MODELS: &[&str] = &[
    "sonar-small-chat",
    "sonar-small-online",
    "sonar-pro",
    "llama-3.1-sonar-small-128k-online",
];

pub const GEMINI_QUIZ_MODEL: &str = "gemini-1.5-flash";
pub const GEMINI_FINAL_QUIZ_MODEL: &str = "gemini-1.5-pro-latest";

/// Failure of a single model attempt. The driver keeps only the most recent
/// one; its status (default 500) becomes the response status when every
/// model in the list has failed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{provider} API error: {message}")]
pub struct ProviderError {
    pub provider: &'static str,
    pub model: String,
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    fn transport(provider: &'static str, model: &str, err: reqwest::Error) -> Self {
        Self {
            provider,
            model: model.to_string(),
            status: None,
            message: err.to_string(),
        }
    }
}

/// Common chat message shape for Perplexity requests and responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// One generation request: prompt pair, token budget, and the strict output
/// schema forwarded as Perplexity's `json_schema` response format.
#[derive(Debug, Clone)]
pub struct ChatSpec<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub max_tokens: u32,
    pub schema_name: &'a str,
    pub schema: Value,
}

#[derive(Debug, Serialize)]
struct PerplexityRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    stream: bool,
    response_format: ResponseFormat<'a>,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct PerplexityResponse {
    choices: Vec<PerplexityChoice>,
}

#[derive(Debug, Deserialize)]
struct PerplexityChoice {
    message: ChatMessage,
}

/// Perplexity chat-completions client with linear model fallback.
#[derive(Debug, Clone)]
pub struct PerplexityProvider {
    client: Client,
    base_url: String,
}

impl PerplexityProvider {
    const PROVIDER_NAME: &'static str = "Perplexity";

    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.unwrap_or_else(|| PERPLEXITY_DEFAULT_BASE_URL.to_string()),
        }
    }

    /// Try each model in order with identical parameters, stopping at the
    /// first transport success. Content is not inspected here; a 2xx with a
    /// nonsense body still wins and is left for the normalizer to reject.
    /// After exhausting the list, the last recorded failure is surfaced.
    /// Attempts are strictly sequential; no model is retried.
    pub async fn complete_with_fallback(
        &self,
        api_key: &str,
        models: &[&str],
        spec: &ChatSpec<'_>,
    ) -> Result<String, ProviderError> {
        let mut last_err: Option<ProviderError> = None;

        for model in models {
            match self.attempt(api_key, model, spec).await {
                Ok(content) => {
                    info!(
                        provider = Self::PROVIDER_NAME,
                        model = *model,
                        response_length = content.len(),
                        "Model attempt succeeded"
                    );
                    return Ok(content);
                }
                Err(err) => {
                    warn!(
                        provider = Self::PROVIDER_NAME,
                        model = *model,
                        status = ?err.status,
                        error = %err.message,
                        "Model attempt failed, trying next in list"
                    );
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ProviderError {
            provider: Self::PROVIDER_NAME,
            model: String::new(),
            status: None,
            message: "no models configured".to_string(),
        }))
    }

    async fn attempt(
        &self,
        api_key: &str,
        model: &str,
        spec: &ChatSpec<'_>,
    ) -> Result<String, ProviderError> {
        let body = PerplexityRequest {
            model,
            temperature: 0.2,
            max_tokens: spec.max_tokens,
            top_p: 0.9,
            stream: false,
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: spec.schema_name,
                    schema: &spec.schema,
                },
            },
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: spec.system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: spec.prompt.to_string(),
                },
            ],
        };

        info!(
            provider = Self::PROVIDER_NAME,
            model,
            prompt_length = spec.prompt.len(),
            "Dispatching chat completion request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transport(Self::PROVIDER_NAME, model, e))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(Self::PROVIDER_NAME, model, e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&raw)
                .ok()
                .and_then(|v| {
                    v.pointer("/error/message")
                        .and_then(Value::as_str)
                        .map(str::to_owned)
                })
                .unwrap_or(raw);
            return Err(ProviderError {
                provider: Self::PROVIDER_NAME,
                model: model.to_string(),
                status: Some(status.as_u16()),
                message,
            });
        }

        // A 2xx whose body is not the expected envelope still counts as
        // success; the raw text is handed to the normalizer as-is.
        match serde_json::from_str::<PerplexityResponse>(&raw) {
            Ok(envelope) => Ok(envelope
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .unwrap_or_default()),
            Err(_) => Ok(raw),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

/// Gemini generateContent client. One call per request, no fallback list;
/// callers that want resilience degrade to the templated local generator.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    client: Client,
    base_url: String,
}

impl GeminiProvider {
    const PROVIDER_NAME: &'static str = "Gemini";

    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.unwrap_or_else(|| GEMINI_DEFAULT_BASE_URL.to_string()),
        }
    }

    pub async fn generate_content(
        &self,
        api_key: &str,
        model: &str,
        prompt: &str,
        max_output_tokens: u32,
    ) -> Result<String, ProviderError> {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.2,
                top_p: 0.9,
                max_output_tokens,
            },
        };

        // Key travels in the query string; never log the URL.
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, api_key
        );

        info!(
            provider = Self::PROVIDER_NAME,
            model,
            prompt_length = prompt.len(),
            "Dispatching generateContent request"
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transport(Self::PROVIDER_NAME, model, e))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(Self::PROVIDER_NAME, model, e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&raw)
                .ok()
                .and_then(|v| {
                    v.pointer("/error/message")
                        .and_then(Value::as_str)
                        .map(str::to_owned)
                })
                .unwrap_or(raw);
            return Err(ProviderError {
                provider: Self::PROVIDER_NAME,
                model: model.to_string(),
                status: Some(status.as_u16()),
                message,
            });
        }

        let envelope: GeminiResponse =
            serde_json::from_str(&raw).map_err(|e| ProviderError {
                provider: Self::PROVIDER_NAME,
                model: model.to_string(),
                status: None,
                message: format!("unexpected response envelope: {e}"),
            })?;

        envelope
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| ProviderError {
                provider: Self::PROVIDER_NAME,
                model: model.to_string(),
                status: None,
                message: "no candidates in response".to_string(),
            })
    }
}
