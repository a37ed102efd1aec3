use crate::metrics;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderShape {
    /// `contents/parts` request, key passed as a query parameter.
    Generative,
    /// OpenAI-style `messages` request with bearer auth.
    ChatCompletion,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub url: String,
    pub shape: ProviderShape,
    pub model: Option<String>,
    pub api_key: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Built-in provider order used when no provider list is configured.
pub struct ProviderPreset {
    pub name: &'static str,
    pub url: &'static str,
    pub shape: ProviderShape,
    pub model: Option<&'static str>,
    pub api_key_env: &'static str,
}

pub const DEFAULT_PROVIDERS: [ProviderPreset; 4] = [
    ProviderPreset {
        name: "Gemini Pro",
        url: "https://generativelanguage.googleapis.com/v1/models/gemini-pro:generateContent",
        shape: ProviderShape::Generative,
        model: None,
        api_key_env: "GEMINI_API_KEY",
    },
    ProviderPreset {
        name: "Groq Llama",
        url: "https://api.groq.com/openai/v1/chat/completions",
        shape: ProviderShape::ChatCompletion,
        model: Some("llama3-8b-8192"),
        api_key_env: "GROQ_API_KEY",
    },
    ProviderPreset {
        name: "OpenRouter",
        url: "https://openrouter.ai/api/v1/chat/completions",
        shape: ProviderShape::ChatCompletion,
        model: Some("microsoft/wizardlm-2-8x22b"),
        api_key_env: "OPENROUTER_API_KEY",
    },
    ProviderPreset {
        name: "Groq Backup",
        url: "https://api.groq.com/openai/v1/chat/completions",
        shape: ProviderShape::ChatCompletion,
        model: Some("mixtral-8x7b-32768"),
        api_key_env: "GROQ_API_KEY",
    },
];

pub const DEFAULT_MAX_TOKENS: u32 = 512;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP {0}")]
    Http(u16),
    #[error("request failed: {0}")]
    Request(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("empty completion")]
    EmptyCompletion,
}

impl ProviderError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Http(status) => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub provider: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmMessage {
    pub role: &'static str,
    pub content: String,
}

/// Ordered list of text-generation services. Each provider gets exactly one
/// attempt per request; the first non-empty answer wins.
#[derive(Debug, Clone)]
pub struct ProviderChain {
    http: Client,
    providers: Arc<[ProviderConfig]>,
}

impl ProviderChain {
    pub fn new(http: Client, providers: Vec<ProviderConfig>) -> Self {
        Self {
            http,
            providers: providers.into(),
        }
    }

    pub fn providers(&self) -> &[ProviderConfig] {
        &self.providers
    }

    pub async fn complete(&self, system: &str, prompt: &str) -> Option<Completion> {
        for provider in self.providers.iter() {
            match self.call(provider, system, prompt).await {
                Ok(text) => {
                    metrics::provider_attempt(&provider.name, true);
                    debug!(
                        target = "remedy.llm",
                        provider = %provider.name,
                        chars = text.len(),
                        "provider_completed"
                    );
                    return Some(Completion {
                        provider: provider.name.clone(),
                        text,
                    });
                }
                Err(err) => {
                    metrics::provider_attempt(&provider.name, false);
                    warn!(
                        target = "remedy.llm",
                        provider = %provider.name,
                        status = ?err.status(),
                        error = %err,
                        "provider_failed"
                    );
                }
            }
        }
        None
    }

    async fn call(
        &self,
        provider: &ProviderConfig,
        system: &str,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        let text = match provider.shape {
            ProviderShape::Generative => self.call_generative(provider, system, prompt).await?,
            ProviderShape::ChatCompletion => self.call_chat(provider, system, prompt).await?,
        };
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyCompletion);
        }
        Ok(text)
    }

    async fn call_generative(
        &self,
        provider: &ProviderConfig,
        system: &str,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        let body = GenerativeRequest {
            contents: vec![GenerativeContent {
                parts: vec![GenerativePart {
                    text: format!("{system}\n\n{prompt}"),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: provider.temperature,
                max_output_tokens: provider.max_tokens,
            },
        };
        let response = self
            .http
            .post(&provider.url)
            .query(&[("key", provider.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ProviderError::Http(response.status().as_u16()));
        }
        let payload: GenerativeResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::InvalidResponse(err.to_string()))?;
        payload
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .map(|part| part.text)
            .ok_or_else(|| ProviderError::InvalidResponse("missing candidate text".into()))
    }

    async fn call_chat(
        &self,
        provider: &ProviderConfig,
        system: &str,
        prompt: &str,
    ) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: provider.model.as_deref(),
            messages: vec![
                LlmMessage {
                    role: "system",
                    content: system.to_string(),
                },
                LlmMessage {
                    role: "user",
                    content: prompt.to_string(),
                },
            ],
            temperature: provider.temperature,
            max_tokens: provider.max_tokens,
        };
        let response = self
            .http
            .post(&provider.url)
            .bearer_auth(&provider.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| ProviderError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ProviderError::Http(response.status().as_u16()));
        }
        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::InvalidResponse(err.to_string()))?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("missing message content".into()))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerativeRequest {
    contents: Vec<GenerativeContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GenerativeContent {
    #[serde(default)]
    parts: Vec<GenerativePart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GenerativePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerativeResponse {
    #[serde(default)]
    candidates: Vec<GenerativeCandidate>,
}

#[derive(Debug, Deserialize)]
struct GenerativeCandidate {
    content: GenerativeContent,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<LlmMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}
