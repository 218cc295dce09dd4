// src/llm/mod.rs

use crate::config::{CredentialStore, LlmConfig};
use crate::error::{Result, WpAiError};
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::time::Duration;

pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod stream;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use stream::{Cancellable, CancellationToken};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: &str) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: &str) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Lazy, finite sequence of generated text fragments.
pub type FragmentStream<'a> = Box<dyn Iterator<Item = Result<String>> + 'a>;

pub trait LanguageModel {
    fn name(&self) -> &str;

    fn generate(&self, prompt: &str) -> Result<String>;

    /// The token is checked before each fragment is handed out.
    fn generate_stream<'a>(
        &'a self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<FragmentStream<'a>>;
}

/// Builds the provider named in `[llm]`.
pub fn build_model(config: &LlmConfig, credentials: &dyn CredentialStore) -> Result<Box<dyn LanguageModel>> {
    let require_key = || {
        credentials.llm_api_key(&config.provider).ok_or_else(|| {
            WpAiError::Config(format!(
                "API key for {} not found; set {}",
                config.provider,
                crate::config::EnvCredentials::provider_var(&config.provider)
            ))
        })
    };
    let base_url = config.base_url.clone();

    match config.provider.as_str() {
        "gemini" => Ok(Box::new(GeminiClient::new(&config.model, &require_key()?, base_url)?)),
        "openai" => Ok(Box::new(OpenAiClient::new(&config.model, &require_key()?, base_url)?)),
        "ollama" => Ok(Box::new(OllamaClient::new(&config.model, base_url)?)),
        other => Err(WpAiError::Config(format!(
            "unsupported llm provider '{}' (expected gemini, openai or ollama)",
            other
        ))),
    }
}

pub(crate) fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| WpAiError::ModelInvocation(format!("cannot build HTTP client: {}", e)))
}

/// Sends the request and turns non-2xx answers into `ModelInvocation` errors.
pub(crate) fn send(provider: &str, request: reqwest::blocking::RequestBuilder) -> Result<Response> {
    let response = request
        .send()
        .map_err(|e| WpAiError::ModelInvocation(format!("{} request failed: {}", provider, e)))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(WpAiError::ModelInvocation(format!(
            "{} returned {}: {}",
            provider,
            status,
            body.trim()
        )));
    }
    Ok(response)
}

pub(crate) fn response_lines(provider: &'static str, response: Response) -> impl Iterator<Item = Result<String>> {
    BufReader::new(response).lines().map(move |line| {
        line.map_err(|e| WpAiError::ModelInvocation(format!("{} stream broke: {}", provider, e)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticCredentials;

    fn llm(provider: &str) -> LlmConfig {
        LlmConfig {
            provider: provider.into(),
            model: "m".into(),
            base_url: None,
        }
    }

    #[test]
    fn hosted_providers_need_a_key() {
        let none = StaticCredentials::new();
        assert!(matches!(build_model(&llm("gemini"), &none), Err(WpAiError::Config(_))));
        assert!(matches!(build_model(&llm("openai"), &none), Err(WpAiError::Config(_))));

        let keyed = StaticCredentials::new().with_api_key("gemini", "k");
        assert_eq!(build_model(&llm("gemini"), &keyed).unwrap().name(), "gemini");
    }

    #[test]
    fn ollama_runs_without_a_key() {
        let model = build_model(&llm("ollama"), &StaticCredentials::new()).unwrap();
        assert_eq!(model.name(), "ollama");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(matches!(
            build_model(&llm("mystery"), &StaticCredentials::new()),
            Err(WpAiError::Config(_))
        ));
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}
