// src/llm/openai.rs

use crate::error::{Result, WpAiError};
use crate::llm::stream::sse_data;
use crate::llm::{
    Cancellable, CancellationToken, ChatMessage, FragmentStream, LanguageModel, http_client,
    response_lines, send,
};
use reqwest::blocking::Client;
use serde_json::{Value, json};

const DEFAULT_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat completions endpoint.
pub struct OpenAiClient {
    client: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(model: &str, api_key: &str, base_url: Option<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            model: model.to_string(),
            api_key: api_key.to_string(),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn completions(&self, messages: &[ChatMessage], stream: bool) -> reqwest::blocking::RequestBuilder {
        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "stream": stream
            }))
    }
}

/// One SSE `data:` payload; `None` for role-only deltas and the `[DONE]` marker.
pub fn delta_content(data: &str) -> Option<Result<String>> {
    if data == "[DONE]" {
        return None;
    }
    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return Some(Err(WpAiError::ModelInvocation(format!("bad openai chunk: {}", e)))),
    };
    value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(|text| Ok(text.to_string()))
}

impl LanguageModel for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        let body: Value = send("openai", self.completions(&[ChatMessage::user(prompt)], false))?
            .json()
            .map_err(|e| WpAiError::ModelInvocation(format!("Failed to parse JSON: {}", e)))?;
        body.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| WpAiError::ModelInvocation(format!("openai returned no content: {}", body)))
    }

    fn generate_stream<'a>(
        &'a self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<FragmentStream<'a>> {
        let response = send("openai", self.completions(messages, true))?;
        let fragments = response_lines("openai", response)
            .take_while(|line| !matches!(line, Ok(l) if sse_data(l) == Some("[DONE]")))
            .filter_map(|line| match line {
                Ok(line) => sse_data(&line).and_then(delta_content),
                Err(e) => Some(Err(e)),
            });
        Ok(Box::new(Cancellable::new(fragments, cancel)))
    }
}
