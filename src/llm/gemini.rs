// src/llm/gemini.rs

use crate::error::{Result, WpAiError};
use crate::llm::stream::sse_data;
use crate::llm::{
    Cancellable, CancellationToken, ChatMessage, FragmentStream, LanguageModel, Role, http_client,
    response_lines, send,
};
use reqwest::blocking::Client;
use serde_json::{Value, json};

const DEFAULT_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Generative Language API client.
pub struct GeminiClient {
    client: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
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

    fn endpoint(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, self.model, method)
    }
}

/// Request body; system messages become `systemInstruction`, assistant turns use role `model`.
pub fn request_body(messages: &[ChatMessage]) -> Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let contents: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = if m.role == Role::Assistant { "model" } else { "user" };
            json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();

    let mut body = json!({ "contents": contents });
    if !system.is_empty() {
        body["systemInstruction"] = json!({ "parts": [{ "text": system.join("\n\n") }] });
    }
    body
}

/// Concatenated text parts of the first candidate.
pub fn candidate_text(body: &Value) -> Option<String> {
    let parts = body.pointer("/candidates/0/content/parts")?.as_array()?;
    Some(
        parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<String>(),
    )
}

impl LanguageModel for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        let request = self
            .client
            .post(self.endpoint("generateContent"))
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body(&[ChatMessage::user(prompt)]));
        let body: Value = send("gemini", request)?
            .json()
            .map_err(|e| WpAiError::ModelInvocation(format!("Failed to parse JSON: {}", e)))?;
        candidate_text(&body)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| WpAiError::ModelInvocation(format!("gemini returned no text: {}", body)))
    }

    fn generate_stream<'a>(
        &'a self,
        messages: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<FragmentStream<'a>> {
        let request = self
            .client
            .post(self.endpoint("streamGenerateContent"))
            .query(&[("alt", "sse"), ("key", self.api_key.as_str())])
            .json(&request_body(messages));
        let response = send("gemini", request)?;
        let fragments = response_lines("gemini", response).filter_map(|line| {
            let line = match line {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            let data = sse_data(&line)?;
            match serde_json::from_str::<Value>(data) {
                Ok(chunk) => candidate_text(&chunk).filter(|t| !t.is_empty()).map(Ok),
                Err(e) => Some(Err(WpAiError::ModelInvocation(format!("bad gemini chunk: {}", e)))),
            }
        });
        Ok(Box::new(Cancellable::new(fragments, cancel)))
    }
}
